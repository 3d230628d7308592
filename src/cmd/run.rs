//! Workflow execution: `conductor run` and `conductor resume`.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use std::sync::Arc;

use conductor::adapter::{CommandAdapter, SessionConfig};
use conductor::config::RunOptions;
use conductor::directives::PluginDirectiveRegistry;
use conductor::engine::{RunResult, WorkflowEngine};
use conductor::lsp::LanguageClientRegistry;
use conductor::session::{Session, SessionStatus};
use conductor::step::Workflow;
use conductor::ui::icons::{CHECK, CONSULT, PAUSE};
use conductor::verify::VerifierRegistry;

use super::super::Cli;

fn load_workflow(path: &Path) -> Result<Workflow> {
    let workflow = Workflow::load(path)?;
    for warning in workflow.validate() {
        eprintln!("{} {}", style("warning:").yellow().bold(), warning);
    }
    Ok(workflow)
}

/// Assemble the engine from `.conductor/conductor.toml` and CLI flags.
fn build_engine(cli: &Cli, project_dir: &Path, wait_review: bool) -> Result<WorkflowEngine> {
    let (mut options, toml) = RunOptions::load(project_dir)?;
    options.quiet = cli.quiet;
    options.verbose = cli.verbose;
    options.wait_for_review = wait_review;

    for warning in toml.validate() {
        tracing::warn!("{}", warning);
    }

    let directives = PluginDirectiveRegistry::discover(project_dir, options.directive_timeout);
    tracing::debug!(
        manifests = directives.manifests().len(),
        handlers = directives.handlers().len(),
        "directive handlers loaded"
    );

    let session_config = SessionConfig {
        model: toml.adapter.model.clone(),
        system_prompt: None,
        working_dir: Some(project_dir.to_path_buf()),
    };
    let adapter = Arc::new(CommandAdapter::new(&toml.adapter, project_dir));

    Ok(WorkflowEngine::new(adapter, options)
        .with_verifiers(VerifierRegistry::from_commands(&toml.verify.commands))
        .with_language_clients(LanguageClientRegistry::with_source_index())
        .with_directives(directives)
        .with_session_config(session_config))
}

fn report(session: &Session, result: &RunResult, workflow_path: &Path) -> Result<()> {
    match result.status {
        SessionStatus::Completed => {
            println!(
                "{}Session {} completed ({} response(s), {} checkpoint(s))",
                CHECK,
                style(&session.id).cyan(),
                result.responses.len(),
                result.checkpoints.len()
            );
        }
        SessionStatus::Paused | SessionStatus::Consulting => {
            let icon = if result.status == SessionStatus::Paused {
                PAUSE
            } else {
                CONSULT
            };
            println!(
                "{}Session {} is {} at step {}",
                icon,
                style(&session.id).cyan(),
                style(result.status).yellow(),
                session.prompt_index
            );
            println!(
                "  Review, then run: conductor review clear {} && conductor resume {} {}",
                session.id,
                session.id,
                workflow_path.display()
            );
        }
        SessionStatus::Failed => {
            anyhow::bail!(
                "Session {} failed: {}",
                session.id,
                result.stop_reason.as_deref().unwrap_or("unknown error")
            );
        }
        SessionStatus::Idle | SessionStatus::Running => {
            anyhow::bail!(
                "Session {} ended in unexpected state {}",
                session.id,
                result.status
            );
        }
    }
    Ok(())
}

pub async fn cmd_run(
    cli: &Cli,
    project_dir: &Path,
    workflow_path: &Path,
    session_id: Option<&str>,
    wait_review: bool,
) -> Result<()> {
    let workflow = load_workflow(workflow_path)?;
    let engine = build_engine(cli, project_dir, wait_review)?;

    let mut session = match session_id {
        Some(id) => Session::new(id),
        None => Session::generate(),
    };
    if engine.store().latest(&session.id)?.is_some() {
        anyhow::bail!(
            "Session {} already has checkpoints. Use 'conductor resume {} {}' to continue it.",
            session.id,
            session.id,
            workflow_path.display()
        );
    }

    if !cli.quiet {
        println!("Starting session {}", style(&session.id).cyan());
    }
    let result = engine
        .run(&workflow, &mut session)
        .await
        .context("Workflow did not start")?;
    report(&session, &result, workflow_path)
}

pub async fn cmd_resume(
    cli: &Cli,
    project_dir: &Path,
    session_id: &str,
    workflow_path: &Path,
    wait_review: bool,
) -> Result<()> {
    let workflow = load_workflow(workflow_path)?;
    let engine = build_engine(cli, project_dir, wait_review)?;

    let mut session = Session::new(session_id);
    let checkpoint = engine
        .store()
        .apply_to(&mut session)
        .with_context(|| format!("Cannot resume session {}", session_id))?;

    if !cli.quiet {
        println!(
            "Resuming session {} at step {} from {} checkpoint '{}'",
            style(&session.id).cyan(),
            session.prompt_index,
            checkpoint.kind,
            checkpoint.name
        );
    }
    let result = engine
        .run(&workflow, &mut session)
        .await
        .context("Workflow did not resume")?;
    report(&session, &result, workflow_path)
}
