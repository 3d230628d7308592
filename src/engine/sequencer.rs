use anyhow::Context;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapter::{AdapterSession, SessionConfig, SessionHandle};
use crate::checkpoint::{CheckpointKind, CheckpointRequest, CheckpointStore, ReviewGate};
use crate::compaction::{ContextBudgetTracker, build_compaction_prompt};
use crate::config::{GateErrorPolicy, RunOptions};
use crate::directives::{DirectiveContext, PluginDirectiveRegistry};
use crate::errors::{AdapterError, CheckpointError, EngineError};
use crate::lsp::{LanguageClientRegistry, LspCommand};
use crate::process::{AsyncProcessRegistry, run_command};
use crate::session::{Role, Session, SessionStatus};
use crate::step::{CompareOp, EmbeddedCommand, PausePoint, Step, Workflow, parse_duration};
use crate::tracker::GitTracker;
use crate::ui::StepUI;
use crate::verify::{COVERAGE_VERIFIER, TRACE_VERIFIER, VerifierRegistry, VerifyRequest};

/// What the sequencer does after a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Continue,
    /// Control returns to the caller; resume from the checkpoint at this path.
    Pause(PathBuf),
    Stop(String),
}

/// Summary of one engine invocation.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub status: SessionStatus,
    /// Every model response received during this run, in order.
    pub responses: Vec<String>,
    /// Checkpoints written during this run.
    pub checkpoints: Vec<PathBuf>,
    pub stop_reason: Option<String>,
}

/// A halt requested by a `pause`/`consult` step or pause point.
#[derive(Debug, Clone, Copy)]
pub(super) enum Halt<'a> {
    Pause(&'a str),
    Consult(&'a str),
}

impl<'a> From<&'a PausePoint> for Halt<'a> {
    fn from(point: &'a PausePoint) -> Self {
        match point {
            PausePoint::Pause { message } => Halt::Pause(message),
            PausePoint::Consult { topic } => Halt::Consult(topic),
        }
    }
}

/// Mutable state scoped to a single `run` call.
pub(super) struct RunState {
    pub(super) handle: Option<SessionHandle>,
    /// Context inputs, prepended to the first message of a conversation.
    pub(super) preamble: String,
    pub(super) first_prompt: bool,
    pub(super) tracker: ContextBudgetTracker,
    pub(super) background: AsyncProcessRegistry,
    pub(super) responses: Vec<String>,
    pub(super) checkpoints: Vec<PathBuf>,
    pub(super) consult_timeout: Option<std::time::Duration>,
    pub(super) output_path: Option<PathBuf>,
    pub(super) ui: Option<StepUI>,
}

impl RunState {
    fn handle(&self) -> Result<SessionHandle, AdapterError> {
        self.handle
            .clone()
            .ok_or_else(|| AdapterError::UnknownSession("<none>".into()))
    }
}

/// Executes workflows step by step against an adapter.
pub struct WorkflowEngine {
    pub(super) adapter: Arc<dyn AdapterSession>,
    pub(super) options: RunOptions,
    pub(super) store: CheckpointStore,
    pub(super) verifiers: VerifierRegistry,
    pub(super) lsp: LanguageClientRegistry,
    pub(super) directives: PluginDirectiveRegistry,
    pub(super) session_config: SessionConfig,
}

impl WorkflowEngine {
    pub fn new(adapter: Arc<dyn AdapterSession>, options: RunOptions) -> Self {
        let store = CheckpointStore::new(options.sessions_dir());
        let session_config = SessionConfig {
            working_dir: Some(options.workspace_root.clone()),
            ..Default::default()
        };
        Self {
            adapter,
            store,
            verifiers: VerifierRegistry::new(),
            lsp: LanguageClientRegistry::with_source_index(),
            directives: PluginDirectiveRegistry::new(options.directive_timeout),
            session_config,
            options,
        }
    }

    pub fn with_verifiers(mut self, verifiers: VerifierRegistry) -> Self {
        self.verifiers = verifiers;
        self
    }

    pub fn with_language_clients(mut self, lsp: LanguageClientRegistry) -> Self {
        self.lsp = lsp;
        self
    }

    pub fn with_directives(mut self, directives: PluginDirectiveRegistry) -> Self {
        self.directives = directives;
        self
    }

    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Run `workflow` from `session.prompt_index` until it completes,
    /// pauses or stops.
    ///
    /// Errors are returned only for problems detected before the session
    /// starts running (terminal session, pending review, invalid workflow
    /// settings). Failures after that end the session as `failed` and are
    /// reported through [`RunResult::stop_reason`].
    pub async fn run(
        &self,
        workflow: &Workflow,
        session: &mut Session,
    ) -> Result<RunResult, EngineError> {
        if session.status().is_terminal() {
            return Err(EngineError::SessionTerminal {
                session_id: session.id.clone(),
                status: session.status(),
            });
        }

        let gate = ReviewGate::new(self.store.session_dir(&session.id));
        if self.options.wait_for_review {
            gate.wait_until_clear(self.options.review_poll_interval)
                .await?;
        } else {
            gate.ensure_clear()?;
        }

        let consult_timeout = match workflow.consult_timeout.as_deref() {
            Some(token) => Some(parse_duration(token)?),
            None => self.options.consult_timeout,
        };
        let output_path = workflow
            .output
            .as_ref()
            .map(|p| self.options.workspace_root.join(p))
            .or_else(|| self.options.resolved_output_path());

        self.warn_if_consult_expired(session);

        session.cycle_number += 1;
        session.transition(SessionStatus::Running)?;
        tracing::info!(
            session_id = %session.id,
            cycle = session.cycle_number,
            start = session.prompt_index,
            steps = workflow.steps.len(),
            "session running"
        );

        let ui = (!self.options.quiet).then(|| {
            let ui = StepUI::new(
                workflow.steps.len(),
                session.prompt_index,
                self.options.verbose,
            );
            ui.print_header(workflow.name.as_deref().unwrap_or("workflow"), &session.id);
            ui
        });

        let mut run = RunState {
            handle: None,
            preamble: String::new(),
            first_prompt: true,
            tracker: ContextBudgetTracker::new(session.context.max_tokens),
            background: AsyncProcessRegistry::new(),
            responses: Vec::new(),
            checkpoints: Vec::new(),
            consult_timeout,
            output_path,
            ui,
        };

        let outcome = self.execute(workflow, session, &mut run).await;
        self.teardown(session, &mut run).await;

        let stop_reason = match outcome {
            Ok(StepOutcome::Continue) => {
                session.transition(SessionStatus::Completed)?;
                tracing::info!(session_id = %session.id, "session completed");
                if let Some(ref ui) = run.ui {
                    ui.completed();
                }
                None
            }
            Ok(StepOutcome::Pause(path)) => {
                tracing::info!(
                    session_id = %session.id,
                    status = %session.status(),
                    checkpoint = %path.display(),
                    "session halted for review"
                );
                None
            }
            Ok(StepOutcome::Stop(reason)) => {
                tracing::warn!(session_id = %session.id, %reason, "session stopped");
                self.fail_session(session, &mut run, &reason)?;
                Some(reason)
            }
            Err(e) => {
                let reason = format!("{:#}", anyhow::Error::from(e));
                tracing::error!(session_id = %session.id, error = %reason, "session failed");
                self.fail_session(session, &mut run, &reason)?;
                Some(reason)
            }
        };

        Ok(RunResult {
            status: session.status(),
            responses: run.responses,
            checkpoints: run.checkpoints,
            stop_reason,
        })
    }

    fn warn_if_consult_expired(&self, session: &Session) {
        if session.status() != SessionStatus::Consulting {
            return;
        }
        if let Ok(Some((path, checkpoint))) = self.store.latest(&session.id)
            && checkpoint.is_expired(Utc::now())
        {
            tracing::warn!(
                session_id = %session.id,
                checkpoint = %path.display(),
                "consult window expired, resuming without an answer"
            );
        }
    }

    /// Mark the session failed and attempt a failure checkpoint.
    fn fail_session(
        &self,
        session: &mut Session,
        run: &mut RunState,
        reason: &str,
    ) -> Result<(), EngineError> {
        session.transition(SessionStatus::Failed)?;
        let request = CheckpointRequest::new(CheckpointKind::Failure, "failure").with_message(reason);
        if let Err(e) = self.save_checkpoint(session, run, request) {
            tracing::warn!(session_id = %session.id, error = %e, "could not write failure checkpoint");
        }
        if let Some(ref ui) = run.ui {
            ui.failed(reason);
        }
        Ok(())
    }

    async fn execute(
        &self,
        workflow: &Workflow,
        session: &mut Session,
        run: &mut RunState,
    ) -> Result<StepOutcome, EngineError> {
        run.preamble = self.load_context(workflow)?;
        self.open_adapter_session(session, run).await?;

        while session.prompt_index < workflow.steps.len() {
            let index = session.prompt_index;
            let step = &workflow.steps[index];
            session.prompt_index = index + 1;

            tracing::info!(step = index, kind = step.kind(), "executing step");
            if let Some(ref ui) = run.ui {
                ui.start_step(index, step.kind(), &step.describe());
            }

            let outcome = self
                .execute_step(workflow, index, step, session, run)
                .await?;

            if let Some(ref ui) = run.ui {
                ui.step_done();
            }
            if outcome != StepOutcome::Continue {
                return Ok(outcome);
            }
        }

        Ok(StepOutcome::Continue)
    }

    async fn execute_step(
        &self,
        workflow: &Workflow,
        index: usize,
        step: &Step,
        session: &mut Session,
        run: &mut RunState,
    ) -> Result<StepOutcome, EngineError> {
        match step {
            Step::Prompt { text } => {
                self.execute_prompt(workflow, index, text, &[], session, run)
                    .await
            }
            Step::MergedPrompt {
                text,
                embedded_commands,
            } => {
                self.execute_prompt(workflow, index, text, embedded_commands, session, run)
                    .await
            }
            Step::Run {
                command,
                retry_count,
                retry_prompt,
                on_failure,
                on_success,
            } => {
                self.execute_run(
                    command,
                    *retry_count,
                    retry_prompt.as_deref(),
                    on_failure,
                    on_success,
                    session,
                    run,
                )
                .await
            }
            Step::RunAsync { command } => {
                let handle = run
                    .background
                    .spawn(command, &self.options.workspace_root, &[])?;
                if let Some(ref ui) = run.ui {
                    ui.log_step(&format!("started background process {}", handle.id));
                }
                Ok(StepOutcome::Continue)
            }
            Step::RunWait { duration } => {
                let wait = parse_duration(duration)?;
                tracing::debug!(?wait, "waiting");
                tokio::time::sleep(wait).await;
                Ok(StepOutcome::Continue)
            }
            Step::Checkpoint { name } => self.execute_checkpoint(name, session, run),
            Step::Compact { preserve_list } => {
                self.execute_compact(preserve_list, session, run).await
            }
            Step::Verify { kind, options } => {
                let request = VerifyRequest {
                    kind: kind.clone(),
                    options: options.clone(),
                };
                self.execute_verify(request, None, session, run).await
            }
            Step::VerifyTrace { from_id, to_id } => {
                let request = VerifyRequest::new(TRACE_VERIFIER)
                    .with_option("from", from_id)
                    .with_option("to", to_id);
                self.execute_verify(request, None, session, run).await
            }
            Step::VerifyCoverage {
                metric,
                op,
                threshold,
            } => {
                let request = VerifyRequest::new(COVERAGE_VERIFIER).with_option("metric", metric);
                self.execute_verify(request, Some((metric.as_str(), *op, *threshold)), session, run)
                    .await
            }
            Step::Consult { topic } => self.halt(Halt::Consult(topic), session, run),
            Step::Pause { message } => self.halt(Halt::Pause(message), session, run),
            Step::Lsp { subcommand, args } => {
                self.execute_lsp(subcommand, args, session).await;
                Ok(StepOutcome::Continue)
            }
            Step::NewConversation => {
                self.new_conversation(session, run).await?;
                Ok(StepOutcome::Continue)
            }
            Step::Directive {
                directive_type,
                name,
                value,
            } => {
                self.execute_directive(directive_type, name, value, session, run)
                    .await
            }
        }
    }

    /// Read context inputs into a single preamble.
    fn load_context(&self, workflow: &Workflow) -> Result<String, EngineError> {
        let mut sections = Vec::new();
        for input in &workflow.context {
            let path = self.options.workspace_root.join(&input.path);
            match std::fs::read_to_string(&path) {
                Ok(content) => sections.push(format!(
                    "## Context: {}\n\n{}",
                    input.path.display(),
                    content.trim_end()
                )),
                Err(_) if input.required => {
                    return Err(EngineError::MissingContext { path });
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "optional context input unavailable");
                }
            }
        }
        Ok(sections.join("\n\n"))
    }

    async fn open_adapter_session(
        &self,
        session: &mut Session,
        run: &mut RunState,
    ) -> Result<(), EngineError> {
        self.adapter.start().await?;

        let resumed = match session.adapter_session.as_deref() {
            Some(name) => match self
                .adapter
                .resume_session(name, &self.session_config)
                .await
            {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::warn!(adapter_session = name, error = %e, "resume failed, starting a new conversation");
                    None
                }
            },
            None => None,
        };

        let handle = match resumed {
            Some(handle) => {
                run.first_prompt = false;
                handle
            }
            None => self.adapter.create_session(&self.session_config).await?,
        };
        tracing::debug!(adapter_session = %handle, "adapter session ready");
        session.adapter_session = Some(handle.name.clone());

        if let Err(e) = run.tracker.refresh(self.adapter.as_ref(), &handle).await {
            tracing::debug!(error = %e, "initial context usage unavailable");
        } else {
            session.context = run.tracker.window();
        }
        run.handle = Some(handle);
        Ok(())
    }

    /// Export events and destroy `handle`. Problems are logged.
    async fn release_handle(&self, session: &Session, handle: &SessionHandle, events_file: &str) {
        let dir = self.store.session_dir(&session.id);
        let path = dir.join(events_file);
        let exported = match std::fs::create_dir_all(&dir) {
            Ok(()) => self.adapter.export_events(handle, &path).await,
            Err(e) => Err(AdapterError::Io(e)),
        };
        match exported {
            Ok(count) => tracing::debug!(count, path = %path.display(), "events exported"),
            Err(e) => tracing::warn!(adapter_session = %handle, error = %e, "event export failed"),
        }

        if let Err(e) = self.adapter.destroy_session(handle).await {
            tracing::warn!(adapter_session = %handle, error = %e, "failed to destroy adapter session");
        }
    }

    /// Cleanup that runs however the step loop ended.
    async fn teardown(&self, session: &Session, run: &mut RunState) {
        if !run.background.is_empty() {
            let report = run.background.shutdown(self.options.grace_period).await;
            tracing::info!(
                already_exited = report.already_exited,
                terminated = report.terminated,
                killed = report.killed,
                "background processes stopped"
            );
        }

        if let Some(handle) = run.handle.take() {
            self.release_handle(session, &handle, "events.jsonl").await;
        }

        if let Err(e) = self.adapter.stop().await {
            tracing::warn!(error = %e, "adapter stop failed");
        }
    }

    pub(super) fn save_checkpoint(
        &self,
        session: &mut Session,
        run: &mut RunState,
        request: CheckpointRequest<'_>,
    ) -> Result<PathBuf, CheckpointError> {
        let path = self.store.save(session, request)?;
        session.checkpoints.push(path.clone());
        run.checkpoints.push(path.clone());
        Ok(path)
    }

    /// Send `text` to the model and record the exchange.
    pub(super) async fn exchange(
        &self,
        session: &mut Session,
        run: &mut RunState,
        text: &str,
    ) -> Result<String, AdapterError> {
        let handle = run.handle()?;
        let message = if run.first_prompt && !run.preamble.is_empty() {
            format!("{}\n\n{}", run.preamble, text)
        } else {
            text.to_string()
        };

        session.push_message(Role::User, message.as_str());
        run.tracker.record_local(&message);
        if let Some(ref ui) = run.ui {
            ui.log_step("waiting for model");
        }

        let response = self.adapter.send(&handle, &message, None).await?;
        run.first_prompt = false;

        session.push_message(Role::Assistant, response.as_str());
        run.tracker.record_local(&response);
        if let Some(ref ui) = run.ui {
            ui.show_response(&response);
        }
        run.responses.push(response.clone());

        match run.tracker.refresh(self.adapter.as_ref(), &handle).await {
            Ok(window) => session.context = window,
            Err(e) => tracing::debug!(error = %e, "context usage refresh failed"),
        }
        tracing::debug!(summary = %run.tracker.status_summary(), "exchange recorded");
        Ok(response)
    }

    async fn execute_prompt(
        &self,
        workflow: &Workflow,
        index: usize,
        text: &str,
        embedded: &[EmbeddedCommand],
        session: &mut Session,
        run: &mut RunState,
    ) -> Result<StepOutcome, EngineError> {
        let mut text = text.to_string();
        for ec in embedded {
            let output = run_command(
                &ec.command,
                &self.options.workspace_root,
                &[],
                self.options.run_timeout,
            )
            .await;
            let value = if output.success() {
                output.stdout.trim_end().to_string()
            } else {
                tracing::warn!(command = %ec.command, exit_code = output.exit_code, "embedded command failed");
                output.combined()
            };
            text = text.replace(&ec.placeholder, &value);
        }

        self.exchange(session, run, &text).await?;

        match workflow.pause_points.get(&workflow.prompt_ordinal(index)) {
            Some(point) => self.halt(Halt::from(point), session, run),
            None => Ok(StepOutcome::Continue),
        }
    }

    /// Persist a pause or consult checkpoint and hand control back.
    pub(super) fn halt(
        &self,
        halt: Halt<'_>,
        session: &mut Session,
        run: &mut RunState,
    ) -> Result<StepOutcome, EngineError> {
        let (status, request, title) = match halt {
            Halt::Pause(message) => (
                SessionStatus::Paused,
                CheckpointRequest::new(CheckpointKind::Pause, "pause").with_message(message),
                "pause",
            ),
            Halt::Consult(topic) => {
                let expires_at = run
                    .consult_timeout
                    .and_then(|d| chrono::Duration::from_std(d).ok())
                    .map(|d| Utc::now() + d);
                (
                    SessionStatus::Consulting,
                    CheckpointRequest::new(CheckpointKind::Consult, "consult")
                        .with_message(topic)
                        .expires_at(expires_at),
                    "consult",
                )
            }
        };
        let body = request.message.unwrap_or_default().to_string();

        session.transition(status)?;
        let path = self.save_checkpoint(session, run, request)?;

        let gate = ReviewGate::new(self.store.session_dir(&session.id));
        gate.write_marker(&ReviewGate::nonce(), title, &body, &path)?;

        if let Some(ref ui) = run.ui {
            ui.paused(status == SessionStatus::Consulting, &path);
        }
        Ok(StepOutcome::Pause(path))
    }

    pub(super) fn execute_checkpoint(
        &self,
        name: &str,
        session: &mut Session,
        run: &mut RunState,
    ) -> Result<StepOutcome, EngineError> {
        let mut outputs = Vec::new();
        if let Some(ref path) = run.output_path {
            write_output(path, &session.to_markdown())?;
            outputs.push(path.clone());
        }

        let path = self.save_checkpoint(session, run, CheckpointRequest::new(CheckpointKind::Manual, name))?;
        tracing::info!(name, checkpoint = %path.display(), "checkpoint saved");
        if let Some(ref ui) = run.ui {
            ui.show_checkpoint(name, &path);
        }

        if self.options.commit_checkpoints && !outputs.is_empty() {
            match GitTracker::discover(&self.options.workspace_root) {
                Some(git) => match git.commit_paths(&outputs, &format!("checkpoint: {}", name)) {
                    Ok(Some(sha)) => tracing::info!(%sha, "checkpoint committed"),
                    Ok(None) => tracing::debug!("nothing to commit for checkpoint"),
                    Err(e) => tracing::warn!(error = %e, "checkpoint commit failed"),
                },
                None => tracing::debug!("workspace is not a git repository, skipping commit"),
            }
        }
        Ok(StepOutcome::Continue)
    }

    pub(super) async fn execute_compact(
        &self,
        preserve: &[String],
        session: &mut Session,
        run: &mut RunState,
    ) -> Result<StepOutcome, EngineError> {
        let handle = run.handle()?;
        let needed = match run
            .tracker
            .needs_compaction(self.adapter.as_ref(), &handle, self.options.min_density)
            .await
        {
            Ok(needed) => needed,
            Err(e) => {
                tracing::warn!(error = %e, "context usage unavailable, skipping compaction");
                false
            }
        };

        if !needed {
            tracing::info!(usage = run.tracker.usage_percent(), "compaction not needed");
            if let Some(ref ui) = run.ui {
                ui.show_compaction(false);
            }
            return Ok(StepOutcome::Continue);
        }

        let prompt = build_compaction_prompt(preserve);
        match self.exchange(session, run, &prompt).await {
            Ok(_) => {
                run.tracker.record_compaction();
                tracing::info!(summary = %run.tracker.status_summary(), "context compacted");
                if let Some(ref ui) = run.ui {
                    ui.show_compaction(true);
                }
            }
            Err(e) => tracing::warn!(error = %e, "compaction request failed"),
        }
        Ok(StepOutcome::Continue)
    }

    async fn execute_verify(
        &self,
        request: VerifyRequest,
        threshold: Option<(&str, CompareOp, f64)>,
        session: &mut Session,
        run: &mut RunState,
    ) -> Result<StepOutcome, EngineError> {
        let mut reports = self
            .verifiers
            .run(&self.options.workspace_root, &request)
            .await;
        if let Some((metric, op, value)) = threshold {
            reports = reports
                .into_iter()
                .map(|(name, report)| (name, report.check_metric(metric, op, value)))
                .collect();
        }

        let mut failed = Vec::new();
        for (name, report) in &reports {
            if report.passed {
                tracing::info!(verifier = %name, summary = %report.summary, "verification passed");
            } else {
                tracing::warn!(verifier = %name, summary = %report.summary, "verification failed");
                failed.push(name.as_str());
            }
            if self.options.verify_inject.should_inject(!report.passed) {
                session.push_message(Role::System, report.to_markdown(name));
            }
        }

        if failed.is_empty() {
            return Ok(StepOutcome::Continue);
        }
        let reason = format!("verification failed: {}", failed.join(", "));
        match self.options.verify_on_error {
            GateErrorPolicy::Fail => Ok(StepOutcome::Stop(reason)),
            GateErrorPolicy::Warn => {
                if let Some(ref ui) = run.ui {
                    ui.show_warning(&reason);
                }
                Ok(StepOutcome::Continue)
            }
        }
    }

    async fn execute_lsp(&self, subcommand: &str, args: &[String], session: &mut Session) {
        let record = match LspCommand::parse(subcommand, args) {
            Err(e) => format!("### lsp error\n\n{}", e),
            Ok(command) => match self.lsp.get(command.language.as_deref()) {
                None => format!("### lsp `{}` failed\n\nno language client available", command),
                Some(client) => match client.query(&self.options.workspace_root, &command).await {
                    Ok(text) => format!("### lsp `{}`\n\n{}", command, text),
                    Err(e) => format!("### lsp `{}` failed\n\n{:#}", command, e),
                },
            },
        };
        tracing::debug!(subcommand, "lsp query recorded");
        session.push_message(Role::System, record);
    }

    async fn execute_directive(
        &self,
        directive_type: &str,
        name: &str,
        value: &str,
        session: &mut Session,
        run: &mut RunState,
    ) -> Result<StepOutcome, EngineError> {
        let ctx = DirectiveContext {
            workspace_root: &self.options.workspace_root,
            value,
            adapter_session: run.handle.as_ref().map(|h| h.name.as_str()),
        };
        let (handler, result) = self
            .directives
            .execute(directive_type, name, &ctx, None)
            .await;

        if let Some(handler) = handler
            && handler.inject_output
        {
            session.push_message(Role::System, result.injection(handler));
        }

        if result.success {
            tracing::info!(directive = %format!("{}:{}", directive_type, name), "directive succeeded");
            return Ok(StepOutcome::Continue);
        }

        let reason = format!(
            "directive {}:{} failed with exit code {}",
            directive_type, name, result.exit_code
        );
        tracing::warn!(stderr = %result.stderr.trim(), "{}", reason);
        match self.options.directive_on_error {
            GateErrorPolicy::Fail => Ok(StepOutcome::Stop(reason)),
            GateErrorPolicy::Warn => {
                if let Some(ref ui) = run.ui {
                    ui.show_warning(&reason);
                }
                Ok(StepOutcome::Continue)
            }
        }
    }

    async fn new_conversation(
        &self,
        session: &mut Session,
        run: &mut RunState,
    ) -> Result<(), EngineError> {
        if let Some(old) = run.handle.take() {
            let events_file = format!("events-{}.jsonl", old.name);
            self.release_handle(session, &old, &events_file).await;
        }

        let handle = self.adapter.create_session(&self.session_config).await?;
        tracing::info!(adapter_session = %handle, "started new conversation");
        session.adapter_session = Some(handle.name.clone());
        run.first_prompt = true;
        run.tracker = ContextBudgetTracker::new(session.context.max_tokens);
        run.handle = Some(handle);
        Ok(())
    }
}

fn write_output(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write output artifact {}", path.display()))
}
