//! Session inspection: `conductor checkpoints` and `conductor review`.

use anyhow::Result;
use console::style;
use std::path::Path;

use conductor::checkpoint::{CheckpointStore, ReviewGate};
use conductor::config::RunOptions;

use super::super::ReviewCommands;

pub fn cmd_checkpoints(project_dir: &Path, session_id: Option<&str>) -> Result<()> {
    let options = RunOptions::for_workspace(project_dir);
    let store = CheckpointStore::new(options.sessions_dir());

    let ids = match session_id {
        Some(id) => vec![id.to_string()],
        None => store.session_ids()?,
    };
    if ids.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    for id in ids {
        println!("{}", style(format!("Session {}", id)).bold());
        let records = store.list(&id)?;
        if records.is_empty() {
            println!("  (no checkpoints)");
            continue;
        }
        for (path, checkpoint) in records {
            let file = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mut line = format!(
                "  {}  {}  {:<10} {:<10} step {:<3} {}",
                file,
                checkpoint.timestamp.format("%Y-%m-%d %H:%M:%S"),
                checkpoint.kind,
                checkpoint.status,
                checkpoint.prompt_index,
                checkpoint.name
            );
            if let Some(at) = checkpoint.expires_at {
                line.push_str(&format!("  (expires {})", at.format("%Y-%m-%d %H:%M:%S")));
            }
            println!("{}", line);
        }

        let pending = ReviewGate::new(store.session_dir(&id)).pending()?;
        for marker in pending {
            println!(
                "  {} review pending: {}",
                style("!").yellow().bold(),
                marker.display()
            );
        }
    }
    Ok(())
}

pub fn cmd_review(project_dir: &Path, command: &ReviewCommands) -> Result<()> {
    let options = RunOptions::for_workspace(project_dir);
    let store = CheckpointStore::new(options.sessions_dir());

    match command {
        ReviewCommands::Clear { session } => {
            let removed = ReviewGate::new(store.session_dir(session)).clear()?;
            println!("Removed {} review marker(s) for session {}", removed, session);
        }
    }
    Ok(())
}
