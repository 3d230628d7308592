//! Typed adapter events and their JSON-lines export.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::path::Path;

use crate::util::{shorten_path, truncate_str};

/// One event category reported by a model backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdapterEvent {
    SessionStarted { session: String },
    UserMessage { content: String },
    AssistantText { text: String },
    ToolUse { name: String, description: String },
    Usage { used_tokens: u64, max_tokens: u64 },
    Error { message: String },
    SessionEnded { session: String },
}

impl AdapterEvent {
    pub fn tool_use(name: &str, input: &Value) -> Self {
        AdapterEvent::ToolUse {
            name: name.to_string(),
            description: describe_tool_use(name, input),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AdapterEvent,
}

/// Append-only event log kept per adapter session.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<TimedEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: AdapterEvent) {
        self.events.push(TimedEvent {
            timestamp: Utc::now(),
            event,
        });
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> impl Iterator<Item = &AdapterEvent> {
        self.events.iter().map(|e| &e.event)
    }

    /// Write all events as JSON lines, returning the number written.
    pub fn write_jsonl(&self, path: &Path) -> Result<usize> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create event export {}", path.display()))?;
        for event in &self.events {
            let line = serde_json::to_string(event).context("Failed to serialize event")?;
            writeln!(file, "{}", line).context("Failed to write event")?;
        }
        Ok(self.events.len())
    }
}

/// Extract a human-readable description from a tool use event.
pub fn describe_tool_use(name: &str, input: &Value) -> String {
    let field = |key: &str| input.get(key).and_then(|v| v.as_str());
    match name {
        "Read" => format!(
            "Reading: {}",
            field("file_path").map(shorten_path).unwrap_or_else(|| "file".into())
        ),
        "Write" => format!(
            "Creating: {}",
            field("file_path").map(shorten_path).unwrap_or_else(|| "file".into())
        ),
        "Edit" => format!(
            "Editing: {}",
            field("file_path").map(shorten_path).unwrap_or_else(|| "file".into())
        ),
        "Bash" => format!(
            "Running: {}",
            field("command")
                .map(|s| truncate_str(s, 40))
                .unwrap_or_else(|| "command".into())
        ),
        "Grep" | "Glob" => format!("{}: {}", name, field("pattern").unwrap_or("*")),
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_describe_tool_use() {
        let input = serde_json::json!({"file_path": "/a/b/src/main.rs"});
        assert_eq!(describe_tool_use("Read", &input), "Reading: src/main.rs");

        let input = serde_json::json!({"command": "cargo test --all"});
        assert_eq!(describe_tool_use("Bash", &input), "Running: cargo test --all");

        assert_eq!(
            describe_tool_use("Mystery", &serde_json::json!({})),
            "Mystery"
        );
    }

    #[test]
    fn test_event_log_export() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/events.jsonl");

        let mut log = EventLog::new();
        log.push(AdapterEvent::UserMessage {
            content: "hi".into(),
        });
        log.push(AdapterEvent::Usage {
            used_tokens: 10,
            max_tokens: 100,
        });

        assert_eq!(log.write_jsonl(&path).unwrap(), 2);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: TimedEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(
            first.event,
            AdapterEvent::UserMessage {
                content: "hi".into()
            }
        );
        assert!(lines[1].contains(r#""type":"usage""#));
    }
}
