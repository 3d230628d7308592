//! Adapter backed by a model CLI that speaks stream-json.
//!
//! Each `send` spawns the configured command with the prompt on stdin and
//! parses one JSON event per stdout line. The first message of a session
//! uses `--session-id`; later ones use `--resume` so the backend keeps the
//! conversation.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use super::events::{AdapterEvent, EventLog};
use super::{AdapterSession, ChunkCallback, ContextUsage, SessionConfig, SessionHandle};
use crate::config::AdapterSection;
use crate::errors::AdapterError;
use crate::process::shell::read_all;

/// Events from the CLI's stream-json output format.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StreamEvent {
    #[serde(rename = "assistant")]
    Assistant { message: AssistantMessage },

    #[serde(rename = "result")]
    Result {
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        usage: Option<StreamUsage>,
    },

    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "tool_use")]
    ToolUse { name: String, input: Value },

    #[serde(rename = "text")]
    Text { text: String },

    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct StreamUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl StreamUsage {
    fn total(&self) -> u64 {
        self.input_tokens
            + self.cache_creation_input_tokens
            + self.cache_read_input_tokens
            + self.output_tokens
    }
}

#[derive(Debug, Default)]
struct SessionState {
    /// Whether the backend has seen this session yet.
    started: bool,
    config: SessionConfig,
    used_tokens: u64,
    events: EventLog,
}

pub struct CommandAdapter {
    command: String,
    extra_args: Vec<String>,
    model: Option<String>,
    context_window: u64,
    near_limit_percent: f64,
    working_dir: PathBuf,
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl CommandAdapter {
    pub fn new(section: &AdapterSection, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: section.command(),
            extra_args: section.args.clone(),
            model: section.model.clone(),
            context_window: section.context_window,
            near_limit_percent: section.near_limit_percent,
            working_dir: working_dir.into(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn with_state<T>(
        &self,
        session: &SessionHandle,
        f: impl FnOnce(&mut SessionState) -> T,
    ) -> Result<T, AdapterError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| AdapterError::Backend("session table lock poisoned".into()))?;
        let state = sessions
            .get_mut(&session.name)
            .ok_or_else(|| AdapterError::UnknownSession(session.name.clone()))?;
        Ok(f(state))
    }

    fn register(&self, name: &str, started: bool, config: &SessionConfig) -> Result<(), AdapterError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| AdapterError::Backend("session table lock poisoned".into()))?;
        let mut state = SessionState {
            started,
            config: config.clone(),
            ..Default::default()
        };
        state.events.push(AdapterEvent::SessionStarted {
            session: name.to_string(),
        });
        sessions.insert(name.to_string(), state);
        Ok(())
    }

    fn build_args(&self, session: &SessionHandle, started: bool, config: &SessionConfig) -> Vec<String> {
        let mut args = self.extra_args.clone();
        args.push("--print".to_string());
        args.push("--output-format".to_string());
        args.push("stream-json".to_string());
        args.push("--verbose".to_string());
        if let Some(model) = config.model.as_ref().or(self.model.as_ref()) {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if let Some(ref system) = config.system_prompt {
            args.push("--append-system-prompt".to_string());
            args.push(system.clone());
        }
        if started {
            args.push("--resume".to_string());
        } else {
            args.push("--session-id".to_string());
        }
        args.push(session.name.clone());
        args
    }
}

#[async_trait]
impl AdapterSession for CommandAdapter {
    async fn start(&self) -> Result<(), AdapterError> {
        tracing::debug!(command = %self.command, "command adapter ready");
        Ok(())
    }

    async fn stop(&self) -> Result<(), AdapterError> {
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.clear();
        }
        Ok(())
    }

    async fn create_session(&self, config: &SessionConfig) -> Result<SessionHandle, AdapterError> {
        let name = uuid::Uuid::new_v4().to_string();
        self.register(&name, false, config)?;
        Ok(SessionHandle::new(name))
    }

    async fn resume_session(
        &self,
        name: &str,
        config: &SessionConfig,
    ) -> Result<SessionHandle, AdapterError> {
        if uuid::Uuid::parse_str(name).is_err() {
            return Err(AdapterError::ResumeFailed {
                name: name.to_string(),
                message: "session names must be UUIDs".to_string(),
            });
        }
        self.register(name, true, config)?;
        Ok(SessionHandle::new(name))
    }

    async fn destroy_session(&self, session: &SessionHandle) -> Result<(), AdapterError> {
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| AdapterError::Backend("session table lock poisoned".into()))?;
        sessions.remove(&session.name);
        Ok(())
    }

    async fn send(
        &self,
        session: &SessionHandle,
        text: &str,
        on_chunk: Option<ChunkCallback<'_>>,
    ) -> Result<String, AdapterError> {
        let (started, config) = self.with_state(session, |s| {
            s.events.push(AdapterEvent::UserMessage {
                content: text.to_string(),
            });
            (s.started, s.config.clone())
        })?;

        let args = self.build_args(session, started, &config);
        let working_dir = config
            .working_dir
            .clone()
            .unwrap_or_else(|| self.working_dir.clone());

        tracing::debug!(command = %self.command, session = %session, "spawning adapter process");

        let mut child = Command::new(&self.command)
            .args(&args)
            .current_dir(&working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(AdapterError::SpawnFailed)?;

        // drain stderr alongside stdout
        let stderr_task = tokio::spawn(read_all(child.stderr.take()));

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AdapterError::Backend("adapter stdout unavailable".into()))?;
        let mut reader = BufReader::new(stdout).lines();

        let mut accumulated = String::new();
        let mut final_result: Option<String> = None;
        let mut is_error = false;
        let mut usage: Option<StreamUsage> = None;
        let mut new_events = Vec::new();

        while let Some(line) = reader.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StreamEvent>(&line) {
                Ok(StreamEvent::Assistant { message }) => {
                    for block in message.content {
                        match block {
                            ContentBlock::Text { text } => {
                                if let Some(cb) = on_chunk {
                                    cb(&text);
                                }
                                accumulated.push_str(&text);
                                accumulated.push('\n');
                                new_events.push(AdapterEvent::AssistantText { text });
                            }
                            ContentBlock::ToolUse { name, input } => {
                                new_events.push(AdapterEvent::tool_use(&name, &input));
                            }
                            ContentBlock::Other => {}
                        }
                    }
                }
                Ok(StreamEvent::Result {
                    result,
                    is_error: err,
                    usage: u,
                }) => {
                    final_result = result;
                    is_error = err;
                    usage = u;
                }
                Ok(StreamEvent::Other) => {}
                Err(_) => {
                    accumulated.push_str(&line);
                    accumulated.push('\n');
                }
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default().trim().to_string();
        let response = final_result.unwrap_or(accumulated);

        let max_tokens = self.context_window;
        self.with_state(session, |s| {
            s.started = true;
            for event in new_events {
                s.events.push(event);
            }
            if let Some(ref u) = usage {
                s.used_tokens = u.total();
                s.events.push(AdapterEvent::Usage {
                    used_tokens: s.used_tokens,
                    max_tokens,
                });
            }
            if is_error {
                s.events.push(AdapterEvent::Error {
                    message: response.clone(),
                });
            }
        })?;

        if is_error {
            return Err(AdapterError::Backend(response));
        }
        if !status.success() && response.trim().is_empty() {
            return Err(AdapterError::Backend(format!(
                "adapter exited with code {}: {}",
                status.code().unwrap_or(-1),
                stderr
            )));
        }

        Ok(response.trim_end().to_string())
    }

    async fn context_usage(&self, session: &SessionHandle) -> Result<ContextUsage, AdapterError> {
        let used_tokens = self.with_state(session, |s| s.used_tokens)?;
        Ok(ContextUsage {
            used_tokens,
            max_tokens: self.context_window,
        })
    }

    async fn near_context_limit(&self, session: &SessionHandle) -> Result<bool, AdapterError> {
        let usage = self.context_usage(session).await?;
        Ok(usage.percent() >= self.near_limit_percent)
    }

    async fn export_events(
        &self,
        session: &SessionHandle,
        path: &Path,
    ) -> Result<usize, AdapterError> {
        let log = self.with_state(session, |s| s.events.clone())?;
        log.write_jsonl(path)
            .map_err(|e| AdapterError::Backend(format!("event export failed: {:#}", e)))
    }
}
