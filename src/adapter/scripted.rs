//! In-process adapter used by engine tests.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use super::events::{AdapterEvent, EventLog};
use super::{AdapterSession, ChunkCallback, ContextUsage, SessionConfig, SessionHandle};
use crate::errors::AdapterError;

#[derive(Default)]
pub struct ScriptedAdapter {
    pub prompts: Mutex<Vec<String>>,
    pub destroyed: Mutex<Vec<String>>,
    pub created: AtomicUsize,
    pub resumed: Mutex<Vec<String>>,
    sends: AtomicUsize,
    used_tokens: AtomicU64,
    max_tokens: AtomicU64,
    near_limit: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_send: AtomicBool,
    events: Mutex<EventLog>,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        let adapter = Self::default();
        adapter.max_tokens.store(1000, Ordering::SeqCst);
        adapter
    }

    pub fn set_usage(&self, used: u64, max: u64) {
        self.used_tokens.store(used, Ordering::SeqCst);
        self.max_tokens.store(max, Ordering::SeqCst);
    }

    pub fn set_near_limit(&self, near: bool) {
        self.near_limit.store(near, Ordering::SeqCst);
    }

    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn destroyed(&self) -> Vec<String> {
        self.destroyed.lock().unwrap().clone()
    }
}

#[async_trait]
impl AdapterSession for ScriptedAdapter {
    async fn start(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn create_session(&self, _config: &SessionConfig) -> Result<SessionHandle, AdapterError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(AdapterError::CreateFailed("scripted failure".into()));
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        let name = format!("scripted-{}", n);
        self.events.lock().unwrap().push(AdapterEvent::SessionStarted {
            session: name.clone(),
        });
        Ok(SessionHandle::new(name))
    }

    async fn resume_session(
        &self,
        name: &str,
        _config: &SessionConfig,
    ) -> Result<SessionHandle, AdapterError> {
        self.resumed.lock().unwrap().push(name.to_string());
        Ok(SessionHandle::new(name))
    }

    async fn destroy_session(&self, session: &SessionHandle) -> Result<(), AdapterError> {
        self.destroyed.lock().unwrap().push(session.name.clone());
        Ok(())
    }

    async fn send(
        &self,
        _session: &SessionHandle,
        text: &str,
        on_chunk: Option<ChunkCallback<'_>>,
    ) -> Result<String, AdapterError> {
        let n = self.sends.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(text.to_string());
        self.events.lock().unwrap().push(AdapterEvent::UserMessage {
            content: text.to_string(),
        });
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(AdapterError::Backend("scripted send failure".into()));
        }
        let response = format!("response {}", n + 1);
        if let Some(cb) = on_chunk {
            cb(&response);
        }
        self.events.lock().unwrap().push(AdapterEvent::AssistantText {
            text: response.clone(),
        });
        Ok(response)
    }

    async fn context_usage(&self, _session: &SessionHandle) -> Result<ContextUsage, AdapterError> {
        Ok(ContextUsage {
            used_tokens: self.used_tokens.load(Ordering::SeqCst),
            max_tokens: self.max_tokens.load(Ordering::SeqCst),
        })
    }

    async fn near_context_limit(&self, _session: &SessionHandle) -> Result<bool, AdapterError> {
        Ok(self.near_limit.load(Ordering::SeqCst))
    }

    async fn export_events(
        &self,
        _session: &SessionHandle,
        path: &Path,
    ) -> Result<usize, AdapterError> {
        let log = self.events.lock().unwrap().clone();
        log.write_jsonl(path)
            .map_err(|e| AdapterError::Backend(e.to_string()))
    }
}
