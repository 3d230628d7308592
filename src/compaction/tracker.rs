//! Context budget tracking for compaction decisions.

use crate::adapter::{AdapterSession, SessionHandle};
use crate::errors::AdapterError;
use crate::session::ContextWindow;
use crate::util::estimate_tokens;

/// The compaction decision on already-refreshed values.
pub fn should_compact(near_limit: bool, usage_percent: f64, min_density: f64) -> bool {
    if !near_limit {
        return false;
    }
    min_density <= 0.0 || usage_percent >= min_density
}

/// Tracks token usage against the window and decides when to compact.
#[derive(Debug, Clone, Default)]
pub struct ContextBudgetTracker {
    /// Last authoritative count from the adapter.
    window: ContextWindow,
    /// Whether the adapter reported near-limit on the last refresh.
    near_limit: bool,
    /// Advisory tokens recorded locally since the last refresh.
    local_estimate: u64,
    /// Number of compactions performed.
    compactions: u32,
}

impl ContextBudgetTracker {
    pub fn new(max_tokens: u64) -> Self {
        Self {
            window: ContextWindow::new(0, max_tokens),
            ..Default::default()
        }
    }

    /// Re-sync token counts from the adapter.
    pub async fn refresh(
        &mut self,
        adapter: &dyn AdapterSession,
        handle: &SessionHandle,
    ) -> Result<ContextWindow, AdapterError> {
        let usage = adapter.context_usage(handle).await?;
        self.window.sync(usage.used_tokens, usage.max_tokens);
        self.near_limit = adapter.near_context_limit(handle).await?;
        self.local_estimate = 0;
        Ok(self.window)
    }

    /// Refresh from the adapter, then apply [`should_compact`].
    pub async fn needs_compaction(
        &mut self,
        adapter: &dyn AdapterSession,
        handle: &SessionHandle,
        min_density: f64,
    ) -> Result<bool, AdapterError> {
        self.refresh(adapter, handle).await?;
        let decision = should_compact(self.near_limit, self.usage_percent(), min_density);
        tracing::debug!(
            near_limit = self.near_limit,
            usage = self.usage_percent(),
            min_density,
            decision,
            "compaction check"
        );
        Ok(decision)
    }

    /// Record an advisory estimate for text sent or received.
    pub fn record_local(&mut self, text: &str) {
        self.local_estimate = self
            .local_estimate
            .saturating_add(estimate_tokens(text));
    }

    pub fn record_compaction(&mut self) {
        self.compactions += 1;
    }

    pub fn window(&self) -> ContextWindow {
        self.window
    }

    pub fn usage_percent(&self) -> f64 {
        self.window.usage_percent()
    }

    pub fn local_estimate(&self) -> u64 {
        self.local_estimate
    }

    pub fn compactions(&self) -> u32 {
        self.compactions
    }

    /// Get a status summary for display.
    pub fn status_summary(&self) -> String {
        format!(
            "Context: {:.1}% used ({} / {} tokens){}{}",
            self.usage_percent(),
            self.window.used_tokens,
            self.window.max_tokens,
            if self.local_estimate > 0 {
                format!(", ~{} pending", self.local_estimate)
            } else {
                String::new()
            },
            if self.compactions > 0 {
                format!(", {} compaction(s)", self.compactions)
            } else {
                String::new()
            }
        )
    }
}
