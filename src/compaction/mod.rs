//! Context Budget Tracking and Compaction
//!
//! This module decides when a conversation should be compacted and builds
//! the prompt that asks the backend to do it.
//!
//! ## Decision rule
//!
//! A compaction runs only when the adapter reports the session as near its
//! context limit **and** usage is at least the configured minimum density:
//!
//! ```toml
//! [context]
//! min_density = 60   # 0 means "whenever the adapter is near its limit"
//! ```
//!
//! Token counts always come from the adapter. Local estimates recorded
//! between exchanges are advisory and never feed the decision.

mod prompt;
mod tracker;

pub use prompt::build_compaction_prompt;
pub use tracker::{ContextBudgetTracker, should_compact};
