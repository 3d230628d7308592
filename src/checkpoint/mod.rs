//! Checkpoint persistence and the human-review gate.
//!
//! Layout under the state directory:
//!
//! ```text
//! .conductor/sessions/<session_id>/
//!   checkpoint-0001.json
//!   checkpoint-0002.json
//!   review-<nonce>.md      # present while a human review is pending
//!   events.jsonl           # adapter events exported at teardown
//! ```

mod review;
mod store;

pub use review::ReviewGate;
pub use store::{Checkpoint, CheckpointKind, CheckpointRequest, CheckpointStore};
