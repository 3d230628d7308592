//! The step engine.
//!
//! [`WorkflowEngine`] walks a [`Workflow`](crate::step::Workflow) from the
//! session's cursor, one step at a time. Every step ends in a
//! [`StepOutcome`]; `Pause` and `Stop` hand control back to the caller.
//! Background processes and the adapter session are torn down on every
//! exit path.

mod output;
mod retry;
mod sequencer;

pub use output::{build_fix_prompt, format_run_output, truncate_output};
pub use sequencer::{RunResult, StepOutcome, WorkflowEngine};
