//! `run` steps: the retry loop and `on_failure`/`on_success` blocks.

use crate::config::RunErrorPolicy;
use crate::errors::EngineError;
use crate::process::{CommandOutput, run_command};
use crate::session::{Role, Session};
use crate::step::Step;

use super::output::{build_fix_prompt, format_run_output};
use super::sequencer::{Halt, RunState, StepOutcome, WorkflowEngine};

impl WorkflowEngine {
    /// Run `command` up to `retry_count + 1` times, asking the model for a
    /// fix between attempts, then run the matching follow-up block.
    #[allow(clippy::too_many_arguments)]
    pub(super) async fn execute_run(
        &self,
        command: &str,
        retry_count: u32,
        retry_prompt: Option<&str>,
        on_failure: &[Step],
        on_success: &[Step],
        session: &mut Session,
        run: &mut RunState,
    ) -> Result<StepOutcome, EngineError> {
        let max_attempts = retry_count.saturating_add(1);
        let mut attempts = 0;

        let output = loop {
            attempts += 1;
            if let Some(ref ui) = run.ui {
                ui.run_attempt(attempts, max_attempts, command);
            }
            let output = self.run_once(command).await;
            if output.success() || attempts >= max_attempts {
                break output;
            }
            if output.timed_out {
                tracing::warn!(command, "command timed out, not retrying");
                break output;
            }

            let prompt = build_fix_prompt(command, &output, retry_prompt, self.options.output_limit);
            if let Err(e) = self.exchange(session, run, &prompt).await {
                tracing::warn!(command, error = %e, "fix request failed, not retrying");
                break output;
            }
        };

        let failed = !output.success();
        if self.options.run_inject.should_inject(failed) {
            session.push_message(
                Role::System,
                format_run_output(command, &output, self.options.output_limit),
            );
        }
        if let Some(ref ui) = run.ui {
            ui.run_finished(command, !failed, attempts);
        }

        let block = if failed { on_failure } else { on_success };
        if !block.is_empty() {
            let outcome = self.run_block(block, session, run).await?;
            if outcome != StepOutcome::Continue {
                return Ok(outcome);
            }
        }

        if failed && on_failure.is_empty() && self.options.run_on_error == RunErrorPolicy::Stop {
            return Ok(StepOutcome::Stop(format!(
                "command `{}` failed with exit code {} after {} attempt(s)",
                command, output.exit_code, attempts
            )));
        }
        Ok(StepOutcome::Continue)
    }

    async fn run_once(&self, command: &str) -> CommandOutput {
        let output = run_command(
            command,
            &self.options.workspace_root,
            &[],
            self.options.run_timeout,
        )
        .await;
        tracing::info!(
            command,
            exit_code = output.exit_code,
            timed_out = output.timed_out,
            duration_ms = output.duration.as_millis() as u64,
            "command finished"
        );
        output
    }

    /// Execute the steps of an `on_failure`/`on_success` block.
    ///
    /// Only prompt, run, checkpoint, compact, pause and consult steps run
    /// here. A nested `run` executes once, without retries or blocks, and
    /// its failure does not end the block.
    async fn run_block(
        &self,
        block: &[Step],
        session: &mut Session,
        run: &mut RunState,
    ) -> Result<StepOutcome, EngineError> {
        for step in block {
            let outcome = match step {
                Step::Prompt { text } => {
                    self.exchange(session, run, text).await?;
                    StepOutcome::Continue
                }
                Step::Run { command, .. } => {
                    let output = self.run_once(command).await;
                    let failed = !output.success();
                    if failed {
                        tracing::warn!(command = %command, exit_code = output.exit_code, "block command failed");
                    }
                    if self.options.run_inject.should_inject(failed) {
                        session.push_message(
                            Role::System,
                            format_run_output(command, &output, self.options.output_limit),
                        );
                    }
                    StepOutcome::Continue
                }
                Step::Checkpoint { name } => self.execute_checkpoint(name, session, run)?,
                Step::Compact { preserve_list } => {
                    self.execute_compact(preserve_list, session, run).await?
                }
                Step::Pause { message } => self.halt(Halt::Pause(message), session, run)?,
                Step::Consult { topic } => self.halt(Halt::Consult(topic), session, run)?,
                other => {
                    tracing::warn!(kind = other.kind(), "step not supported inside run blocks, skipping");
                    StepOutcome::Continue
                }
            };
            if outcome != StepOutcome::Continue {
                return Ok(outcome);
            }
        }
        Ok(StepOutcome::Continue)
    }
}
