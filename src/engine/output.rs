//! Formatting of command output for the session log and fix prompts.

use crate::process::CommandOutput;

/// Truncate `text` to roughly `limit` characters.
///
/// Keeps the first two thirds and the last third of the budget verbatim,
/// joined by a marker naming how many characters were dropped.
pub fn truncate_output(text: &str, limit: usize) -> String {
    let total = text.chars().count();
    if total <= limit {
        return text.to_string();
    }

    let head_len = limit * 2 / 3;
    let tail_len = limit / 3;
    let dropped = total - head_len - tail_len;

    let head: String = text.chars().take(head_len).collect();
    let tail: String = text.chars().skip(total - tail_len).collect();
    format!("{}\n[... {} chars truncated ...]\n{}", head, dropped, tail)
}

/// Markdown record of a finished command, injected into the session log.
pub fn format_run_output(command: &str, output: &CommandOutput, limit: usize) -> String {
    let verdict = if output.timed_out {
        "timed out".to_string()
    } else {
        format!("exit code {}", output.exit_code)
    };
    let body = output.combined();
    let mut out = format!("### Command `{}` ({})\n", command, verdict);
    if !body.trim().is_empty() {
        out.push_str("\n```\n");
        out.push_str(truncate_output(body.trim_end(), limit).trim_end());
        out.push_str("\n```\n");
    }
    out
}

/// Prompt asking the model to fix a failing command.
pub fn build_fix_prompt(
    command: &str,
    output: &CommandOutput,
    retry_prompt: Option<&str>,
    limit: usize,
) -> String {
    let mut prompt = String::new();
    if let Some(preamble) = retry_prompt.map(str::trim).filter(|p| !p.is_empty()) {
        prompt.push_str(preamble);
        prompt.push_str("\n\n");
    }
    prompt.push_str(&format!(
        "The command `{}` failed with exit code {}{}.\n\n",
        command,
        output.exit_code,
        if output.timed_out { " (timed out)" } else { "" }
    ));
    let body = output.combined();
    if !body.trim().is_empty() {
        prompt.push_str("Output:\n\n```\n");
        prompt.push_str(truncate_output(body.trim_end(), limit).trim_end());
        prompt.push_str("\n```\n\n");
    }
    prompt.push_str("Fix the underlying problem so the command succeeds. The command will be re-run after your changes.");
    prompt
}
