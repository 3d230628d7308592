//! Compaction prompt generation.

/// Build the prompt asking the backend to compact the conversation.
///
/// Items in `preserve` are listed first so the summary keeps them verbatim.
pub fn build_compaction_prompt(preserve: &[String]) -> String {
    let mut prompt = String::new();

    let preserve: Vec<&str> = preserve
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();

    if !preserve.is_empty() {
        prompt.push_str("Preserve the following exactly:\n");
        for item in &preserve {
            prompt.push_str(&format!("- {}\n", item));
        }
        prompt.push('\n');
    }

    prompt.push_str(
        "Summarize our conversation so far into a compact form that keeps:\n\
         - the current goal and any open tasks\n\
         - decisions made and the reasons given\n\
         - file paths, commands and errors still relevant\n\n\
         Drop exploratory detail that no longer matters. \
         Continue from the summary in subsequent replies.",
    );

    prompt
}
