//! Shared utility functions for the conductor crate.

/// Truncate a string to at most `max_len` characters, ending with `...`.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let keep = max_len.saturating_sub(3);
    let head: String = s.chars().take(keep).collect();
    format!("{}...", head)
}

/// Shorten a file path to just the last 2 components.
pub fn shorten_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').collect();
    if parts.len() <= 2 {
        path.to_string()
    } else {
        parts[parts.len() - 2..].join("/")
    }
}

/// Rough token estimate used for advisory accounting only (~4 chars per token).
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}
