use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{LanguageClient, LspCommand, LspQuery};

const MAX_RESULTS: usize = 20;
const SKIP_DIRS: &[&str] = &["target", "node_modules", "dist", "build", "vendor"];

/// Language client that answers queries by scanning source files for
/// definitions. Used when no dedicated client is registered.
#[derive(Debug, Default)]
pub struct SourceIndexClient;

impl SourceIndexClient {
    pub fn new() -> Self {
        Self
    }
}

fn extensions_for(language: &str) -> &'static [&'static str] {
    match language {
        "rust" | "rs" => &["rs"],
        "python" | "py" => &["py"],
        "typescript" | "ts" => &["ts", "tsx"],
        "javascript" | "js" => &["js", "jsx", "mjs"],
        "go" => &["go"],
        "java" => &["java"],
        "kotlin" => &["kt"],
        _ => &[],
    }
}

fn definition_pattern(query: LspQuery, name: &str) -> Result<Regex> {
    let keywords = match query {
        LspQuery::Type => "struct|enum|trait|type|class|interface|union",
        LspQuery::Symbol => {
            "fn|def|function|func|const|static|let|var|struct|enum|trait|type|class|interface|mod"
        }
    };
    Regex::new(&format!(r"\b(?:{})\s+{}\b", keywords, regex::escape(name)))
        .context("Failed to build definition pattern")
}

fn is_skipped(entry: &walkdir::DirEntry) -> bool {
    if entry.depth() == 0 {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    entry.file_type().is_dir() && (name.starts_with('.') || SKIP_DIRS.contains(&name.as_ref()))
}

fn scan(root: &Path, command: &LspCommand) -> Result<Vec<String>> {
    let pattern = definition_pattern(command.query, &command.name)?;
    let extensions = command
        .language
        .as_deref()
        .map(extensions_for)
        .unwrap_or(&[]);

    let start: PathBuf = match command.path {
        Some(ref p) if p.is_absolute() => p.clone(),
        Some(ref p) => root.join(p),
        None => root.to_path_buf(),
    };
    if !start.exists() {
        anyhow::bail!("path not found: {}", start.display());
    }

    let mut matches = Vec::new();
    for entry in WalkDir::new(&start)
        .into_iter()
        .filter_entry(|e| !is_skipped(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if !extensions.is_empty() {
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if !extensions.contains(&ext) {
                continue;
            }
        }
        let Ok(content) = std::fs::read_to_string(path) else {
            continue;
        };
        let display = path.strip_prefix(root).unwrap_or(path).display().to_string();
        for (idx, line) in content.lines().enumerate() {
            if pattern.is_match(line) {
                matches.push(format!("{}:{}: {}", display, idx + 1, line.trim()));
                if matches.len() >= MAX_RESULTS {
                    return Ok(matches);
                }
            }
        }
    }
    Ok(matches)
}

#[async_trait]
impl LanguageClient for SourceIndexClient {
    async fn query(&self, root: &Path, command: &LspCommand) -> Result<String> {
        let root = root.to_path_buf();
        let cmd = command.clone();
        let matches = tokio::task::spawn_blocking(move || scan(&root, &cmd))
            .await
            .context("source scan panicked")??;

        if matches.is_empty() {
            anyhow::bail!("no {} named '{}' found", command.query, command.name);
        }

        let mut out = format!(
            "{} definition(s) for {} `{}`:\n",
            matches.len(),
            command.query,
            command.name
        );
        for m in matches {
            out.push_str("  ");
            out.push_str(&m);
            out.push('\n');
        }
        Ok(out.trim_end().to_string())
    }
}
