//! Language queries for `lsp` steps.
//!
//! A step such as `lsp type Session -p src/session.rs -l rust` is parsed
//! into an [`LspCommand`] and answered by a [`LanguageClient`] chosen by
//! language. Failures never stop a workflow; they are recorded in the
//! session log instead.

mod source_index;

pub use source_index::SourceIndexClient;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::errors::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LspQuery {
    /// Definition of a type
    Type,
    /// Any named symbol
    Symbol,
}

impl std::fmt::Display for LspQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LspQuery::Type => write!(f, "type"),
            LspQuery::Symbol => write!(f, "symbol"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LspCommand {
    pub query: LspQuery,
    pub name: String,
    pub path: Option<PathBuf>,
    pub language: Option<String>,
}

impl LspCommand {
    /// Parse `type|symbol <name> [-p path] [-l lang]`.
    pub fn parse(subcommand: &str, args: &[String]) -> Result<Self, EngineError> {
        let invalid = || EngineError::InvalidLspCommand(format!("{} {}", subcommand, args.join(" ")));

        let query = match subcommand.trim() {
            "type" => LspQuery::Type,
            "symbol" => LspQuery::Symbol,
            _ => return Err(invalid()),
        };

        let mut name = None;
        let mut path = None;
        let mut language = None;
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-p" | "--path" => path = Some(PathBuf::from(iter.next().ok_or_else(invalid)?)),
                "-l" | "--lang" => language = Some(iter.next().ok_or_else(invalid)?.to_lowercase()),
                flag if flag.starts_with('-') => return Err(invalid()),
                value if name.is_none() => name = Some(value.to_string()),
                _ => return Err(invalid()),
            }
        }

        Ok(Self {
            query,
            name: name.ok_or_else(invalid)?,
            path,
            language,
        })
    }
}

impl std::fmt::Display for LspCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.query, self.name)?;
        if let Some(ref path) = self.path {
            write!(f, " -p {}", path.display())?;
        }
        if let Some(ref lang) = self.language {
            write!(f, " -l {}", lang)?;
        }
        Ok(())
    }
}

#[async_trait]
pub trait LanguageClient: Send + Sync {
    /// Answer a query, returning text suitable for the session log.
    async fn query(&self, root: &Path, command: &LspCommand) -> Result<String>;
}

/// Language clients keyed by language name, with an optional fallback.
#[derive(Default, Clone)]
pub struct LanguageClientRegistry {
    clients: BTreeMap<String, Arc<dyn LanguageClient>>,
    fallback: Option<Arc<dyn LanguageClient>>,
}

impl LanguageClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry answering every language from a source scan.
    pub fn with_source_index() -> Self {
        let mut registry = Self::new();
        registry.set_fallback(Arc::new(SourceIndexClient::new()));
        registry
    }

    pub fn register(&mut self, language: impl Into<String>, client: Arc<dyn LanguageClient>) {
        self.clients.insert(language.into().to_lowercase(), client);
    }

    pub fn set_fallback(&mut self, client: Arc<dyn LanguageClient>) {
        self.fallback = Some(client);
    }

    pub fn get(&self, language: Option<&str>) -> Option<Arc<dyn LanguageClient>> {
        language
            .and_then(|l| self.clients.get(&l.to_lowercase()).cloned())
            .or_else(|| self.fallback.clone())
    }
}
