//! Best-effort extraction of the primary declared type name of a code unit.
//!
//! This is a textual heuristic, not a parser: the first `class <Name>` occurrence
//! (optionally preceded by a visibility modifier) wins, even when it sits inside a
//! comment, a string or a nested declaration. Callers that need correctness
//! regardless of this heuristic (the script-language import) must not depend on it.

use chrono::Local;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

const PLACEHOLDER_PREFIX: &str = "Target_";

static CLASS_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:(?:public|private|protected)\s+)?class\s+([A-Za-z_][A-Za-z0-9_]*)")
        .expect("class declaration pattern is valid")
});

/// Name of the main type declared by a code unit, or a placeholder when none was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryIdentifier {
    name: String,
    placeholder: bool,
}

impl PrimaryIdentifier {
    pub fn declared(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            placeholder: false,
        }
    }

    /// `Target_<HHMMSS>`: unique within a run at one-second resolution, nothing more.
    pub fn placeholder() -> Self {
        Self {
            name: format!("{}{}", PLACEHOLDER_PREFIX, Local::now().format("%H%M%S")),
            placeholder: true,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }
}

impl fmt::Display for PrimaryIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Find the first type declaration in `content`. Never fails.
pub fn extract(content: &str) -> PrimaryIdentifier {
    CLASS_DECL
        .captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| PrimaryIdentifier::declared(m.as_str()))
        .unwrap_or_else(PrimaryIdentifier::placeholder)
}
