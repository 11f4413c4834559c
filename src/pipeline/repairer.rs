//! Deterministic fixes for defects generators keep making in test artifacts.
//!
//! Every rule is textual and idempotent: running a repairer on its own output
//! changes nothing. Rules that do not match are no-ops, never errors.

use once_cell::sync::Lazy;
use regex::{Captures, Regex, RegexBuilder};
use tracing::{debug, warn};

use super::identifier::PrimaryIdentifier;
use crate::language::Language;

/// Module name the source file is staged under for script languages.
pub const SCRIPT_MODULE: &str = "target_module";

const UNITTEST_IMPORT: &str = "import unittest";
const IO_IMPORT: &str = "import io";
const JUNIT_TEST_IMPORT: &str = "import org.junit.jupiter.api.Test;";
const JUNIT_ASSERTIONS_IMPORT: &str = "import static org.junit.jupiter.api.Assertions.*;";

/// `import a, b  # comment`: indent, module list, comment.
static IMPORT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([ \t]*)import[ \t]+([^#]*?)[ \t]*(#.*)?$").expect("import pattern is valid")
});

/// `from a.b import <names>`: indent, module, name list (rest of the line).
static FROM_IMPORT_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([ \t]*)from[ \t]+[\w.]+[ \t]+import[ \t]+(.*)$")
        .expect("from-import pattern is valid")
});

static IO_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[ \t]*(?:import[ \t]+io\b|from[ \t]+io[ \t]+import\b)")
        .expect("io pattern is valid")
});

static SCRIPT_MODULE_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[ \t]*from[ \t]+target_module[ \t]+import\b")
        .expect("target module pattern is valid")
});

static JUNIT_TEST_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[ \t]*import[ \t]+org\.junit\.jupiter\.api\.Test[ \t]*;")
        .expect("junit test import pattern is valid")
});

static JAVA_PACKAGE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[ \t]*package[ \t]+[\w.]+[ \t]*;").expect("package pattern is valid")
});

static JUNIT_ASSERTION_CALL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\bassert(?:Equals|NotEquals|True|False|Null|NotNull|Same|NotSame|ArrayEquals|Throws|DoesNotThrow|All|Timeout|IterableEquals|LinesMatch)\s*\(",
    )
    .expect("assertion call pattern is valid")
});

/// Language-specific repair rules for a sanitized test artifact.
pub trait ArtifactRepairer: Send + Sync {
    fn repair(&self, artifact: &str, source: &PrimaryIdentifier) -> String;
}

/// Rules for `unittest`-based Python tests.
pub struct PythonRepairer;

/// Rules for JUnit 5 tests.
pub struct JavaRepairer;

/// Repairer for `language`, or `None` when no rules are defined for it.
pub fn repairer_for(language: &Language) -> Option<Box<dyn ArtifactRepairer>> {
    match language {
        Language::Python => Some(Box::new(PythonRepairer)),
        Language::Java => Some(Box::new(JavaRepairer)),
        _ => None,
    }
}

/// Apply the rules of `language` to `artifact`; identity for languages without rules.
pub fn repair(artifact: &str, language: &Language, source: &PrimaryIdentifier) -> String {
    match repairer_for(language) {
        Some(repairer) => repairer.repair(artifact, source),
        None => {
            debug!("No repair rules for {}, artifact passed through", language);
            artifact.to_string()
        }
    }
}

impl ArtifactRepairer for PythonRepairer {
    fn repair(&self, artifact: &str, source: &PrimaryIdentifier) -> String {
        let mut lines: Vec<String> = artifact.lines().map(str::to_string).collect();

        let base = ensure_single_unittest_import(&mut lines);
        ensure_io_import(&mut lines, base);
        ensure_target_import(&mut lines, base, source);

        lines.join("\n").trim_end().to_string()
    }
}

/// Modules listed by a plain `import` line, with its indent and trailing comment.
fn import_list(line: &str) -> Option<(&str, Vec<&str>, Option<&str>)> {
    let caps = IMPORT_LINE.captures(line)?;
    let indent = caps.get(1).map_or("", |m| m.as_str());
    let modules = caps
        .get(2)
        .map_or("", |m| m.as_str())
        .split(',')
        .map(str::trim)
        .collect();
    Some((indent, modules, caps.get(3).map(|m| m.as_str())))
}

fn with_comment(text: String, comment: Option<&str>) -> String {
    match comment {
        Some(comment) => format!("{}  {}", text, comment),
        None => text,
    }
}

enum BaseImport {
    Keep,
    Drop,
    Replace(String),
}

/// Keep exactly one `import unittest` (also as part of `import unittest, sys`),
/// adding it on top when absent. Returns the index of the line that provides it.
fn ensure_single_unittest_import(lines: &mut Vec<String>) -> usize {
    let mut first = None;
    let mut kept = Vec::with_capacity(lines.len() + 1);
    for line in lines.drain(..) {
        let action = match import_list(&line) {
            Some((indent, modules, comment)) if modules.contains(&"unittest") => {
                let seen = first.is_some();
                if !seen {
                    first = Some(kept.len());
                }
                match (seen, modules.len()) {
                    (false, 1) => BaseImport::Replace(with_comment(
                        format!("{}{}", indent, UNITTEST_IMPORT),
                        comment,
                    )),
                    (false, _) => BaseImport::Keep,
                    (true, 1) => BaseImport::Drop,
                    (true, _) => {
                        let rest: Vec<&str> =
                            modules.into_iter().filter(|m| *m != "unittest").collect();
                        BaseImport::Replace(with_comment(
                            format!("{}import {}", indent, rest.join(", ")),
                            comment,
                        ))
                    }
                }
            }
            _ => BaseImport::Keep,
        };
        match action {
            BaseImport::Keep => kept.push(line),
            BaseImport::Drop => {}
            BaseImport::Replace(replacement) => kept.push(replacement),
        }
    }
    *lines = kept;

    match first {
        Some(position) => position,
        None => {
            lines.insert(0, UNITTEST_IMPORT.to_string());
            0
        }
    }
}

fn ensure_io_import(lines: &mut Vec<String>, base: usize) {
    let uses_string_io = lines.iter().any(|l| l.contains("StringIO"));
    let has_io = lines.iter().any(|l| IO_LINE.is_match(l));
    if uses_string_io && !has_io {
        lines.insert(base + 1, IO_IMPORT.to_string());
    }
}

/// Line range of a `from X import ...` statement starting at `start`, following a
/// parenthesised name list over several lines.
fn from_import_span(lines: &[String], start: usize) -> usize {
    let Some(names) = FROM_IMPORT_LINE
        .captures(&lines[start])
        .and_then(|caps| caps.get(2))
        .map(|m| strip_comment(m.as_str()))
    else {
        return start;
    };
    if !names.trim_start().starts_with('(') || names.contains(')') {
        return start;
    }
    lines[start + 1..]
        .iter()
        .position(|l| strip_comment(l).contains(')'))
        .map_or(lines.len() - 1, |offset| start + 1 + offset)
}

fn strip_comment(line: &str) -> &str {
    line.split('#').next().unwrap_or("")
}

/// Names bound by an import name list, `as` aliases resolved to the imported name.
fn imported_names(list: &str) -> impl Iterator<Item = &str> {
    strip_comment(list)
        .split(',')
        .filter_map(|item| {
            item.trim_matches(|c: char| c.is_whitespace() || c == '(' || c == ')')
                .split_whitespace()
                .next()
        })
}

fn ensure_target_import(lines: &mut Vec<String>, base: usize, source: &PrimaryIdentifier) {
    if source.is_placeholder() {
        // No class in the source: importing the placeholder name would never resolve.
        if !lines.iter().any(|l| SCRIPT_MODULE_IMPORT.is_match(l)) {
            lines.insert(base + 1, format!("from {} import *", SCRIPT_MODULE));
        }
        return;
    }

    // The symbol at the start of a name-list item, case-insensitively.
    let Ok(symbol) = case_insensitive(&format!(
        r"(^[ \t]*\(?[ \t]*|,[ \t]*){}\b",
        regex::escape(source.as_str())
    )) else {
        warn!("Could not build import pattern for {}", source);
        return;
    };
    let fix_symbol = |text: &str| -> String {
        symbol
            .replace_all(text, |caps: &Captures| format!("{}{}", &caps[1], source.as_str()))
            .into_owned()
    };

    let mut found = false;
    let mut index = 0;
    while index < lines.len() {
        let header = FROM_IMPORT_LINE.captures(&lines[index]).map(|caps| {
            let indent = caps.get(1).map_or("", |m| m.as_str()).to_string();
            let names = caps.get(2).map_or("", |m| m.as_str()).to_string();
            (indent, names)
        });
        let Some((indent, names)) = header else {
            index += 1;
            continue;
        };

        let end = from_import_span(lines, index);
        let imports_source = imported_names(&names)
            .chain(lines[index + 1..=end].iter().flat_map(|l| imported_names(l)))
            .any(|name| name.eq_ignore_ascii_case(source.as_str()));

        if imports_source {
            found = true;
            lines[index] = format!(
                "{}from {} import {}",
                indent,
                SCRIPT_MODULE,
                fix_symbol(&names)
            );
            for line in &mut lines[index + 1..=end] {
                *line = fix_symbol(line);
            }
        }
        index = end + 1;
    }

    if !found {
        lines.insert(
            base + 1,
            format!("from {} import {}", SCRIPT_MODULE, source.as_str()),
        );
    }
}

fn case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

impl ArtifactRepairer for JavaRepairer {
    fn repair(&self, artifact: &str, _source: &PrimaryIdentifier) -> String {
        let mut lines: Vec<String> = artifact.lines().map(str::to_string).collect();

        let test_import = match lines.iter().position(|l| JUNIT_TEST_LINE.is_match(l)) {
            Some(position) => position,
            None => {
                // Imports must follow the package declaration.
                let position = lines
                    .iter()
                    .position(|l| JAVA_PACKAGE_LINE.is_match(l))
                    .map_or(0, |p| p + 1);
                lines.insert(position, JUNIT_TEST_IMPORT.to_string());
                position
            }
        };

        let calls_assertions = lines.iter().any(|l| JUNIT_ASSERTION_CALL.is_match(l));
        let has_assertions = lines.iter().any(|l| {
            l.contains("org.junit.jupiter.api.Assertions") || l.contains("org.junit.Assert")
        });
        if calls_assertions && !has_assertions {
            lines.insert(test_import + 1, JUNIT_ASSERTIONS_IMPORT.to_string());
        }

        lines.join("\n").trim_end().to_string()
    }
}
