// Test pipeline: sanitize -> repair -> stage -> execute
//
// Everything after generation is deterministic and never trusts the generated
// text; every request that gets past generation ends with a classified outcome.

pub mod error;
pub mod executor;
pub mod identifier;
pub mod orchestrator;
pub mod outcome;
pub mod pool;
pub mod repairer;
pub mod sanitizer;
pub mod stager;
pub mod workspace;

pub use error::{PipelineError, StagingError};
pub use executor::ToolchainExecutor;
pub use orchestrator::{Orchestrator, TestReport, TestRequest};
pub use outcome::{ExecutionOutcome, ExecutionStatus};
pub use pool::{ExecutionPool, PoolError};
pub use stager::StagedFiles;
pub use workspace::{IsolationMode, Workspace, WorkspaceRoot};

use crate::language::Language;
use identifier::PrimaryIdentifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Source,
    Test,
}

/// A piece of code in the pipeline. Never modified once built.
///
/// The identifier is extracted once, here, so every stage sees the same name
/// (a placeholder is time-based and would differ between extractions).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeUnit {
    pub content: String,
    pub language: Language,
    pub role: Role,
    pub identifier: PrimaryIdentifier,
}

impl CodeUnit {
    pub fn new(content: impl Into<String>, language: Language, role: Role) -> Self {
        let content = content.into();
        let identifier = identifier::extract(&content);
        Self {
            content,
            language,
            role,
            identifier,
        }
    }

    pub fn source(content: impl Into<String>, language: Language) -> Self {
        Self::new(content, language, Role::Source)
    }

    pub fn test(content: impl Into<String>, language: Language) -> Self {
        Self::new(content, language, Role::Test)
    }
}
