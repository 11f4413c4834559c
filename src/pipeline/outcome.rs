use serde::{Deserialize, Serialize};
use std::fmt;

use crate::util::tail_chars;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecutionStatus {
    Success,
    TestFailure,
    TimeoutError,
    ToolMissing,
    UnsupportedLanguage,
    ExecutionSkipped,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::TestFailure => "testFailure",
            ExecutionStatus::TimeoutError => "timeoutError",
            ExecutionStatus::ToolMissing => "toolMissing",
            ExecutionStatus::UnsupportedLanguage => "unsupportedLanguage",
            ExecutionStatus::ExecutionSkipped => "executionSkipped",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionStatus::Success)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified result of one toolchain invocation. Always produced once staging succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    pub message: String,
    pub raw_output: String,
    pub truncated: bool,
}

impl ExecutionOutcome {
    /// Outcome carrying the complete output.
    pub fn full(
        status: ExecutionStatus,
        message: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            status,
            message: message.into(),
            raw_output: output.into(),
            truncated: false,
        }
    }

    /// Outcome keeping only the last `limit` characters of `output`.
    pub fn tail(
        status: ExecutionStatus,
        message: impl Into<String>,
        output: &str,
        limit: usize,
    ) -> Self {
        let (raw_output, truncated) = tail_chars(output, limit);
        Self {
            status,
            message: message.into(),
            raw_output,
            truncated,
        }
    }

    pub fn unsupported(language: &str) -> Self {
        Self::full(
            ExecutionStatus::UnsupportedLanguage,
            format!("Automatic execution for {} is not implemented yet", language),
            "",
        )
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::full(ExecutionStatus::ExecutionSkipped, reason, "")
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
