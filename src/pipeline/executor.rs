//! Run the staged tests with the language's toolchain and classify what came back.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::outcome::{ExecutionOutcome, ExecutionStatus};
use super::stager::StagedFiles;
use crate::config::ExecutionConfig;
use crate::language::{Language, Toolchain};
use crate::util::{run_cmd_with_timeout, CommandError, CommandOutput, ProcessTracker};

const BUILD_SUCCESS: &str = "BUILD SUCCESS";
const BUILD_FAILURE: &str = "BUILD FAILURE";
const SCRIPT_FAILURE_MARKERS: &[&str] = &["FAILED (", "NO TESTS RAN", "Ran 0 tests"];
const SHELL_NOT_FOUND_CODE: i32 = 127;
const WINDOWS_NOT_RECOGNIZED: &str = "is not recognized as an internal or external command";
const PACKAGE_MARKER: &str = "__init__.py";

/// Makes the workspace importable as a package for the duration of one run.
struct PackageMarker {
    path: PathBuf,
}

impl PackageMarker {
    fn create(dir: &Path) -> Option<Self> {
        let path = dir.join(PACKAGE_MARKER);
        match fs::write(&path, "") {
            Ok(()) => Some(Self { path }),
            Err(e) => {
                warn!("Could not create {}: {}", path.display(), e);
                None
            }
        }
    }
}

impl Drop for PackageMarker {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            debug!("Could not remove {}: {}", self.path.display(), e);
        }
    }
}

pub struct ToolchainExecutor {
    config: ExecutionConfig,
}

impl ToolchainExecutor {
    pub fn new(config: ExecutionConfig) -> Self {
        Self { config }
    }

    /// Bound on a single toolchain run, `None` when nothing is ever spawned.
    pub fn timeout_for(&self, language: &Language) -> Option<Duration> {
        match language.toolchain() {
            Toolchain::Script => Some(self.config.script_timeout()),
            Toolchain::Build => Some(self.config.build_timeout()),
            Toolchain::Unsupported => None,
        }
    }

    /// Run the tests in `staged`. Never fails: every result is an outcome.
    pub fn execute(
        &self,
        language: &Language,
        staged: &StagedFiles,
        tracker: &ProcessTracker,
    ) -> ExecutionOutcome {
        let outcome = match language.toolchain() {
            Toolchain::Script => self.execute_script(staged, tracker),
            Toolchain::Build => self.execute_build(staged, tracker),
            Toolchain::Unsupported => ExecutionOutcome::unsupported(language.as_str()),
        };
        info!("{} execution finished: {}", language, outcome.status);
        outcome
    }

    fn execute_script(&self, staged: &StagedFiles, tracker: &ProcessTracker) -> ExecutionOutcome {
        let mut parts = self.config.python_command.split_whitespace();
        let Some(program) = parts.next() else {
            return ExecutionOutcome::full(
                ExecutionStatus::ToolMissing,
                "No Python interpreter configured",
                "",
            );
        };

        let test_file = staged
            .test_path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| staged.test_path.clone());

        let mut cmd = Command::new(program);
        cmd.args(parts)
            .args(["-m", "unittest", "-v"])
            .arg(&test_file)
            .current_dir(&staged.workspace);
        debug!("Running {:?} in {}", cmd, staged.workspace.display());

        let timeout = self.config.script_timeout();
        let _marker = PackageMarker::create(&staged.workspace);
        match run_cmd_with_timeout(cmd, timeout, tracker) {
            Ok(output) => classify_script_output(&output, self.config.max_output_chars),
            Err(CommandError::NotFound { program }) => ExecutionOutcome::full(
                ExecutionStatus::ToolMissing,
                format!(
                    "Python interpreter ('{}') not found. Make sure it is installed and in your PATH.",
                    program
                ),
                "",
            ),
            Err(CommandError::TimedOut { partial_output, .. }) => ExecutionOutcome::tail(
                ExecutionStatus::TimeoutError,
                format!(
                    "Python execution timed out (max {} seconds)",
                    timeout.as_secs()
                ),
                &partial_output,
                self.config.max_output_chars,
            ),
            Err(e) => ExecutionOutcome::full(
                ExecutionStatus::TestFailure,
                format!("Failed to run Python tests: {}", e),
                "",
            ),
        }
    }

    fn execute_build(&self, staged: &StagedFiles, tracker: &ProcessTracker) -> ExecutionOutcome {
        let build_command = self.config.build_command.trim();
        let tool = build_command
            .split_whitespace()
            .next()
            .unwrap_or(build_command)
            .to_string();

        let cmd = shell_command(&format!("{} test", build_command), &staged.workspace);
        debug!("Running {:?} in {}", cmd, staged.workspace.display());

        let timeout = self.config.build_timeout();
        match run_cmd_with_timeout(cmd, timeout, tracker) {
            Ok(output) => classify_build_output(&output, &tool, self.config.max_output_chars),
            Err(CommandError::NotFound { program }) => ExecutionOutcome::full(
                ExecutionStatus::ToolMissing,
                format!("Shell ('{}') not found, cannot run Maven", program),
                "",
            ),
            Err(CommandError::TimedOut { partial_output, .. }) => ExecutionOutcome::tail(
                ExecutionStatus::TimeoutError,
                format!(
                    "Maven execution timed out (max {} seconds)",
                    timeout.as_secs()
                ),
                &partial_output,
                self.config.max_output_chars,
            ),
            Err(e) => ExecutionOutcome::full(
                ExecutionStatus::TestFailure,
                format!("Failed to run Maven: {}", e),
                "",
            ),
        }
    }
}

#[cfg(unix)]
fn shell_command(line: &str, dir: &Path) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(line).current_dir(dir);
    cmd
}

#[cfg(not(unix))]
fn shell_command(line: &str, dir: &Path) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(line).current_dir(dir);
    cmd
}

/// unittest reports on stderr; a clean exit without failure markers is a pass.
pub fn classify_script_output(output: &CommandOutput, limit: usize) -> ExecutionOutcome {
    let marker = SCRIPT_FAILURE_MARKERS
        .iter()
        .find(|m| output.combined.contains(*m));

    match (output.success(), marker) {
        (true, None) => ExecutionOutcome::full(
            ExecutionStatus::Success,
            "Python tests passed",
            output.combined.clone(),
        ),
        (_, Some(marker)) => {
            debug!("Script output contains failure marker {:?}", marker);
            ExecutionOutcome::tail(
                ExecutionStatus::TestFailure,
                "Python tests failed",
                &output.combined,
                limit,
            )
        }
        (false, None) => ExecutionOutcome::tail(
            ExecutionStatus::TestFailure,
            format!("Python tests failed (exit code {})", exit_code_label(output)),
            &output.combined,
            limit,
        ),
    }
}

/// Maven is judged by its banner, not its exit code. No banner is a failure.
pub fn classify_build_output(output: &CommandOutput, tool: &str, limit: usize) -> ExecutionOutcome {
    let text = &output.combined;

    if text.contains(BUILD_SUCCESS) {
        return ExecutionOutcome::full(
            ExecutionStatus::Success,
            "Maven BUILD SUCCESS",
            text.clone(),
        );
    }
    if text.contains(BUILD_FAILURE) {
        return ExecutionOutcome::tail(
            ExecutionStatus::TestFailure,
            "Maven BUILD FAILURE",
            text,
            limit,
        );
    }
    if output.code() == Some(SHELL_NOT_FOUND_CODE) || text.contains(WINDOWS_NOT_RECOGNIZED) {
        return ExecutionOutcome::full(
            ExecutionStatus::ToolMissing,
            format!(
                "Maven ('{}' command) not found. Make sure it is installed and in your PATH.",
                tool
            ),
            text.clone(),
        );
    }

    warn!("Maven output has no build banner, treating as failure");
    ExecutionOutcome::full(
        ExecutionStatus::TestFailure,
        format!(
            "Maven finished without a build result (exit code {})",
            exit_code_label(output)
        ),
        text.clone(),
    )
}

fn exit_code_label(output: &CommandOutput) -> String {
    output
        .code()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string())
}
