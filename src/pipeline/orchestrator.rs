use serde::Serialize;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::error::PipelineError;
use super::executor::ToolchainExecutor;
use super::outcome::{ExecutionOutcome, ExecutionStatus};
use super::pool::{ExecutionPool, PoolError};
use super::stager::{self, StagedFiles};
use super::workspace::WorkspaceRoot;
use super::{repairer, sanitizer, CodeUnit};
use crate::config::ExecutionConfig;
use crate::language::{Language, Toolchain};
use crate::llm::prompts;
use crate::llm::LlmClient;
use crate::util::ProcessTracker;

/// Extra time the pool waits past the toolchain timeout before giving up on a job.
const POOL_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct TestRequest {
    pub code: String,
    pub language: Language,
}

impl TestRequest {
    pub fn new(code: impl Into<String>, language: Language) -> Self {
        Self {
            code: code.into(),
            language,
        }
    }
}

/// What a request returns once generation succeeded.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    pub test_artifact: String,
    pub execution_outcome: ExecutionOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staged: Option<StagedFiles>,
}

struct JobResult {
    staged: Option<StagedFiles>,
    outcome: ExecutionOutcome,
}

pub struct Orchestrator {
    client: Arc<dyn LlmClient>,
    workspaces: Arc<WorkspaceRoot>,
    executor: Arc<ToolchainExecutor>,
    pool: ExecutionPool,
    stage_unsupported: bool,
    custom_instructions: Option<String>,
    job_bound: Option<Duration>,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn LlmClient>, config: ExecutionConfig) -> Self {
        let workspaces = Arc::new(WorkspaceRoot::from_config(&config));
        Self::with_workspace_root(client, workspaces, config)
    }

    pub fn with_workspace_root(
        client: Arc<dyn LlmClient>,
        workspaces: Arc<WorkspaceRoot>,
        config: ExecutionConfig,
    ) -> Self {
        Self {
            client,
            workspaces,
            pool: ExecutionPool::new(config.max_workers),
            stage_unsupported: config.stage_unsupported,
            executor: Arc::new(ToolchainExecutor::new(config)),
            custom_instructions: None,
            job_bound: None,
        }
    }

    pub fn with_custom_instructions(mut self, instructions: Option<String>) -> Self {
        self.custom_instructions = instructions;
        self
    }

    /// Cap how long a stage+execute job may run before it is abandoned, replacing
    /// the default of the toolchain timeout plus a grace period.
    pub fn with_job_bound(mut self, bound: Duration) -> Self {
        self.job_bound = Some(bound);
        self
    }

    pub fn workspace_root(&self) -> &Arc<WorkspaceRoot> {
        &self.workspaces
    }

    /// Generate a test for `request` and push it through the pipeline.
    ///
    /// Only a generation failure is an error; everything later is reported in the outcome.
    pub async fn run(&self, request: &TestRequest) -> Result<TestReport, PipelineError> {
        let source = CodeUnit::source(request.code.clone(), request.language.clone());
        let prompt = prompts::test_generation(
            &source.content,
            &source.language,
            &source.identifier,
            self.custom_instructions.as_deref(),
        );

        info!(
            "Generating {} tests (source: {})",
            source.language, source.identifier
        );
        let raw = self
            .client
            .complete(&prompt)
            .await
            .map_err(PipelineError::Generation)?;
        debug!("Generator returned {} bytes", raw.len());

        Ok(self.process(source, &raw).await)
    }

    /// Push an already generated artifact through sanitize, repair, stage and execute.
    pub async fn run_with_artifact(&self, request: &TestRequest, raw: &str) -> TestReport {
        let source = CodeUnit::source(request.code.clone(), request.language.clone());
        self.process(source, raw).await
    }

    async fn process(&self, source: CodeUnit, raw: &str) -> TestReport {
        let language = source.language.clone();
        let sanitized = sanitizer::sanitize(raw);
        let test_artifact = repairer::repair(&sanitized, &language, &source.identifier);

        if language.toolchain() == Toolchain::Unsupported && !self.stage_unsupported {
            debug!("Not staging {} artifact", language);
            return TestReport {
                test_artifact,
                execution_outcome: ExecutionOutcome::unsupported(language.as_str()),
                staged: None,
            };
        }

        let test = CodeUnit::test(test_artifact.clone(), language.clone());
        let workspaces = self.workspaces.clone();
        let executor = self.executor.clone();
        let bound = self
            .job_bound
            .or_else(|| executor.timeout_for(&language).map(|t| t + POOL_GRACE));
        // Filled as soon as staging succeeds, so an abandoned job still reports its files.
        let staged_slot: Arc<Mutex<Option<StagedFiles>>> = Arc::new(Mutex::new(None));
        let job_slot = staged_slot.clone();

        let job = move |tracker: ProcessTracker| {
            let staged = match workspaces
                .acquire()
                .and_then(|workspace| stager::stage(&workspace, &source, &test, &language))
            {
                Ok(staged) => staged,
                Err(e) => {
                    warn!("Staging failed, skipping execution: {}", e);
                    return JobResult {
                        staged: None,
                        outcome: ExecutionOutcome::skipped(format!("Staging failed: {}", e)),
                    };
                }
            };
            *job_slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(staged.clone());
            let outcome = executor.execute(&language, &staged, &tracker);
            JobResult {
                staged: Some(staged),
                outcome,
            }
        };

        let result = match self.pool.dispatch(bound, job).await {
            Ok(result) => result,
            Err(e @ PoolError::Timeout(_)) => JobResult {
                staged: staged_slot.lock().unwrap_or_else(|e| e.into_inner()).take(),
                outcome: ExecutionOutcome::full(
                    ExecutionStatus::TimeoutError,
                    format!("Execution abandoned: {}", e),
                    "",
                ),
            },
            Err(e @ PoolError::Panicked(_)) => {
                warn!("Execution worker failed: {}", e);
                JobResult {
                    staged: staged_slot.lock().unwrap_or_else(|e| e.into_inner()).take(),
                    outcome: ExecutionOutcome::full(
                        ExecutionStatus::TestFailure,
                        format!("Execution worker failed: {}", e),
                        "",
                    ),
                }
            }
            Err(e @ PoolError::Closed) => JobResult {
                staged: None,
                outcome: ExecutionOutcome::skipped(e.to_string()),
            },
        };

        TestReport {
            test_artifact,
            execution_outcome: result.outcome,
            staged: result.staged,
        }
    }

    /// Stop accepting work and remove the workspace tree unless it is persisted.
    pub fn shutdown(&self) -> io::Result<bool> {
        self.pool.close();
        self.workspaces.teardown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::pipeline::workspace::IsolationMode;
    use anyhow::bail;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct FailingClient;

    #[async_trait]
    impl LlmClient for FailingClient {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            bail!("connection refused")
        }
    }

    fn config_in(temp: &TempDir) -> ExecutionConfig {
        ExecutionConfig {
            workspace_dir: temp.path().join("generated_files"),
            isolation: IsolationMode::PerRequest,
            ..ExecutionConfig::default()
        }
    }

    #[tokio::test]
    async fn test_generation_failure_is_request_level_error() {
        let temp = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(Arc::new(FailingClient), config_in(&temp));
        let err = orchestrator
            .run(&TestRequest::new("class A {}", Language::Java))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Generation(_)));
        assert!(err.to_string().contains("connection refused"));
        // Nothing was staged.
        assert!(!temp.path().join("generated_files").exists());
    }

    #[tokio::test]
    async fn test_unsupported_language_is_staged_not_executed() {
        let temp = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(Arc::new(MockLlmClient::new()), config_in(&temp));
        let report = orchestrator
            .run(&TestRequest::new("public class Calculator {}", Language::CSharp))
            .await
            .unwrap();

        assert_eq!(report.execution_outcome.status, ExecutionStatus::UnsupportedLanguage);
        let staged = report.staged.expect("unsupported languages are staged");
        assert!(staged.test_path.exists());
        assert!(staged.source_path.exists());
    }

    #[tokio::test]
    async fn test_unsupported_language_without_staging() {
        let temp = TempDir::new().unwrap();
        let mut config = config_in(&temp);
        config.stage_unsupported = false;
        let orchestrator = Orchestrator::new(Arc::new(MockLlmClient::new()), config);
        let report = orchestrator
            .run_with_artifact(
                &TestRequest::new("fn main() {}", Language::Other("rust".to_string())),
                "```rust\n#[test]\nfn t() {}\n```",
            )
            .await;

        assert_eq!(report.execution_outcome.status, ExecutionStatus::UnsupportedLanguage);
        assert_eq!(report.test_artifact, "#[test]\nfn t() {}");
        assert!(report.staged.is_none());
        assert!(!temp.path().join("generated_files").exists());
    }

    #[tokio::test]
    async fn test_staging_failure_becomes_execution_skipped() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();
        let config = ExecutionConfig {
            workspace_dir: blocker,
            ..ExecutionConfig::default()
        };
        let orchestrator = Orchestrator::new(Arc::new(MockLlmClient::new()), config);
        let report = orchestrator
            .run(&TestRequest::new("class Greeter:\n    pass", Language::Python))
            .await
            .unwrap();

        assert_eq!(report.execution_outcome.status, ExecutionStatus::ExecutionSkipped);
        assert!(report.execution_outcome.message.contains("Staging failed"));
        assert!(report.test_artifact.starts_with("import unittest"));
        assert!(report.staged.is_none());
    }

    #[tokio::test]
    async fn test_report_json_shape() {
        let temp = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(Arc::new(MockLlmClient::new()), config_in(&temp));
        let report = orchestrator
            .run(&TestRequest::new("class A {}", Language::TypeScript))
            .await
            .unwrap();

        let value = serde_json::to_value(&report).unwrap();
        assert!(value["testArtifact"].is_string());
        assert_eq!(value["executionOutcome"]["status"], "unsupportedLanguage");
        assert!(value["staged"]["testPath"].is_string());
    }

    #[tokio::test]
    async fn test_shutdown_removes_workspace() {
        let temp = TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(Arc::new(MockLlmClient::new()), config_in(&temp));
        orchestrator
            .run(&TestRequest::new("class A {}", Language::CSharp))
            .await
            .unwrap();
        assert!(temp.path().join("generated_files").exists());

        assert!(orchestrator.shutdown().unwrap());
        assert!(!temp.path().join("generated_files").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_abandoned_job_still_reports_staged_files() {
        let temp = TempDir::new().unwrap();
        let script = temp.path().join("slow_python.sh");
        std::fs::write(&script, "#!/bin/sh\nsleep 60\n").unwrap();
        let config = ExecutionConfig {
            python_command: format!("sh {}", script.display()),
            script_timeout_secs: 30,
            ..config_in(&temp)
        };
        let orchestrator = Orchestrator::new(Arc::new(MockLlmClient::new()), config)
            .with_job_bound(Duration::from_millis(500));

        let report = orchestrator
            .run_with_artifact(
                &TestRequest::new("class Greeter:\n    pass", Language::Python),
                "import unittest",
            )
            .await;

        assert_eq!(report.execution_outcome.status, ExecutionStatus::TimeoutError);
        assert!(report.execution_outcome.message.contains("Execution abandoned"));
        let staged = report.staged.expect("staging finished before the job was abandoned");
        assert!(staged.test_path.exists());
        assert!(staged.source_path.ends_with("target_module.py"));
    }
}
