use anyhow::{bail, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::{read_code, report, resolve_language, teardown, ExecutionArgs};
use crate::llm::{factory, LlmClient};
use crate::pipeline::{Orchestrator, PipelineError, TestReport, TestRequest};

type Labelled<T> = (String, T);

pub async fn run(
    files: Vec<String>,
    language: Option<String>,
    model_override: Option<String>,
    provider_override: Option<String>,
    dry_run: bool,
    args: ExecutionArgs,
) -> Result<()> {
    let mut config = args.load_config()?;

    if let Some(ref provider) = provider_override {
        info!("CLI override: provider = {}", provider);
        config.llm.provider = provider.clone();
    }
    if let Some(ref model) = model_override {
        info!("CLI override: model = {}", model);
        config.llm.model = model.clone();
    }

    // Read every input before anything touches the workspace
    let mut requests = Vec::with_capacity(files.len());
    for file in &files {
        let path = Path::new(file);
        let language = resolve_language(language.as_deref(), path)?;
        let code = read_code(path)?;
        requests.push((file.clone(), TestRequest::new(code, language)));
    }

    if dry_run {
        info!("Using mock LLM client");
    } else {
        info!(
            "Using {} LLM provider (model: {})",
            config.llm.provider, config.llm.model
        );
    }
    let client: Arc<dyn LlmClient> = Arc::from(factory::create_client(&config, dry_run)?);

    let orchestrator = Arc::new(
        Orchestrator::new(client, config.execution.clone())
            .with_custom_instructions(config.prompts.custom_instructions.clone()),
    );
    info!(
        "Processing {} file(s) with up to {} concurrent executions",
        requests.len(),
        config.execution.max_workers
    );

    let results = tokio::select! {
        results = run_all(orchestrator.clone(), requests) => results,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cleaning up");
            teardown(&orchestrator);
            bail!("Interrupted");
        }
    };
    teardown(&orchestrator);

    let total = results.len();
    let mut reports = Vec::with_capacity(total);
    let mut failed = 0;
    for (label, result) in results {
        match result {
            Ok(report) => reports.push((label, report)),
            Err(e) => {
                error!("{}: {:#}", label, anyhow::Error::from(e));
                failed += 1;
            }
        }
    }

    report::print(&reports, args.json)?;

    if failed > 0 {
        bail!("Test generation failed for {} of {} file(s)", failed, total);
    }
    Ok(())
}

/// Run every request concurrently, returning results in input order.
async fn run_all(
    orchestrator: Arc<Orchestrator>,
    requests: Vec<Labelled<TestRequest>>,
) -> Vec<Labelled<Result<TestReport, PipelineError>>> {
    let mut set = JoinSet::new();
    for (index, (label, request)) in requests.into_iter().enumerate() {
        let orchestrator = orchestrator.clone();
        set.spawn(async move {
            let result = orchestrator.run(&request).await;
            (index, label, result)
        });
    }

    let mut results = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => error!("Request task failed: {}", e),
        }
    }
    results.sort_by_key(|(index, _, _)| *index);
    results
        .into_iter()
        .map(|(_, label, result)| (label, result))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionConfig;
    use crate::language::Language;
    use crate::llm::MockLlmClient;
    use crate::pipeline::ExecutionStatus;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_run_all_keeps_input_order() {
        let temp = TempDir::new().unwrap();
        let config = ExecutionConfig {
            workspace_dir: temp.path().join("ws"),
            ..ExecutionConfig::default()
        };
        let orchestrator = Arc::new(Orchestrator::new(Arc::new(MockLlmClient::new()), config));
        let requests = vec![
            ("a.cs".to_string(), TestRequest::new("class A {}", Language::CSharp)),
            ("b.ts".to_string(), TestRequest::new("class B {}", Language::TypeScript)),
            ("c.js".to_string(), TestRequest::new("class C {}", Language::JavaScript)),
        ];

        let results = run_all(orchestrator, requests).await;
        let labels: Vec<&str> = results.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, ["a.cs", "b.ts", "c.js"]);
        for (_, result) in &results {
            assert_eq!(
                result.as_ref().unwrap().execution_outcome.status,
                ExecutionStatus::UnsupportedLanguage
            );
        }
    }

    #[tokio::test]
    async fn test_missing_input_file_fails_before_generation() {
        let temp = TempDir::new().unwrap();
        let args = ExecutionArgs {
            workspace: Some(temp.path().join("ws").to_string_lossy().into_owned()),
            ..ExecutionArgs::default()
        };
        let result = run(
            vec![temp.path().join("missing.py").to_string_lossy().into_owned()],
            None,
            None,
            None,
            true,
            args,
        )
        .await;
        assert!(result.unwrap_err().to_string().contains("Failed to read"));
        assert!(!temp.path().join("ws").exists());
    }
}
