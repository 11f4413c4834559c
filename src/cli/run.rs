use anyhow::{bail, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::{read_code, report, resolve_language, teardown, ExecutionArgs};
use crate::llm::MockLlmClient;
use crate::pipeline::{Orchestrator, TestRequest};

/// Push an existing test artifact through sanitize, repair, stage and execute.
pub async fn run(
    source: String,
    test: String,
    language: Option<String>,
    args: ExecutionArgs,
) -> Result<()> {
    let config = args.load_config()?;

    let source_path = Path::new(&source);
    let language = resolve_language(language.as_deref(), source_path)?;
    let code = read_code(source_path)?;
    let artifact = read_code(Path::new(&test))?;
    info!("Running {} against {} ({})", test, source, language);

    // Generation is skipped, so the client is never called.
    let orchestrator = Orchestrator::new(Arc::new(MockLlmClient::new()), config.execution.clone());
    let request = TestRequest::new(code, language);

    let report = tokio::select! {
        report = orchestrator.run_with_artifact(&request, &artifact) => report,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cleaning up");
            teardown(&orchestrator);
            bail!("Interrupted");
        }
    };
    teardown(&orchestrator);

    report::print(&[(test, report)], args.json)
}
