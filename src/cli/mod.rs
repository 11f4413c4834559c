// Command-line boundary: reads files, applies overrides, prints reports.

pub mod generate;
pub mod report;
pub mod run;

use anyhow::{bail, Context, Result};
use clap::Args;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

use crate::config::Config;
use crate::language::Language;
use crate::pipeline::{IsolationMode, Orchestrator};

/// Flags shared by every subcommand that stages and executes tests.
#[derive(Debug, Clone, Default, Args)]
pub struct ExecutionArgs {
    /// Path to config file (defaults to ./testsmith.toml or ~/.config/testsmith/config.toml)
    #[arg(long)]
    pub config: Option<String>,

    /// Workspace root directory (default: generated_files)
    #[arg(long)]
    pub workspace: Option<String>,

    /// Workspace isolation: per-request (default) or shared
    #[arg(long)]
    pub isolation: Option<String>,

    /// Keep the workspace on exit for inspection
    #[arg(long)]
    pub keep_workspace: bool,

    /// Print the report as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

impl ExecutionArgs {
    /// Load config (explicit path, working directory, or user config dir) and apply overrides.
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load_with_path(self.config.clone())?;
        self.apply(&mut config)?;
        Ok(config)
    }

    fn apply(&self, config: &mut Config) -> Result<()> {
        if let Some(ref workspace) = self.workspace {
            info!("CLI override: workspace_dir = {}", workspace);
            config.execution.workspace_dir = workspace.into();
        }
        if let Some(ref isolation) = self.isolation {
            let mode = IsolationMode::from_str(isolation)?;
            info!("CLI override: isolation = {}", mode);
            config.execution.isolation = mode;
        }
        if self.keep_workspace {
            info!("CLI override: persist = true");
            config.execution.persist = true;
        }
        Ok(())
    }
}

/// Explicit `--language` wins, otherwise the file extension decides.
pub fn resolve_language(explicit: Option<&str>, path: &Path) -> Result<Language> {
    if let Some(label) = explicit {
        return Language::from_str(label);
    }
    match Language::from_extension(path) {
        Some(language) => {
            info!("Detected language {} for {}", language, path.display());
            Ok(language)
        }
        None => bail!(
            "Cannot detect the language of {}; pass --language",
            path.display()
        ),
    }
}

/// Remove the workspace tree on the way out; failures are only logged.
pub fn teardown(orchestrator: &Orchestrator) {
    if let Err(e) = orchestrator.shutdown() {
        warn!(
            "Failed to remove workspace {}: {}",
            orchestrator.workspace_root().path().display(),
            e
        );
    }
}

pub fn read_code(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
