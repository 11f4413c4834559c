use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::pipeline::workspace::IsolationMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub llm: LlmConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "groq", "openai", "openai-compatible" or "anthropic"
    pub provider: String,
    pub model: String,
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>, // For OpenAI-compatible APIs

    /// Optional: Override max_tokens for LLM requests
    /// If not specified, uses provider-specific defaults:
    /// - groq: 2048
    /// - anthropic: 4096
    /// - openai: 4096
    /// - openai-compatible (ollama): 8192
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Sampling temperature; low values keep the generated tests focused.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// HTTP timeout for a single completion request
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// Get max_tokens value, using provider-specific default if not specified
    pub fn get_max_tokens(&self) -> u32 {
        if let Some(tokens) = self.max_tokens {
            return tokens;
        }

        match self.provider.as_str() {
            "groq" => 2048,
            "anthropic" => 4096,
            "openai" => 4096,
            "openai-compatible" => 8192,
            _ => 2048,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Root directory holding staged workspaces (default: "generated_files")
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,

    /// "per-request" stages every request in its own subdirectory, "shared" reuses the root
    #[serde(default)]
    pub isolation: IsolationMode,

    /// Keep the workspace root on shutdown instead of deleting it
    #[serde(default)]
    pub persist: bool,

    /// Interpreter used for script-language tests (default: "python")
    #[serde(default = "default_python_command")]
    pub python_command: String,

    /// Build tool used for compiled-language tests, run as "<build_command> test" (default: "mvn")
    #[serde(default = "default_build_command")]
    pub build_command: String,

    /// Timeout for interpreted test runs in seconds (default: 15)
    #[serde(default = "default_script_timeout")]
    pub script_timeout_secs: u64,

    /// Timeout for build + test runs in seconds (default: 45)
    #[serde(default = "default_build_timeout")]
    pub build_timeout_secs: u64,

    /// Characters of output kept from the end of a failed run (default: 3000)
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,

    /// Maximum number of concurrent stage+execute jobs (default: 4)
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Write files for languages without a toolchain so they can be inspected (default: true)
    #[serde(default = "default_true")]
    pub stage_unsupported: bool,
}

impl ExecutionConfig {
    pub fn script_timeout(&self) -> Duration {
        Duration::from_secs(self.script_timeout_secs)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            workspace_dir: default_workspace_dir(),
            isolation: IsolationMode::default(),
            persist: false,
            python_command: default_python_command(),
            build_command: default_build_command(),
            script_timeout_secs: default_script_timeout(),
            build_timeout_secs: default_build_timeout(),
            max_output_chars: default_max_output_chars(),
            max_workers: default_max_workers(),
            stage_unsupported: true,
        }
    }
}

fn default_temperature() -> f32 {
    0.2
}

fn default_llm_timeout() -> u64 {
    120
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from("generated_files")
}

fn default_python_command() -> String {
    "python".to_string()
}

fn default_build_command() -> String {
    "mvn".to_string()
}

fn default_script_timeout() -> u64 {
    15
}

fn default_build_timeout() -> u64 {
    45
}

fn default_max_output_chars() -> usize {
    3000
}

fn default_max_workers() -> usize {
    4
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PromptsConfig {
    /// Extra instructions appended to the test generation prompt
    #[serde(default)]
    pub custom_instructions: Option<String>,
}

impl Config {
    /// Load config from the working directory or user config directory
    pub fn load() -> Result<Self> {
        Self::load_with_path(None)
    }

    /// Load configuration from a specific path, or use default search paths
    pub fn load_with_path(path: Option<String>) -> Result<Self> {
        if let Some(config_path) = path {
            debug!("Loading config from explicit path: {}", config_path);
            return Self::load_from_path(&config_path)
                .with_context(|| format!("Failed to load config from {}", config_path));
        }

        if let Ok(config) = Self::load_from_path("testsmith.toml") {
            debug!("Loaded config from ./testsmith.toml");
            return Ok(config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("testsmith").join("config.toml");
            if let Ok(config) = Self::load_from_path(&config_path) {
                debug!("Loaded config from {:?}", config_path);
                return Ok(config);
            }
        }

        debug!("Using default config");
        Ok(Self::default())
    }

    fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Get API key from environment variable specified in config
    pub fn get_api_key(&self) -> Result<String> {
        match &self.llm.api_key_env {
            Some(env_var) => {
                // Special case: "none" means no API key needed (e.g., Ollama)
                if env_var.to_lowercase() == "none" {
                    return Ok(String::new());
                }

                // openai-compatible: local servers don't need keys, gateways do
                if self.llm.provider == "openai-compatible" {
                    return Ok(env::var(env_var).unwrap_or_default());
                }

                env::var(env_var).map_err(|_| {
                    anyhow::anyhow!("API key not found in environment variable: {}", env_var)
                })
            }
            None => Ok(String::new()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: "groq".to_string(),
                model: "llama-3.1-8b-instant".to_string(),
                api_key_env: Some("GROQ_API_KEY".to_string()),
                base_url: None,
                max_tokens: None,
                temperature: default_temperature(),
                timeout_secs: default_llm_timeout(),
            },
            execution: ExecutionConfig::default(),
            prompts: PromptsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.llm.provider, "groq");
        assert_eq!(config.llm.model, "llama-3.1-8b-instant");
        assert_eq!(config.llm.api_key_env, Some("GROQ_API_KEY".to_string()));
        assert_eq!(config.execution.script_timeout_secs, 15);
        assert_eq!(config.execution.build_timeout_secs, 45);
        assert_eq!(config.execution.max_output_chars, 3000);
        assert_eq!(config.execution.workspace_dir, PathBuf::from("generated_files"));
        assert!(!config.execution.persist);
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("provider = \"groq\""));
        assert!(toml_str.contains("GROQ_API_KEY"));
        assert!(toml_str.contains("isolation = \"per-request\""));
    }

    #[test]
    fn test_partial_toml_fills_execution_defaults() {
        let config: Config = toml::from_str(
            r#"
[llm]
provider = "openai"
model = "gpt-4o-mini"
api_key_env = "OPENAI_API_KEY"

[execution]
python_command = "python3"
isolation = "shared"
"#,
        )
        .unwrap();
        assert_eq!(config.llm.temperature, 0.2);
        assert_eq!(config.llm.timeout_secs, 120);
        assert_eq!(config.execution.python_command, "python3");
        assert_eq!(config.execution.isolation, IsolationMode::Shared);
        assert_eq!(config.execution.build_command, "mvn");
        assert_eq!(config.execution.max_workers, 4);
        assert!(config.execution.stage_unsupported);
        assert!(config.prompts.custom_instructions.is_none());
    }

    #[test]
    fn test_timeouts_as_durations() {
        let execution = ExecutionConfig::default();
        assert_eq!(execution.script_timeout(), Duration::from_secs(15));
        assert_eq!(execution.build_timeout(), Duration::from_secs(45));
    }

    #[test]
    fn test_max_tokens_provider_defaults() {
        let mut llm = Config::default().llm;
        assert_eq!(llm.get_max_tokens(), 2048);

        llm.provider = "anthropic".to_string();
        assert_eq!(llm.get_max_tokens(), 4096);

        llm.provider = "openai-compatible".to_string();
        assert_eq!(llm.get_max_tokens(), 8192);

        llm.max_tokens = Some(1000);
        assert_eq!(llm.get_max_tokens(), 1000);
    }

    #[test]
    #[serial]
    fn test_api_key_from_env() {
        env::set_var("TESTSMITH_TEST_API_KEY", "test_key_123");
        let mut config = Config::default();
        config.llm.api_key_env = Some("TESTSMITH_TEST_API_KEY".to_string());

        let api_key = config.get_api_key().unwrap();
        assert_eq!(api_key, "test_key_123");

        env::remove_var("TESTSMITH_TEST_API_KEY");
    }

    #[test]
    #[serial]
    fn test_api_key_missing_fails() {
        let mut config = Config::default();
        config.llm.api_key_env = Some("TESTSMITH_NONEXISTENT_KEY_XYZ".to_string());

        let result = config.get_api_key();
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("TESTSMITH_NONEXISTENT_KEY_XYZ"));
    }

    #[test]
    fn test_api_key_none_for_local_models() {
        let mut config = Config::default();
        config.llm.api_key_env = Some("none".to_string());
        assert_eq!(config.get_api_key().unwrap(), "");
    }

    #[test]
    #[serial]
    fn test_api_key_openai_compatible_missing_ok() {
        let mut config = Config::default();
        config.llm.provider = "openai-compatible".to_string();
        config.llm.api_key_env = Some("TESTSMITH_NONEXISTENT_KEY_OAI_999".to_string());
        assert_eq!(config.get_api_key().unwrap(), "");
    }

    #[test]
    fn test_load_with_explicit_missing_path_fails() {
        let result = Config::load_with_path(Some("/nonexistent/testsmith.toml".to_string()));
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to load config"));
    }
}
