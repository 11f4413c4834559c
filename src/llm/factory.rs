use anyhow::{bail, Result};

use super::client::LlmClient;
use super::client::MockLlmClient;
use super::client_impl::{AnthropicClient, OpenAIClient};
use crate::config::Config;

/// Create an LLM client based on configuration
pub fn create_client(config: &Config, dry_run: bool) -> Result<Box<dyn LlmClient>> {
    if dry_run {
        return Ok(Box::new(MockLlmClient::new()));
    }

    let api_key = config.get_api_key()?;
    let llm = &config.llm;
    let max_tokens = llm.get_max_tokens();

    match llm.provider.as_str() {
        "groq" => {
            let client = match &llm.base_url {
                Some(base_url) => OpenAIClient::with_base_url(
                    api_key,
                    llm.model.clone(),
                    base_url.clone(),
                    max_tokens,
                    llm.temperature,
                    llm.timeout_secs,
                )?,
                None => OpenAIClient::groq(
                    api_key,
                    llm.model.clone(),
                    max_tokens,
                    llm.temperature,
                    llm.timeout_secs,
                )?,
            };
            Ok(Box::new(client))
        }

        "openai" => Ok(Box::new(OpenAIClient::openai(
            api_key,
            llm.model.clone(),
            max_tokens,
            llm.temperature,
            llm.timeout_secs,
        )?)),

        "openai-compatible" => {
            let base_url = llm
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434/v1".to_string());

            Ok(Box::new(OpenAIClient::with_base_url(
                api_key,
                llm.model.clone(),
                base_url,
                max_tokens,
                llm.temperature,
                llm.timeout_secs,
            )?))
        }

        "anthropic" => {
            let client = AnthropicClient::new(
                api_key,
                llm.model.clone(),
                max_tokens,
                llm.temperature,
                llm.timeout_secs,
            )?;
            Ok(Box::new(match &llm.base_url {
                Some(base_url) => client.with_base_url(base_url.clone()),
                None => client,
            }))
        }

        unknown => bail!("Unknown LLM provider: {}", unknown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    fn test_create_mock_client_for_dry_run() {
        let mut config = Config::default();
        config.llm.api_key_env = Some("TESTSMITH_FACTORY_UNSET_KEY".to_string());
        // Dry run never looks at the key
        create_client(&config, true).unwrap();
    }

    #[test]
    #[serial]
    fn test_create_groq_client() {
        env::set_var("TESTSMITH_FACTORY_KEY", "gsk_test");
        let mut config = Config::default();
        config.llm.api_key_env = Some("TESTSMITH_FACTORY_KEY".to_string());
        assert!(create_client(&config, false).is_ok());
        env::remove_var("TESTSMITH_FACTORY_KEY");
    }

    #[test]
    #[serial]
    fn test_create_openai_and_anthropic_clients() {
        env::set_var("TESTSMITH_FACTORY_KEY", "test_key");
        let mut config = Config::default();
        config.llm.api_key_env = Some("TESTSMITH_FACTORY_KEY".to_string());

        config.llm.provider = "openai".to_string();
        assert!(create_client(&config, false).is_ok());

        config.llm.provider = "anthropic".to_string();
        assert!(create_client(&config, false).is_ok());
        env::remove_var("TESTSMITH_FACTORY_KEY");
    }

    #[test]
    fn test_create_openai_compatible_client_without_key() {
        let mut config = Config::default();
        config.llm.provider = "openai-compatible".to_string();
        config.llm.api_key_env = Some("none".to_string());
        config.llm.base_url = Some("http://localhost:11434/v1".to_string());
        assert!(create_client(&config, false).is_ok());
    }

    #[test]
    #[serial]
    fn test_create_client_with_unknown_provider() {
        env::set_var("TESTSMITH_FACTORY_KEY", "test_key");
        let mut config = Config::default();
        config.llm.api_key_env = Some("TESTSMITH_FACTORY_KEY".to_string());
        config.llm.provider = "gemini".to_string();
        let result = create_client(&config, false);
        assert!(result.is_err());
        if let Err(e) = result {
            assert!(e.to_string().contains("Unknown LLM provider"));
        }
        env::remove_var("TESTSMITH_FACTORY_KEY");
    }

    #[test]
    fn test_create_client_without_api_key() {
        let mut config = Config::default();
        config.llm.api_key_env = Some("TESTSMITH_TEST_NONEXISTENT_KEY_FACTORY_99999".to_string());
        let result = create_client(&config, false);
        assert!(result.is_err());
        if let Err(e) = result {
            assert!(e.to_string().contains("API key not found"));
        }
    }
}
