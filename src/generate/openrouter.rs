//! OpenRouter-backed generator.

use super::Generator;
use crate::config::GeneratorConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

/// Chat-completions client for OpenRouter (or any API-compatible endpoint).
pub struct OpenRouterGenerator {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    system_prompt: String,
}

impl OpenRouterGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .context("generator.api_key is not configured")?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            system_prompt: config.system_prompt.clone(),
        })
    }
}

#[async_trait]
impl Generator for OpenRouterGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": self.system_prompt},
                {"role": "user", "content": prompt}
            ]
        });

        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .context("generation request failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("generation provider returned {status}"));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .context("generation response was not JSON")?;

        body.pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| anyhow!("generation response missing choices[0].message.content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_errors() {
        let config = GeneratorConfig::default();
        let result = OpenRouterGenerator::new(&config);
        assert!(result.is_err());
    }

    #[test]
    fn configured_key_builds() {
        let config = GeneratorConfig {
            api_key: Some("sk-test".into()),
            ..GeneratorConfig::default()
        };
        assert!(OpenRouterGenerator::new(&config).is_ok());
    }
}
