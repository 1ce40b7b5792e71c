use super::Generator;
use crate::config::GenerationConfig;
use crate::error::GeneratorError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::timeout as tokio_timeout;
use tracing::debug;

/// HTTP client for the generation service. The response body is returned as
/// an opaque JSON value; the extraction chain owns interpreting it.
pub struct HttpGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpGenerator {
    pub fn new(config: &GenerationConfig) -> Self {
        let api_key = config
            .api_key_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok());

        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            timeout: Duration::from_secs(config.timeout_sec),
        }
    }
}

#[async_trait]
impl Generator for HttpGenerator {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn invoke(&self, scope: &str, prompt: &str) -> Result<Value, GeneratorError> {
        let url = format!("{}/v1/generate", self.base_url);
        let body = json!({
            "conversation": scope,
            "model": self.model,
            "prompt": prompt,
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let start = std::time::Instant::now();

        let response = tokio_timeout(self.timeout, request.send())
            .await
            .map_err(|_| GeneratorError::Timeout(self.timeout))??;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let payload = tokio_timeout(self.timeout, response.json::<Value>())
            .await
            .map_err(|_| GeneratorError::Timeout(self.timeout))??;

        debug!(
            "generation call for scope {} completed in {:?}",
            scope,
            start.elapsed()
        );

        Ok(payload)
    }
}
