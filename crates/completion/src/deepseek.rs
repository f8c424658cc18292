//! OpenAI-compatible chat-completion client.

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    tracing::{debug, warn},
};

use codeglass_transcripts::Turn;

use crate::{
    CompletionClient, shared_http_client,
    error::{Error, Result},
};

pub const DEFAULT_API_BASE: &str = "https://api.deepseek.com/v1";
pub const DEFAULT_MODEL: &str = "deepseek-coder";

/// Upper bound on generated tokens per reply.
const MAX_TOKENS: u32 = 2048;
const TEMPERATURE: f64 = 0.7;

/// Client for a bearer-authenticated `/chat/completions` endpoint.
pub struct DeepSeekClient {
    api_key: Secret<String>,
    model: String,
    base_url: String,
    client: &'static reqwest::Client,
}

impl DeepSeekClient {
    pub fn new(api_key: Secret<String>) -> Self {
        Self::with_endpoint(api_key, DEFAULT_API_BASE, DEFAULT_MODEL)
    }

    /// Build a client against a non-default endpoint or model. `base_url`
    /// is the API root without the `/chat/completions` suffix.
    pub fn with_endpoint(
        api_key: Secret<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            api_key,
            model: model.into(),
            base_url,
            client: shared_http_client(),
        }
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl CompletionClient for DeepSeekClient {
    async fn complete(&self, transcript: &[Turn]) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": transcript,
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
        });

        debug!(model = %self.model, turns = transcript.len(), "completion request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose_secret()),
            )
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, model = %self.model, body = %body, "completion API error");
            return Err(Error::Api { status, body });
        }

        let payload = response.json::<serde_json::Value>().await?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or(Error::MissingContent)?;

        debug!(model = %self.model, reply_len = content.len(), "completion reply");
        Ok(content.to_string())
    }
}
