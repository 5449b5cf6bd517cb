use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};
use vitalcore_shared::errors::{CoreError, CoreResult};
use vitalcore_shared::vendor::{LlmVendor, LlmVendorRegistrar};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Talks to the OpenAI chat completions API to generate the JSON payload
/// the Insight Generator caches (`spec.md` §4.8). Reads `LLM_API_KEY` and
/// `LLM_API_BASE_URL` directly since the `inventory` factory signature takes
/// no config.
pub struct OpenAiLlmVendor {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAiLlmVendor {
    fn from_env() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("failed to build reqwest client"),
            api_key: std::env::var("LLM_API_KEY").ok(),
            base_url: std::env::var("LLM_API_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        }
    }
}

#[async_trait]
impl LlmVendor for OpenAiLlmVendor {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate_insight(&self, prompt: &str) -> CoreResult<String> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| CoreError::ExternalAiUnavailable("LLM_API_KEY is not configured".to_string()))?;

        let body = json!({
            "model": DEFAULT_MODEL,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a health insight generator. Respond with JSON only, matching \
                                 the schema: {headline, explanation, suggestions: [string], urgency}."
                },
                { "role": "user", "content": prompt },
            ],
            "response_format": { "type": "json_object" },
        });

        debug!(base_url = %self.base_url, "requesting insight generation");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::ExternalAiUnavailable(format!("openai request failed: {e}")))?;

        let status = response.status();
        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CoreError::ExternalAiUnavailable(format!("openai returned an unparseable response: {e}")))?;

        if !status.is_success() {
            warn!(status = %status, body = %payload, "openai request rejected");
            return Err(CoreError::ExternalAiUnavailable(format!("openai responded with {status}")));
        }

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CoreError::ExternalAiUnavailable("openai response missing message content".to_string()))
    }
}

inventory::submit! {
    LlmVendorRegistrar {
        name: "openai",
        factory: || std::sync::Arc::new(OpenAiLlmVendor::from_env()),
    }
}
