//! xAI Grok adapter (OpenAI-compatible chat-completions wire format).

use crate::ai::provider::{AiProvider, ProviderRuntime, UpstreamOutcome};
use crate::ai::providers::{build_http_client, parse_structured_fields};
use crate::ai::types::{AnalysisKind, AnalyzeOptions, ProviderStats};
use crate::config::ProviderConfig;
use crate::error::AiError;
use crate::models::AiResponse;
use async_trait::async_trait;
use serde::Deserialize;

const COST_PER_1K_INPUT: f64 = 0.0002;
const COST_PER_1K_OUTPUT: f64 = 0.0008;

pub struct GrokProvider {
    client: reqwest::Client,
    runtime: ProviderRuntime,
}

impl GrokProvider {
    pub fn new(config: ProviderConfig) -> anyhow::Result<Self> {
        let client = build_http_client(config.timeout_s)?;
        Ok(Self {
            client,
            runtime: ProviderRuntime::new(config, COST_PER_1K_INPUT, COST_PER_1K_OUTPUT),
        })
    }

    async fn call_upstream(
        client: &reqwest::Client,
        api_key: &str,
        model: &str,
        prompt: &str,
    ) -> Result<UpstreamOutcome, AiError> {
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct Message {
            content: String,
        }
        #[derive(Deserialize, Default)]
        struct Usage {
            #[serde(default)]
            prompt_tokens: u32,
            #[serde(default)]
            completion_tokens: u32,
        }
        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
            #[serde(default)]
            usage: Usage,
        }

        let body = serde_json::json!({
            "model": model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": 0.2,
        });

        let resp = client
            .post("https://api.x.ai/v1/chat/completions")
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AiError::Transport(e, "grok".to_string()))?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AiError::Permanent {
                provider: "grok".to_string(),
                message: "auth failure".to_string(),
            });
        }
        if !resp.status().is_success() {
            let status = resp.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                return Err(AiError::Transient {
                    provider: "grok".to_string(),
                    message: format!("upstream error: {status}"),
                });
            }
            return Err(AiError::Permanent {
                provider: "grok".to_string(),
                message: format!("upstream error: {status}"),
            });
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| AiError::Transport(e, "grok".to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        let (signal, confidence, sentiment_score, risk_level) = parse_structured_fields(&content);

        Ok(UpstreamOutcome {
            content,
            confidence,
            signal,
            sentiment_score,
            risk_level,
            input_tokens: parsed.usage.prompt_tokens,
            output_tokens: parsed.usage.completion_tokens,
        })
    }
}

#[async_trait]
impl AiProvider for GrokProvider {
    fn name(&self) -> &str {
        "grok"
    }

    async fn analyze(
        &self,
        prompt: &str,
        kind: AnalysisKind,
        options: &AnalyzeOptions,
    ) -> AiResponse {
        let client = self.client.clone();
        let api_key = self.runtime.config.api_key.clone();
        let model = self.runtime.config.model.clone();
        self.runtime
            .execute(prompt, kind, options, move |prompt, _kind| {
                let client = client.clone();
                let api_key = api_key.clone();
                let model = model.clone();
                Box::pin(async move {
                    Self::call_upstream(&client, &api_key, &model, prompt).await
                })
            })
            .await
    }

    fn get_stats(&self) -> ProviderStats {
        self.runtime.get_stats()
    }

    fn reset_stats(&self) {
        self.runtime.reset_stats()
    }
}
