//! Google Gemini `generateContent` adapter.

use crate::ai::provider::{AiProvider, ProviderRuntime, UpstreamOutcome};
use crate::ai::providers::{build_http_client, parse_structured_fields};
use crate::ai::types::{AnalysisKind, AnalyzeOptions, ProviderStats};
use crate::config::ProviderConfig;
use crate::error::AiError;
use crate::models::AiResponse;
use async_trait::async_trait;
use serde::Deserialize;

const COST_PER_1K_INPUT: f64 = 0.000075;
const COST_PER_1K_OUTPUT: f64 = 0.0003;

pub struct GeminiProvider {
    client: reqwest::Client,
    runtime: ProviderRuntime,
}

impl GeminiProvider {
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
        struct Part {
            text: String,
        }
        #[derive(Deserialize)]
        struct Content {
            parts: Vec<Part>,
        }
        #[derive(Deserialize)]
        struct Candidate {
            content: Content,
        }
        #[derive(Deserialize, Default)]
        struct UsageMetadata {
            #[serde(rename = "promptTokenCount", default)]
            prompt_token_count: u32,
            #[serde(rename = "candidatesTokenCount", default)]
            candidates_token_count: u32,
        }
        #[derive(Deserialize)]
        struct GenerateResponse {
            candidates: Vec<Candidate>,
            #[serde(rename = "usageMetadata", default)]
            usage_metadata: UsageMetadata,
        }

        let body = serde_json::json!({
            "contents": [{"parts": [{"text": prompt}]}],
        });

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent?key={api_key}"
        );
        let resp = client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AiError::Transport(e, "gemini".to_string()))?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED
            || resp.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Err(AiError::Permanent {
                provider: "gemini".to_string(),
                message: "auth failure".to_string(),
            });
        }
        if !resp.status().is_success() {
            let status = resp.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                return Err(AiError::Transient {
                    provider: "gemini".to_string(),
                    message: format!("upstream error: {status}"),
                });
            }
            return Err(AiError::Permanent {
                provider: "gemini".to_string(),
                message: format!("upstream error: {status}"),
            });
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| AiError::Transport(e, "gemini".to_string()))?;
        let content = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .unwrap_or_default();
        let (signal, confidence, sentiment_score, risk_level) = parse_structured_fields(&content);

        Ok(UpstreamOutcome {
            content,
            confidence,
            signal,
            sentiment_score,
            risk_level,
            input_tokens: parsed.usage_metadata.prompt_token_count,
            output_tokens: parsed.usage_metadata.candidates_token_count,
        })
    }
}

#[async_trait]
impl AiProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
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
