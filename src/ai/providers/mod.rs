pub mod anthropic;
pub mod gemini;
pub mod grok;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use grok::GrokProvider;
pub use openai::OpenAiProvider;

use reqwest::Client;
use std::time::Duration;

/// Builds a pooled, timed-out HTTP client the way every upstream adapter in
/// this crate does (one client per provider, reused across calls).
pub fn build_http_client(timeout_s: u64) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_s))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
}

/// Extracts the first balanced `{...}` substring from a model completion,
/// stripping Markdown code fences first. Used when a prompt requested
/// structured JSON and the model wraps it in prose or fences anyway.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let text = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let start = text.find('{')?;
    let mut depth = 0i32;
    for (i, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Default, serde::Deserialize)]
struct StructuredFields {
    signal: Option<String>,
    confidence: Option<f64>,
    sentiment_score: Option<f64>,
    risk_level: Option<String>,
}

/// Parses the recognized structured-JSON keys out of a model completion.
/// Unrecognized or unparseable JSON falls back to confidence 0.3 with the
/// structured fields left null, per the adapter contract.
pub fn parse_structured_fields(content: &str) -> (Option<crate::models::AiSignal>, f64, Option<f64>, Option<crate::models::RiskLevel>) {
    use crate::models::{AiSignal, RiskLevel};

    let Some(json_str) = extract_json_object(content) else {
        return (None, 0.3, None, None);
    };
    let Ok(fields) = serde_json::from_str::<StructuredFields>(json_str) else {
        return (None, 0.3, None, None);
    };

    let signal = fields.signal.and_then(|s| match s.to_uppercase().as_str() {
        "BUY" => Some(AiSignal::Buy),
        "SELL" => Some(AiSignal::Sell),
        "HOLD" => Some(AiSignal::Hold),
        _ => None,
    });
    let risk_level = fields.risk_level.and_then(|r| match r.to_uppercase().as_str() {
        "LOW" => Some(RiskLevel::Low),
        "MEDIUM" => Some(RiskLevel::Medium),
        "HIGH" => Some(RiskLevel::High),
        "EXTREME" => Some(RiskLevel::Extreme),
        _ => None,
    });
    let confidence = fields.confidence.unwrap_or(0.3);
    (signal, confidence, fields.sentiment_score, risk_level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_json() {
        let text = "here you go:\n```json\n{\"signal\": \"BUY\", \"confidence\": 0.8}\n```";
        let extracted = extract_json_object(text).expect("json present");
        assert_eq!(extracted, "{\"signal\": \"BUY\", \"confidence\": 0.8}");
    }

    #[test]
    fn extracts_bare_json_with_trailing_prose() {
        let text = "{\"signal\": \"HOLD\"} -- end of analysis";
        assert_eq!(extract_json_object(text), Some("{\"signal\": \"HOLD\"}"));
    }
}
