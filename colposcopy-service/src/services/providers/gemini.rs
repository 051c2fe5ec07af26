//! Gemini vision provider implementation.
//!
//! Sends one `generateContent` call per analysis: the instruction text
//! followed by the image as inline data.

use super::{FinishReason, GenerationParams, ProviderError, ProviderResponse, VisionProvider};
use crate::services::image_decoder::DecodedImage;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Header carrying the API key; keeps the key out of URLs and access logs.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Upper bound for the readiness probe, independent of the analysis timeout.
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Finish reasons that mean the candidate was withheld for policy reasons.
const BLOCKING_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "PROHIBITED_CONTENT",
    "BLOCKLIST",
    "SPII",
    "RECITATION",
    "IMAGE_SAFETY",
];

/// Gemini provider configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Secret<String>,
    pub model: String,
    pub api_base: String,
    pub timeout: Duration,
}

/// Gemini vision provider.
pub struct GeminiVisionProvider {
    config: GeminiConfig,
    client: Client,
}

impl GeminiVisionProvider {
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        if config.api_key.expose_secret().is_empty() {
            return Err(ProviderError::NotConfigured(
                "Gemini API key is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// Build the API URL for the configured model and method.
    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/models/{}:{}",
            self.config.api_base, self.config.model, method
        )
    }

    fn build_generation_config(params: &GenerationParams) -> Option<GenerationConfig> {
        if params.temperature.is_none() && params.max_tokens.is_none() {
            return None;
        }
        Some(GenerationConfig {
            temperature: params.temperature,
            max_output_tokens: params.max_tokens,
        })
    }

    fn health_check_timeout(&self) -> Duration {
        HEALTH_CHECK_TIMEOUT.min(self.config.timeout)
    }

    fn map_send_error(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout(self.config.timeout)
        } else {
            ProviderError::NetworkError(e.to_string())
        }
    }
}

#[async_trait]
impl VisionProvider for GeminiVisionProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate(
        &self,
        prompt: &str,
        image: &DecodedImage,
        params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![
                    Part::text(prompt),
                    Part::inline(image.mime_type, image.to_base64()),
                ],
            }],
            generation_config: Self::build_generation_config(params),
        };

        tracing::debug!(
            model = %self.config.model,
            prompt_len = prompt.len(),
            mime_type = image.mime_type,
            image_bytes = image.bytes.len(),
            "Sending request to Gemini API"
        );

        let response = self
            .client
            .post(self.api_url("generateContent"))
            .header(API_KEY_HEADER, self.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = api_error_message(&body);

            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(ProviderError::RateLimited(message));
            }

            return Err(ProviderError::ApiError(format!(
                "Gemini API error {}: {}",
                status, message
            )));
        }

        let api_response: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("Failed to parse response: {}", e)))?;

        interpret_response(api_response)
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        let url = format!("{}/models/{}", self.config.api_base, self.config.model);

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, self.config.api_key.expose_secret())
            .timeout(self.health_check_timeout())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(self.health_check_timeout())
                } else {
                    ProviderError::NetworkError(e.to_string())
                }
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProviderError::ApiError(format!(
                "Health check failed: {}",
                response.status()
            )))
        }
    }
}

/// Translate a successful HTTP response into text, a block, or nothing.
fn interpret_response(
    response: GenerateContentResponse,
) -> Result<ProviderResponse, ProviderError> {
    if let Some(feedback) = &response.prompt_feedback {
        if let Some(reason) = &feedback.block_reason {
            let detail = match &feedback.block_reason_message {
                Some(message) => format!("prompt blocked ({}): {}", reason, message),
                None => format!(
                    "prompt blocked ({}){}",
                    reason,
                    flagged_categories(&feedback.safety_ratings)
                ),
            };
            return Err(ProviderError::ContentBlocked(detail));
        }
    }

    let candidate = response.candidates.first();

    if let Some(reason) = candidate.and_then(|c| c.finish_reason.as_deref()) {
        if BLOCKING_FINISH_REASONS.contains(&reason) {
            let ratings = candidate.map(|c| c.safety_ratings.as_slice()).unwrap_or(&[]);
            return Err(ProviderError::ContentBlocked(format!(
                "response withheld ({}){}",
                reason,
                flagged_categories(ratings)
            )));
        }
    }

    let text = candidate
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<String>()
        })
        .filter(|text| !text.is_empty());

    let finish_reason = match candidate.and_then(|c| c.finish_reason.as_deref()) {
        Some("STOP") | None => FinishReason::Complete,
        Some("MAX_TOKENS") => FinishReason::Length,
        Some(_) => FinishReason::Other,
    };

    let usage = response.usage_metadata.unwrap_or_default();

    Ok(ProviderResponse {
        text,
        input_tokens: usage.prompt_token_count.unwrap_or(0),
        output_tokens: usage.candidates_token_count.unwrap_or(0),
        finish_reason,
    })
}

/// `" [HARM_CATEGORY_X: HIGH, ...]"`, or empty when nothing was flagged.
fn flagged_categories(ratings: &[SafetyRating]) -> String {
    let flagged: Vec<String> = ratings
        .iter()
        .filter(|r| r.blocked || matches!(r.probability.as_deref(), Some("HIGH") | Some("MEDIUM")))
        .map(|r| {
            format!(
                "{}: {}",
                r.category,
                r.probability.as_deref().unwrap_or("UNKNOWN")
            )
        })
        .collect();

    if flagged.is_empty() {
        String::new()
    } else {
        format!(" [{}]", flagged.join(", "))
    }
}

/// Prefer `error.message` from a Google error envelope, else the raw body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    inline_data: Option<InlineData>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Default::default()
        }
    }

    fn inline(mime_type: &str, data: String) -> Self {
        Self {
            inline_data: Some(InlineData {
                mime_type: mime_type.to_string(),
                data,
            }),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    safety_ratings: Vec<SafetyRating>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    block_reason_message: Option<String>,
    #[serde(default)]
    safety_ratings: Vec<SafetyRating>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SafetyRating {
    category: String,
    #[serde(default)]
    probability: Option<String>,
    #[serde(default)]
    blocked: bool,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u64>,
    candidates_token_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> GenerateContentResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn joins_text_parts_of_first_candidate() {
        let response = parse(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Main Observations:\n"}, {"text": "- x"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 300, "candidatesTokenCount": 42}
        }));

        let result = interpret_response(response).unwrap();
        assert_eq!(result.text.as_deref(), Some("Main Observations:\n- x"));
        assert_eq!(result.input_tokens, 300);
        assert_eq!(result.output_tokens, 42);
        assert_eq!(result.finish_reason, FinishReason::Complete);
    }

    #[test]
    fn prompt_block_reason_is_content_blocked() {
        let response = parse(json!({
            "promptFeedback": {
                "blockReason": "SAFETY",
                "safetyRatings": [
                    {"category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "probability": "HIGH"},
                    {"category": "HARM_CATEGORY_HATE_SPEECH", "probability": "NEGLIGIBLE"}
                ]
            }
        }));

        match interpret_response(response) {
            Err(ProviderError::ContentBlocked(detail)) => {
                assert!(detail.contains("SAFETY"));
                assert!(detail.contains("HARM_CATEGORY_SEXUALLY_EXPLICIT: HIGH"));
                assert!(!detail.contains("HATE_SPEECH"));
            }
            other => panic!("expected ContentBlocked, got {:?}", other),
        }
    }

    #[test]
    fn safety_finish_reason_is_content_blocked() {
        let response = parse(json!({
            "candidates": [{"finishReason": "SAFETY", "safetyRatings": [
                {"category": "HARM_CATEGORY_DANGEROUS_CONTENT", "probability": "LOW", "blocked": true}
            ]}]
        }));

        assert!(matches!(
            interpret_response(response),
            Err(ProviderError::ContentBlocked(detail)) if detail.contains("DANGEROUS_CONTENT")
        ));
    }

    #[test]
    fn missing_candidates_yield_no_text() {
        let result = interpret_response(parse(json!({}))).unwrap();
        assert!(result.text.is_none());
    }

    #[test]
    fn max_tokens_is_length() {
        let result = interpret_response(parse(json!({
            "candidates": [{"content": {"parts": [{"text": "partial"}]}, "finishReason": "MAX_TOKENS"}]
        })))
        .unwrap();
        assert_eq!(result.finish_reason, FinishReason::Length);
    }

    #[test]
    fn request_serializes_inline_image_after_prompt() {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part::text("describe"), Part::inline("image/png", "AAAA".to_string())],
            }],
            generation_config: None,
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["contents"][0]["parts"][0], json!({"text": "describe"}));
        assert_eq!(
            value["contents"][0]["parts"][1],
            json!({"inlineData": {"mimeType": "image/png", "data": "AAAA"}})
        );
        assert!(value.get("generationConfig").is_none());
    }

    fn provider(timeout: Duration) -> GeminiVisionProvider {
        GeminiVisionProvider::new(GeminiConfig {
            api_key: Secret::new("key".to_string()),
            model: "gemini-test".to_string(),
            api_base: "http://127.0.0.1:9".to_string(),
            timeout,
        })
        .unwrap()
    }

    #[test]
    fn health_check_timeout_is_short() {
        assert_eq!(
            provider(Duration::from_secs(120)).health_check_timeout(),
            HEALTH_CHECK_TIMEOUT
        );
        assert_eq!(
            provider(Duration::from_secs(2)).health_check_timeout(),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn generation_config_serializes_camel_case() {
        let config = GeminiVisionProvider::build_generation_config(&GenerationParams {
            temperature: Some(0.25),
            max_tokens: Some(512),
        });
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value, json!({"temperature": 0.25, "maxOutputTokens": 512}));
        assert!(
            GeminiVisionProvider::build_generation_config(&GenerationParams::default()).is_none()
        );
    }

    #[test]
    fn api_error_message_prefers_envelope() {
        let body = r#"{"error": {"code": 400, "message": "API key not valid.", "status": "INVALID_ARGUMENT"}}"#;
        assert_eq!(api_error_message(body), "API key not valid.");
        assert_eq!(api_error_message("upstream exploded\n"), "upstream exploded");
    }
}
