//! Colposcopy analysis flow.
//!
//! Checks the provider is configured, decodes the image, builds the
//! instruction, calls the provider once under a deadline, and classifies the
//! outcome. Nothing is retried and nothing outlives the call.

use crate::models::{AnalysisReport, AnalysisRequest};
use crate::services::image_decoder::{decode_image, ImageError};
use crate::services::metrics;
use crate::services::prompt::{build_prompt, ReportLanguage};
use crate::services::providers::{GenerationParams, ProviderError, VisionProvider};
use service_core::error::AppError;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Environment variable holding the provider credential.
pub const API_KEY_VAR: &str = "GEMINI_API_KEY";

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("{0} is not configured. Set it in the environment or the .env file.")]
    Configuration(&'static str),

    #[error("Invalid image data: {0}")]
    InvalidImage(#[from] ImageError),

    #[error("The content was blocked by the AI provider for safety reasons. Detail: {0}")]
    ContentBlocked(String),

    #[error(
        "An error occurred while analyzing the image. This may be a problem with the API key \
         or the connection. Detail: {0}"
    )]
    Provider(String),
}

impl AnalysisError {
    fn outcome(&self) -> &'static str {
        match self {
            AnalysisError::Configuration(_) => "not_configured",
            AnalysisError::InvalidImage(_) => "invalid_image",
            AnalysisError::ContentBlocked(_) => "blocked",
            AnalysisError::Provider(_) => "provider_error",
        }
    }
}

impl From<ProviderError> for AnalysisError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::ContentBlocked(reason) => AnalysisError::ContentBlocked(reason),
            other => AnalysisError::Provider(other.to_string()),
        }
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::Configuration(_) => AppError::ConfigError(anyhow::anyhow!("{}", err)),
            AnalysisError::InvalidImage(_) | AnalysisError::ContentBlocked(_) => {
                AppError::BadRequest(anyhow::anyhow!("{}", err))
            }
            AnalysisError::Provider(_) => AppError::InternalError(anyhow::anyhow!("{}", err)),
        }
    }
}

/// Runs analyses against an injected provider.
#[derive(Clone)]
pub struct ReportAnalyzer {
    provider: Option<Arc<dyn VisionProvider>>,
    language: ReportLanguage,
    timeout: Duration,
    params: GenerationParams,
}

impl ReportAnalyzer {
    /// `provider` is `None` when no credential was configured; every
    /// analysis then fails before touching the image.
    pub fn new(
        provider: Option<Arc<dyn VisionProvider>>,
        language: ReportLanguage,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            language,
            timeout,
            params: GenerationParams::default(),
        }
    }

    pub fn with_params(mut self, params: GenerationParams) -> Self {
        self.params = params;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    /// Probe the provider; fails with a configuration error when absent.
    pub async fn health_check(&self) -> Result<(), AnalysisError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or(AnalysisError::Configuration(API_KEY_VAR))?;
        provider.health_check().await.map_err(AnalysisError::from)
    }

    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisReport, AnalysisError> {
        let result = self.run(request).await;

        match &result {
            Ok(_) => metrics::record_analysis("success"),
            Err(e) => metrics::record_analysis(e.outcome()),
        }

        result
    }

    async fn run(&self, request: AnalysisRequest) -> Result<AnalysisReport, AnalysisError> {
        let provider = self
            .provider
            .as_ref()
            .ok_or(AnalysisError::Configuration(API_KEY_VAR))?;

        let AnalysisRequest {
            image_data,
            medical_history,
        } = request;

        // Full raster decode is CPU-bound.
        let image = tokio::task::spawn_blocking(move || decode_image(&image_data))
            .await
            .map_err(|e| AnalysisError::Provider(format!("image decoding task failed: {}", e)))??;

        tracing::info!(
            mime_type = image.mime_type,
            width = image.width,
            height = image.height,
            history_len = medical_history.len(),
            language = %self.language,
            "Decoded colposcopy image"
        );

        let prompt = build_prompt(self.language, &medical_history);

        let start = Instant::now();
        let outcome =
            tokio::time::timeout(self.timeout, provider.generate(&prompt, &image, &self.params))
                .await
                .unwrap_or_else(|_| Err(ProviderError::Timeout(self.timeout)));
        let elapsed = start.elapsed().as_secs_f64();

        metrics::record_provider_latency(provider.name(), provider.model(), elapsed);

        let response = outcome.map_err(|e| {
            tracing::warn!(
                provider = provider.name(),
                error_type = e.kind(),
                error = %e,
                "Provider call failed"
            );
            metrics::record_provider_error(provider.name(), e.kind());
            AnalysisError::from(e)
        })?;

        metrics::record_tokens(provider.model(), response.input_tokens, response.output_tokens);

        let report = response
            .text
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| {
                AnalysisError::Provider(
                    "The AI service did not return a valid report. This can happen when the \
                     image is not suitable for analysis."
                        .to_string(),
                )
            })?;

        tracing::info!(
            provider = provider.name(),
            model = provider.model(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            finish_reason = response.finish_reason.as_str(),
            elapsed_secs = elapsed,
            "Colposcopy report generated"
        );

        Ok(AnalysisReport { report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::mock::{MockBehavior, MockVisionProvider, SAMPLE_REPORT};
    use base64::Engine as _;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_base64() -> String {
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([255, 0, 0])))
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        base64::engine::general_purpose::STANDARD.encode(buffer.into_inner())
    }

    fn request(history: &str) -> AnalysisRequest {
        AnalysisRequest {
            image_data: png_base64(),
            medical_history: history.to_string(),
        }
    }

    fn analyzer(mock: &Arc<MockVisionProvider>) -> ReportAnalyzer {
        let provider: Arc<dyn VisionProvider> = mock.clone();
        ReportAnalyzer::new(
            Some(provider),
            ReportLanguage::English,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn returns_report_verbatim() {
        let text = "Main Observations:\n- x\nPossible Diagnosis:\n- y\nRecommendations:\n- z";
        let mock = Arc::new(MockVisionProvider::new(MockBehavior::Report(text.to_string())));

        let report = analyzer(&mock).analyze(request("none")).await.unwrap();

        assert_eq!(report.report, text);
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn prompt_carries_medical_history() {
        let history = "Previous LSIL, \"smoker\" {10 pack-years}";
        let mock = Arc::new(MockVisionProvider::new(MockBehavior::Report(
            SAMPLE_REPORT.to_string(),
        )));

        analyzer(&mock).analyze(request(history)).await.unwrap();

        assert!(mock.last_prompt().unwrap().contains(history));
    }

    #[tokio::test]
    async fn missing_provider_is_configuration_error() {
        let analyzer = ReportAnalyzer::new(None, ReportLanguage::English, Duration::from_secs(5));

        // Even garbage image data is not looked at.
        let err = analyzer
            .analyze(AnalysisRequest {
                image_data: "!!!".to_string(),
                medical_history: String::new(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::Configuration(API_KEY_VAR)));
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[tokio::test]
    async fn invalid_image_skips_provider() {
        let mock = Arc::new(MockVisionProvider::new(MockBehavior::Report(
            SAMPLE_REPORT.to_string(),
        )));

        let err = analyzer(&mock)
            .analyze(AnalysisRequest {
                image_data: "aGVsbG8gd29ybGQ=".to_string(),
                medical_history: String::new(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AnalysisError::InvalidImage(_)));
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn empty_text_is_provider_failure() {
        for behavior in [MockBehavior::Empty, MockBehavior::Report("  \n ".to_string())] {
            let mock = Arc::new(MockVisionProvider::new(behavior));
            let err = analyzer(&mock).analyze(request("")).await.unwrap_err();
            assert!(matches!(err, AnalysisError::Provider(ref d) if d.contains("valid report")));
        }
    }

    #[tokio::test]
    async fn blocked_content_keeps_reason() {
        let mock = Arc::new(MockVisionProvider::new(MockBehavior::Blocked(
            "prompt blocked (SAFETY)".to_string(),
        )));

        let err = analyzer(&mock).analyze(request("")).await.unwrap_err();

        assert!(matches!(err, AnalysisError::ContentBlocked(_)));
        assert!(err.to_string().contains("prompt blocked (SAFETY)"));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let mock = Arc::new(MockVisionProvider::new(MockBehavior::Slow(
            Duration::from_secs(30),
        )));
        let provider: Arc<dyn VisionProvider> = mock.clone();
        let analyzer = ReportAnalyzer::new(
            Some(provider),
            ReportLanguage::English,
            Duration::from_millis(50),
        );

        let err = analyzer.analyze(request("")).await.unwrap_err();

        assert!(matches!(err, AnalysisError::Provider(ref d) if d.contains("timed out")));
    }

    #[test]
    fn maps_to_http_status() {
        use axum::http::StatusCode;

        let cases = [
            (AnalysisError::Configuration(API_KEY_VAR), StatusCode::INTERNAL_SERVER_ERROR),
            (AnalysisError::InvalidImage(ImageError::Empty), StatusCode::BAD_REQUEST),
            (AnalysisError::ContentBlocked("x".into()), StatusCode::BAD_REQUEST),
            (AnalysisError::Provider("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }
}
