//! Scripted provider for tests and offline runs.

use super::{FinishReason, GenerationParams, ProviderError, ProviderResponse, VisionProvider};
use crate::services::image_decoder::DecodedImage;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Canned report returned when no text is scripted.
pub const SAMPLE_REPORT: &str = "Main Observations:\n\
- Squamocolumnar junction fully visible.\n\
- Transformation zone type 1 without acetowhite epithelium.\n\
\n\
Possible Diagnosis:\n\
- Normal colposcopic findings.\n\
\n\
Recommendations:\n\
- Routine screening according to national guidelines.\n\
- Repeat cytology in 3 years.";

/// What the mock does on every call.
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Answer with this text.
    Report(String),
    /// Answer successfully but without any text.
    Empty,
    /// Refuse with this block reason.
    Blocked(String),
    /// Fail with an API error carrying this detail.
    Failure(String),
    /// Sleep, then answer with [`SAMPLE_REPORT`].
    Slow(Duration),
}

/// Mock vision provider.
pub struct MockVisionProvider {
    behavior: MockBehavior,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl MockVisionProvider {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    /// Number of `generate` calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompt from the most recent `generate` call.
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or(None)
    }

    fn respond(text: Option<String>, prompt: &str) -> ProviderResponse {
        let output_tokens = text.as_ref().map(|t| t.len() as u64 / 4).unwrap_or(0);
        ProviderResponse {
            text,
            input_tokens: prompt.len() as u64 / 4,
            output_tokens,
            finish_reason: FinishReason::Complete,
        }
    }
}

#[async_trait]
impl VisionProvider for MockVisionProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-vision"
    }

    async fn generate(
        &self,
        prompt: &str,
        _image: &DecodedImage,
        _params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut guard) = self.last_prompt.lock() {
            *guard = Some(prompt.to_string());
        }

        match &self.behavior {
            MockBehavior::Report(text) => Ok(Self::respond(Some(text.clone()), prompt)),
            MockBehavior::Empty => Ok(Self::respond(None, prompt)),
            MockBehavior::Blocked(reason) => Err(ProviderError::ContentBlocked(reason.clone())),
            MockBehavior::Failure(detail) => Err(ProviderError::ApiError(detail.clone())),
            MockBehavior::Slow(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(Self::respond(Some(SAMPLE_REPORT.to_string()), prompt))
            }
        }
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}
