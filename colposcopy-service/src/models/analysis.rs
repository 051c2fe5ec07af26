use serde::{Deserialize, Serialize};
use std::fmt;

/// Body of `POST /analyze_colposcopy/`.
#[derive(Clone, Deserialize)]
pub struct AnalysisRequest {
    /// Base64 image, optionally as a `data:` URL.
    pub image_data: String,
    /// Free text from the clinician; may be empty.
    #[serde(default)]
    pub medical_history: String,
}

// Patient data stays out of logs; only sizes are shown.
impl fmt::Debug for AnalysisRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisRequest")
            .field("image_data_len", &self.image_data.len())
            .field("medical_history_len", &self.medical_history.len())
            .finish()
    }
}

/// Successful analysis, returned verbatim from the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalysisReport {
    pub report: String,
}
