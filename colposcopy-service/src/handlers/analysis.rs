use crate::models::{AnalysisReport, AnalysisRequest};
use crate::services::analysis::{AnalysisError, API_KEY_VAR};
use crate::startup::AppState;
use axum::{extract::rejection::JsonRejection, extract::State, Json};
use service_core::error::AppError;

/// `POST /analyze_colposcopy/`
///
/// The credential check runs before the body is even parsed, so a
/// misconfigured deployment answers 500 for every request.
pub async fn analyze_colposcopy(
    State(state): State<AppState>,
    payload: Result<Json<AnalysisRequest>, JsonRejection>,
) -> Result<Json<AnalysisReport>, AppError> {
    if !state.analyzer.is_configured() {
        return Err(AnalysisError::Configuration(API_KEY_VAR).into());
    }

    let Json(request) = payload?;
    tracing::debug!(?request, "Received colposcopy analysis request");

    let report = state.analyzer.analyze(request).await?;

    Ok(Json(report))
}
