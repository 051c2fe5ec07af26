//! HTTP handlers for the colposcopy service.

pub mod analysis;
pub mod health;

pub use analysis::analyze_colposcopy;
pub use health::{health_check, metrics_endpoint, readiness_check};
