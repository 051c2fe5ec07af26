pub mod analysis;
pub mod image_decoder;
pub mod metrics;
pub mod prompt;
pub mod providers;

pub use analysis::{AnalysisError, ReportAnalyzer};
