use colposcopy_service::config::ColposcopyConfig;
use colposcopy_service::startup::Application;
use service_core::observability::{init_metrics, init_tracing};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = match ColposcopyConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(
        "colposcopy-service",
        &config.common.log_level,
        config.otlp_endpoint.as_deref(),
    );
    init_metrics();

    tracing::info!(
        model = %config.gemini.model,
        language = %config.report.language,
        mock = config.gemini.mock,
        "Starting colposcopy-service"
    );

    let application = match Application::build(config).await {
        Ok(app) => app,
        Err(e) => {
            tracing::error!("Failed to build application: {}", e);
            std::process::exit(1);
        }
    };

    application.run_until_stopped().await
}
