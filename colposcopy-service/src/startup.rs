//! Application startup and lifecycle management.
//!
//! Wires the configured vision provider into the analysis handler, mounts
//! the probes and the static front-end bundle, and serves them over HTTP.

use crate::config::{ColposcopyConfig, GeminiSettings};
use crate::handlers;
use crate::services::providers::gemini::{GeminiConfig, GeminiVisionProvider};
use crate::services::providers::mock::{MockBehavior, MockVisionProvider, SAMPLE_REPORT};
use crate::services::providers::{GenerationParams, VisionProvider};
use crate::services::ReportAnalyzer;
use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware, security_headers::security_headers_middleware,
    tracing::{request_id_middleware, RequestId},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ColposcopyConfig>,
    pub analyzer: ReportAnalyzer,
}

impl AppState {
    pub fn new(config: ColposcopyConfig, analyzer: ReportAnalyzer) -> Self {
        Self {
            config: Arc::new(config),
            analyzer,
        }
    }

    /// Build state with the provider selected by `config`.
    pub fn from_config(config: ColposcopyConfig) -> Result<Self, AppError> {
        let provider = build_provider(&config.gemini)?;
        let analyzer = ReportAnalyzer::new(
            provider,
            config.report.language,
            config.gemini.timeout,
        )
        .with_params(GenerationParams {
            temperature: config.gemini.temperature,
            max_tokens: config.gemini.max_output_tokens,
        });

        Ok(Self::new(config, analyzer))
    }
}

/// Pick the provider: scripted mock, Gemini, or none when no key is set.
fn build_provider(
    settings: &GeminiSettings,
) -> Result<Option<Arc<dyn VisionProvider>>, AppError> {
    if settings.mock {
        tracing::warn!("GEMINI_MOCK is set; serving canned reports");
        return Ok(Some(Arc::new(MockVisionProvider::new(MockBehavior::Report(
            SAMPLE_REPORT.to_string(),
        )))));
    }

    let Some(api_key) = settings.api_key.clone() else {
        tracing::error!(
            "GEMINI_API_KEY is not set; analysis requests will fail until it is configured"
        );
        return Ok(None);
    };

    let provider = GeminiVisionProvider::new(GeminiConfig {
        api_key,
        model: settings.model.clone(),
        api_base: settings.api_base.clone(),
        timeout: settings.timeout,
    })
    .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;

    tracing::info!(
        model = %settings.model,
        timeout_secs = settings.timeout.as_secs(),
        "Initialized Gemini vision provider"
    );

    Ok(Some(Arc::new(provider)))
}

/// Any origin, method and header, with credentials. Wildcards cannot be
/// combined with credentials, so the request's own values are mirrored.
fn permissive_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Build the HTTP router.
///
/// API routes are matched first; every other path is served from the
/// static bundle directory.
pub fn build_router(state: AppState) -> Router {
    let static_files =
        ServeDir::new(&state.config.http.static_dir).append_index_html_on_directories(true);
    let max_body_bytes = state.config.http.max_body_bytes;

    Router::new()
        .route("/analyze_colposcopy/", post(handlers::analyze_colposcopy))
        .route("/analyze_colposcopy", post(handlers::analyze_colposcopy))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .fallback_service(static_files)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .extensions()
                    .get::<RequestId>()
                    .map(|id| id.0.as_str())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(permissive_cors())
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: ColposcopyConfig) -> Result<Self, AppError> {
        let state = AppState::from_config(config)?;
        Self::build_with_state(state).await
    }

    /// Build around pre-assembled state (tests inject providers this way).
    pub async fn build_with_state(state: AppState) -> Result<Self, AppError> {
        // Port 0 = random port for testing
        let addr = SocketAddr::from(([0, 0, 0, 0], state.config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            port,
            static_dir = %state.config.http.static_dir.display(),
            language = %state.config.report.language,
            "Colposcopy service listening"
        );

        Ok(Self {
            port,
            listener,
            router: build_router(state),
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the application until SIGINT/SIGTERM.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
