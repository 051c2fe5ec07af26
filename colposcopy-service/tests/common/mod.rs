//! Test helpers for colposcopy-service integration tests.
//!
//! Every app runs on a random port against a scripted provider or a
//! wiremock-backed Gemini endpoint, so no credential or network is needed.

#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use colposcopy_service::config::{
    ColposcopyConfig, GeminiSettings, HttpSettings, ReportSettings, DEFAULT_GEMINI_MODEL,
};
use colposcopy_service::services::prompt::ReportLanguage;
use colposcopy_service::services::providers::mock::{MockBehavior, MockVisionProvider};
use colposcopy_service::services::providers::VisionProvider;
use colposcopy_service::services::ReportAnalyzer;
use colposcopy_service::startup::{AppState, Application};
use image::{ImageBuffer, ImageFormat, Rgb};
use secrecy::Secret;
use service_core::config::Config as CoreConfig;
use service_core::observability::init_metrics;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const INDEX_HTML: &str = "<!doctype html><title>Colposcopy</title><h1>Colposcopy analysis</h1>";

/// Base64 of a small, valid PNG.
pub fn png_base64() -> String {
    let image = ImageBuffer::from_pixel(4, 4, Rgb([200u8, 120, 130]));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .expect("Failed to encode PNG fixture");
    STANDARD.encode(bytes.into_inner())
}

/// Fresh static bundle directory holding [`INDEX_HTML`].
pub fn static_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("colposcopy-static-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("Failed to create static dir");
    std::fs::write(dir.join("index.html"), INDEX_HTML).expect("Failed to write index.html");
    dir
}

/// Configuration bound to a random port with no credential.
pub fn test_config() -> ColposcopyConfig {
    ColposcopyConfig {
        common: CoreConfig {
            port: 0,
            log_level: "warn".to_string(),
        },
        gemini: GeminiSettings {
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.to_string(),
            api_base: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_secs(5),
            temperature: None,
            max_output_tokens: None,
            mock: false,
        },
        report: ReportSettings {
            language: ReportLanguage::English,
        },
        http: HttpSettings {
            static_dir: static_dir(),
            max_body_bytes: 20 * 1024 * 1024,
        },
        otlp_endpoint: None,
    }
}

/// Configuration pointing the Gemini client at `api_base`.
pub fn gemini_config(api_base: &str) -> ColposcopyConfig {
    let mut config = test_config();
    config.gemini.api_key = Some(Secret::new("test-api-key".to_string()));
    config.gemini.api_base = api_base.to_string();
    config
}

/// Test application wrapper for integration tests.
pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub mock: Option<Arc<MockVisionProvider>>,
}

impl TestApp {
    /// Spawn with a scripted provider.
    pub async fn spawn(behavior: MockBehavior) -> Self {
        let mock = Arc::new(MockVisionProvider::new(behavior));
        let provider: Arc<dyn VisionProvider> = mock.clone();
        let mut app = Self::spawn_with_provider(test_config(), Some(provider)).await;
        app.mock = Some(mock);
        app
    }

    /// Spawn without any provider, as when the credential is missing.
    pub async fn spawn_unconfigured() -> Self {
        Self::spawn_with_provider(test_config(), None).await
    }

    pub async fn spawn_with_provider(
        config: ColposcopyConfig,
        provider: Option<Arc<dyn VisionProvider>>,
    ) -> Self {
        let analyzer =
            ReportAnalyzer::new(provider, config.report.language, config.gemini.timeout);
        let state = AppState::new(config, analyzer);
        Self::start(
            Application::build_with_state(state)
                .await
                .expect("Failed to build application"),
        )
        .await
    }

    /// Spawn through the same path `main` uses.
    pub async fn spawn_with_config(config: ColposcopyConfig) -> Self {
        Self::start(
            Application::build(config)
                .await
                .expect("Failed to build application"),
        )
        .await
    }

    async fn start(app: Application) -> Self {
        init_metrics();

        let port = app.port();
        tokio::spawn(async move {
            let _ = app.run_until_stopped().await;
        });

        // Wait for server to start
        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            address: format!("http://127.0.0.1:{}", port),
            port,
            mock: None,
        }
    }

    pub fn analyze_url(&self) -> String {
        format!("{}/analyze_colposcopy/", self.address)
    }
}
