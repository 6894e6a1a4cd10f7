//! headline-lab: a two-flow demo service that samples news-style headlines
//! from GPT-2 and labels headlines REAL or FAKE with a fine-tuned DistilBERT.

pub mod config_repair;
pub mod detection;
pub mod error;
pub mod generation;
pub mod models;
pub mod service;
pub mod session;
pub mod settings;
pub mod web;

use anyhow::Result;
use config_repair::{ensure_model_config, RepairMode};
use models::{CandleModelSource, ModelRegistry, SamplingParams};
use newsdesk_core::{init_metrics, init_tracing, mark_ready, start_health_server, StartupState};
use service::HeadlineService;
use session::{Notice, NoticeLevel, SessionStore};
use settings::Settings;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Builds the shared service from already-constructed parts.
pub fn build_service(settings: &Settings, registry: Arc<ModelRegistry>, greeting: Option<Notice>) -> Arc<HeadlineService> {
    let mut store = SessionStore::new(
        Duration::from_secs(settings.session.ttl_secs),
        settings.session.default_headline.clone(),
        settings.session.default_prompt.clone(),
    );
    if let Some(g) = greeting { store = store.with_greeting(g); }
    let sampling = SamplingParams::headline().with_seed(settings.generation.seed);
    Arc::new(HeadlineService::new(registry, store, sampling))
}

pub async fn run() -> Result<()> {
    let settings = Settings::load()?;
    init_tracing(&settings.service_name, &settings.log_level)?;
    init_metrics()?;
    info!(http_port = settings.http_port, health_port = settings.health_port, version = ?settings.config_version, "config loaded");
    start_health_server(settings.health_port).await?;

    let mut startup = StartupState::new();
    let mode = RepairMode::from_flag(settings.model.repair_config);
    let report = match ensure_model_config(&settings.model.classifier_config_path(), &settings.model.architecture_tag, mode) {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "model config step failed");
            return Err(e.into());
        }
    };
    startup.advance();

    let source = CandleModelSource::new(settings.model.clone())?;
    let registry = Arc::new(ModelRegistry::new(Box::new(source)));
    let preload = registry.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || preload.preload()).await? {
        error!(error = %e, "model load failed");
        return Err(e.into());
    }
    startup.advance();

    let greeting = Notice::new(NoticeLevel::Success, report.notice());
    let service = build_service(&settings, registry, Some(greeting));
    let app = web::router(web::AppState { service });

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.http_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    mark_ready();
    info!(?addr, startup_ms = startup.elapsed().as_secs_f64() * 1000.0, "service ready");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            newsdesk_core::clear_ready();
            info!("shutdown");
        })
        .await?;
    Ok(())
}
