//! Core shared utilities for newsdesk services.

use anyhow::Result;
use tracing::info;
use once_cell::sync::OnceCell;
use axum::{routing::get, Router};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub mod config_loader;
pub mod lifecycle;
pub mod metrics;

pub use config_loader::{load_config, load_config_with, config_version, ConfigSources};
pub use lifecycle::{StartupPhase, StartupState, current_phase};
pub use metrics::{init_metrics, render_metrics, flow_metrics, record_flow, record_model_load, record_config_repair, FlowMetrics};

static TRACING_INIT: OnceCell<()> = OnceCell::new();
static NODE_READINESS: AtomicBool = AtomicBool::new(false);

pub fn mark_ready() { NODE_READINESS.store(true, Ordering::SeqCst); }
pub fn clear_ready() { NODE_READINESS.store(false, Ordering::SeqCst); }

/// Installs the global subscriber once. `RUST_LOG` wins over `default_level`;
/// `NEWSDESK_JSON_LOG=1` switches to flattened JSON lines.
pub fn init_tracing(service: &str, default_level: &str) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let json = std::env::var("NEWSDESK_JSON_LOG").ok().map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        let registry = tracing_subscriber::registry().with(env_filter);
        if json {
            registry
                .with(tracing_subscriber::fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(false))
                .try_init()?;
        } else {
            registry
                .with(tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_line_number(true))
                .try_init()?;
        }
        Ok(())
    })?;
    info!(target: "newsdesk", service, "tracing initialized");
    Ok(())
}

/// Liveness, readiness, status and Prometheus scrape endpoints.
pub fn health_router() -> Router {
    Router::new()
        .route("/live", get(|| async { axum::Json(serde_json::json!({"live": true})) }))
        .route("/ready", get(ready_handler))
        .route("/status", get(|| async {
            axum::Json(serde_json::json!({
                "live": true,
                "ready": NODE_READINESS.load(Ordering::SeqCst),
                "phase": current_phase().as_str(),
                "config_version": config_version(),
            }))
        }))
        .route("/metrics", get(metrics_handler))
}

pub async fn start_health_server(port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(?addr, "health server listening");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, health_router()).await {
            tracing::error!(error=?e, "health server failed");
        }
    });
    Ok(())
}

async fn ready_handler() -> Response {
    let ready = NODE_READINESS.load(Ordering::SeqCst);
    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, axum::Json(serde_json::json!({"ready": ready}))).into_response()
}

async fn metrics_handler() -> Response {
    if flow_metrics().is_none() {
        return (StatusCode::SERVICE_UNAVAILABLE, "metrics not initialized").into_response();
    }
    match render_metrics() {
        Ok(body) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("encode error: {e}")).into_response(),
    }
}
