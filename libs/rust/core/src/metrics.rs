//! Prometheus metric groups for the inference flows, model loading and startup
//! config repair. Recording helpers are no-ops until `init_metrics` has run.

use anyhow::Result;
use once_cell::sync::OnceCell;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, TextEncoder};

static FLOW_METRICS: OnceCell<FlowMetrics> = OnceCell::new();

const LATENCY_BUCKETS_MS: &[f64] = &[5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0];

#[derive(Clone, Debug)]
pub struct FlowMetrics {
    pub requests_total: IntCounterVec,
    pub latency_ms: HistogramVec,
    pub model_loads_total: IntCounterVec,
    pub model_load_ms: HistogramVec,
    pub config_repairs_total: IntCounterVec,
}

impl FlowMetrics {
    fn build() -> Result<Self> {
        let requests_total = IntCounterVec::new(
            Opts::new("newsdesk_flow_requests_total", "Flow invocations by flow and outcome"),
            &["flow", "outcome"],
        )?;
        let latency_ms = HistogramVec::new(
            HistogramOpts::new("newsdesk_flow_latency_ms", "Wall time of a completed flow invocation (ms)")
                .buckets(LATENCY_BUCKETS_MS.to_vec()),
            &["flow"],
        )?;
        let model_loads_total = IntCounterVec::new(
            Opts::new("newsdesk_model_loads_total", "Model load attempts by model and outcome"),
            &["model", "outcome"],
        )?;
        let model_load_ms = HistogramVec::new(
            HistogramOpts::new("newsdesk_model_load_ms", "Model load time (ms)")
                .buckets(LATENCY_BUCKETS_MS.to_vec()),
            &["model"],
        )?;
        let config_repairs_total = IntCounterVec::new(
            Opts::new("newsdesk_config_repairs_total", "Startup model config checks by mode and outcome"),
            &["mode", "outcome"],
        )?;
        let registry = prometheus::default_registry();
        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(latency_ms.clone()))?;
        registry.register(Box::new(model_loads_total.clone()))?;
        registry.register(Box::new(model_load_ms.clone()))?;
        registry.register(Box::new(config_repairs_total.clone()))?;
        Ok(Self { requests_total, latency_ms, model_loads_total, model_load_ms, config_repairs_total })
    }
}

pub fn init_metrics() -> Result<()> {
    FLOW_METRICS.get_or_try_init(FlowMetrics::build)?;
    Ok(())
}

pub fn flow_metrics() -> Option<&'static FlowMetrics> { FLOW_METRICS.get() }

pub fn record_flow(flow: &str, outcome: &str, latency_ms: f64) {
    if let Some(m) = flow_metrics() {
        m.requests_total.with_label_values(&[flow, outcome]).inc();
        if outcome == "ok" { m.latency_ms.with_label_values(&[flow]).observe(latency_ms); }
    }
}

pub fn record_model_load(model: &str, ok: bool, latency_ms: f64) {
    if let Some(m) = flow_metrics() {
        m.model_loads_total.with_label_values(&[model, if ok { "ok" } else { "error" }]).inc();
        if ok { m.model_load_ms.with_label_values(&[model]).observe(latency_ms); }
    }
}

pub fn record_config_repair(mode: &str, ok: bool) {
    if let Some(m) = flow_metrics() {
        m.config_repairs_total.with_label_values(&[mode, if ok { "ok" } else { "error" }]).inc();
    }
}

/// Text exposition of the default registry.
pub fn render_metrics() -> Result<String> {
    let families = prometheus::default_registry().gather();
    let mut buf = Vec::new();
    TextEncoder::new().encode(&families, &mut buf)?;
    Ok(String::from_utf8(buf)?)
}
