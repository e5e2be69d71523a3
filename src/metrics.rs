//! Prometheus metrics: `Lazy<...Vec>` statics built with
//! `register_*_vec!`, falling back to logging + process exit if
//! registration itself fails (a duplicate registration is a startup bug,
//! not a runtime condition to recover from). The scrape format/exposition
//! endpoint itself lives in `src/http`; this module only registers and
//! updates the series.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_gauge, CounterVec, HistogramVec,
    IntGauge,
};

pub static REQUESTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentra_requests_total",
        "Total number of requests admitted to the pipeline",
        &["model", "outcome"]
    )
    .unwrap_or_else(|e| {
        tracing::error!("failed to register sentra_requests_total: {}", e);
        std::process::exit(1)
    })
});

pub static RATE_LIMIT_REJECTIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentra_rate_limit_rejections_total",
        "Total number of rate-limit rejections",
        &["model", "limiting_factor"]
    )
    .unwrap_or_else(|e| {
        tracing::error!("failed to register sentra_rate_limit_rejections_total: {}", e);
        std::process::exit(1)
    })
});

pub static INJECTED_ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentra_injected_errors_total",
        "Total number of injected errors",
        &["model", "kind"]
    )
    .unwrap_or_else(|e| {
        tracing::error!("failed to register sentra_injected_errors_total: {}", e);
        std::process::exit(1)
    })
});

pub static SIMULATED_LATENCY_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "sentra_simulated_latency_seconds",
        "Simulated response latency in seconds",
        &["model", "stream"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0]
    )
    .unwrap_or_else(|e| {
        tracing::error!("failed to register sentra_simulated_latency_seconds: {}", e);
        std::process::exit(1)
    })
});

pub static PROCESSING_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "sentra_processing_duration_seconds",
        "Actual wall-clock pipeline processing time in seconds",
        &["model"],
        vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]
    )
    .unwrap_or_else(|e| {
        tracing::error!("failed to register sentra_processing_duration_seconds: {}", e);
        std::process::exit(1)
    })
});

pub static COST_USD_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentra_cost_usd_total",
        "Total simulated cost in USD",
        &["model"]
    )
    .unwrap_or_else(|e| {
        tracing::error!("failed to register sentra_cost_usd_total: {}", e);
        std::process::exit(1)
    })
});

pub static TOKENS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "sentra_tokens_total",
        "Total tokens counted",
        &["model", "direction"]
    )
    .unwrap_or_else(|e| {
        tracing::error!("failed to register sentra_tokens_total: {}", e);
        std::process::exit(1)
    })
});

pub static ACTIVE_STREAMS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("sentra_active_streams", "Currently open SSE streams").unwrap_or_else(|e| {
        tracing::error!("failed to register sentra_active_streams: {}", e);
        std::process::exit(1)
    })
});

pub fn record_outcome(model: &str, outcome: &str) {
    REQUESTS_TOTAL.with_label_values(&[model, outcome]).inc();
}

pub fn record_rate_limit_rejection(model: &str, limiting_factor: &str) {
    RATE_LIMIT_REJECTIONS.with_label_values(&[model, limiting_factor]).inc();
}

pub fn record_injected_error(model: &str, kind: &str) {
    INJECTED_ERRORS.with_label_values(&[model, kind]).inc();
}

pub fn observe_simulated_latency(model: &str, stream: bool, secs: f64) {
    let stream_label = if stream { "true" } else { "false" };
    SIMULATED_LATENCY_SECONDS.with_label_values(&[model, stream_label]).observe(secs);
}

pub fn observe_processing_duration(model: &str, secs: f64) {
    PROCESSING_DURATION_SECONDS.with_label_values(&[model]).observe(secs);
}

pub fn record_cost(model: &str, usd: f64) {
    COST_USD_TOTAL.with_label_values(&[model]).inc_by(usd);
}

pub fn record_tokens(model: &str, prompt_tokens: u32, completion_tokens: u32) {
    TOKENS_TOTAL.with_label_values(&[model, "prompt"]).inc_by(prompt_tokens as f64);
    TOKENS_TOTAL.with_label_values(&[model, "completion"]).inc_by(completion_tokens as f64);
}

pub fn stream_opened() {
    ACTIVE_STREAMS.inc();
}

pub fn stream_closed() {
    ACTIVE_STREAMS.dec();
}
