//! Sentra entry point: loads configuration, initializes telemetry, wires
//! the simulator core together, and serves the HTTP surface plus a
//! separate metrics listener (`#[tokio::main]` -> init logging -> load
//! config -> build state -> serve, across this crate's two-port
//! topology).

use anyhow::{Context, Result};
use sentra_core::config::AppConfig;
use sentra_core::error_injector::{ErrorInjectionConfig, ErrorInjector};
use sentra_core::fixtures::matcher::Matcher;
use sentra_core::fixtures::FixtureStore;
use sentra_core::generator::{ResponseCacheConfig, ResponseGenerator};
use sentra_core::http::{build_metrics_router, build_router, AppState};
use sentra_core::kv::InMemoryKv;
use sentra_core::latency::{LatencyConfig, LatencySimulator};
use sentra_core::models::ModelRegistry;
use sentra_core::pipeline::Pipeline;
use sentra_core::pricing::apply_pricing_override;
use sentra_core::rate_limiter::RateLimiter;
use sentra_core::telemetry;
use sentra_core::tiers::{TierBinding, TierRegistry};
use sentra_core::token_counter::{CachedTokenCounter, TokenCounter};
use sentra_core::usage::UsageTracker;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load().context("failed to load configuration")?;
    telemetry::init_logging(&config.observability.log_level, config.behavior.mode)
        .context("failed to initialize logging")?;

    for warning in config.lint() {
        tracing::warn!(warning, "configuration lint warning");
    }

    info!(mode = ?config.behavior.mode, bind = %config.server.bind, "starting sentra-sim");

    let mut models = ModelRegistry::with_defaults().with_extra(config.models.extra.clone());
    for record in &config.pricing.overrides {
        if let Some(model) = models_get_mut(&mut models, &record.model) {
            apply_pricing_override(model, record);
        } else {
            tracing::warn!(model = %record.model, "pricing override for unknown model ignored");
        }
    }
    let models = Arc::new(models);

    let kv = InMemoryKv::new();
    kv.clone().start_cleanup_task();

    let token_counter = Arc::new(CachedTokenCounter::new(
        TokenCounter::new(models.clone()),
        kv.clone(),
        Duration::from_secs(config.caching.token_cache_ttl_secs),
    ));

    let tiers = Arc::new(TierRegistry::with_defaults(
        config.rate_limiting.default_tier.clone(),
        config.rate_limiting.fallback_rpm,
        config.rate_limiting.fallback_tpm,
    ));
    let rate_limiter = Arc::new(RateLimiter::new(tiers.clone(), Some(kv.clone())));
    let tier_binding = Arc::new(TierBinding::new(
        config.rate_limiting.default_tier.clone(),
        &config.rate_limiting.tier_bindings,
    ));

    let latency = Arc::new(LatencySimulator::new(LatencyConfig {
        jitter_distribution: config.latency.jitter_distribution,
        peak_hours_utc: config.latency.peak_hours_utc,
        load_multiplier: config.latency.load_multiplier,
    }));

    let error_injector = Arc::new(ErrorInjector::new(ErrorInjectionConfig {
        enabled: config.error_injection.enabled,
        base_error_rate: config.error_injection.base_error_rate,
        burst_error_rate: config.error_injection.burst_error_rate,
        quota_error_rate: config.error_injection.quota_error_rate,
        load_threshold_rps: config.error_injection.load_threshold_rps,
        quota_threshold: config.error_injection.quota_threshold,
    }));

    let fixtures_dir = std::path::Path::new(&config.fixtures.dir);
    let fixture_store = Arc::new(
        FixtureStore::load_dir(fixtures_dir)
            .with_context(|| format!("failed to load fixtures from {}", fixtures_dir.display()))?,
    );
    let mut matcher = Matcher::new(config.fixtures.default_path.clone());
    for rule in &config.fixtures.rules {
        if let Err(e) = matcher.add_rule(&rule.name, &rule.pattern, &rule.target_path, rule.priority) {
            tracing::warn!(rule = %rule.name, error = %e, "skipping invalid fixture match rule");
        }
    }
    if !fixture_store.path_exists(&config.fixtures.default_path) {
        tracing::warn!(
            path = %config.fixtures.default_path,
            "configured default fixture path does not exist; matcher will fall through to the hard-coded fallback"
        );
    }
    let mut generator = ResponseGenerator::new(fixture_store, matcher, token_counter.clone());
    if config.response_cache_enabled() {
        generator = generator.with_response_cache(
            kv.clone(),
            ResponseCacheConfig {
                enabled: true,
                ttl: Duration::from_secs(config.caching.response_cache_ttl_secs),
                latency_reduction: config.latency.cache_latency_reduction,
            },
        );
    }
    let generator = Arc::new(generator);

    let usage = UsageTracker::new(Some(kv.clone()));
    usage.clone().start_pruning_task();

    let config = Arc::new(config);

    let pipeline = Arc::new(Pipeline {
        config: config.clone(),
        models: models.clone(),
        token_counter: token_counter.clone(),
        rate_limiter: rate_limiter.clone(),
        tiers: tiers.clone(),
        tier_binding,
        latency,
        error_injector,
        generator,
        usage,
    });

    let state = Arc::new(AppState {
        config: config.clone(),
        models,
        token_counter,
        rate_limiter,
        tiers,
        pipeline,
    });

    let app_listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    let metrics_listener = TcpListener::bind(&config.server.metrics_bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.metrics_bind))?;

    info!(bind = %config.server.bind, metrics_bind = %config.server.metrics_bind, "listening");

    let app = build_router(state);
    let metrics_app = build_metrics_router();

    let app_server = axum::serve(app_listener, app).with_graceful_shutdown(shutdown_signal());
    let metrics_server = axum::serve(metrics_listener, metrics_app).with_graceful_shutdown(shutdown_signal());

    tokio::try_join!(
        async { app_server.await.context("main server failed") },
        async { metrics_server.await.context("metrics server failed") },
    )?;

    Ok(())
}

fn models_get_mut<'a>(
    registry: &'a mut ModelRegistry,
    id: &str,
) -> Option<&'a mut sentra_core::models::ModelDescriptor> {
    registry.get_mut(id)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
