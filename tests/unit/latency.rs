use sentra_core::config::JitterDistribution;
use sentra_core::latency::{wait_cancellable, LatencyConfig, LatencySimulator, WaitOutcome};
use sentra_core::models::ModelRegistry;
use std::time::Duration;

fn simulator(jitter: JitterDistribution) -> LatencySimulator {
    LatencySimulator::new(LatencyConfig {
        jitter_distribution: jitter,
        // load_multiplier is 1.0 so whether "now" falls inside this window
        // doesn't change the result; these assertions stay time-of-day
        // independent.
        peak_hours_utc: (0, 0),
        load_multiplier: 1.0,
    })
}

#[test]
fn compute_stays_within_model_clamp_bounds() {
    let registry = ModelRegistry::with_defaults();
    let model = registry.get("gpt-4o").unwrap();
    let sim = simulator(JitterDistribution::Uniform);
    for _ in 0..50 {
        let delay = sim.compute(model, 100);
        let ms = delay.as_secs_f64() * 1000.0;
        assert!(ms >= model.min_latency() - 0.001);
        assert!(ms <= model.max_latency() + 0.001);
    }
}

#[test]
fn normal_jitter_also_stays_within_clamp_bounds() {
    let registry = ModelRegistry::with_defaults();
    let model = registry.get("gpt-3.5-turbo").unwrap();
    let sim = simulator(JitterDistribution::Normal);
    for _ in 0..50 {
        let delay = sim.compute(model, 50);
        let ms = delay.as_secs_f64() * 1000.0;
        assert!(ms >= model.min_latency() - 0.001);
        assert!(ms <= model.max_latency() + 0.001);
    }
}

#[test]
fn more_output_tokens_never_decreases_the_unloaded_baseline() {
    let registry = ModelRegistry::with_defaults();
    let model = registry.get("gpt-4o-mini").unwrap();
    // Zero jitter window: load_multiplier 1.0 and peak disabled below.
    let sim = LatencySimulator::new(LatencyConfig {
        jitter_distribution: JitterDistribution::Uniform,
        peak_hours_utc: (25, 25), // unreachable hour range -> never "peak"
        load_multiplier: 1.0,
    });
    let small = sim.compute(model, 1).as_secs_f64();
    let large = sim.compute(model, 5000).as_secs_f64();
    assert!(large >= small);
}

#[test]
fn streaming_delays_cover_every_requested_chunk() {
    let registry = ModelRegistry::with_defaults();
    let model = registry.get("gpt-4o").unwrap();
    let sim = simulator(JitterDistribution::Uniform);
    let delays = sim.compute_streaming(model, 5);
    assert_eq!(delays.len(), 5);
    assert!(delays.iter().all(|d| *d >= Duration::ZERO));
}

#[test]
fn streaming_with_zero_chunks_still_returns_the_first_token_delay() {
    let registry = ModelRegistry::with_defaults();
    let model = registry.get("gpt-4o").unwrap();
    let sim = simulator(JitterDistribution::Uniform);
    let delays = sim.compute_streaming(model, 0);
    assert_eq!(delays.len(), 1);
}

#[test]
fn cache_reduction_shortens_the_delay() {
    let base = Duration::from_millis(1000);
    let reduced = LatencySimulator::apply_cache_reduction(base, 0.25);
    assert!(reduced < base);
    assert!(reduced.as_millis() >= 740 && reduced.as_millis() <= 760);
}

#[tokio::test]
async fn wait_cancellable_completes_when_not_cancelled() {
    let never = std::future::pending::<()>();
    let outcome = wait_cancellable(Duration::from_millis(1), never).await;
    assert_eq!(outcome, WaitOutcome::Completed);
}

#[tokio::test]
async fn wait_cancellable_short_circuits_on_cancellation() {
    let already_cancelled = std::future::ready(());
    let outcome = wait_cancellable(Duration::from_secs(30), already_cancelled).await;
    assert_eq!(outcome, WaitOutcome::Cancelled);
}
