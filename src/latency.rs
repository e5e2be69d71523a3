//! Latency simulator. The peak-hour load multiplier is driven off a
//! deterministic UTC-hour schedule rather than host load, giving a
//! testable peak window instead of a live load average.

use crate::config::JitterDistribution;
use crate::models::ModelDescriptor;
use chrono::{Timelike, Utc};
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct LatencyConfig {
    pub jitter_distribution: JitterDistribution,
    pub peak_hours_utc: (u8, u8),
    pub load_multiplier: f64,
}

fn is_peak_hour(peak: (u8, u8)) -> bool {
    let hour = Utc::now().hour() as u8;
    if peak.0 <= peak.1 {
        hour >= peak.0 && hour < peak.1
    } else {
        // wrap-around window, e.g. (22, 4)
        hour >= peak.0 || hour < peak.1
    }
}

fn draw_jitter(distribution: JitterDistribution, jitter_percent: f64, rng: &mut impl Rng) -> f64 {
    match distribution {
        JitterDistribution::Uniform => rng.random_range(-jitter_percent..=jitter_percent),
        JitterDistribution::Normal => {
            // Box-Muller, clamped to +/-3 sigma then scaled into
            // [-jitter_percent, jitter_percent] so the configured
            // percentage still bounds the common case.
            let u1: f64 = rng.random_range(f64::EPSILON..1.0);
            let u2: f64 = rng.random_range(0.0..1.0);
            let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
            (z / 3.0).clamp(-1.0, 1.0) * jitter_percent
        }
    }
}

pub struct LatencySimulator {
    pub config: LatencyConfig,
}

impl LatencySimulator {
    pub fn new(config: LatencyConfig) -> Self {
        Self { config }
    }

    /// Computes a single non-negative delay for a unary (non-streaming)
    /// response: base + per-token cost, jittered, scaled by peak-hour
    /// load, then clamped to the model's min/max latency.
    pub fn compute(&self, model: &ModelDescriptor, output_tokens: u32) -> Duration {
        let mut rng = rand::rng();
        let base = model.base_latency_ms + model.per_token_latency_ms * output_tokens as f64;
        let jitter = draw_jitter(self.config.jitter_distribution, model.jitter_percent, &mut rng);
        let jittered = base * (1.0 + jitter);
        let loaded = if is_peak_hour(self.config.peak_hours_utc) {
            jittered * self.config.load_multiplier
        } else {
            jittered
        };
        let clamped = loaded.clamp(model.min_latency(), model.max_latency());
        Duration::from_secs_f64((clamped / 1000.0).max(0.0))
    }

    /// Returns `k` streaming chunk delays. `delay[0]` is the jittered base
    /// latency (time-to-first-token, with peak-hour loading still
    /// applied; only subsequent chunks skip the load multiplier).
    /// `delay[i>0]` is `per_token_latency * (1 +/- 0.1)` drawn
    /// independently per chunk.
    pub fn compute_streaming(&self, model: &ModelDescriptor, chunk_count: usize) -> Vec<Duration> {
        let mut rng = rand::rng();
        let mut delays = Vec::with_capacity(chunk_count.max(1));

        let first_jitter = draw_jitter(self.config.jitter_distribution, model.jitter_percent, &mut rng);
        let mut first = model.base_latency_ms * (1.0 + first_jitter);
        if is_peak_hour(self.config.peak_hours_utc) {
            first *= self.config.load_multiplier;
        }
        delays.push(Duration::from_secs_f64(
            (first.clamp(model.min_latency(), model.max_latency()) / 1000.0).max(0.0),
        ));

        for _ in 1..chunk_count.max(1) {
            let factor = rng.random_range(-0.1..=0.1);
            let d = (model.per_token_latency_ms * (1.0 + factor)).max(0.0);
            delays.push(Duration::from_secs_f64(d / 1000.0));
        }
        delays
    }

    /// Applies the optional response-cache latency reduction: a small, fixed fractional speedup over an already-computed
    /// delay.
    pub fn apply_cache_reduction(delay: Duration, reduction: f64) -> Duration {
        Duration::from_secs_f64(delay.as_secs_f64() * (1.0 - reduction).max(0.0))
    }
}

/// Outcome of suspending for a computed delay under a cancellable context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed,
    Cancelled,
}

/// Suspends for `delay`, aborting early if `cancelled` resolves first.
pub async fn wait_cancellable(delay: Duration, cancelled: impl std::future::Future<Output = ()>) -> WaitOutcome {
    tokio::select! {
        _ = tokio::time::sleep(delay) => WaitOutcome::Completed,
        _ = cancelled => WaitOutcome::Cancelled,
    }
}
