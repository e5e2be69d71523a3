//! Error injector: selects an effective error rate from the
//! configured base/burst/quota tiers, then — when a draw falls inside that
//! rate — picks an error kind via weighted random selection.
//!
//! The effective-rate escalation generalizes a closed/open/half-open
//! style promotion on crossed thresholds to a continuous rate rather
//! than a discrete state machine. The weighted draw uses a prefix-sum
//! technique applied to error kinds.

use crate::error::ErrorKind;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
pub struct ErrorInjectionConfig {
    pub enabled: bool,
    pub base_error_rate: f64,
    pub burst_error_rate: f64,
    pub quota_error_rate: f64,
    pub load_threshold_rps: f64,
    pub quota_threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedError {
    RateLimitExceeded,
    ServerError,
    ServiceUnavailable,
}

impl InjectedError {
    pub fn into_kind(self) -> ErrorKind {
        match self {
            InjectedError::RateLimitExceeded => ErrorKind::RateLimitExceeded,
            InjectedError::ServerError => ErrorKind::ServerError,
            InjectedError::ServiceUnavailable => ErrorKind::ServiceUnavailable,
        }
    }
}

/// Default weighted distribution over injected error kinds: 60% rate_limit, 30% server_error, 10% service_unavailable.
const DEFAULT_WEIGHTS: &[(InjectedError, f64)] = &[
    (InjectedError::RateLimitExceeded, 0.60),
    (InjectedError::ServerError, 0.30),
    (InjectedError::ServiceUnavailable, 0.10),
];

/// Tracks recent request volume (a sliding one-second counter) to derive
/// "burst load" without depending on host metrics, via a self-contained
/// request-rate estimate.
pub struct RequestRateTracker {
    window_start: std::sync::Mutex<Instant>,
    count_in_window: AtomicU64,
    last_rps: std::sync::Mutex<f64>,
}

impl RequestRateTracker {
    pub fn new() -> Self {
        Self {
            window_start: std::sync::Mutex::new(Instant::now()),
            count_in_window: AtomicU64::new(0),
            last_rps: std::sync::Mutex::new(0.0),
        }
    }

    /// Records one request and returns the current smoothed RPS estimate.
    pub fn record(&self) -> f64 {
        self.count_in_window.fetch_add(1, Ordering::Relaxed);
        let mut start = self.window_start.lock().unwrap();
        let elapsed = start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let count = self.count_in_window.swap(0, Ordering::Relaxed);
            *start = Instant::now();
            let rps = count as f64 / elapsed.as_secs_f64();
            *self.last_rps.lock().unwrap() = rps;
            rps
        } else {
            *self.last_rps.lock().unwrap()
        }
    }
}

impl Default for RequestRateTracker {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ErrorInjector {
    config: ErrorInjectionConfig,
    rate_tracker: RequestRateTracker,
}

impl ErrorInjector {
    pub fn new(config: ErrorInjectionConfig) -> Self {
        Self {
            config,
            rate_tracker: RequestRateTracker::new(),
        }
    }

    /// Selects the effective error rate for this request: burst load
    /// takes precedence over quota pressure, which takes precedence over
    /// the steady-state base rate. Every call records into the RPS
    /// tracker regardless of which branch fires, so burst detection stays
    /// accurate even while quota pressure is also high.
    fn effective_rate(&self, quota_fraction: f64) -> f64 {
        if !self.config.enabled {
            return 0.0;
        }
        let current_rps = self.rate_tracker.record();
        if current_rps > self.config.load_threshold_rps {
            self.config.burst_error_rate
        } else if quota_fraction > self.config.quota_threshold {
            self.config.quota_error_rate
        } else {
            self.config.base_error_rate
        }
    }

    /// Draws whether this request should be injected with a failure, and
    /// if so, which kind. `quota_fraction` is the caller's current
    /// tokens-consumed / tokens-limit ratio for the active window.
    pub fn maybe_inject(&self, quota_fraction: f64) -> Option<InjectedError> {
        let rate = self.effective_rate(quota_fraction);
        if rate <= 0.0 {
            return None;
        }
        let mut rng = rand::rng();
        if rng.random::<f64>() >= rate {
            return None;
        }
        Some(weighted_pick(DEFAULT_WEIGHTS, &mut rng))
    }
}

/// Prefix-sum weighted selection: draws a uniform value in `[0, total)`
/// and walks the cumulative weight table to find the bucket it falls in.
fn weighted_pick(weights: &[(InjectedError, f64)], rng: &mut impl Rng) -> InjectedError {
    let total: f64 = weights.iter().map(|(_, w)| w).sum();
    let mut draw = rng.random::<f64>() * total;
    for (kind, weight) in weights {
        if draw < *weight {
            return *kind;
        }
        draw -= weight;
    }
    weights.last().map(|(k, _)| *k).unwrap_or(InjectedError::ServerError)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_never_injects() {
        let injector = ErrorInjector::new(ErrorInjectionConfig {
            enabled: false,
            base_error_rate: 1.0,
            burst_error_rate: 1.0,
            quota_error_rate: 1.0,
            load_threshold_rps: 0.0,
            quota_threshold: 0.0,
        });
        for _ in 0..100 {
            assert!(injector.maybe_inject(1.0).is_none());
        }
    }

    #[test]
    fn quota_pressure_always_injects_when_rate_is_one() {
        let injector = ErrorInjector::new(ErrorInjectionConfig {
            enabled: true,
            base_error_rate: 0.0,
            burst_error_rate: 0.0,
            quota_error_rate: 1.0,
            load_threshold_rps: 1_000_000.0,
            quota_threshold: 0.9,
        });
        assert!(injector.maybe_inject(0.95).is_some());
    }

    #[test]
    fn weighted_pick_respects_extremes() {
        let mut rng = rand::rng();
        let all_one_kind: &[(InjectedError, f64)] = &[
            (InjectedError::RateLimitExceeded, 1.0),
            (InjectedError::ServerError, 0.0),
        ];
        for _ in 0..20 {
            assert_eq!(weighted_pick(all_one_kind, &mut rng), InjectedError::RateLimitExceeded);
        }
    }
}
