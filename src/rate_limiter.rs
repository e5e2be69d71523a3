//! Dual token bucket rate limiter: two independently-observable buckets
//! per (identity, model), with continuous refill and request-then-token
//! admission order.

use crate::kv::KvStore;
use crate::tiers::TierRegistry;
use crate::types::Identity;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitingFactor {
    None,
    Requests,
    Tokens,
}

/// One continuous-refill bucket. Mirrors `TokenBucket::try_consume`/
/// `refill`, generalized to fractional demand and exposing
/// remaining/reset-in for response headers.
#[derive(Debug)]
struct Bucket {
    capacity: f64,
    level: f64,
    refill_rate_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(capacity: f64, refill_rate_per_sec: f64) -> Self {
        Self {
            capacity,
            level: capacity,
            refill_rate_per_sec,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.level = (self.level + elapsed * self.refill_rate_per_sec).min(self.capacity);
            self.last_refill = now;
        }
    }

    /// Returns `(allowed, remaining_after, reset_in_secs)`.
    fn try_consume(&mut self, demand: f64, now: Instant) -> (bool, f64, f64) {
        self.refill(now);
        if self.level >= demand {
            self.level -= demand;
            (true, self.level, 0.0)
        } else {
            let reset_in = (demand - self.level) / self.refill_rate_per_sec;
            (false, self.level, reset_in)
        }
    }

    fn refund(&mut self, amount: f64) {
        self.level = (self.level + amount).min(self.capacity);
    }
}

struct DualBucket {
    requests: Mutex<Bucket>,
    tokens: Mutex<Bucket>,
}

#[derive(Debug, Clone)]
pub struct AdmissionResult {
    pub allowed: bool,
    pub limiting_factor: LimitingFactor,
    pub remaining_requests: f64,
    pub remaining_tokens: f64,
    pub reset_in_requests: f64,
    pub reset_in_tokens: f64,
    pub limit_requests: u32,
    pub limit_tokens: u32,
}

/// Per-(identity, model) dual buckets, lazily created, never destroyed.
/// One `RwLock` guards the top-level map (admission runs on the async
/// request path, so the lock is an async `RwLock` rather than a plain
/// mutex); each bucket pair's arithmetic is behind its own mutex.
pub struct RateLimiter<S: KvStore> {
    tiers: Arc<TierRegistry>,
    buckets: RwLock<HashMap<(String, String), Arc<DualBucket>>>,
    store: Option<Arc<S>>,
}

impl<S: KvStore> RateLimiter<S> {
    pub fn new(tiers: Arc<TierRegistry>, store: Option<Arc<S>>) -> Self {
        Self {
            tiers,
            buckets: RwLock::new(HashMap::new()),
            store,
        }
    }

    async fn bucket_for(&self, identity: &Identity, model: &str, tier: &str) -> Arc<DualBucket> {
        let key = (identity.0.clone(), model.to_string());
        if let Some(existing) = self.buckets.read().await.get(&key) {
            return existing.clone();
        }

        let mut write_guard = self.buckets.write().await;
        if let Some(existing) = write_guard.get(&key) {
            return existing.clone();
        }

        let limits = self.tiers.limits_for(tier, model);
        let mut req_bucket = Bucket::new(limits.rpm as f64, limits.rpm as f64 / 60.0);
        let mut tok_bucket = Bucket::new(limits.tpm as f64, limits.tpm as f64 / 60.0);

        if let Some(store) = &self.store {
            hydrate(store.as_ref(), identity, model, "requests", &mut req_bucket).await;
            hydrate(store.as_ref(), identity, model, "tokens", &mut tok_bucket).await;
        }

        let bucket = Arc::new(DualBucket {
            requests: Mutex::new(req_bucket),
            tokens: Mutex::new(tok_bucket),
        });
        write_guard.insert(key, bucket.clone());
        bucket
    }

    /// Admission check: request bucket first,
    /// then token bucket; a token-dimension rejection refunds the request
    /// bucket atomically so no caller observes requests consumed without
    /// tokens.
    pub async fn admit(
        &self,
        identity: &Identity,
        model: &str,
        tier: &str,
        estimated_tokens: u32,
    ) -> AdmissionResult {
        let limits = self.tiers.limits_for(tier, model);
        let bucket = self.bucket_for(identity, model, tier).await;
        let now = Instant::now();

        let mut req_guard = bucket.requests.lock().await;
        let (req_ok, req_remaining, req_reset) = req_guard.try_consume(1.0, now);
        if !req_ok {
            debug!(%model, tier, "rate limit rejection: requests");
            return AdmissionResult {
                allowed: false,
                limiting_factor: LimitingFactor::Requests,
                remaining_requests: req_remaining,
                remaining_tokens: 0.0,
                reset_in_requests: req_reset,
                reset_in_tokens: 0.0,
                limit_requests: limits.rpm,
                limit_tokens: limits.tpm,
            };
        }
        drop(req_guard);

        let mut tok_guard = bucket.tokens.lock().await;
        let (tok_ok, tok_remaining, tok_reset) = tok_guard.try_consume(estimated_tokens as f64, now);
        if !tok_ok {
            drop(tok_guard);
            // Refund the request token consumed above — conservation
            // invariant.
            let mut req_guard = bucket.requests.lock().await;
            req_guard.refund(1.0);
            let remaining_requests = req_guard.level;
            drop(req_guard);

            warn!(%model, tier, estimated_tokens, "rate limit rejection: tokens");
            self.persist(identity, model, &bucket).await;
            return AdmissionResult {
                allowed: false,
                limiting_factor: LimitingFactor::Tokens,
                remaining_requests,
                remaining_tokens: tok_remaining,
                reset_in_requests: 0.0,
                reset_in_tokens: tok_reset,
                limit_requests: limits.rpm,
                limit_tokens: limits.tpm,
            };
        }
        let remaining_tokens = tok_guard.level;
        drop(tok_guard);

        let remaining_requests = bucket.requests.lock().await.level;
        self.persist(identity, model, &bucket).await;

        AdmissionResult {
            allowed: true,
            limiting_factor: LimitingFactor::None,
            remaining_requests,
            remaining_tokens,
            reset_in_requests: 0.0,
            reset_in_tokens: 0.0,
            limit_requests: limits.rpm,
            limit_tokens: limits.tpm,
        }
    }

    async fn persist(&self, identity: &Identity, model: &str, bucket: &DualBucket) {
        let Some(store) = &self.store else { return };
        let req_level = bucket.requests.lock().await.level;
        let tok_level = bucket.tokens.lock().await.level;
        let now_millis = chrono::Utc::now().timestamp_millis();

        // Best-effort; store failures degrade to in-memory-only, never
        // affect admission correctness.
        let req_key = format!("ratelimit:{}:{}:requests", identity.0, model);
        let tok_key = format!("ratelimit:{}:{}:tokens", identity.0, model);
        let _ = store.set(&req_key, req_level.to_string().into_bytes(), None).await;
        let _ = store.set(&tok_key, tok_level.to_string().into_bytes(), None).await;
        let _ = store.rl_set_timestamp(&req_key, now_millis).await;
        let _ = store.rl_set_timestamp(&tok_key, now_millis).await;
    }
}

async fn hydrate<S: KvStore>(store: &S, identity: &Identity, model: &str, dimension: &str, bucket: &mut Bucket) {
    let key = format!("ratelimit:{}:{}:{}", identity.0, model, dimension);
    if let Ok(Some(bytes)) = store.get(&key).await {
        if let Ok(text) = std::str::from_utf8(&bytes) {
            if let Ok(level) = text.parse::<f64>() {
                bucket.level = level.min(bucket.capacity);
            }
        }
    }
}

/// Formats a reset-in duration as `<seconds>.<hundredths>s` for the
/// `x-ratelimit-reset-*` headers.
pub fn format_reset(seconds: f64) -> String {
    let secs = seconds.max(0.0);
    format!("{:.2}s", secs)
}
