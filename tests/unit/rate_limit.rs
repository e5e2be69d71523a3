use sentra_core::kv::InMemoryKv;
use sentra_core::rate_limiter::{LimitingFactor, RateLimiter};
use sentra_core::tiers::{TierLimits, TierRegistry};
use sentra_core::types::Identity;
use std::sync::Arc;

fn identity(name: &str) -> Identity {
    Identity(name.to_string())
}

#[tokio::test]
async fn admits_within_limits_and_tracks_remaining() {
    let mut tiers = TierRegistry::with_defaults("free", 60, 100_000);
    tiers.set_limits("free", "gpt-4o", TierLimits { rpm: 10, tpm: 1_000, rpd: None, tpd: None });
    let limiter: RateLimiter<InMemoryKv> = RateLimiter::new(Arc::new(tiers), None);

    let result = limiter.admit(&identity("alice"), "gpt-4o", "free", 100).await;
    assert!(result.allowed);
    assert_eq!(result.limiting_factor, LimitingFactor::None);
    assert!(result.remaining_requests < 10.0);
    assert!(result.remaining_tokens < 1_000.0);
}

#[tokio::test]
async fn rejects_on_request_exhaustion() {
    let mut tiers = TierRegistry::with_defaults("free", 60, 100_000);
    tiers.set_limits("free", "gpt-4o", TierLimits { rpm: 1, tpm: 1_000_000, rpd: None, tpd: None });
    let limiter: RateLimiter<InMemoryKv> = RateLimiter::new(Arc::new(tiers), None);

    let first = limiter.admit(&identity("bob"), "gpt-4o", "free", 10).await;
    assert!(first.allowed);

    let second = limiter.admit(&identity("bob"), "gpt-4o", "free", 10).await;
    assert!(!second.allowed);
    assert_eq!(second.limiting_factor, LimitingFactor::Requests);
}

#[tokio::test]
async fn token_rejection_refunds_the_request_bucket() {
    let mut tiers = TierRegistry::with_defaults("free", 60, 100_000);
    tiers.set_limits("free", "gpt-4o", TierLimits { rpm: 5, tpm: 50, rpd: None, tpd: None });
    let limiter: RateLimiter<InMemoryKv> = RateLimiter::new(Arc::new(tiers), None);

    // Demands more tokens than the bucket holds; the request slot consumed
    // for this attempt must be refunded so it doesn't silently leak.
    let rejected = limiter.admit(&identity("carol"), "gpt-4o", "free", 500).await;
    assert!(!rejected.allowed);
    assert_eq!(rejected.limiting_factor, LimitingFactor::Tokens);
    assert!((rejected.remaining_requests - 5.0).abs() < 0.001);
}

#[tokio::test]
async fn unknown_tier_and_model_fall_back_to_configured_default() {
    let tiers = TierRegistry::with_defaults("free", 42, 4_200);
    let limiter: RateLimiter<InMemoryKv> = RateLimiter::new(Arc::new(tiers), None);

    let result = limiter.admit(&identity("dave"), "some-unlisted-model", "unknown-tier", 1).await;
    assert!(result.allowed);
    assert_eq!(result.limit_requests, 42);
    assert_eq!(result.limit_tokens, 4_200);
}

#[tokio::test]
async fn separate_identities_get_independent_buckets() {
    let mut tiers = TierRegistry::with_defaults("free", 60, 100_000);
    tiers.set_limits("free", "gpt-4o", TierLimits { rpm: 1, tpm: 1_000_000, rpd: None, tpd: None });
    let limiter: RateLimiter<InMemoryKv> = RateLimiter::new(Arc::new(tiers), None);

    assert!(limiter.admit(&identity("eve"), "gpt-4o", "free", 10).await.allowed);
    // A different identity's first request should not be affected by eve's.
    assert!(limiter.admit(&identity("frank"), "gpt-4o", "free", 10).await.allowed);
}
