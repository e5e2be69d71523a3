//! Property tests for the dual token bucket:
//! bucket levels never leave `[0, capacity]`, and a token-dimension
//! rejection leaves the request bucket's level unchanged from right
//! before the call.

use proptest::prelude::*;
use sentra_core::kv::InMemoryKv;
use sentra_core::rate_limiter::{LimitingFactor, RateLimiter};
use sentra_core::tiers::{TierLimits, TierRegistry};
use sentra_core::types::Identity;
use std::sync::Arc;

fn limiter_with(rpm: u32, tpm: u32) -> RateLimiter<InMemoryKv> {
    let mut tiers = TierRegistry::with_defaults("free", 60, 100_000);
    tiers.set_limits("free", "gpt-4o", TierLimits { rpm, tpm, rpd: None, tpd: None });
    RateLimiter::new(Arc::new(tiers), None)
}

proptest! {
    /// For any sequence of per-request token demands, every admission
    /// result reports remaining levels within [0, capacity].
    #[test]
    fn bucket_levels_stay_within_capacity(
        rpm in 1u32..200,
        tpm in 100u32..500_000,
        demands in prop::collection::vec(1u32..1000, 1..30),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let limiter = limiter_with(rpm, tpm);
            let identity = Identity("prop-bucket".to_string());
            for demand in demands {
                let result = limiter.admit(&identity, "gpt-4o", "free", demand).await;
                prop_assert!(result.remaining_requests >= -1e-9);
                prop_assert!(result.remaining_requests <= rpm as f64 + 1e-9);
                prop_assert!(result.remaining_tokens >= -1e-9);
                prop_assert!(result.remaining_tokens <= tpm as f64 + 1e-9);
            }
            Ok(())
        })?;
    }

    /// Whenever a call is rejected on the token dimension, the request
    /// bucket must show exactly `capacity` minus however many whole
    /// requests have actually been admitted so far — i.e. the refund
    /// leaves no trace of the token-rejected attempt.
    #[test]
    fn token_rejection_never_leaks_a_request_slot(
        tpm in 1u32..50,
        oversized_demand in 10_000u32..1_000_000,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let limiter = limiter_with(1_000, tpm);
            let identity = Identity("prop-refund".to_string());

            let before = limiter.admit(&identity, "gpt-4o", "free", 1).await;
            prop_assert!(before.allowed);
            let requests_after_first = before.remaining_requests;

            let rejected = limiter.admit(&identity, "gpt-4o", "free", oversized_demand).await;
            prop_assert_eq!(rejected.limiting_factor, LimitingFactor::Tokens);
            prop_assert!((rejected.remaining_requests - requests_after_first).abs() < 1e-6);
            Ok(())
        })?;
    }
}
