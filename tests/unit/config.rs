use sentra_core::config::{parse_duration, AppConfig, BehaviorMode};
use std::time::Duration;

#[test]
fn test_parse_duration() {
    assert_eq!(parse_duration("30s").expect("parse 30s"), Duration::from_secs(30));
    assert_eq!(parse_duration("5m").expect("parse 5m"), Duration::from_secs(300));
    assert_eq!(parse_duration("2h").expect("parse 2h"), Duration::from_secs(7200));
    assert_eq!(parse_duration("1d").expect("parse 1d"), Duration::from_secs(86400));

    assert!(parse_duration("").is_err());
    assert!(parse_duration("30").is_err());
    assert!(parse_duration("30x").is_err());
}

#[test]
fn default_config_validates() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.behavior.mode, BehaviorMode::Production);
}

#[test]
fn fast_mode_disables_latency_rate_limiting_and_error_injection() {
    let mut config = AppConfig::default();
    config.behavior.mode = BehaviorMode::Fast;
    assert!(!config.latency_enabled());
    assert!(!config.rate_limiting_enabled());
    assert!(!config.error_injection_enabled());
    // Fast mode says nothing about caching.
    assert!(config.response_cache_enabled());
}

#[test]
fn debug_mode_disables_only_response_caching() {
    let mut config = AppConfig::default();
    config.behavior.mode = BehaviorMode::Debug;
    assert!(config.latency_enabled());
    assert!(config.rate_limiting_enabled());
    assert!(config.error_injection_enabled());
    assert!(!config.response_cache_enabled());
}

#[test]
fn validate_rejects_malformed_bind_address() {
    let mut config = AppConfig::default();
    config.server.bind = "not-a-host-port".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn validate_rejects_out_of_range_error_rate() {
    let mut config = AppConfig::default();
    config.error_injection.base_error_rate = 1.5;
    assert!(config.validate().is_err());
}

#[test]
fn validate_rejects_zero_rate_limit_fallbacks() {
    let mut config = AppConfig::default();
    config.rate_limiting.fallback_rpm = 0;
    assert!(config.validate().is_err());
}

#[test]
fn lint_warns_but_does_not_fail_on_suspicious_thresholds() {
    let mut config = AppConfig::default();
    config.behavior.mode = BehaviorMode::Debug;
    config.caching.response_cache_enabled = true;
    assert!(config.validate().is_ok());
    assert!(!config.lint().is_empty());
}
