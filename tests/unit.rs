//! Cargo integration-test entry point. Cargo only auto-discovers files
//! placed directly under `tests/`; the individual suites below live in
//! `tests/unit/` and are pulled in here as modules so `cargo test` runs
//! them all as one binary.

#[path = "unit/config.rs"]
mod config;
#[path = "unit/fixtures.rs"]
mod fixtures;
#[path = "unit/kv.rs"]
mod kv;
#[path = "unit/latency.rs"]
mod latency;
#[path = "unit/rate_limit.rs"]
mod rate_limit;
#[path = "unit/rate_limit_proptest.rs"]
mod rate_limit_proptest;
#[path = "unit/token_counter.rs"]
mod token_counter;
