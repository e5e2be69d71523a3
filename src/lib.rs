//! Sentra: a local production-parity simulator for an OpenAI-style chat
//! completion API. This crate is the simulator core; `main.rs`
//! is the thin binary entry point that wires configuration, telemetry, and
//! the HTTP surface together.

pub mod config;
pub mod error;
pub mod error_injector;
pub mod fixtures;
pub mod generator;
pub mod http;
pub mod kv;
pub mod latency;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod pricing;
pub mod rate_limiter;
pub mod telemetry;
pub mod tiers;
pub mod token_counter;
pub mod types;
pub mod usage;
