//! Structured logging init: `tracing_subscriber::registry()` with a
//! `fmt` layer and an `EnvFilter`. Production and debug modes switch
//! between JSON and human-readable output. Plain tracing plus prometheus
//! covers this service's observability needs; no OpenTelemetry exporter
//! is wired up.

use crate::config::BehaviorMode;
use anyhow::Result;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

pub fn init_logging(log_level: &str, mode: BehaviorMode) -> Result<()> {
    let level = log_level.parse::<tracing::Level>().unwrap_or(tracing::Level::INFO);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sentra_core={level},sentra_sim={level}")));

    let registry = tracing_subscriber::registry().with(filter);

    match mode {
        BehaviorMode::Production => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_file(true)
                        .with_line_number(true)
                        .json(),
                )
                .init();
        }
        BehaviorMode::Fast | BehaviorMode::Debug => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(true)
                        .with_file(true)
                        .with_line_number(true)
                        .pretty(),
                )
                .init();
        }
    }

    Ok(())
}
