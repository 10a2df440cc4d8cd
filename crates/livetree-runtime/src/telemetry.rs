#![forbid(unsafe_code)]

//! Global `tracing` subscriber setup.
//!
//! Spans emitted by the runtime use the `livetree.runtime` target, so
//! `LIVETREE_LOG=livetree.runtime=debug` narrows output to reconcile passes.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LogConfig;

/// Environment variable that overrides [`LogConfig::filter`].
pub const LOG_ENV_VAR: &str = "LIVETREE_LOG";

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter {filter:?}: {source}")]
    Filter {
        filter: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled(#[source] tracing_subscriber::util::TryInitError),
}

/// Filter from `LIVETREE_LOG` if set and non-blank, else from `config`.
pub fn build_filter(config: &LogConfig) -> Result<EnvFilter, TelemetryError> {
    let directives = std::env::var(LOG_ENV_VAR)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| config.filter.clone());
    parse_filter(&directives)
}

fn parse_filter(directives: &str) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(directives).map_err(|source| TelemetryError::Filter {
        filter: directives.to_owned(),
        source,
    })
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &LogConfig) -> Result<(), TelemetryError> {
    let filter = build_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry
            .with(fmt::layer().json().with_target(true).with_current_span(true))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };
    installed.map_err(TelemetryError::AlreadyInstalled)?;
    tracing::debug!(target: "livetree.runtime", json = config.json, "tracing initialised");
    Ok(())
}
