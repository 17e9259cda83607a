//! Diagnostic logging setup.
//!
//! Off unless `TOKSCAN_LOG` (or `RUST_LOG`) is set, so a benchmark run pays
//! nothing for it. `TOKSCAN_LOG_FORMAT=json` switches from flat text lines
//! to one JSON object per event.
//!
//! ```bash
//! TOKSCAN_LOG=debug tokscan big.json
//! TOKSCAN_LOG=debug TOKSCAN_LOG_FORMAT=json tokscan big.json
//! ```
//!
//! Everything goes to stderr; stdout carries only the progress and error
//! lines.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }

    fn from_env() -> Self {
        Self::parse(&std::env::var("TOKSCAN_LOG_FORMAT").unwrap_or_default())
    }
}

/// `TOKSCAN_LOG` wins over `RUST_LOG` when both are set.
fn build_filter() -> EnvFilter {
    if let Ok(val) = std::env::var("TOKSCAN_LOG") {
        EnvFilter::builder().parse_lossy(val)
    } else {
        EnvFilter::from_default_env()
    }
}

/// Installs the global subscriber if logging was requested.
pub fn init_tracing() {
    let has_tokscan_log = std::env::var("TOKSCAN_LOG").is_ok();
    let has_rust_log = std::env::var("RUST_LOG").is_ok();
    if !has_tokscan_log && !has_rust_log {
        return;
    }

    let filter = build_filter();
    match LogFormat::from_env() {
        LogFormat::Json => {
            let json_layer = fmt::layer().json().with_writer(std::io::stderr);
            Registry::default().with(filter).with(json_layer).init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}
