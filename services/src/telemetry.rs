//! Tracing subscriber setup for LLMC binaries.
//!
//! Compact single-line output with RFC3339 UTC timestamps. The filter
//! comes from `RUST_LOG` with a caller-supplied default, so library crates
//! only ever emit events and never install subscribers themselves.

use std::io::{self, IsTerminal};

use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{EnvFilter, fmt};

/// RFC3339 UTC timer implemented via `chrono` (no extra features).
/// Example output: `2026-07-30T10:20:30Z`
#[derive(Clone, Debug, Default)]
struct ChronoRfc3339Utc;

impl FormatTime for ChronoRfc3339Utc {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = chrono::Utc::now();
        // Keep timestamps compact: no fractional seconds, Z-suffix
        let s = now.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        w.write_str(&s)
    }
}

/// Installs the global subscriber. `default_directive` is used when
/// `RUST_LOG` is unset (e.g. `"info"` or `"llmc=debug,info"`).
///
/// Calling this twice is a no-op; the second install attempt is discarded.
pub fn init(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive.to_string()));

    let use_ansi = io::stdout().is_terminal();

    let _ = fmt()
        .with_env_filter(filter)
        .with_timer(ChronoRfc3339Utc)
        .with_target(true)
        .with_level(true)
        .with_ansi(use_ansi)
        .compact()
        .try_init();
}
