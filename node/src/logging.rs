//! # Structured Logging
//!
//! Wires up the `tracing` subscriber for the binary. The filter comes
//! from `RUST_LOG` when set, otherwise from the directives the caller
//! passes in (assembled from `--log-level` in `run_node`); the output
//! shape is one of [`LogFormat`]'s two variants, selected directly on
//! the command line via clap.
//!
//! Everything goes to stderr — stdout is reserved for structured output
//! like the `status` subcommand's JSON body.

use clap::ValueEnum;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output shape, parsed straight from `--log-format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines with file/line locations. For terminals.
    Pretty,
    /// One JSON object per line. For log aggregation.
    Json,
}

/// Install the global subscriber. Call once, before anything logs;
/// a second call panics, which is the bug you want to hear about.
///
/// `directives` is the fallback filter (e.g.
/// `"storj_node=info,storj_protocol=info"`) used when the `RUST_LOG`
/// environment variable is absent.
pub fn init(directives: &str, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));
    let base = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => base
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init(),
        LogFormat::Json => base.with(fmt::layer().json().with_target(true)).init(),
    }

    tracing::debug!(?format, "tracing subscriber installed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_parse_from_cli_strings() {
        assert!(matches!(
            LogFormat::from_str("pretty", true),
            Ok(LogFormat::Pretty)
        ));
        assert!(matches!(LogFormat::from_str("json", true), Ok(LogFormat::Json)));
        assert!(matches!(LogFormat::from_str("JSON", true), Ok(LogFormat::Json)));
        assert!(LogFormat::from_str("verbose", true).is_err());
    }
}
