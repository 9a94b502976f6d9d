//! Diagnostic logging on stderr.
//!
//! Console output meant for the user goes through `println!` with colors;
//! `tracing` carries the diagnostics (encoder command lines, service
//! commands, deletion failures, mail API calls).

use anyhow::{anyhow, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const QUIET_DIRECTIVE: &str = "warn";
const VERBOSE_DIRECTIVE: &str = "warn,batchdesk=debug";

/// Filter used when `RUST_LOG` is not set.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        VERBOSE_DIRECTIVE
    } else {
        QUIET_DIRECTIVE
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_logging(verbose: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_raises_only_this_crate() {
        assert_eq!(default_directive(false), "warn");
        assert_eq!(default_directive(true), "warn,batchdesk=debug");
        assert!(EnvFilter::try_new(default_directive(true)).is_ok());
    }
}
