//! Diagnostic tracing for the `story-cycle` binary.
//!
//! Diagnostics go to stderr and are controlled by `RUST_LOG`. Run progress
//! (step transitions, auto-replies) is printed by [`crate::output`] and is
//! not affected by the filter.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise `verbose` picks the level:
/// 0 is `warn`, 1 is `info`, 2 or more is `debug`.
pub fn init(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

fn default_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}
