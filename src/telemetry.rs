use std::io::IsTerminal;
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_LOG_FILTER: &str = "payouts=info";
const VERBOSE_LOG_FILTER: &str = "payouts=debug";

/// Installs a stderr `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise `verbose` picks between info and
/// debug output for this crate. Calling it twice is harmless.
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose {
            VERBOSE_LOG_FILTER
        } else {
            DEFAULT_LOG_FILTER
        })
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();
}
