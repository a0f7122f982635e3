//! Logging setup shared by the daemon and tools.

use time::format_description::well_known::Rfc3339;
use tracing_subscriber::{EnvFilter, fmt, fmt::time::OffsetTime, prelude::*};

/// Macros every module pulls in with `use crate::tracing::prelude::*`.
pub mod prelude {
    pub use ::tracing::{debug, error, info, trace, warn};
}

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber.
///
/// Under systemd (`JOURNAL_STREAM` is set) records go to the journal with
/// their structured fields intact. Otherwise they are written to stdout
/// with local-time timestamps. `RUST_LOG` overrides the default `info`
/// filter in both cases.
pub fn init_journald_or_stdout() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if std::env::var_os("JOURNAL_STREAM").is_some() {
        match tracing_journald::layer() {
            Ok(journald) => {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(journald)
                    .init();
                return;
            }
            Err(e) => {
                eprintln!("journald unavailable, logging to stdout: {e}");
            }
        }
    }

    // The local offset can only be determined while the process is still
    // single threaded; fall back to UTC rather than guessing.
    let timer = OffsetTime::local_rfc_3339()
        .unwrap_or_else(|_| OffsetTime::new(time::UtcOffset::UTC, Rfc3339));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_timer(timer))
        .init();
}
