//! Fire sprinkler alarm daemon.
//!
//! Started when the flow switch powers the host. Runs one alarm session and
//! powers the host off once the alarm is acknowledged.

use std::env;

use anyhow::{Context, Result};

use sprinkler_alarm::clock;
use sprinkler_alarm::config::Config;
use sprinkler_alarm::daemon::{self, Launch};
use sprinkler_alarm::tracing::{self, prelude::*};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let launch = match args.get(1).map(String::as_str) {
        None => Launch::Direct,
        Some("resume") => Launch::Resumed,
        Some(other) => {
            eprintln!("Unknown argument: {}", other);
            eprintln!("Usage: sprinkler-alarmd [resume]");
            eprintln!();
            eprintln!("Configuration is read from SPRINKLER_* environment variables.");
            std::process::exit(1);
        }
    };

    // Read while the process is still single threaded.
    let local_offset = clock::local_offset();

    tracing::init_journald_or_stdout();

    let config = Config::from_env().context("reading configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting runtime")?;

    let report = runtime.block_on(daemon::run(config, launch, local_offset))?;
    info!(
        %launch,
        elapsed_secs = report.elapsed_secs,
        notifications = report.notifications,
        "Alarm daemon finished"
    );

    Ok(())
}
