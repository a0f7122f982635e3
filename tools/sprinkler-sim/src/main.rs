//! Sprinkler alarm simulator.
//!
//! Runs a full alarm session against simulated GPIO under virtual time, so
//! a 400 second escalation finishes instantly, and prints what would have
//! been sent.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use time::OffsetDateTime;
use tokio::time::{self as tokio_time, Instant};

use sprinkler_alarm::alarm::{AlarmSupervisor, SessionReport, SupervisorConfig};
use sprinkler_alarm::button::{ButtonMonitor, EdgeSourceConfig, watch_rising_edges};
use sprinkler_alarm::clock::{self, AnchoredClock};
use sprinkler_alarm::config::Config;
use sprinkler_alarm::escalation::{Contact, EscalationScheduler};
use sprinkler_alarm::gpio::SimGpio;
use sprinkler_alarm::hw_trait::gpio::{Gpio, PinValue};
use sprinkler_alarm::indicator::{ExitBlink, IndicatorController};
use sprinkler_alarm::notify::MemoryTransport;
use sprinkler_alarm::shutdown::CountingShutdown;
use tokio_util::sync::CancellationToken;

mod timeline;

#[derive(Parser, Debug)]
#[command(
    name = "sprinkler-sim",
    about = "Simulate a sprinkler alarm session and print the notification timeline"
)]
struct Args {
    /// Seconds of virtual time to simulate
    #[arg(long, default_value_t = 400)]
    run_for: u64,

    /// Press the acknowledge button this many seconds after activation
    #[arg(long)]
    press_at: Option<u64>,

    /// How long the simulated press is held, in milliseconds
    #[arg(long, default_value_t = 200)]
    hold_ms: u64,

    /// Poll interval in milliseconds
    #[arg(long, default_value_t = 100)]
    poll_ms: u64,

    /// Primary contact (repeatable)
    #[arg(long = "primary", default_values_t = ["+15550000001".to_string()])]
    primary: Vec<String>,

    /// Secondary contact (repeatable)
    #[arg(long = "secondary", default_values_t = ["+15550000002".to_string()])]
    secondary: Vec<String>,

    /// Log session internals
    #[arg(short, long)]
    verbose: bool,
}

const RED: u8 = 18;
const YELLOW: u8 = 4;
const BUTTON: u8 = 17;

/// What the simulated session produced.
struct Outcome {
    report: Option<SessionReport>,
    transport: MemoryTransport,
    shutdown: CountingShutdown,
    start: Instant,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Resolve before any runtime threads exist.
    let anchor = OffsetDateTime::now_utc().to_offset(clock::local_offset());

    if args.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .init();
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .context("starting runtime")?;

    let outcome = runtime.block_on(simulate(&args, anchor))?;
    timeline::print(&args, &outcome);

    Ok(())
}

async fn simulate(args: &Args, anchor: OffsetDateTime) -> Result<Outcome> {
    let defaults = Config::default();

    let mut plan = defaults.escalation.clone();
    plan.primary = args.primary.iter().map(Contact::new).collect();
    plan.secondary = args.secondary.iter().map(Contact::new).collect();
    plan.validate()?;

    let mut gpio = SimGpio::new();
    let transport = MemoryTransport::new();
    let shutdown = CountingShutdown::new();
    let cancel = CancellationToken::new();

    let button = ButtonMonitor::new(
        Box::new(gpio.pin(BUTTON).await?),
        defaults.timing.settle_delay,
    );
    tokio::spawn(watch_rising_edges(
        Box::new(gpio.pin(BUTTON).await?),
        button.edge_handle(),
        EdgeSourceConfig {
            sample_interval: defaults.timing.edge_sample_interval,
            debounce: defaults.timing.edge_debounce,
        },
        cancel.clone(),
    ));

    let indicator = IndicatorController::new(
        Box::new(gpio.pin(RED).await?),
        Box::new(gpio.pin(YELLOW).await?),
    )
    .await?;

    let supervisor = AlarmSupervisor::new(
        SupervisorConfig {
            poll_interval: Duration::from_millis(args.poll_ms.max(1)),
            exit_blink: ExitBlink {
                cycles: defaults.timing.exit_blinks,
                half_period: defaults.timing.exit_blink_half_period,
            },
        },
        EscalationScheduler::new(&plan, Arc::new(AnchoredClock::new(anchor))),
        button,
        indicator,
        Arc::new(transport.clone()),
        Box::new(shutdown.clone()),
    );

    let start = Instant::now();
    let mut session = tokio::spawn(supervisor.run());

    if let Some(press_at) = args.press_at {
        let gpio = gpio.clone();
        let hold = Duration::from_millis(args.hold_ms);
        tokio::spawn(async move {
            tokio_time::sleep_until(start + Duration::from_secs(press_at)).await;
            gpio.set_level(BUTTON, PinValue::High);
            tokio_time::sleep(hold).await;
            gpio.set_level(BUTTON, PinValue::Low);
        });
    }

    let report = match tokio_time::timeout(Duration::from_secs(args.run_for), &mut session).await {
        Ok(joined) => Some(joined.context("session task panicked")??),
        Err(_) => {
            session.abort();
            None
        }
    };
    cancel.cancel();

    Ok(Outcome {
        report,
        transport,
        shutdown,
        start,
    })
}
