//! Wires configuration to hardware and runs one alarm session.

use std::sync::Arc;

use strum::Display;
use time::UtcOffset;
use tokio_util::sync::CancellationToken;

use crate::alarm::{AlarmSupervisor, SessionReport, SupervisorConfig};
use crate::button::{ButtonMonitor, EdgeSourceConfig, watch_rising_edges};
use crate::clock::{self, SystemClock, WallClock};
use crate::config::Config;
use crate::error::Result;
use crate::escalation::EscalationScheduler;
use crate::gpio::SysfsGpio;
use crate::hw_trait::gpio::{Gpio, GpioPin, PinMode};
use crate::indicator::{ExitBlink, IndicatorController};
use crate::notify::{LogTransport, SmsTransport, Transport};
use crate::shutdown;
use crate::tracing::prelude::*;

/// How the process was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Launch {
    /// Started directly when power came up.
    Direct,
    /// Handed over from an external bootstrap that already announced the
    /// alarm.
    Resumed,
}

/// Run a session on the host's sysfs GPIO and power off at the end.
///
/// `local_offset` is used for message timestamps when the configuration
/// does not name an offset; resolve it before the runtime starts threads.
pub async fn run(config: Config, launch: Launch, local_offset: UtcOffset) -> Result<SessionReport> {
    config.validate()?;

    let wall: Arc<dyn WallClock> =
        Arc::new(SystemClock::new(config.utc_offset.unwrap_or(local_offset)));
    announce(launch, wall.as_ref());

    let mut gpio = SysfsGpio::new(&config.pins.sysfs_root);
    let red = gpio.pin(config.pins.red_led).await?;
    let yellow = gpio.pin(config.pins.yellow_led).await?;
    let indicator = IndicatorController::new(Box::new(red), Box::new(yellow)).await?;

    let mut button_line = gpio.pin(config.pins.button).await?;
    button_line.set_mode(PinMode::Input).await?;
    let edge_line = gpio.pin(config.pins.button).await?;
    let button = ButtonMonitor::new(Box::new(button_line), config.timing.settle_delay);

    let cancel = CancellationToken::new();
    let edge_source = tokio::spawn(watch_rising_edges(
        Box::new(edge_line),
        button.edge_handle(),
        EdgeSourceConfig {
            sample_interval: config.timing.edge_sample_interval,
            debounce: config.timing.edge_debounce,
        },
        cancel.clone(),
    ));

    let transport: Arc<dyn Transport> = match config.sms.clone() {
        Some(sms) => Arc::new(SmsTransport::new(sms)?),
        None => {
            warn!("No SMS gateway configured; notifications will only be logged");
            Arc::new(LogTransport)
        }
    };

    let supervisor = AlarmSupervisor::new(
        SupervisorConfig {
            poll_interval: config.timing.poll_interval,
            exit_blink: ExitBlink {
                cycles: config.timing.exit_blinks,
                half_period: config.timing.exit_blink_half_period,
            },
        },
        EscalationScheduler::new(&config.escalation, wall),
        button,
        indicator,
        transport,
        shutdown::from_config(&config.shutdown),
    );

    let result = supervisor.run().await;

    cancel.cancel();
    if let Err(e) = edge_source.await {
        warn!(error = %e, "Edge source task ended abnormally");
    }

    result
}

fn announce(launch: Launch, wall: &dyn WallClock) {
    let at = clock::format_timestamp(wall.now());
    match launch {
        Launch::Direct => info!(%at, "initiate alarm sequence"),
        Launch::Resumed => info!(%at, "Resuming alarm sequence after bootstrap"),
    }
}
