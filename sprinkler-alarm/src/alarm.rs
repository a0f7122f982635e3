//! The alarm session and its poll loop.
//!
//! # State Machine
//!
//! ```text
//!            button seen pressed            exit blink done
//!  Running ─────────────────────► Acknowledging ─────────────► Terminated
//!     ▲ │                                                          │
//!     └─┘ tick: escalate, heartbeat, release check                 ▼
//!                                                           shutdown, once
//! ```
//!
//! One [`AlarmSupervisor`] exists per activation. Nothing stops it except
//! the button: there is no timeout, and once acknowledging begins the exit
//! blink and shutdown always run.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};

use crate::button::{ButtonMonitor, ButtonState};
use crate::error::Result;
use crate::escalation::{Contact, EscalationScheduler, NotificationEvent};
use crate::indicator::{ExitBlink, IndicatorController};
use crate::notify::Transport;
use crate::shutdown::Shutdown;
use crate::tracing::prelude::*;

/// Elapsed time since activation, from the monotonic clock.
#[derive(Debug)]
pub struct AlarmSession {
    start: Instant,
    elapsed_secs: u64,
}

impl AlarmSession {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            elapsed_secs: 0,
        }
    }

    /// Whole seconds since activation. Never decreases.
    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    /// Bring the counter up to date with the clock.
    fn advance(&mut self) -> u64 {
        let now = Instant::now().saturating_duration_since(self.start).as_secs();
        self.elapsed_secs = self.elapsed_secs.max(now);
        self.elapsed_secs
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Acknowledging,
    Terminated,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub elapsed_secs: u64,
    pub notifications: u32,
    pub exit_blinks: u32,
}

/// Poll loop settings.
#[derive(Debug, Clone, Copy)]
pub struct SupervisorConfig {
    pub poll_interval: Duration,
    pub exit_blink: ExitBlink,
}

/// Runs one alarm session from activation to shutdown.
pub struct AlarmSupervisor {
    config: SupervisorConfig,
    session: AlarmSession,
    state: SessionState,
    scheduler: EscalationScheduler,
    button: ButtonMonitor,
    indicator: IndicatorController,
    transport: Arc<dyn Transport>,
    shutdown: Box<dyn Shutdown>,
    notifications: u32,
}

impl AlarmSupervisor {
    /// Start the session clock. Build the supervisor at activation time.
    pub fn new(
        config: SupervisorConfig,
        scheduler: EscalationScheduler,
        button: ButtonMonitor,
        indicator: IndicatorController,
        transport: Arc<dyn Transport>,
        shutdown: Box<dyn Shutdown>,
    ) -> Self {
        Self {
            config,
            session: AlarmSession::start(),
            state: SessionState::Running,
            scheduler,
            button,
            indicator,
            transport,
            shutdown,
            notifications: 0,
        }
    }

    /// Drive the session to completion and power off.
    ///
    /// Returns only after the shutdown action has run. An error from the
    /// shutdown action is passed back; it has still been invoked exactly
    /// once.
    pub async fn run(mut self) -> Result<SessionReport> {
        info!(poll_ms = self.config.poll_interval.as_millis() as u64, "Alarm session started");

        let mut interval = time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut exit_blinks = 0;
        loop {
            match self.state {
                SessionState::Running => {
                    interval.tick().await;
                    self.tick().await;
                }
                SessionState::Acknowledging => {
                    exit_blinks = self.indicator.exit_sequence(self.config.exit_blink).await;
                    self.transition(SessionState::Terminated);
                }
                SessionState::Terminated => break,
            }
        }

        self.indicator.all_off().await;

        let report = SessionReport {
            elapsed_secs: self.session.elapsed_secs(),
            notifications: self.notifications,
            exit_blinks,
        };
        info!(
            elapsed_secs = report.elapsed_secs,
            notifications = report.notifications,
            "Alarm session ended"
        );

        self.shutdown.power_off().await?;
        Ok(report)
    }

    /// One pass of the Running state.
    async fn tick(&mut self) {
        let elapsed = self.session.advance();

        if let Some(event) = self.scheduler.on_tick(elapsed) {
            self.dispatch(event).await;
        }

        self.indicator.advance().await;

        // Sample before the release check: a press shorter than one tick has
        // already been released by now, and the check would clear it unseen.
        let acknowledged = self.button.state() == ButtonState::Pressed;
        self.button.check_release().await;

        if acknowledged {
            info!(elapsed_secs = elapsed, "Alarm acknowledged");
            self.transition(SessionState::Acknowledging);
        }
    }

    async fn dispatch(&mut self, event: NotificationEvent) {
        let to: Vec<&str> = event.recipients.iter().map(Contact::as_str).collect();
        info!(
            step = %event.kind,
            elapsed_secs = event.elapsed_secs,
            ?to,
            message = %event.message,
            "Sending notification"
        );

        self.notifications += 1;
        if let Err(e) = self.transport.send(&event.message, &event.recipients).await {
            warn!(step = %event.kind, error = %e, "Notification not delivered; escalation continues");
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "Session state change");
        self.state = next;
    }
}
