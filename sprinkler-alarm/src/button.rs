//! Debounced acknowledgment button.
//!
//! Two execution contexts share one [`ButtonState`]:
//!
//! ```text
//!               EdgeHandle::on_rising_edge          (edge source task)
//!   Idle ────────────────────────────────────► Pressed
//!    ▲                                            │
//!    └────────────────────────────────────────────┘
//!               ButtonMonitor::check_release        (poll loop, once per tick)
//! ```
//!
//! Each transition has exactly one writer, so the state lives in a single
//! atomic and both writers use compare-and-swap on their own edge. The edge
//! side never clears a press and the release side never creates one.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::hw_trait::gpio::{GpioPin, PinValue};
use crate::tracing::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ButtonState {
    Idle = 0,
    Pressed = 1,
}

impl ButtonState {
    fn from_raw(raw: u8) -> Self {
        if raw == ButtonState::Pressed as u8 {
            ButtonState::Pressed
        } else {
            ButtonState::Idle
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: AtomicU8,
    presses: AtomicU32,
}

impl Shared {
    fn load(&self) -> ButtonState {
        ButtonState::from_raw(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: ButtonState, to: ButtonState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Poll-loop side of the button: owns the input line for release checks.
pub struct ButtonMonitor {
    shared: Arc<Shared>,
    input: Box<dyn GpioPin>,
    settle_delay: Duration,
}

impl ButtonMonitor {
    pub fn new(input: Box<dyn GpioPin>, settle_delay: Duration) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            input,
            settle_delay,
        }
    }

    /// Handle for the edge context. Cheap to clone.
    pub fn edge_handle(&self) -> EdgeHandle {
        EdgeHandle {
            shared: Arc::clone(&self.shared),
            settle_delay: self.settle_delay,
        }
    }

    pub fn state(&self) -> ButtonState {
        self.shared.load()
    }

    /// Clear a press once the button is physically released.
    ///
    /// Waits the settle delay, samples the line and moves Pressed to Idle
    /// only if it reads low. A read fault counts as released. Returns the
    /// state after the check.
    pub async fn check_release(&mut self) -> ButtonState {
        time::sleep(self.settle_delay).await;

        let level = match self.input.read().await {
            Ok(level) => level,
            Err(e) => {
                debug!(pin = self.input.number(), error = %e, "Button read failed, treating as released");
                PinValue::Low
            }
        };

        if level == PinValue::Low && self.shared.transition(ButtonState::Pressed, ButtonState::Idle)
        {
            debug!("Button released");
        }

        self.shared.load()
    }
}

/// Edge-context side of the button.
#[derive(Clone)]
pub struct EdgeHandle {
    shared: Arc<Shared>,
    settle_delay: Duration,
}

impl EdgeHandle {
    /// Register a rising edge.
    ///
    /// Waits the settle delay, then moves Idle to Pressed. Returns whether
    /// this call made the transition; an edge while already pressed is
    /// absorbed.
    pub async fn on_rising_edge(&self) -> bool {
        time::sleep(self.settle_delay).await;

        if self.shared.transition(ButtonState::Idle, ButtonState::Pressed) {
            let count = self.shared.presses.fetch_add(1, Ordering::Relaxed) + 1;
            info!(press = count, "Button pressed");
            true
        } else {
            trace!("Rising edge while already pressed");
            false
        }
    }

    /// Idle to Pressed transitions so far.
    pub fn presses(&self) -> u32 {
        self.shared.presses.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> ButtonState {
        self.shared.load()
    }
}

/// Timing of the edge source.
#[derive(Debug, Clone, Copy)]
pub struct EdgeSourceConfig {
    pub sample_interval: Duration,
    /// Rising edges within this window of the last accepted edge are bounce.
    pub debounce: Duration,
}

/// Watch `input` for rising edges and deliver them to `edge` until
/// `cancel` fires.
///
/// Plays the role of the kernel's edge interrupt: it runs beside the poll
/// loop and enforces the debounce window itself, so `on_rising_edge` sees
/// at most one edge per window. Read faults are treated as a low line.
pub async fn watch_rising_edges(
    mut input: Box<dyn GpioPin>,
    edge: EdgeHandle,
    config: EdgeSourceConfig,
    cancel: CancellationToken,
) {
    trace!(pin = input.number(), "Edge source started");

    let mut interval = time::interval(config.sample_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // A line already high at start is not an edge.
    let mut previous = input.read().await.unwrap_or(PinValue::Low);
    let mut last_accepted: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let level = input.read().await.unwrap_or(PinValue::Low);
                let rising = previous == PinValue::Low && level == PinValue::High;
                previous = level;

                if !rising {
                    continue;
                }

                let now = Instant::now();
                if last_accepted.is_some_and(|at| now.duration_since(at) < config.debounce) {
                    trace!("Rising edge inside debounce window ignored");
                    continue;
                }
                last_accepted = Some(now);

                edge.on_rising_edge().await;
            }
        }
    }

    trace!("Edge source stopped");
}
