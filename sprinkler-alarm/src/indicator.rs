//! Red/yellow heartbeat lights.
//!
//! The blink is driven by poll ticks, not wall time, so its period is only
//! as regular as the poll loop. It tells a passer-by that the agent is
//! alive; nothing depends on its timing.

use std::time::Duration;

use tokio::time;

use crate::hw_trait::gpio::{GpioPin, PinMode, PinValue};
use crate::hw_trait::Result;
use crate::tracing::prelude::*;

/// Ticks before red comes on.
const RED_AFTER_TICKS: u32 = 10;
/// Ticks before yellow takes over and the counter restarts.
const YELLOW_AFTER_TICKS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorState {
    Off,
    RedOn,
    YellowOn,
}

/// Exit blink shape.
#[derive(Debug, Clone, Copy)]
pub struct ExitBlink {
    pub cycles: u32,
    pub half_period: Duration,
}

pub struct IndicatorController {
    red: Box<dyn GpioPin>,
    yellow: Box<dyn GpioPin>,
    flipflop: u32,
    state: IndicatorState,
}

impl IndicatorController {
    /// Take the two lines and configure them as outputs, both off.
    pub async fn new(mut red: Box<dyn GpioPin>, mut yellow: Box<dyn GpioPin>) -> Result<Self> {
        red.set_mode(PinMode::Output).await?;
        yellow.set_mode(PinMode::Output).await?;

        Ok(Self {
            red,
            yellow,
            flipflop: 0,
            state: IndicatorState::Off,
        })
    }

    pub fn state(&self) -> IndicatorState {
        self.state
    }

    /// Count one poll tick and return the new state if it changed.
    ///
    /// Red comes on once the counter passes 10; once it passes 20 yellow
    /// replaces red and the counter restarts. The previous colour holds in
    /// between.
    fn step(&mut self) -> Option<IndicatorState> {
        self.flipflop += 1;

        let next = if self.flipflop > YELLOW_AFTER_TICKS {
            self.flipflop = 0;
            IndicatorState::YellowOn
        } else if self.flipflop > RED_AFTER_TICKS {
            IndicatorState::RedOn
        } else {
            return None;
        };

        if next == self.state {
            return None;
        }
        self.state = next;
        Some(next)
    }

    /// Advance the heartbeat by one tick, driving the lines on a change.
    pub async fn advance(&mut self) {
        if let Some(state) = self.step() {
            self.apply(state).await;
        }
    }

    /// Blink yellow `cycles` times with red held off, then leave both off.
    ///
    /// Runs to completion. A failed write is logged and the blink continues
    /// so the sequence always takes its full time. Returns the number of
    /// cycles played.
    pub async fn exit_sequence(&mut self, blink: ExitBlink) -> u32 {
        self.apply(IndicatorState::Off).await;

        for _ in 0..blink.cycles {
            drive(&mut self.yellow, PinValue::High).await;
            time::sleep(blink.half_period).await;
            drive(&mut self.yellow, PinValue::Low).await;
            time::sleep(blink.half_period).await;
        }

        blink.cycles
    }

    /// Drive both lines low.
    pub async fn all_off(&mut self) {
        self.apply(IndicatorState::Off).await;
    }

    async fn apply(&mut self, state: IndicatorState) {
        self.state = state;
        // Off before on, so the two lines are never lit together.
        match state {
            IndicatorState::Off => {
                drive(&mut self.red, PinValue::Low).await;
                drive(&mut self.yellow, PinValue::Low).await;
            }
            IndicatorState::RedOn => {
                drive(&mut self.yellow, PinValue::Low).await;
                drive(&mut self.red, PinValue::High).await;
            }
            IndicatorState::YellowOn => {
                drive(&mut self.red, PinValue::Low).await;
                drive(&mut self.yellow, PinValue::High).await;
            }
        }
    }
}

async fn drive(pin: &mut Box<dyn GpioPin>, value: PinValue) {
    if let Err(e) = pin.write(value).await {
        warn!(pin = pin.number(), ?value, error = %e, "Indicator write failed");
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::Instant;

    use crate::gpio::SimGpio;
    use crate::hw_trait::gpio::Gpio;

    use super::*;

    const RED: u8 = 18;
    const YELLOW: u8 = 4;

    async fn controller(gpio: &mut SimGpio) -> IndicatorController {
        let red = gpio.pin(RED).await.unwrap();
        let yellow = gpio.pin(YELLOW).await.unwrap();
        IndicatorController::new(Box::new(red), Box::new(yellow))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn heartbeat_pattern() {
        let mut gpio = SimGpio::new();
        let mut indicator = controller(&mut gpio).await;

        let mut states = Vec::new();
        for _ in 0..42 {
            indicator.advance().await;
            states.push(indicator.state());
        }

        assert!(states[..10].iter().all(|s| *s == IndicatorState::Off));
        assert!(states[10..20].iter().all(|s| *s == IndicatorState::RedOn));
        assert_eq!(states[20], IndicatorState::YellowOn);
        // After the restart yellow holds until red comes back.
        assert!(states[21..31].iter().all(|s| *s == IndicatorState::YellowOn));
        assert_eq!(states[31], IndicatorState::RedOn);
        assert_eq!(states[41], IndicatorState::YellowOn);
    }

    #[tokio::test]
    async fn never_both_lit() {
        let mut gpio = SimGpio::new();
        let mut indicator = controller(&mut gpio).await;

        for _ in 0..100 {
            indicator.advance().await;
            let both = gpio.level(RED).is_high() && gpio.level(YELLOW).is_high();
            assert!(!both);
        }
    }

    #[tokio::test]
    async fn writes_only_on_change() {
        let mut gpio = SimGpio::new();
        let mut indicator = controller(&mut gpio).await;

        for _ in 0..21 {
            indicator.advance().await;
        }

        // Red on (yellow off, red high), then yellow on (red off, yellow high).
        assert_eq!(gpio.writes(RED), [PinValue::High, PinValue::Low]);
        assert_eq!(gpio.writes(YELLOW), [PinValue::Low, PinValue::High]);
    }

    #[tokio::test(start_paused = true)]
    async fn exit_sequence_blinks_yellow() {
        let mut gpio = SimGpio::new();
        let mut indicator = controller(&mut gpio).await;
        for _ in 0..15 {
            indicator.advance().await;
        }
        assert_eq!(gpio.level(RED), PinValue::High);

        let start = Instant::now();
        let cycles = indicator
            .exit_sequence(ExitBlink {
                cycles: 6,
                half_period: Duration::from_millis(500),
            })
            .await;

        assert_eq!(cycles, 6);
        assert_eq!(start.elapsed(), Duration::from_secs(6));
        assert_eq!(gpio.level(RED), PinValue::Low);
        assert_eq!(gpio.level(YELLOW), PinValue::Low);

        let highs = gpio
            .writes(YELLOW)
            .iter()
            .filter(|v| v.is_high())
            .count();
        assert_eq!(highs, 6);
    }
}
