//! In-memory GPIO.
//!
//! Every handle shares one line table, so a test (or the simulator) can
//! drive the button line from outside and inspect what the indicator
//! outputs were told to do.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::hw_trait::gpio::{Gpio, GpioPin, PinMode, PinValue};
use crate::hw_trait::{HwError, Result};

#[derive(Debug)]
struct Line {
    level: PinValue,
    mode: PinMode,
    writes: Vec<PinValue>,
    fail_reads: bool,
}

impl Default for Line {
    fn default() -> Self {
        Self {
            level: PinValue::Low,
            mode: PinMode::Input,
            writes: Vec::new(),
            fail_reads: false,
        }
    }
}

/// Simulated GPIO controller. Cloning shares the line table.
#[derive(Debug, Clone, Default)]
pub struct SimGpio {
    lines: Arc<Mutex<HashMap<u8, Line>>>,
}

impl SimGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drive a line from outside, as a switch or sensor would.
    pub fn set_level(&self, number: u8, level: PinValue) {
        self.lines.lock().entry(number).or_default().level = level;
    }

    pub fn level(&self, number: u8) -> PinValue {
        self.lines
            .lock()
            .get(&number)
            .map(|line| line.level)
            .unwrap_or(PinValue::Low)
    }

    /// Every value written to the line, oldest first.
    pub fn writes(&self, number: u8) -> Vec<PinValue> {
        self.lines
            .lock()
            .get(&number)
            .map(|line| line.writes.clone())
            .unwrap_or_default()
    }

    /// Make reads of the line fail, as a disconnected or faulty input would.
    pub fn fail_reads(&self, number: u8, fail: bool) {
        self.lines.lock().entry(number).or_default().fail_reads = fail;
    }
}

#[async_trait]
impl Gpio for SimGpio {
    type Pin = SimGpioPin;

    async fn pin(&mut self, number: u8) -> Result<Self::Pin> {
        self.lines.lock().entry(number).or_default();
        Ok(SimGpioPin {
            lines: Arc::clone(&self.lines),
            number,
        })
    }
}

/// Handle to one simulated line.
#[derive(Debug)]
pub struct SimGpioPin {
    lines: Arc<Mutex<HashMap<u8, Line>>>,
    number: u8,
}

#[async_trait]
impl GpioPin for SimGpioPin {
    fn number(&self) -> u8 {
        self.number
    }

    async fn set_mode(&mut self, mode: PinMode) -> Result<()> {
        let mut lines = self.lines.lock();
        let line = lines.entry(self.number).or_default();
        line.mode = mode;
        if mode == PinMode::Output {
            line.level = PinValue::Low;
        }
        Ok(())
    }

    async fn write(&mut self, value: PinValue) -> Result<()> {
        let mut lines = self.lines.lock();
        let line = lines.entry(self.number).or_default();
        if line.mode != PinMode::Output {
            return Err(HwError::WrongMode(self.number));
        }
        line.level = value;
        line.writes.push(value);
        Ok(())
    }

    async fn read(&mut self) -> Result<PinValue> {
        let lines = self.lines.lock();
        match lines.get(&self.number) {
            Some(line) if line.fail_reads => Err(HwError::Io {
                path: format!("sim/gpio{}", self.number),
                source: io::Error::other("simulated read fault"),
            }),
            Some(line) => Ok(line.level),
            None => Ok(PinValue::Low),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handles_share_line_state() {
        let mut gpio = SimGpio::new();
        let mut a = gpio.pin(17).await.unwrap();
        let mut b = gpio.pin(17).await.unwrap();

        gpio.set_level(17, PinValue::High);
        assert_eq!(a.read().await.unwrap(), PinValue::High);
        assert_eq!(b.read().await.unwrap(), PinValue::High);
    }

    #[tokio::test]
    async fn write_requires_output_mode() {
        let mut gpio = SimGpio::new();
        let mut pin = gpio.pin(4).await.unwrap();

        assert!(matches!(
            pin.write(PinValue::High).await,
            Err(HwError::WrongMode(4))
        ));

        pin.set_mode(PinMode::Output).await.unwrap();
        pin.write(PinValue::High).await.unwrap();
        pin.write(PinValue::Low).await.unwrap();
        assert_eq!(gpio.writes(4), vec![PinValue::High, PinValue::Low]);
    }

    #[tokio::test]
    async fn injected_read_fault() {
        let mut gpio = SimGpio::new();
        let mut pin = gpio.pin(17).await.unwrap();

        gpio.fail_reads(17, true);
        assert!(pin.read().await.is_err());
    }
}
