//! Digital I/O traits.

use async_trait::async_trait;

use super::Result;

/// Logic level of a pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinValue {
    Low,
    High,
}

impl PinValue {
    pub fn is_high(self) -> bool {
        self == PinValue::High
    }
}

impl From<bool> for PinValue {
    fn from(high: bool) -> Self {
        if high { PinValue::High } else { PinValue::Low }
    }
}

impl From<PinValue> for u8 {
    fn from(value: PinValue) -> Self {
        match value {
            PinValue::Low => 0,
            PinValue::High => 1,
        }
    }
}

/// Direction of a pin. Outputs start low.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
}

/// A GPIO controller that hands out pins by number.
///
/// Requesting the same number twice yields two handles to the same line.
/// The edge source and the release check rely on this to read the button
/// from separate tasks.
#[async_trait]
pub trait Gpio: Send {
    type Pin: GpioPin + 'static;

    async fn pin(&mut self, number: u8) -> Result<Self::Pin>;
}

/// A single digital line.
#[async_trait]
pub trait GpioPin: Send {
    /// Line number, for logging.
    fn number(&self) -> u8;

    async fn set_mode(&mut self, mode: PinMode) -> Result<()>;

    async fn write(&mut self, value: PinValue) -> Result<()>;

    async fn read(&mut self) -> Result<PinValue>;
}
