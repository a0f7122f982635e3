//! GPIO implementation using the Linux sysfs interface.
//!
//! Lines are exported through `<root>/export` and driven through
//! `<root>/gpioN/{direction,value}`. The kernel's character device API is
//! the modern replacement, but sysfs is still what the Raspberry Pi images
//! this agent ships on enable by default.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::{fs, time};

use crate::hw_trait::gpio::{Gpio, GpioPin, PinMode, PinValue};
use crate::hw_trait::{HwError, Result};

/// udev fixes up permissions on freshly exported lines asynchronously.
const EXPORT_POLL: Duration = Duration::from_millis(10);
const EXPORT_ATTEMPTS: u32 = 20;

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> HwError + '_ {
    move |source| HwError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// GPIO controller backed by `/sys/class/gpio` (or another root, for tests).
pub struct SysfsGpio {
    root: PathBuf,
}

impl SysfsGpio {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn export(&self, number: u8, line_dir: &Path) -> Result<()> {
        if fs::try_exists(line_dir).await.unwrap_or(false) {
            return Ok(());
        }

        let export = self.root.join("export");
        fs::write(&export, number.to_string())
            .await
            .map_err(io_error(&export))?;

        for _ in 0..EXPORT_ATTEMPTS {
            if fs::try_exists(line_dir.join("value")).await.unwrap_or(false) {
                return Ok(());
            }
            time::sleep(EXPORT_POLL).await;
        }

        Err(HwError::InvalidParameter(format!(
            "GPIO {number} did not appear under {} after export",
            self.root.display()
        )))
    }
}

#[async_trait]
impl Gpio for SysfsGpio {
    type Pin = SysfsGpioPin;

    async fn pin(&mut self, number: u8) -> Result<Self::Pin> {
        let line_dir = self.root.join(format!("gpio{number}"));
        self.export(number, &line_dir).await?;

        Ok(SysfsGpioPin {
            value_path: line_dir.join("value"),
            direction_path: line_dir.join("direction"),
            number,
        })
    }
}

/// One exported sysfs line.
pub struct SysfsGpioPin {
    value_path: PathBuf,
    direction_path: PathBuf,
    number: u8,
}

#[async_trait]
impl GpioPin for SysfsGpioPin {
    fn number(&self) -> u8 {
        self.number
    }

    async fn set_mode(&mut self, mode: PinMode) -> Result<()> {
        // "low" both switches the line to output and drives it low in one
        // write, so the indicator never glitches high during setup.
        let direction = match mode {
            PinMode::Input => "in",
            PinMode::Output => "low",
        };
        fs::write(&self.direction_path, direction)
            .await
            .map_err(io_error(&self.direction_path))
    }

    async fn write(&mut self, value: PinValue) -> Result<()> {
        let raw = u8::from(value).to_string();
        fs::write(&self.value_path, raw)
            .await
            .map_err(io_error(&self.value_path))
    }

    async fn read(&mut self) -> Result<PinValue> {
        let raw = fs::read_to_string(&self.value_path)
            .await
            .map_err(io_error(&self.value_path))?;

        match raw.trim() {
            "0" => Ok(PinValue::Low),
            "1" => Ok(PinValue::High),
            other => Err(HwError::InvalidParameter(format!(
                "unexpected value {other:?} on GPIO {}",
                self.number
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lay out a fake sysfs tree with the line already exported.
    async fn fake_root(number: u8) -> PathBuf {
        let root = std::env::temp_dir().join(format!(
            "sprinkler-sysfs-{}-{number}",
            std::process::id()
        ));
        let line = root.join(format!("gpio{number}"));
        fs::create_dir_all(&line).await.unwrap();
        fs::write(line.join("value"), "0\n").await.unwrap();
        fs::write(line.join("direction"), "in\n").await.unwrap();
        root
    }

    #[tokio::test]
    async fn writes_direction_and_value() {
        let root = fake_root(18).await;
        let mut gpio = SysfsGpio::new(&root);
        let mut pin = gpio.pin(18).await.unwrap();

        pin.set_mode(PinMode::Output).await.unwrap();
        pin.write(PinValue::High).await.unwrap();

        let line = root.join("gpio18");
        assert_eq!(fs::read_to_string(line.join("direction")).await.unwrap(), "low");
        assert_eq!(fs::read_to_string(line.join("value")).await.unwrap(), "1");
        assert_eq!(pin.read().await.unwrap(), PinValue::High);

        fs::remove_dir_all(root).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_garbage_value() {
        let root = fake_root(17).await;
        fs::write(root.join("gpio17/value"), "x\n").await.unwrap();

        let mut pin = SysfsGpio::new(&root).pin(17).await.unwrap();
        assert!(matches!(
            pin.read().await,
            Err(HwError::InvalidParameter(_))
        ));

        fs::remove_dir_all(root).await.unwrap();
    }

    #[tokio::test]
    async fn export_fails_without_sysfs() {
        let root = std::env::temp_dir().join(format!(
            "sprinkler-sysfs-missing-{}",
            std::process::id()
        ));
        let mut gpio = SysfsGpio::new(&root);
        assert!(matches!(gpio.pin(4).await, Err(HwError::Io { .. })));
    }
}
