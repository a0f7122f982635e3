//! GPIO drivers: Linux sysfs for the real board, an in-memory model for
//! tests and the simulator.

pub mod sim;
pub mod sysfs;

pub use sim::{SimGpio, SimGpioPin};
pub use sysfs::{SysfsGpio, SysfsGpioPin};
