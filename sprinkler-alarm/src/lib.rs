//! Fire sprinkler alarm agent.
//!
//! Once the host is powered by the sprinkler flow switch, the agent runs an
//! escalating notification schedule until somebody acknowledges the alarm
//! with the physical button, then powers the host down.

pub mod alarm;
pub mod button;
pub mod clock;
pub mod config;
pub mod daemon;
pub mod error;
pub mod escalation;
pub mod gpio;
pub mod hw_trait;
pub mod indicator;
pub mod notify;
pub mod shutdown;
pub mod tracing;
