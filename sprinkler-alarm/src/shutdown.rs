//! Host power-down at the end of a session.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::ShutdownConfig;
use crate::error::{Error, Result};
use crate::tracing::prelude::*;

/// Action run once after the session reaches its terminal state.
#[async_trait]
pub trait Shutdown: Send {
    async fn power_off(&mut self) -> Result<()>;
}

/// Build the shutdown action described by `config`.
pub fn from_config(config: &ShutdownConfig) -> Box<dyn Shutdown> {
    if config.dry_run {
        Box::new(DryRunShutdown)
    } else {
        Box::new(CommandShutdown::new(config.command.clone()))
    }
}

/// Flushes filesystems and runs a host command such as `shutdown -h now`.
pub struct CommandShutdown {
    command: Vec<String>,
}

impl CommandShutdown {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl Shutdown for CommandShutdown {
    async fn power_off(&mut self) -> Result<()> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| Error::Shutdown("empty shutdown command".into()))?;

        // The SD card is the only storage; get logs onto it before power
        // is cut.
        nix::unistd::sync();

        info!(command = ?self.command, "Powering off host");
        let status = Command::new(program)
            .args(args)
            .status()
            .await
            .map_err(|e| Error::Shutdown(format!("{program}: {e}")))?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::Shutdown(format!("{program} exited with {status}")))
        }
    }
}

/// Logs instead of powering off.
#[derive(Debug, Default)]
pub struct DryRunShutdown;

#[async_trait]
impl Shutdown for DryRunShutdown {
    async fn power_off(&mut self) -> Result<()> {
        info!("Dry run: host would power off now");
        Ok(())
    }
}

/// Counts invocations. Clones share the count.
#[derive(Debug, Clone, Default)]
pub struct CountingShutdown {
    calls: Arc<AtomicU32>,
}

impl CountingShutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Shutdown for CountingShutdown {
    async fn power_off(&mut self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn command_success() {
        let mut shutdown = CommandShutdown::new(vec!["true".into()]);
        shutdown.power_off().await.unwrap();
    }

    #[tokio::test]
    async fn command_failure_is_reported() {
        let mut shutdown = CommandShutdown::new(vec!["false".into()]);
        assert!(matches!(shutdown.power_off().await, Err(Error::Shutdown(_))));
    }

    #[tokio::test]
    async fn missing_program_is_reported() {
        let mut shutdown =
            CommandShutdown::new(vec!["/nonexistent/sprinkler-shutdown".into()]);
        assert!(matches!(shutdown.power_off().await, Err(Error::Shutdown(_))));
    }

    #[tokio::test]
    async fn dry_run_from_config() {
        let config = ShutdownConfig {
            command: vec!["false".into()],
            dry_run: true,
        };
        from_config(&config).power_off().await.unwrap();
    }
}
