//! Notification transports.
//!
//! The alarm hands each escalation message to a [`Transport`] and moves on.
//! Whatever the transport reports is logged, never retried: a lost SMS is a
//! known gap of this design, not something the escalation ladder reacts to.

pub mod sms;

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::escalation::Contact;
use crate::tracing::prelude::*;

pub use sms::SmsTransport;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("gateway rejected message to {recipient}: HTTP {status}: {detail}")]
    Rejected {
        recipient: String,
        status: u16,
        detail: String,
    },

    #[error("{failed} of {total} recipients not reached")]
    Partial { failed: usize, total: usize },
}

/// Delivers a message to a list of recipients.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: &str, recipients: &[Contact]) -> Result<(), TransportError>;
}

/// Writes notifications to the log instead of sending them. Used when no
/// SMS gateway is configured.
#[derive(Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl Transport for LogTransport {
    async fn send(&self, message: &str, recipients: &[Contact]) -> Result<(), TransportError> {
        let to: Vec<&str> = recipients.iter().map(Contact::as_str).collect();
        warn!(?to, message, "No SMS gateway configured; notification logged only");
        Ok(())
    }
}

/// A message captured by [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub at: Instant,
    pub message: String,
    pub recipients: Vec<Contact>,
}

/// Keeps every message in memory. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    sent: Arc<Mutex<Vec<SentMessage>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, message: &str, recipients: &[Contact]) -> Result<(), TransportError> {
        self.sent.lock().push(SentMessage {
            at: Instant::now(),
            message: message.to_string(),
            recipients: recipients.to_vec(),
        });
        Ok(())
    }
}
