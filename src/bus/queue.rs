use crate::bus::InboundEvent;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const DEFAULT_CAPACITY: usize = 256;
/// Timeout for queue send operations so a stalled consumer cannot wedge
/// webhook handlers indefinitely.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Bounded handoff between the webhook gateway and the dispatch loop.
#[derive(Clone)]
pub struct EventQueue {
    tx: mpsc::Sender<InboundEvent>,
}

impl EventQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<InboundEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub fn with_default_capacity() -> (Self, mpsc::Receiver<InboundEvent>) {
        Self::new(DEFAULT_CAPACITY)
    }

    pub async fn publish(&self, event: InboundEvent) -> Result<()> {
        let message_id = event.message_id.clone();
        let sender = event.sender.clone();
        tokio::time::timeout(SEND_TIMEOUT, self.tx.send(event))
            .await
            .map_err(|_| {
                warn!(
                    "inbound send timed out after {}s, queue full or dispatch loop stalled",
                    SEND_TIMEOUT.as_secs()
                );
                anyhow::anyhow!("inbound send timed out, queue full")
            })?
            .context("Failed to queue inbound event - receiver closed")?;
        debug!("inbound event queued: id={}, sender={}", message_id, sender);
        Ok(())
    }
}
