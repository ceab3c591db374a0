//! Command publisher
//!
//! Best-effort delivery of actuator commands. A command is sent over whatever session
//! the connection manager holds at the moment of the call; with no session it fails
//! straight away. Nothing is queued for later: a dose replayed minutes after the
//! grower asked for it can overdose the reservoir.

use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::command::{encode, Command};
use super::connection::ConnectionManager;
use super::error::{CommandError, PublishFailure};
use super::transport::Qos;

pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of one publish attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishResult {
    Delivered,
    Failed(PublishFailure),
}

impl PublishResult {
    pub fn is_delivered(&self) -> bool {
        matches!(self, PublishResult::Delivered)
    }
}

impl fmt::Display for PublishResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PublishResult::Delivered => write!(f, "delivered"),
            PublishResult::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Publisher {
    manager: ConnectionManager,
    ack_timeout: Duration,
}

impl Publisher {
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            manager,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }

    pub fn with_ack_timeout(mut self, ack_timeout: Duration) -> Self {
        self.ack_timeout = ack_timeout;
        self
    }

    /// Publishes a raw payload, waiting at most the ack timeout for the broker.
    pub async fn publish(&self, topic: &str, payload: &[u8], qos: Qos) -> PublishResult {
        // Looked up on every call, never stored: a reconnect swaps the session underneath us
        let Some(link) = self.manager.current_connection() else {
            warn!("Publish to {} skipped: no connection", topic);
            return PublishResult::Failed(PublishFailure::NoConnection);
        };

        debug!(
            "Publishing {} bytes to {} at {} via {}",
            payload.len(),
            topic,
            qos,
            link.client_id()
        );

        match tokio::time::timeout(self.ack_timeout, link.publish(topic, payload.to_vec(), qos))
            .await
        {
            Ok(Ok(())) => {
                info!("Publish ok {} {}", topic, String::from_utf8_lossy(payload));
                PublishResult::Delivered
            }
            Ok(Err(reason)) => {
                warn!("Publish error {}: {}", topic, reason);
                PublishResult::Failed(reason)
            }
            Err(_) => {
                warn!(
                    "Publish to {} not acknowledged within {:?}",
                    topic, self.ack_timeout
                );
                PublishResult::Failed(PublishFailure::Timeout)
            }
        }
    }

    /// Encodes and publishes a command at at-least-once.
    ///
    /// Contract violations come back as `Err` before anything is sent; delivery
    /// problems come back as `Ok(PublishResult::Failed(..))`.
    pub async fn send(&self, command: &Command) -> Result<PublishResult, CommandError> {
        let encoded = encode(command).map_err(|e| {
            warn!("Rejected command {}: {}", command, e);
            e
        })?;
        info!("Sending {}", command);
        Ok(self
            .publish(&encoded.topic, &encoded.payload, Qos::AtLeastOnce)
            .await)
    }
}
