//! Error types for the actuator messaging layer

use thiserror::Error;

/// Failure to establish or keep a broker session.
///
/// Never returned to the caller of `ConnectionManager::connect`; the connection
/// worker logs it and schedules the next attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("Failed to reach broker {addr}: {reason}")]
    Unreachable { addr: String, reason: String },

    #[error("Broker refused connection: {0}")]
    Refused(String),

    #[error("Connection attempt timed out after {0}s")]
    Timeout(u64),

    #[error("Connection closed: {0}")]
    Closed(String),
}

/// A command that violates its contract and must not reach the wire.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

/// Why a publish did not end in a broker acknowledgement.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PublishFailure {
    #[error("no connection")]
    NoConnection,

    #[error("timeout")]
    Timeout,

    #[error("{0}")]
    Rejected(String),
}
