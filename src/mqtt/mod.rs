//! # Actuator Messaging Module
//!
//! Sends actuator commands (pump, fan, light, peristaltic dosers) to the HydroBox
//! controller over MQTT and keeps the broker connection alive in the background.
//!
//! ## Why This Module Exists
//!
//! Every switch flip and nutrient dose the grower triggers ends up as a small JSON
//! message on the box's broker. This module owns that path end to end:
//! - Turning a display label into the device id the controller listens for
//! - Encoding a command into its topic and payload
//! - Holding exactly one broker session and regaining it after failures
//! - Publishing at at-least-once and reporting whether the broker acknowledged
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── devices.rs     - Label → device id table with slug fallback
//! ├── command.rs     - Command type and topic/payload encoding
//! ├── config.rs      - Broker settings and per-attempt session options
//! ├── transport.rs   - Broker session traits and the rumqttc implementation
//! ├── connection.rs  - Connection manager and its retry worker
//! ├── publisher.rs   - Best-effort publish with ack timeout
//! └── error.rs       - Connection, command and publish errors
//! ```
//!
//! ## Control Flow
//!
//! ```text
//! label ──resolve──► device id ──► Command ──encode──► (topic, payload)
//!                                                          │
//!                                  Publisher::publish ◄────┘
//!                                          │ reads current session
//!                                          ▼
//!                                  ConnectionManager ──► broker
//! ```
//!
//! ## Failure Policy
//!
//! - **Connection failures** are absorbed: logged, then retried on a fixed interval.
//! - **Invalid commands** are returned to the caller before any network activity.
//! - **Publish failures** (no session, ack timeout, broker error) are returned to the
//!   caller as [`PublishResult::Failed`] and are never retried or queued.
//!
//! Commands published concurrently carry no ordering guarantee relative to each other.

pub mod command;
pub mod config;
pub mod connection;
pub mod devices;
pub mod error;
pub mod publisher;
pub mod transport;

pub use command::{encode, Command, EncodedCommand};
pub use config::{BrokerConfig, SessionOptions};
pub use connection::{ConnectionManager, ConnectionState};
pub use devices::resolve;
pub use error::{CommandError, ConnectionError, PublishFailure};
pub use publisher::{PublishResult, Publisher};
pub use transport::{BrokerLink, BrokerTransport, Qos, RumqttTransport};
