//! HydroBox controller core.
//!
//! - [`mqtt`]: actuator commands and the resilient broker connection
//! - [`api`]: HTTP client for sensors, measurement history and crop selection
//! - [`crops`]: crop catalogue and cycle-day arithmetic
//! - [`config`]: the TOML configuration file

pub mod api;
pub mod config;
pub mod crops;
pub mod mqtt;
