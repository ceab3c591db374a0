//! HTTP client for the HydroBox backend: login, crop selection, measurement
//! history and the sensor catalogue.
//!
//! This side of the app is independent of the actuator messaging in [`crate::mqtt`].

pub mod client;
pub mod config;
pub mod error;
pub mod models;

pub use client::HydroApi;
pub use config::ApiConfig;
pub use error::ApiError;
pub use models::{ApiCrop, ApiSensor, ApiUser, Measurement};
