//! Configuration Module
//!
//! Configuration loading for the hub service.

mod settings;

pub use settings::{ConfigError, HubConfig, ProducerConfig, ServerSettings};
