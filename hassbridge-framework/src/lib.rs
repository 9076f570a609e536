//! hassbridge Bridge Framework
//!
//! Common abstractions for building bridges that expose field devices to Home
//! Assistant over MQTT.
//!
//! # Overview
//!
//! This framework provides:
//! - [`BridgeConfig`] trait for configuration loading and validation
//! - [`BridgeRunner`] for supervising bridge modules (startup, shutdown, signal handling)
//! - [`MqttSession`] for a broker connection driven on a background task
//! - [`MessageHandler`] and [`Dispatcher`] for reacting to broker events
//! - [`MessageBus`] and [`Publisher`] for publishing and subscribing
//! - [`BridgeArgs`] for common CLI argument parsing
//!
//! # Example
//!
//! ```ignore
//! use hassbridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = BridgeArgs::parse_with_default("mybridge.json5");
//!     let config = MyBridgeConfig::load(&args.config)?;
//!
//!     let mut runner = BridgeRunner::init("mybridge", &config, Some(&args))?;
//!
//!     // Spawn modules, each with its own MQTT session
//!     runner.spawn_module("switch", |shutdown| run_switch(config.clone(), shutdown));
//!
//!     // Run until Ctrl+C
//!     runner.run().await?;
//!     Ok(())
//! }
//! ```

mod args;
mod config;
mod error;
mod publisher;
mod runner;
mod session;

pub use args::BridgeArgs;
pub use config::{BridgeConfig, validate_node_id};
pub use error::{BridgeError, Result};
pub use publisher::{MessageBus, PublishStats, Publisher, publish_discovery};
pub use runner::{BridgeRunner, shutdown_signal};
pub use session::{
    BusEvent, Dispatcher, EventSource, MessageHandler, MqttSession, SessionState, serve,
};

// Re-export commonly used types from hassbridge-common
pub use hassbridge_common::{LogFormat, LoggingConfig, MqttConfig};
