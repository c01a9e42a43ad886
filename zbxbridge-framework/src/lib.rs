//! Bridge Framework
//!
//! Common abstractions for building bridges that forward broker messages to a
//! monitoring sink.
//!
//! # Overview
//!
//! This framework provides:
//! - [`BridgeConfig`] trait for configuration loading and validation
//! - [`BridgeRunner`] for managing bridge lifecycle (logging, signal handling, exit)
//! - [`Shutdown`] for cooperative termination of the event loop
//! - [`PresenceTopic`] for the retained online/offline marker
//! - [`BridgeArgs`] for common CLI argument parsing
//!
//! # Example
//!
//! ```ignore
//! use zbxbridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let args = BridgeArgs::parse_with_default("mybridge.json5");
//!     let config = MyBridgeConfig::load(&args.config)?;
//!
//!     let runner = BridgeRunner::new_with_args("mybridge", config, Some(&args))?;
//!
//!     // Run the bridge body until it returns or a termination signal arrives
//!     runner.run(|config, shutdown| my_bridge(config, shutdown)).await
//! }
//! ```

mod args;
mod config;
mod error;
mod presence;
mod runner;
mod shutdown;

pub use args::BridgeArgs;
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use presence::{OFFLINE, ONLINE, PresenceTopic, local_fqdn, local_hostname, resolve_fqdn};
pub use runner::{BridgeRunner, run_bridge};
pub use shutdown::{Shutdown, ShutdownTrigger};

// Re-export commonly used types from zbxbridge-common
pub use zbxbridge_common::{LogFormat, LoggingConfig, NormalizedMetric};
