//! Bridge runner for lifecycle management.

use std::fmt::Display;
use std::future::Future;

use zbxbridge_common::init_tracing;

use crate::BridgeArgs;
use crate::config::BridgeConfig;
use crate::error::Result;
use crate::shutdown::Shutdown;

/// Bridge runner that manages the process-level lifecycle of a bridge.
///
/// Handles:
/// - Logging initialization (with optional CLI override)
/// - Signal wiring (SIGINT/SIGTERM flip a [`Shutdown`] flag)
/// - Running the bridge body and reporting how it ended
///
/// The bridge body owns its broker session; the runner never touches it.
///
/// # Example
///
/// ```ignore
/// use zbxbridge_framework::{BridgeArgs, BridgeConfig, BridgeRunner};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> anyhow::Result<()> {
///     let args = BridgeArgs::parse_with_default("mybridge.json5");
///     let config = MyBridgeConfig::load(&args.config)?;
///
///     let runner = BridgeRunner::new_with_args("mybridge", config, Some(&args))?;
///     runner.run(|config, shutdown| async move {
///         // Event loop here, observing `shutdown`
///         Ok::<(), anyhow::Error>(())
///     })
///     .await
/// }
/// ```
pub struct BridgeRunner<C: BridgeConfig> {
    /// Bridge name for logging.
    name: String,
    /// Bridge version.
    version: String,
    /// The loaded configuration.
    config: C,
}

impl<C: BridgeConfig> BridgeRunner<C> {
    /// Create a new bridge runner and initialize logging from the config.
    pub fn new(name: impl Into<String>, config: C) -> Result<Self> {
        Self::new_with_args(name, config, None)
    }

    /// Create a new bridge runner with CLI args for log level override.
    pub fn new_with_args(
        name: impl Into<String>,
        config: C,
        args: Option<&BridgeArgs>,
    ) -> Result<Self> {
        let level_override = args.and_then(|args| args.log_level.as_deref());
        let log_config = config.logging().with_level_override(level_override);

        init_tracing(&log_config)?;

        let runner = Self::unlogged(name, config);
        tracing::info!(bridge = %runner.name, version = %runner.version, "Starting bridge");
        Ok(runner)
    }

    fn unlogged(name: impl Into<String>, config: C) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            config,
        }
    }

    /// Get the bridge name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the bridge version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &C {
        &self.config
    }

    /// Run the bridge body until it returns.
    ///
    /// Installs the signal listener, then hands the configuration and a
    /// [`Shutdown`] observer to `body`. The body is expected to return once it
    /// observes the shutdown request (or fails fatally).
    pub async fn run<F, Fut, E>(self, body: F) -> std::result::Result<(), E>
    where
        F: FnOnce(C, Shutdown) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
        E: Display,
    {
        let (trigger, shutdown) = Shutdown::channel();
        trigger.listen_for_signals();
        self.run_until(shutdown, body).await
    }

    async fn run_until<F, Fut, E>(self, shutdown: Shutdown, body: F) -> std::result::Result<(), E>
    where
        F: FnOnce(C, Shutdown) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
        E: Display,
    {
        tracing::info!(
            bridge = %self.name,
            "Bridge running. Send SIGINT or SIGTERM to stop."
        );

        let name = self.name;
        let result = body(self.config, shutdown).await;

        match &result {
            Ok(()) => tracing::info!(bridge = %name, "Goodbye!"),
            Err(e) => tracing::error!(bridge = %name, error = %e, "Bridge terminated"),
        }

        result
    }
}

/// Convenience function to run a bridge with minimal boilerplate.
///
/// Parses CLI arguments, loads and validates the configuration, initializes
/// logging and runs `body`.
///
/// # Example
///
/// ```ignore
/// use zbxbridge_framework::run_bridge;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() -> anyhow::Result<()> {
///     run_bridge::<MyBridgeConfig, _, _>("mybridge", "mybridge.json5", |config, shutdown| {
///         my_bridge(config, shutdown)
///     })
///     .await
/// }
/// ```
pub async fn run_bridge<C, F, Fut>(
    name: &str,
    default_config: &'static str,
    body: F,
) -> anyhow::Result<()>
where
    C: BridgeConfig,
    F: FnOnce(C, Shutdown) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let args = BridgeArgs::parse_with_default(default_config);
    let config = C::load(&args.config).map_err(|e| {
        anyhow::anyhow!("Failed to load config from {}: {}", args.config.display(), e)
    })?;

    let runner = BridgeRunner::new_with_args(name, config, Some(&args))
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    runner.run(body).await
}
