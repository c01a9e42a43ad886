//! JSON5 configuration loading for bridges.

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::LoggingConfig;
use crate::error::{BridgeError, Result};

/// A bridge configuration file.
///
/// The bridge's top-level config struct implements this to get file loading,
/// JSON5 parsing and a validation hook run before the bridge starts.
///
/// ```ignore
/// #[derive(Debug, Deserialize)]
/// pub struct SenderConfig {
///     pub broker: String,
///     #[serde(default)]
///     pub logging: LoggingConfig,
/// }
///
/// impl BridgeConfig for SenderConfig {
///     fn logging(&self) -> &LoggingConfig {
///         &self.logging
///     }
///
///     fn validate(&self) -> zbxbridge_framework::Result<()> {
///         if self.broker.is_empty() {
///             return Err(BridgeError::validation("broker cannot be empty"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait BridgeConfig: Sized + DeserializeOwned {
    /// Logging section, applied before the bridge body runs.
    fn logging(&self) -> &LoggingConfig;

    /// Reject values that parse but cannot work. Accepts everything by default.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Parse a JSON5 document, then validate it.
    fn parse(content: &str) -> Result<Self> {
        let config: Self = zbxbridge_common::parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate the file at `path`.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BridgeError::ConfigNotFound {
                    path: path.display().to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        Self::parse(&content)
    }
}
