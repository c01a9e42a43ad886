//! Static topic to item routing.
//!
//! The routing table is loaded once at startup from a two-column CSV source:
//!
//! ```text
//! sensors/kitchen/power,power.kitchen::host1
//! sensors/hall/light,light.hall::
//! ```
//!
//! The second column is split on the first `::` into the item key and the
//! target host. An empty host defers to the configured default host, which is
//! resolved at lookup time and never stored in the table.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use thiserror::Error;

/// Separator between item key and host in a mapping value.
pub const HOST_SEPARATOR: &str = "::";

/// Errors raised while building the routing table.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read routing source '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse routing record at line {line}: {source}")]
    Csv {
        line: u64,
        #[source]
        source: csv::Error,
    },

    #[error("Routing record at line {line} has {fields} field(s), expected topic and key::host")]
    MissingField { line: u64, fields: usize },

    #[error("Routing record at line {line} has an empty {field}")]
    EmptyField { line: u64, field: &'static str },

    #[error("Routing value '{value}' at line {line} has no '::' separator")]
    MissingSeparator { line: u64, value: String },

    #[error("Routing value '{value}' at line {line} contains '::' more than once")]
    AmbiguousSeparator { line: u64, value: String },
}

/// The rule mapping one topic to one metric identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingEntry {
    /// Exact inbound topic.
    pub topic: String,
    /// Item key on the monitoring side.
    pub metric_key: String,
    /// Target host, `None` to use the default host.
    pub target_host: Option<String>,
}

impl RoutingEntry {
    /// Host this entry forwards to, given the current default host.
    pub fn resolve_host<'a>(&'a self, default_host: &'a str) -> &'a str {
        self.target_host.as_deref().unwrap_or(default_host)
    }
}

/// Immutable topic to entry lookup.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: HashMap<String, RoutingEntry>,
}

impl RoutingTable {
    /// Load the table from a CSV file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "Loading routing table");

        let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let table = Self::from_reader(file)?;
        tracing::info!(path = %path.display(), routes = table.len(), "Routing table loaded");
        Ok(table)
    }

    /// Build the table from any CSV record stream.
    ///
    /// Later records win over earlier records for the same topic.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, LoadError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut routes = HashMap::new();
        let mut record = csv::StringRecord::new();

        loop {
            let line = csv_reader.position().line();
            match csv_reader.read_record(&mut record) {
                Ok(true) => {}
                Ok(false) => break,
                Err(source) => return Err(LoadError::Csv { line, source }),
            }

            let line = record.position().map_or(line, |p| p.line());
            let entry = parse_record(&record, line)?;

            if let Some(previous) = routes.insert(entry.topic.clone(), entry) {
                tracing::debug!(
                    topic = %previous.topic,
                    line = line,
                    "Duplicate routing topic, later record wins"
                );
            }
        }

        Ok(Self { routes })
    }

    /// Build the table from in-memory `(topic, "key::host")` pairs.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, LoadError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut routes = HashMap::new();
        for (index, (topic, value)) in pairs.into_iter().enumerate() {
            let entry = build_entry(topic, value, index as u64 + 1)?;
            routes.insert(entry.topic.clone(), entry);
        }
        Ok(Self { routes })
    }

    /// Exact-match lookup. `None` means the topic is unrouted.
    pub fn lookup(&self, topic: &str) -> Option<&RoutingEntry> {
        self.routes.get(topic)
    }

    /// Number of routed topics.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether the table routes nothing.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn parse_record(record: &csv::StringRecord, line: u64) -> Result<RoutingEntry, LoadError> {
    match (record.get(0), record.get(1)) {
        (Some(topic), Some(value)) => build_entry(topic, value, line),
        _ => Err(LoadError::MissingField {
            line,
            fields: record.len(),
        }),
    }
}

fn build_entry(topic: &str, value: &str, line: u64) -> Result<RoutingEntry, LoadError> {
    if topic.is_empty() {
        return Err(LoadError::EmptyField {
            line,
            field: "topic",
        });
    }

    let (key, host) = split_mapping(value, line)?;

    Ok(RoutingEntry {
        topic: topic.to_string(),
        metric_key: key.to_string(),
        target_host: (!host.is_empty()).then(|| host.to_string()),
    })
}

/// Split a `"KEY::HOST"` value on its first separator.
fn split_mapping(value: &str, line: u64) -> Result<(&str, &str), LoadError> {
    let Some((key, host)) = value.split_once(HOST_SEPARATOR) else {
        return Err(LoadError::MissingSeparator {
            line,
            value: value.to_string(),
        });
    };

    if host.contains(HOST_SEPARATOR) {
        return Err(LoadError::AmbiguousSeparator {
            line,
            value: value.to_string(),
        });
    }

    if key.is_empty() {
        return Err(LoadError::EmptyField { line, field: "key" });
    }

    Ok((key, host))
}
