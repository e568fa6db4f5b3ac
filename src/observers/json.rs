//! JSON observer for serializing counters.
//!
//! This module provides [`JsonObserver`], which serializes a collection of
//! [`Observable`] counters to JSON using the snapshot types from
//! [`crate::snapshot`].
//!
//! # Feature Flag
//!
//! This module requires the `json` feature:
//!
//! ```toml
//! [dependencies]
//! soglie = { version = "0.1", features = ["json"] }
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use soglie::counter::Observable;
//! use soglie::counter::threshold::ThresholdCounter;
//! use soglie::observers::json::JsonObserver;
//!
//! let inflight = ThresholdCounter::new().with_name("inflight");
//! inflight.initialize(10, 20);
//! inflight.add(15);
//!
//! let counters: Vec<&dyn Observable> = vec![&inflight];
//!
//! let observer = JsonObserver::new();
//! let json = observer.to_json(counters.into_iter()).unwrap();
//!
//! println!("{}", json);
//! // [{"name":"inflight","sum":15,"position":"Between"}]
//! ```

use crate::counter::Observable;
use crate::observers::Result;
use crate::snapshot::{MetricsSnapshot, ThresholdSnapshot};

/// Configuration for the JSON observer.
#[derive(Debug, Clone, Default)]
pub struct JsonConfig {
    /// Whether to pretty-print the JSON output.
    pub pretty: bool,
    /// Whether to include a timestamp in the output.
    pub include_timestamp: bool,
    /// Whether to wrap counters in a [`MetricsSnapshot`] object.
    pub wrap_in_snapshot: bool,
}

/// An observer that serializes counters to JSON format.
///
/// # Examples
///
/// Basic usage (array of counters):
///
/// ```rust,ignore
/// use soglie::observers::json::JsonObserver;
///
/// let json = JsonObserver::new().to_json(counters.into_iter())?;
/// ```
///
/// Pretty-printed output with timestamp wrapper:
///
/// ```rust,ignore
/// let observer = JsonObserver::new()
///     .pretty(true)
///     .wrap_in_snapshot(true)
///     .include_timestamp(true);
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonObserver {
    config: JsonConfig,
}

impl JsonObserver {
    /// Creates a new JSON observer with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new JSON observer with the specified configuration.
    pub fn with_config(config: JsonConfig) -> Self {
        Self { config }
    }

    /// Enables or disables pretty-printing.
    pub fn pretty(mut self, enabled: bool) -> Self {
        self.config.pretty = enabled;
        self
    }

    /// Enables or disables timestamp inclusion.
    ///
    /// Only has effect when `wrap_in_snapshot` is also enabled.
    pub fn include_timestamp(mut self, enabled: bool) -> Self {
        self.config.include_timestamp = enabled;
        self
    }

    /// Enables or disables wrapping the output in a [`MetricsSnapshot`].
    pub fn wrap_in_snapshot(mut self, enabled: bool) -> Self {
        self.config.wrap_in_snapshot = enabled;
        self
    }

    /// Collects counters into a vector of [`ThresholdSnapshot`].
    ///
    /// Useful when you need the intermediate representation before
    /// serialization.
    pub fn collect<'a>(
        &self,
        counters: impl Iterator<Item = &'a dyn Observable>,
    ) -> Vec<ThresholdSnapshot> {
        counters.map(ThresholdSnapshot::from_observable).collect()
    }

    /// Serializes counters to a JSON string.
    pub fn to_json<'a>(
        &self,
        counters: impl Iterator<Item = &'a dyn Observable>,
    ) -> Result<String> {
        let snapshots = self.collect(counters);

        let json = if self.config.wrap_in_snapshot {
            let snapshot = if self.config.include_timestamp {
                MetricsSnapshot::with_timestamp(snapshots, current_timestamp_ms())
            } else {
                MetricsSnapshot::new(snapshots)
            };
            if self.config.pretty {
                serde_json::to_string_pretty(&snapshot)?
            } else {
                serde_json::to_string(&snapshot)?
            }
        } else if self.config.pretty {
            serde_json::to_string_pretty(&snapshots)?
        } else {
            serde_json::to_string(&snapshots)?
        };
        Ok(json)
    }

    /// Serializes counters to a JSON byte vector.
    pub fn to_json_bytes<'a>(
        &self,
        counters: impl Iterator<Item = &'a dyn Observable>,
    ) -> Result<Vec<u8>> {
        let snapshots = self.collect(counters);

        if self.config.wrap_in_snapshot {
            let snapshot = if self.config.include_timestamp {
                MetricsSnapshot::with_timestamp(snapshots, current_timestamp_ms())
            } else {
                MetricsSnapshot::new(snapshots)
            };
            Ok(serde_json::to_vec(&snapshot)?)
        } else {
            Ok(serde_json::to_vec(&snapshots)?)
        }
    }
}

/// Returns the current timestamp in milliseconds since Unix epoch.
fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
