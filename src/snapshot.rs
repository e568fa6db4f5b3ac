//! Snapshot types for serializing counter state.
//!
//! This module provides serializable snapshot types that capture a counter's
//! sum, position and (optionally) transition statistics at a point in time.
//!
//! # Feature Flag
//!
//! This module requires the `serde` feature:
//!
//! ```toml
//! [dependencies]
//! soglie = { version = "0.1", features = ["serde"] }
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use soglie::counter::threshold::ThresholdCounter;
//! use soglie::snapshot::ThresholdSnapshot;
//!
//! let counter = ThresholdCounter::new().with_name("inflight");
//! counter.initialize(10, 20);
//! counter.add(15);
//!
//! let snapshot = ThresholdSnapshot::from_counter(&counter);
//!
//! // Serialize with any serde-compatible format.
//! let json = serde_json::to_string(&snapshot).unwrap();
//! ```

use crate::counter::{Observable, Position, TransitionStats};
use serde::{Deserialize, Serialize};

/// A snapshot of a single counter's state.
///
/// This struct is serializable and can be used for:
/// - Storing counter state to files
/// - Sending metrics over HTTP APIs
/// - Inter-process communication
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThresholdSnapshot {
    /// The name of the counter.
    pub name: String,
    /// The best-effort sum at capture time.
    pub sum: u64,
    /// The last recorded position at capture time.
    pub position: Position,
    /// Transition statistics, when the source exposes them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transitions: Option<TransitionStats>,
}

impl ThresholdSnapshot {
    /// Creates a new snapshot from raw parts.
    pub fn new(name: impl Into<String>, sum: u64, position: Position) -> Self {
        Self {
            name: name.into(),
            sum,
            position,
            transitions: None,
        }
    }

    /// Creates a snapshot from an observable counter.
    ///
    /// Transition statistics are not part of the [`Observable`] contract, so
    /// this constructor leaves them empty; use
    /// [`from_counter`](ThresholdSnapshot::from_counter) for the full
    /// picture.
    pub fn from_observable(counter: &dyn Observable) -> Self {
        Self {
            name: if counter.name().is_empty() {
                "(unnamed)".to_string()
            } else {
                counter.name().to_string()
            },
            sum: counter.value(),
            position: counter.position(),
            transitions: None,
        }
    }

    /// Creates a snapshot from a concrete counter, including its transition
    /// statistics.
    pub fn from_counter(counter: &crate::counter::threshold::ThresholdCounter) -> Self {
        let mut snapshot = Self::from_observable(counter);
        snapshot.transitions = Some(counter.transition_stats());
        snapshot
    }
}

/// A collection of counter snapshots, typically representing a point-in-time
/// capture of all metrics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Optional timestamp in milliseconds since Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_ms: Option<u64>,
    /// The counter snapshots.
    pub counters: Vec<ThresholdSnapshot>,
}

impl MetricsSnapshot {
    /// Creates a new metrics snapshot with the given counters.
    pub fn new(counters: Vec<ThresholdSnapshot>) -> Self {
        Self {
            timestamp_ms: None,
            counters,
        }
    }

    /// Creates a new metrics snapshot with counters and a timestamp.
    pub fn with_timestamp(counters: Vec<ThresholdSnapshot>, timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms: Some(timestamp_ms),
            counters,
        }
    }

    /// Finds a counter by name.
    pub fn get(&self, name: &str) -> Option<&ThresholdSnapshot> {
        self.counters.iter().find(|c| c.name == name)
    }

    /// Collects snapshots from an iterator of observable counters.
    pub fn collect<'a>(counters: impl Iterator<Item = &'a dyn Observable>) -> Self {
        Self::new(counters.map(ThresholdSnapshot::from_observable).collect())
    }

    /// Collects snapshots with a timestamp.
    pub fn collect_with_timestamp<'a>(
        counters: impl Iterator<Item = &'a dyn Observable>,
        timestamp_ms: u64,
    ) -> Self {
        Self::with_timestamp(
            counters.map(ThresholdSnapshot::from_observable).collect(),
            timestamp_ms,
        )
    }
}
