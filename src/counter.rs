//! Core module containing the partitioned dual-threshold counter and its
//! shared infrastructure.
//!
//! # Architecture
//!
//! A [`ThresholdCounter`](threshold::ThresholdCounter) maintains one logical
//! count sharded across per-partition records, one partition per core up to
//! [`MAX_PARTITIONS`]. Unlike a plain sharded counter, the *thresholds* are
//! sharded too: the configured global low/high bounds are distributed across
//! the partitions so that `sum(low_i)` and `sum(high_i)` always equal the
//! configured values.
//!
//! ```text
//!                     ┌────────────────────────────────────────┐
//!                     │          ThresholdCounter              │
//!                     ├────────────────────────────────────────┤
//!   Thread 0 ──────►  │ [Partition 0] count/low/high + lock    │
//!   Thread 1 ──────►  │ [Partition 1] count/low/high + lock    │
//!        ...          │     ...              (CachePadded)     │
//!   Thread N ──────►  │ [Partition N] count/low/high + lock    │
//!                     └────────────────────────────────────────┘
//!                                      │
//!                                      ▼
//!                     fast path: home partition only
//!                     slow path: migrate thresholds/count
//!                                between partitions
//! ```
//!
//! Updates hit the calling thread's *home* partition and usually touch a
//! single lock and a single cache line. Only when the home partition runs out
//! of local threshold headroom (or local count, for subtraction) does the
//! operation reach across partitions, borrowing capacity from its siblings
//! under the deadlock-free ordering enforced by the internal lock
//! accumulator.
//!
//! # Thread Slot Assignment
//!
//! Home partitions are assigned round-robin: the first thread that touches
//! any counter gets slot 0, the second slot 1, and so on, wrapping after
//! [`MAX_PARTITIONS`]. The slot is cached in thread-local storage and stable
//! for the thread's lifetime; each counter maps it onto its own partition
//! array with a modulo.

pub(crate) mod locks;
pub(crate) mod partition;
pub mod threshold;

use std::{
    fmt::Debug,
    fmt::Display,
    sync::atomic::{AtomicUsize, Ordering},
};

/// Upper bound on the number of partitions a counter may have.
///
/// Chosen to match the lock accumulator's `u64` held-locks bitmask, and
/// because machines with more than 64 logical cores hammering one admission
/// counter are rare enough that slot sharing is an acceptable trade.
pub const MAX_PARTITIONS: usize = 64;

/// Global counter for assigning home slots to threads.
static NEXT_SLOT_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// Home slot assigned to the current thread, fixed at first use.
    static THREAD_SLOT_INDEX: usize = next_slot_id();
}

/// Assigns the next available slot to a thread.
///
/// Uses `Ordering::Relaxed` because only atomicity matters here; two threads
/// occasionally landing on the same slot costs a little contention, never
/// correctness.
fn next_slot_id() -> usize {
    NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed) % MAX_PARTITIONS
}

/// Returns the calling thread's home slot in `[0, MAX_PARTITIONS)`.
pub(crate) fn thread_slot() -> usize {
    THREAD_SLOT_INDEX.with(|idx| *idx)
}

/// Default partition count: one per logical core, clamped to
/// `[1, MAX_PARTITIONS]`.
pub(crate) fn default_partition_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get().clamp(1, MAX_PARTITIONS))
        .unwrap_or(1)
}

/// Classification of a count against the configured low/high thresholds.
///
/// Comparisons are strict on both sides: a count exactly equal to a
/// threshold is [`Between`](Position::Between). The equality cases matter to
/// the counter's internal transition accounting, which must not report a
/// crossing when the count merely touches a boundary.
///
/// # Examples
///
/// ```rust
/// use soglie::counter::Position;
///
/// assert_eq!(format!("{}", Position::Below), "Below");
/// assert!(Position::Below != Position::Between);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum Position {
    /// The count is strictly below the low threshold.
    Below = 0,
    /// The count is at or between the thresholds.
    Between = 1,
    /// The count is strictly above the high threshold.
    Above = 2,
}

impl Position {
    pub(crate) fn from_u8(raw: u8) -> Position {
        match raw {
            0 => Position::Below,
            2 => Position::Above,
            _ => Position::Between,
        }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Position::Below => write!(f, "Below"),
            Position::Between => write!(f, "Between"),
            Position::Above => write!(f, "Above"),
        }
    }
}

/// Counts of observed global position transitions.
///
/// One field per edge the counter can take. A single update large enough to
/// jump the whole band records one edge for where it landed: `Below` to
/// `Above` counts under [`to_above`](TransitionStats::to_above), the
/// reverse under [`to_below`](TransitionStats::to_below).
///
/// # Examples
///
/// ```rust
/// use soglie::counter::threshold::ThresholdCounter;
///
/// let counter = ThresholdCounter::with_partitions(2);
/// counter.initialize(0, 0);
/// counter.add(1);
///
/// let stats = counter.transition_stats();
/// assert_eq!(stats.to_above, 1);
/// assert_eq!(stats.total(), 1);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TransitionStats {
    /// Transitions ending in `Below`.
    pub to_below: u64,
    /// Transitions from `Below` to `Between`.
    pub below_to_between: u64,
    /// Transitions from `Above` to `Between`.
    pub above_to_between: u64,
    /// Transitions ending in `Above`.
    pub to_above: u64,
}

impl TransitionStats {
    /// Total number of recorded transitions.
    pub fn total(&self) -> u64 {
        self.to_below + self.below_to_between + self.above_to_between + self.to_above
    }
}

/// A trait for counters that can be observed by the export layer.
///
/// [`ThresholdCounter`](threshold::ThresholdCounter) implements this; the
/// feature-gated observers and snapshots consume it so that export code does
/// not depend on the concrete counter type.
pub trait Observable: Debug {
    /// Returns the name of this counter, or an empty string if unnamed.
    fn name(&self) -> &str;

    /// Returns the best-effort total: the unlocked sum over all partitions.
    fn value(&self) -> u64;

    /// Returns the last recorded global position.
    fn position(&self) -> Position;
}

impl Display for dyn Observable + '_ {
    /// Formats the counter as `name:value` if named, or just `value`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.name().is_empty() {
            write!(f, "{}:{}", self.name(), self.value())
        } else {
            write!(f, "{}", self.value())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_slot_stable() {
        let a = thread_slot();
        let b = thread_slot();
        assert_eq!(a, b);
        assert!(a < MAX_PARTITIONS);
    }

    #[test]
    fn test_default_partition_count_bounds() {
        let n = default_partition_count();
        assert!(n >= 1);
        assert!(n <= MAX_PARTITIONS);
    }

    #[test]
    fn test_position_roundtrip() {
        for pos in [Position::Below, Position::Between, Position::Above] {
            assert_eq!(Position::from_u8(pos as u8), pos);
        }
    }

    #[test]
    fn test_transition_stats_total() {
        let stats = TransitionStats {
            to_below: 1,
            below_to_between: 2,
            above_to_between: 3,
            to_above: 4,
        };
        assert_eq!(stats.total(), 10);
        assert_eq!(TransitionStats::default().total(), 0);
    }
}
