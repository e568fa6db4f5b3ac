//! The partitioned dual-threshold counter.
//!
//! [`ThresholdCounter`] keeps one logical count plus a low/high threshold
//! pair, sharded across per-core partitions so that the hot add/sub path
//! touches a single partition lock and a single cache line. The thresholds
//! are sharded along with the count: at any quiescent point the per-partition
//! `low` and `high` values sum to the configured global thresholds, and each
//! partition's `count`-versus-thresholds relation stays consistent with the
//! rest of the array, so the array never looks "below" in one partition and
//! "above" in another.
//!
//! # Fast and slow paths
//!
//! An update first asks its home partition how much of the delta it can
//! absorb without crossing a boundary it does not own enough threshold for.
//! Usually that is all of it. When the home partition runs dry, the
//! operation scans the siblings for spare capacity (unlocked peeks first,
//! then locked transfers through the lock accumulator), migrating threshold
//! capacity toward the home partition for additions and count for
//! subtractions. If the scan cannot settle the deficit, the operation takes
//! every partition lock in ascending order, consolidates the entire state
//! into the home partition, and finishes with exact knowledge of the global
//! position. A genuine threshold crossing therefore always happens under
//! the full lock set, which is what keeps the recorded transitions honest.
//!
//! # Staleness
//!
//! [`current_state`](ThresholdCounter::current_state) is a lock-free read of
//! the position computed by the most recent operation that could prove it.
//! Operations that land a partition exactly on a boundary value cannot
//! always tell whether the global sum crossed, and leave the recorded state
//! alone; the reading therefore lags while the sum hovers on a threshold and
//! firms up as it moves away. That matches the intended admission-control
//! usage, where boundary-exact realtime precision is not required.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use crossbeam_utils::CachePadded;

use crate::counter::locks::LockAccumulator;
use crate::counter::partition::Partition;
use crate::counter::{
    default_partition_count, thread_slot, Observable, Position, TransitionStats, MAX_PARTITIONS,
};

/// A logical counter with distributed low/high thresholds.
///
/// # Examples
///
/// ```rust
/// use soglie::counter::threshold::ThresholdCounter;
/// use soglie::counter::Position;
///
/// let counter = ThresholdCounter::new().with_name("inflight");
/// counter.initialize(10, 20);
///
/// counter.add(5);
/// assert_eq!(counter.sum(), 5);
/// assert_eq!(counter.current_state(), Position::Below);
///
/// counter.add(20);
/// assert_eq!(counter.sum(), 25);
/// assert_eq!(counter.current_state(), Position::Above);
/// ```
///
/// Shared across threads via `Arc`:
///
/// ```rust
/// use soglie::counter::threshold::ThresholdCounter;
/// use std::sync::Arc;
/// use std::thread;
///
/// let counter = Arc::new(ThresholdCounter::with_partitions(4));
/// counter.initialize(100, 200);
///
/// let mut handles = vec![];
/// for _ in 0..4 {
///     let c = Arc::clone(&counter);
///     handles.push(thread::spawn(move || {
///         for _ in 0..1000 {
///             c.add(1);
///         }
///     }));
/// }
/// for h in handles {
///     h.join().unwrap();
/// }
///
/// assert_eq!(counter.sum(), 4000);
/// ```
pub struct ThresholdCounter {
    name: &'static str,
    partitions: Box<[CachePadded<Partition>]>,
    last_position: AtomicU8,
    initialized: AtomicBool,
    to_below: AtomicU64,
    below_to_between: AtomicU64,
    above_to_between: AtomicU64,
    to_above: AtomicU64,
}

impl ThresholdCounter {
    /// Creates a counter with one partition per logical core.
    ///
    /// The count and both thresholds start at zero, so the initial position
    /// is `Between`; call [`initialize`](ThresholdCounter::initialize) or
    /// [`set_thresholds`](ThresholdCounter::set_thresholds) before use.
    pub fn new() -> Self {
        Self::with_partitions(default_partition_count())
    }

    /// Creates a counter with a specific partition count, clamped to
    /// `[1, MAX_PARTITIONS]`. Useful for tests and for bounding memory.
    pub fn with_partitions(n: usize) -> Self {
        let n = n.clamp(1, MAX_PARTITIONS);
        let partitions: Vec<CachePadded<Partition>> =
            (0..n).map(|_| CachePadded::new(Partition::new())).collect();
        ThresholdCounter {
            name: "",
            partitions: partitions.into_boxed_slice(),
            last_position: AtomicU8::new(Position::Between as u8),
            initialized: AtomicBool::new(false),
            to_below: AtomicU64::new(0),
            below_to_between: AtomicU64::new(0),
            above_to_between: AtomicU64::new(0),
            to_above: AtomicU64::new(0),
        }
    }

    /// Sets the name of this counter, returning `self` for method chaining.
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Number of partitions backing this counter.
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// One-time threshold setup. The first call behaves like
    /// [`set_thresholds`](ThresholdCounter::set_thresholds); every later
    /// call is a no-op.
    pub fn initialize(&self, low: u64, high: u64) {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.set_thresholds(low, high);
        }
    }

    /// Reconfigures the global thresholds. Requires `low <= high`.
    ///
    /// Takes every partition lock, consolidates the entire distributed
    /// state into partition 0, installs the new thresholds there, and
    /// derives the new global position exactly. The count is preserved.
    pub fn set_thresholds(&self, low: u64, high: u64) {
        debug_assert!(low <= high, "low threshold above high threshold");
        self.initialized.store(true, Ordering::Release);
        let mut locks = LockAccumulator::new(&self.partitions);
        locks.acquire_all();
        self.consolidate_into(0, &locks);
        self.partitions[0].set_thresholds(low, high);
        self.publish(self.exact_position());
        locks.release_all();
    }

    /// Adds `by` to the logical count. Requires `by > 0`.
    pub fn add(&self, by: u64) {
        debug_assert!(by > 0, "add requires a positive delta");
        if by == 0 {
            return;
        }
        let home = self.home_index();
        let mut locks = LockAccumulator::new(&self.partitions);
        locks.acquire(home);
        let mut remaining = by;
        let mut rounds = 0usize;
        loop {
            rounds += 1;
            debug_assert!(
                rounds <= 2 * self.partitions.len() + 8,
                "threshold migration failed to converge"
            );
            let plan = self.partitions[home].needed_for_add(remaining);
            if plan.apply > 0 {
                self.partitions[home].force_add(plan.apply);
                remaining -= plan.apply;
            }
            if remaining == 0 {
                self.finish(home, &locks);
                return;
            }
            // First pass: siblings whose unlocked peek suggests spare
            // threshold capacity.
            let mut low_needed = plan.low_needed;
            let mut high_needed = plan.high_needed;
            let mut stale = false;
            for j in self.scan_order(home) {
                if low_needed == 0 && high_needed == 0 {
                    break;
                }
                if !locks.holds(j) {
                    let plausible = (low_needed > 0 && self.partitions[j].peek_low_slack() > 0)
                        || (high_needed > 0 && self.partitions[j].peek_high_slack() > 0);
                    if !plausible {
                        continue;
                    }
                    if !locks.acquire(j) {
                        stale = true;
                        break;
                    }
                }
                // Ask for half the donor's slack when that exceeds the
                // deficit, so the home partition keeps headroom for later
                // updates instead of migrating one deficit at a time. Never
                // gather capacity the operation has no deficit in.
                if low_needed > 0 {
                    let want = low_needed.max(self.partitions[j].peek_low_slack() / 2);
                    low_needed = low_needed
                        .saturating_sub(self.partitions[j].donate_low(&self.partitions[home], want));
                }
                if high_needed > 0 {
                    let want = high_needed.max(self.partitions[j].peek_high_slack() / 2);
                    high_needed = high_needed
                        .saturating_sub(self.partitions[j].donate_high(&self.partitions[home], want));
                }
            }
            if stale || (low_needed == 0 && high_needed == 0) {
                continue;
            }
            // Second pass: take everything. A disturbed acquisition still
            // means stale reads, so go around once more; the held set only
            // grows, which bounds the retries.
            if !locks.acquire_all() {
                continue;
            }
            self.consolidate_into(home, &locks);
            let plan = self.partitions[home].needed_for_add(remaining);
            if plan.apply > 0 {
                self.partitions[home].force_add(plan.apply);
                remaining -= plan.apply;
            }
            if remaining > 0 {
                // No threshold capacity exists anywhere: the crossing is
                // genuine.
                self.partitions[home].force_add(remaining);
            }
            self.finish(home, &locks);
            return;
        }
    }

    /// Subtracts `by` from the logical count. Requires `by > 0` and a
    /// current sum of at least `by`; draining below zero is a caller bug.
    pub fn sub(&self, by: u64) {
        debug_assert!(by > 0, "sub requires a positive delta");
        if by == 0 {
            return;
        }
        let home = self.home_index();
        let mut locks = LockAccumulator::new(&self.partitions);
        locks.acquire(home);
        let mut remaining = by;
        let mut rounds = 0usize;
        loop {
            rounds += 1;
            debug_assert!(
                rounds <= 2 * self.partitions.len() + 8,
                "count migration failed to converge"
            );
            let plan = self.partitions[home].needed_for_sub(remaining);
            if plan.apply > 0 {
                self.partitions[home].force_sub(plan.apply);
                remaining -= plan.apply;
            }
            if remaining == 0 {
                self.finish(home, &locks);
                return;
            }
            let mut count_needed = plan.count_needed;
            let mut stale = false;
            for j in self.scan_order(home) {
                if count_needed == 0 {
                    break;
                }
                if !locks.holds(j) {
                    if self.partitions[j].peek_count_slack() == 0 {
                        continue;
                    }
                    if !locks.acquire(j) {
                        stale = true;
                        break;
                    }
                }
                let want = count_needed.max(self.partitions[j].peek_count_slack() / 2);
                count_needed = count_needed
                    .saturating_sub(self.partitions[j].donate_count(&self.partitions[home], want));
            }
            if stale || count_needed == 0 {
                continue;
            }
            if !locks.acquire_all() {
                continue;
            }
            self.consolidate_into(home, &locks);
            let plan = self.partitions[home].needed_for_sub(remaining);
            if plan.apply > 0 {
                self.partitions[home].force_sub(plan.apply);
                remaining -= plan.apply;
            }
            if remaining > 0 {
                let have = self.partitions[home].count();
                debug_assert!(remaining <= have, "subtracting more than the counter holds");
                self.partitions[home].force_sub(remaining.min(have));
            }
            self.finish(home, &locks);
            return;
        }
    }

    /// Adds one.
    pub fn increment(&self) {
        self.add(1);
    }

    /// Subtracts one.
    pub fn decrement(&self) {
        self.sub(1);
    }

    /// Last recorded global position: a lock-free, possibly stale read.
    ///
    /// The value was exactly correct when the operation that recorded it
    /// completed; the further the sum sits from the thresholds, the more
    /// reliable the reading.
    pub fn current_state(&self) -> Position {
        Position::from_u8(self.last_position.load(Ordering::Relaxed))
    }

    /// Best-effort total: an unlocked sum over all partitions, not atomic
    /// with respect to concurrent updates.
    pub fn sum(&self) -> u64 {
        self.partitions.iter().map(|p| p.count()).sum()
    }

    /// Per-partition counts, for diagnostics.
    pub fn partition_values(&self) -> Vec<u64> {
        self.partitions.iter().map(|p| p.count()).collect()
    }

    /// Snapshot of the transition counters.
    pub fn transition_stats(&self) -> TransitionStats {
        TransitionStats {
            to_below: self.to_below.load(Ordering::Relaxed),
            below_to_between: self.below_to_between.load(Ordering::Relaxed),
            above_to_between: self.above_to_between.load(Ordering::Relaxed),
            to_above: self.to_above.load(Ordering::Relaxed),
        }
    }

    /// Resets the transition counters to zero.
    pub fn clear_transition_stats(&self) {
        self.to_below.store(0, Ordering::Relaxed);
        self.below_to_between.store(0, Ordering::Relaxed);
        self.above_to_between.store(0, Ordering::Relaxed);
        self.to_above.store(0, Ordering::Relaxed);
    }

    // -- internals ----------------------------------------------------------

    fn home_index(&self) -> usize {
        thread_slot() % self.partitions.len()
    }

    fn scan_order(&self, home: usize) -> impl Iterator<Item = usize> {
        let n = self.partitions.len();
        (home + 1..n).chain(0..home)
    }

    /// Moves every other partition's state into `home`. Every lock must be
    /// held.
    fn consolidate_into(&self, home: usize, locks: &LockAccumulator<'_>) {
        debug_assert!(locks.holds_all());
        for j in 0..self.partitions.len() {
            if j != home {
                self.partitions[j].transfer_all(&self.partitions[home]);
            }
        }
    }

    /// Global position from the true sums. Every lock must be held.
    fn exact_position(&self) -> Position {
        let mut count = 0u64;
        let mut low = 0u64;
        let mut high = 0u64;
        for p in self.partitions.iter() {
            count += p.count();
            low += p.low();
            high += p.high();
        }
        if count < low {
            Position::Below
        } else if count > high {
            Position::Above
        } else {
            Position::Between
        }
    }

    /// Derives and records the global position at the end of an operation.
    ///
    /// With every lock held the position is exact. Otherwise the home
    /// partition's own position is conclusive when it is strictly below,
    /// strictly above, or strictly interior; a landing exactly on a
    /// boundary value adjacent to the last recorded state is ambiguous
    /// (a sibling may sit on the strict side of the same boundary) and
    /// leaves the recorded state untouched.
    fn finish(&self, home: usize, locks: &LockAccumulator<'_>) {
        if locks.holds_all() {
            self.publish(self.exact_position());
            return;
        }
        let p = &self.partitions[home];
        let new_pos = p.position();
        let last = self.current_state();
        if new_pos == last {
            return;
        }
        let ambiguous = new_pos == Position::Between
            && ((last == Position::Below && p.is_at_low())
                || (last == Position::Above && p.is_at_high()));
        if !ambiguous {
            self.publish(new_pos);
        }
    }

    /// Installs `new` as the last known position and counts the edge taken,
    /// if any.
    fn publish(&self, new: Position) {
        let old = Position::from_u8(self.last_position.swap(new as u8, Ordering::Relaxed));
        if old == new {
            return;
        }
        match (old, new) {
            (_, Position::Below) => self.to_below.fetch_add(1, Ordering::Relaxed),
            (Position::Below, Position::Between) => {
                self.below_to_between.fetch_add(1, Ordering::Relaxed)
            }
            (_, Position::Between) => self.above_to_between.fetch_add(1, Ordering::Relaxed),
            (_, Position::Above) => self.to_above.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Checks that no partition sits strictly below its low threshold while
    /// another sits strictly above its high threshold. Holds at any
    /// quiescent point.
    #[cfg(test)]
    pub(crate) fn regions_consistent(&self) -> bool {
        let below = self.partitions.iter().any(|p| p.count() < p.low());
        let above = self.partitions.iter().any(|p| p.count() > p.high());
        !(below && above)
    }
}

impl Default for ThresholdCounter {
    /// Creates an unnamed counter with one partition per logical core.
    fn default() -> Self {
        Self::new()
    }
}

impl Observable for ThresholdCounter {
    fn name(&self) -> &str {
        self.name
    }

    fn value(&self) -> u64 {
        self.sum()
    }

    fn position(&self) -> Position {
        self.current_state()
    }
}

impl Debug for ThresholdCounter {
    /// Formats the counter showing partitions with non-zero state.
    ///
    /// Output format: `name{ [slot]:count/low..high ... }`
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{{", self.name)?;
        for (i, p) in self.partitions.iter().enumerate() {
            let (c, l, h) = (p.count(), p.low(), p.high());
            if c != 0 || l != 0 || h != 0 {
                write!(f, " [{i}]:{c}/{l}..{h}")?;
            }
        }
        write!(f, " }}")
    }
}
