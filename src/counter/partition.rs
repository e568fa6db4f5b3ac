//! Per-partition record: one shard of the distributed count and thresholds.
//!
//! Each partition owns a `count`, a `low` and a `high` value, plus the raw
//! mutex that guards them. The three values are atomics so that the unlocked
//! peeks used by [`sum`](crate::counter::threshold::ThresholdCounter::sum)
//! and by donor scanning are plain relaxed loads rather than data races; all
//! *writes* still happen only while the partition's lock is held, which the
//! callers in [`threshold`](crate::counter::threshold) guarantee through the
//! lock accumulator.
//!
//! The donation methods move threshold capacity or count between two locked
//! partitions without ever leaving either side in a state that contradicts
//! the rest of the array: a donor never crosses strictly into a different
//! region by giving capacity away, and a receiver of count is topped up
//! with enough low/high capacity to land strictly inside its own region,
//! never parked exactly on a boundary where it could not absorb what it
//! was just given.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::lock_api::RawMutex as RawMutexApi;
use parking_lot::RawMutex;

use crate::counter::Position;

/// Outcome of planning an addition against one partition.
///
/// `apply` is the largest sub-increment the partition can absorb right now
/// without crossing a boundary it does not own enough threshold for;
/// `low_needed` / `high_needed` are the threshold deficits that must be
/// covered by sibling partitions before the rest of the delta can land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AddPlan {
    pub apply: u64,
    pub low_needed: u64,
    pub high_needed: u64,
}

/// Outcome of planning a subtraction against one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SubPlan {
    pub apply: u64,
    pub count_needed: u64,
}

/// One shard of the distributed counter state.
pub(crate) struct Partition {
    lock: RawMutex,
    count: AtomicU64,
    low: AtomicU64,
    high: AtomicU64,
}

impl Partition {
    pub(crate) fn new() -> Self {
        Partition {
            lock: RawMutex::INIT,
            count: AtomicU64::new(0),
            low: AtomicU64::new(0),
            high: AtomicU64::new(0),
        }
    }

    // -- locking ------------------------------------------------------------

    pub(crate) fn acquire(&self) {
        self.lock.lock();
    }

    pub(crate) fn try_acquire(&self) -> bool {
        self.lock.try_lock()
    }

    pub(crate) fn release(&self) {
        // SAFETY: the lock accumulator only releases locks it recorded as
        // held in its bitmask, so the mutex is locked by this context.
        unsafe { self.lock.unlock() }
    }

    // -- unlocked peeks -----------------------------------------------------

    pub(crate) fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub(crate) fn low(&self) -> u64 {
        self.low.load(Ordering::Relaxed)
    }

    pub(crate) fn high(&self) -> u64 {
        self.high.load(Ordering::Relaxed)
    }

    /// Low-threshold slack a donor could plausibly give up. A hint only:
    /// the three loads are not mutually consistent without the lock.
    pub(crate) fn peek_low_slack(&self) -> u64 {
        self.low().saturating_sub(self.count())
    }

    /// High-threshold slack a donor could plausibly give up.
    pub(crate) fn peek_high_slack(&self) -> u64 {
        self.high().saturating_sub(self.count().max(self.low()))
    }

    /// Count a donor could plausibly give up without crossing a boundary.
    pub(crate) fn peek_count_slack(&self) -> u64 {
        let (c, l, h) = (self.count(), self.low(), self.high());
        if c > h {
            c - h
        } else if c < l {
            c
        } else {
            c - l
        }
    }

    // -- locked operations --------------------------------------------------

    /// Sets both thresholds directly. Only valid once all threshold state
    /// has been consolidated into this partition.
    pub(crate) fn set_thresholds(&self, low: u64, high: u64) {
        debug_assert!(low <= high);
        self.low.store(low, Ordering::Relaxed);
        self.high.store(high, Ordering::Relaxed);
    }

    pub(crate) fn force_add(&self, value: u64) {
        self.count.fetch_add(value, Ordering::Relaxed);
    }

    pub(crate) fn force_sub(&self, value: u64) {
        debug_assert!(value <= self.count(), "subtracting below zero");
        let clipped = value.min(self.count());
        self.count.fetch_sub(clipped, Ordering::Relaxed);
    }

    /// Classifies this partition's count against its local thresholds.
    /// Strict on both sides: a count sitting exactly on a threshold is
    /// `Between`.
    pub(crate) fn position(&self) -> Position {
        let (c, l, h) = (self.count(), self.low(), self.high());
        if c < l {
            Position::Below
        } else if c > h {
            Position::Above
        } else {
            Position::Between
        }
    }

    pub(crate) fn is_at_low(&self) -> bool {
        self.count() == self.low()
    }

    pub(crate) fn is_at_high(&self) -> bool {
        self.count() == self.high()
    }

    /// Plans an addition of `by`.
    ///
    /// A partition strictly above its high threshold absorbs anything; one
    /// strictly below absorbs up to its low threshold; one in between
    /// absorbs up to its high threshold. Sitting exactly on the low
    /// threshold absorbs nothing until the low deficit is settled, because
    /// moving off that boundary while a sibling still sits strictly below
    /// its own low would let the array report "below" and "above" at once.
    pub(crate) fn needed_for_add(&self, by: u64) -> AddPlan {
        let (c, l, h) = (self.count(), self.low(), self.high());
        let end = c.saturating_add(by);
        if c > h {
            return AddPlan {
                apply: by,
                low_needed: 0,
                high_needed: 0,
            };
        }
        if c < l {
            return AddPlan {
                apply: by.min(l - c),
                low_needed: end.saturating_sub(l),
                high_needed: end.saturating_sub(h),
            };
        }
        // l <= c <= h
        AddPlan {
            apply: if c == l { 0 } else { by.min(h - c) },
            low_needed: if c == l { by } else { 0 },
            high_needed: end.saturating_sub(h),
        }
    }

    /// Plans a subtraction of `by`: the subtraction analogue of
    /// [`needed_for_add`](Partition::needed_for_add), with borrowed *count*
    /// standing in for borrowed threshold capacity.
    pub(crate) fn needed_for_sub(&self, by: u64) -> SubPlan {
        let (c, l, h) = (self.count(), self.low(), self.high());
        if c < l {
            return SubPlan {
                apply: by.min(c),
                count_needed: by.saturating_sub(c),
            };
        }
        if c > h {
            return SubPlan {
                apply: by.min(c - h),
                count_needed: h.saturating_add(by).saturating_sub(c),
            };
        }
        // l <= c <= h
        SubPlan {
            apply: if c == h { 0 } else { by.min(c - l) },
            count_needed: if c == h {
                by
            } else {
                l.saturating_add(by).saturating_sub(c)
            },
        }
    }

    /// Donates up to `want` units of low threshold to `to`.
    ///
    /// Only a partition whose count sits below its low threshold has low
    /// slack to give; it is drained down to (at most) its own count. The
    /// receiver gets matching high threshold whenever the extra low would
    /// otherwise exceed its high. Both locks must be held.
    pub(crate) fn donate_low(&self, to: &Partition, want: u64) -> u64 {
        let dl = want.min(self.peek_low_slack());
        if dl == 0 {
            return 0;
        }
        let dh = (to.low() + dl).saturating_sub(to.high());
        debug_assert!(dh <= dl);
        self.low.fetch_sub(dl, Ordering::Relaxed);
        self.high.fetch_sub(dh, Ordering::Relaxed);
        to.low.fetch_add(dl, Ordering::Relaxed);
        to.high.fetch_add(dh, Ordering::Relaxed);
        debug_assert!(self.low() <= self.high() && self.count() <= self.low());
        debug_assert!(to.low() <= to.high());
        dl
    }

    /// Donates up to `want` units of high threshold to `to`, keeping at
    /// least `max(count, low)` for itself so it never turns strictly above.
    /// Both locks must be held.
    pub(crate) fn donate_high(&self, to: &Partition, want: u64) -> u64 {
        let dh = want.min(self.peek_high_slack());
        if dh == 0 {
            return 0;
        }
        self.high.fetch_sub(dh, Ordering::Relaxed);
        to.high.fetch_add(dh, Ordering::Relaxed);
        debug_assert!(self.low() <= self.high() && self.count() <= self.high());
        dh
    }

    /// Donates up to `want` units of count to `to`.
    ///
    /// A donor above its high threshold gives surplus freely; one between
    /// its thresholds gives down to its low; one strictly below gives its
    /// whole count. In the latter two cases the donor also hands over
    /// threshold capacity so the moved count leaves the receiver strictly
    /// inside its own region, one unit past the boundary the bare count
    /// would land on. A receiver parked exactly on a boundary cannot absorb
    /// anything, so landing it there would only move the deficit around.
    /// The donor always has that spare unit, being strictly inside itself.
    /// Both locks must be held.
    pub(crate) fn donate_count(&self, to: &Partition, want: u64) -> u64 {
        let (c, l, h) = (self.count(), self.low(), self.high());
        if want == 0 || c == 0 {
            return 0;
        }
        if c > h {
            let dc = want.min(c - h);
            self.count.fetch_sub(dc, Ordering::Relaxed);
            to.count.fetch_add(dc, Ordering::Relaxed);
            return dc;
        }
        if c > l && c < h {
            let dc = want.min(c - l);
            let dh = if to.count() > to.high() {
                0
            } else {
                to.count()
                    .saturating_add(dc)
                    .saturating_add(1)
                    .saturating_sub(to.high())
            };
            self.count.fetch_sub(dc, Ordering::Relaxed);
            self.high.fetch_sub(dh, Ordering::Relaxed);
            to.count.fetch_add(dc, Ordering::Relaxed);
            to.high.fetch_add(dh, Ordering::Relaxed);
            debug_assert!(self.low() <= self.high() && self.count() <= self.high());
            debug_assert!(to.count() != to.high());
            return dc;
        }
        if c < l {
            let dc = want.min(c);
            let dl = to
                .count()
                .saturating_add(dc)
                .saturating_add(1)
                .saturating_sub(to.low())
                .min(l - c + dc);
            let dh = to.low().saturating_add(dl).saturating_sub(to.high());
            debug_assert!(dh <= dl);
            self.count.fetch_sub(dc, Ordering::Relaxed);
            self.low.fetch_sub(dl, Ordering::Relaxed);
            self.high.fetch_sub(dh, Ordering::Relaxed);
            to.count.fetch_add(dc, Ordering::Relaxed);
            to.low.fetch_add(dl, Ordering::Relaxed);
            to.high.fetch_add(dh, Ordering::Relaxed);
            debug_assert!(self.low() <= self.high());
            debug_assert!(to.count() < to.low());
            return dc;
        }
        0
    }

    /// Moves this partition's entire count, low and high into `to`, leaving
    /// this one zeroed. Used only while every partition lock is held, to
    /// consolidate global state into a single record.
    pub(crate) fn transfer_all(&self, to: &Partition) {
        to.count
            .fetch_add(self.count.swap(0, Ordering::Relaxed), Ordering::Relaxed);
        to.low
            .fetch_add(self.low.swap(0, Ordering::Relaxed), Ordering::Relaxed);
        to.high
            .fetch_add(self.high.swap(0, Ordering::Relaxed), Ordering::Relaxed);
    }
}

impl std::fmt::Debug for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partition")
            .field("count", &self.count())
            .field("low", &self.low())
            .field("high", &self.high())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(count: u64, low: u64, high: u64) -> Partition {
        let p = Partition::new();
        p.set_thresholds(low, high);
        p.force_add(count);
        p
    }

    #[test]
    fn test_position_strict_comparisons() {
        assert_eq!(part(4, 5, 10).position(), Position::Below);
        assert_eq!(part(5, 5, 10).position(), Position::Between);
        assert_eq!(part(10, 5, 10).position(), Position::Between);
        assert_eq!(part(11, 5, 10).position(), Position::Above);
    }

    #[test]
    fn test_boundary_checks() {
        let p = part(5, 5, 10);
        assert!(p.is_at_low());
        assert!(!p.is_at_high());
        p.force_add(5);
        assert!(p.is_at_high());
    }

    #[test]
    fn test_force_sub_clips() {
        let p = part(3, 0, 10);
        p.force_sub(3);
        assert_eq!(p.count(), 0);
    }

    #[test]
    fn test_needed_for_add_below() {
        let p = part(2, 10, 20);
        // Room up to the low threshold, deficits past it.
        assert_eq!(
            p.needed_for_add(5),
            AddPlan {
                apply: 5,
                low_needed: 0,
                high_needed: 0
            }
        );
        assert_eq!(
            p.needed_for_add(12),
            AddPlan {
                apply: 8,
                low_needed: 4,
                high_needed: 0
            }
        );
        assert_eq!(
            p.needed_for_add(30),
            AddPlan {
                apply: 8,
                low_needed: 22,
                high_needed: 12
            }
        );
    }

    #[test]
    fn test_needed_for_add_at_low_boundary() {
        let p = part(10, 10, 20);
        assert_eq!(
            p.needed_for_add(3),
            AddPlan {
                apply: 0,
                low_needed: 3,
                high_needed: 0
            }
        );
    }

    #[test]
    fn test_needed_for_add_between_and_above() {
        let p = part(15, 10, 20);
        assert_eq!(
            p.needed_for_add(3),
            AddPlan {
                apply: 3,
                low_needed: 0,
                high_needed: 0
            }
        );
        assert_eq!(
            p.needed_for_add(8),
            AddPlan {
                apply: 5,
                low_needed: 0,
                high_needed: 3
            }
        );
        let above = part(25, 10, 20);
        assert_eq!(
            above.needed_for_add(100),
            AddPlan {
                apply: 100,
                low_needed: 0,
                high_needed: 0
            }
        );
    }

    #[test]
    fn test_needed_for_sub_cases() {
        // Strictly below: only the zero floor matters.
        let below = part(3, 10, 20);
        assert_eq!(
            below.needed_for_sub(2),
            SubPlan {
                apply: 2,
                count_needed: 0
            }
        );
        assert_eq!(
            below.needed_for_sub(5),
            SubPlan {
                apply: 3,
                count_needed: 2
            }
        );
        // Above: free down to high, borrowed past it.
        let above = part(25, 10, 20);
        assert_eq!(
            above.needed_for_sub(5),
            SubPlan {
                apply: 5,
                count_needed: 0
            }
        );
        assert_eq!(
            above.needed_for_sub(8),
            SubPlan {
                apply: 5,
                count_needed: 3
            }
        );
        // Between: free down to low.
        let mid = part(15, 10, 20);
        assert_eq!(
            mid.needed_for_sub(5),
            SubPlan {
                apply: 5,
                count_needed: 0
            }
        );
        assert_eq!(
            mid.needed_for_sub(7),
            SubPlan {
                apply: 5,
                count_needed: 2
            }
        );
        // Exactly at high: crossing down needs everyone else's surplus first.
        let at_high = part(20, 10, 20);
        assert_eq!(
            at_high.needed_for_sub(1),
            SubPlan {
                apply: 0,
                count_needed: 1
            }
        );
    }

    #[test]
    fn test_needed_for_sub_huge_thresholds() {
        // Thresholds near u64::MAX are legitimate "effectively disabled"
        // configurations; planning must not overflow on them.
        let above = part(u64::MAX, 0, u64::MAX / 2);
        let plan = above.needed_for_sub(u64::MAX);
        assert_eq!(plan.apply, u64::MAX - u64::MAX / 2);
        assert_eq!(plan.count_needed, 0);

        let mid = part(u64::MAX / 2 + 2, u64::MAX / 2, u64::MAX);
        let plan = mid.needed_for_sub(u64::MAX);
        assert_eq!(plan.apply, 2);
        assert_eq!(plan.count_needed, u64::MAX - (u64::MAX / 2 + 2));
    }

    #[test]
    fn test_donate_low_drains_to_count() {
        let from = part(2, 10, 20);
        let to = part(0, 0, 0);
        let moved = from.donate_low(&to, 5);
        assert_eq!(moved, 5);
        assert_eq!(from.low(), 5);
        assert_eq!(to.low(), 5);
        // The receiver got matching high so low <= high still holds.
        assert_eq!(to.high(), 5);
        assert!(from.low() <= from.high());
        // Nothing left past the donor's own count after a full drain.
        assert_eq!(from.donate_low(&to, 100), 3);
        assert_eq!(from.low(), from.count());
    }

    #[test]
    fn test_donate_low_from_non_below_is_zero() {
        let from = part(10, 10, 20);
        let to = part(0, 0, 0);
        assert_eq!(from.donate_low(&to, 5), 0);
    }

    #[test]
    fn test_donate_high_keeps_own_cover() {
        let from = part(12, 10, 20);
        let to = part(5, 5, 5);
        assert_eq!(from.donate_high(&to, 6), 6);
        assert_eq!(from.high(), 14);
        assert_eq!(to.high(), 11);
        // Slack is high - max(count, low); never dips below its own count.
        assert_eq!(from.donate_high(&to, 100), 2);
        assert_eq!(from.high(), 12);
    }

    #[test]
    fn test_donate_count_above_surplus() {
        let from = part(25, 10, 20);
        let to = part(20, 15, 20);
        assert_eq!(from.donate_count(&to, 3), 3);
        assert_eq!(from.count(), 22);
        assert_eq!(to.count(), 23);
    }

    #[test]
    fn test_donate_count_mid_with_high_topup() {
        let from = part(15, 10, 20);
        let to = part(4, 0, 4);
        // Receiver is at its high; bare count would push it strictly above,
        // so high threshold comes along, with one unit to spare so the
        // receiver can absorb the moved count.
        assert_eq!(from.donate_count(&to, 5), 5);
        assert_eq!(to.count(), 9);
        assert_eq!(to.high(), 10);
        assert!(to.count() < to.high());
        assert_eq!(from.count(), 10);
        assert_eq!(from.high(), 14);
        assert!(from.count() <= from.high());
    }

    #[test]
    fn test_donate_count_mid_leaves_receiver_off_boundary() {
        // A receiver landed exactly on count == high could not absorb any
        // of the count it was just given; the deficit would only bounce
        // between the partitions.
        let from = part(10_000_000, 0, 100_000_000);
        let to = part(0, 0, 0);
        let moved = from.donate_count(&to, 5_000_000);
        assert_eq!(moved, 5_000_000);
        assert!(to.count() < to.high());
        assert!(to.count() > to.low());
        assert!(from.count() <= from.high());
    }

    #[test]
    fn test_donate_count_below_with_threshold_topup() {
        let from = part(3, 5, 5);
        let to = part(0, 0, 0);
        assert_eq!(from.donate_count(&to, 2), 2);
        // Receiver ends strictly below its low rather than parked on it or
        // turning spuriously above.
        assert_eq!(to.count(), 2);
        assert_eq!(to.low(), 3);
        assert_eq!(to.high(), 3);
        assert!(to.count() < to.low());
        assert_eq!(from.count(), 1);
        assert!(from.count() < from.low());
        assert!(from.low() <= from.high());
    }

    #[test]
    fn test_donate_count_at_boundary_is_zero() {
        let at_low = part(10, 10, 20);
        let at_high = part(20, 10, 20);
        let to = part(0, 0, 0);
        assert_eq!(at_low.donate_count(&to, 5), 0);
        assert_eq!(at_high.donate_count(&to, 5), 0);
    }

    #[test]
    fn test_transfer_all() {
        let from = part(7, 10, 20);
        let to = part(1, 2, 3);
        from.transfer_all(&to);
        assert_eq!((from.count(), from.low(), from.high()), (0, 0, 0));
        assert_eq!((to.count(), to.low(), to.high()), (8, 12, 23));
    }
}
