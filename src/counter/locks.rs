//! Deadlock-free accumulation of partition locks.
//!
//! An operation on the counter discovers which partitions it needs as it
//! goes: the home partition first, then whichever siblings turn out to have
//! spare capacity. Acquiring an arbitrary set of locks in discovery order is
//! the classic recipe for deadlock, so the accumulator enforces a total
//! order instead: whenever a contended lock would have to be taken
//! out of ascending-index order, every held lock at or above the requested
//! index is released and the whole set is re-acquired in ascending order.
//! If the requested index falls below the first lock this accumulator ever
//! took, everything is released, because the first lock acquired must always
//! be the last one released.
//!
//! The release-and-reacquire cycle is reported to the caller, which must
//! treat everything it read from already-locked partitions as stale and
//! restart its read-and-decide step: another operation may have slipped in
//! while the locks were down.
//!
//! The accumulator is a stack-local helper for exactly one logical
//! operation; it is not itself thread-safe, and its `Drop` releases whatever
//! is still held.

use crossbeam_utils::CachePadded;

use crate::counter::partition::Partition;

pub(crate) struct LockAccumulator<'a> {
    partitions: &'a [CachePadded<Partition>],
    /// Bitmask of held partition locks; bit `i` covers partition `i`.
    held: u64,
    /// Index of the first lock acquired, released last. Meaningful only
    /// while `held != 0`.
    first: usize,
}

impl<'a> LockAccumulator<'a> {
    pub(crate) fn new(partitions: &'a [CachePadded<Partition>]) -> Self {
        debug_assert!(partitions.len() <= 64);
        LockAccumulator {
            partitions,
            held: 0,
            first: 0,
        }
    }

    pub(crate) fn holds(&self, index: usize) -> bool {
        self.held & (1u64 << index) != 0
    }

    pub(crate) fn holds_all(&self) -> bool {
        self.held.count_ones() as usize == self.partitions.len()
    }

    /// Acquires the lock for `index`, keeping the ascending-order
    /// discipline.
    ///
    /// Returns `true` when the lock was obtained without disturbing any
    /// previously held lock (already held, uncontended, or blocking-acquired
    /// above everything held). Returns `false` when a release-and-reacquire
    /// cycle was needed: the caller's previously observed partition state
    /// may be stale and its read-and-decide step must restart.
    pub(crate) fn acquire(&mut self, index: usize) -> bool {
        debug_assert!(index < self.partitions.len());
        let bit = 1u64 << index;
        if self.held & bit != 0 {
            return true;
        }
        if self.held == 0 {
            self.partitions[index].acquire();
            self.held = bit;
            self.first = index;
            return true;
        }
        if self.partitions[index].try_acquire() {
            self.held |= bit;
            return true;
        }
        // Contended. Work out what must come down to restore ascending
        // order: everything at or above the requested index, or everything
        // if the request falls below the first-acquired lock.
        let release = if index < self.first {
            self.held
        } else {
            self.held & !(bit - 1)
        };
        if release == 0 {
            // The request is above everything held; blocking here keeps the
            // order intact.
            self.partitions[index].acquire();
            self.held |= bit;
            return true;
        }
        let releasing_all = release == self.held;
        for i in (0..self.partitions.len()).rev() {
            if release & (1u64 << i) != 0 && (!releasing_all || i != self.first) {
                self.partitions[i].release();
            }
        }
        if releasing_all {
            self.partitions[self.first].release();
        }
        self.held &= !release;
        let reacquire = release | bit;
        for i in 0..self.partitions.len() {
            if reacquire & (1u64 << i) != 0 {
                self.partitions[i].acquire();
                self.held |= 1u64 << i;
            }
        }
        if releasing_all {
            self.first = reacquire.trailing_zeros() as usize;
        }
        false
    }

    /// Acquires every partition lock. Returns `true` only if no
    /// release-and-reacquire cycle occurred along the way.
    pub(crate) fn acquire_all(&mut self) -> bool {
        let mut undisturbed = true;
        for i in 0..self.partitions.len() {
            undisturbed &= self.acquire(i);
        }
        undisturbed
    }

    /// Releases every held lock, the first-acquired one last.
    pub(crate) fn release_all(&mut self) {
        if self.held == 0 {
            return;
        }
        for i in (0..self.partitions.len()).rev() {
            if i != self.first && self.held & (1u64 << i) != 0 {
                self.partitions[i].release();
            }
        }
        self.partitions[self.first].release();
        self.held = 0;
    }
}

impl Drop for LockAccumulator<'_> {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn partitions(n: usize) -> Vec<CachePadded<Partition>> {
        (0..n).map(|_| CachePadded::new(Partition::new())).collect()
    }

    #[test]
    fn test_acquire_is_idempotent() {
        let parts = partitions(4);
        let mut locks = LockAccumulator::new(&parts);
        assert!(locks.acquire(2));
        assert!(locks.acquire(2));
        assert!(locks.holds(2));
        assert!(!locks.holds(0));
    }

    #[test]
    fn test_uncontended_out_of_order_acquire() {
        let parts = partitions(4);
        let mut locks = LockAccumulator::new(&parts);
        // Without contention even a descending request succeeds in place.
        assert!(locks.acquire(3));
        assert!(locks.acquire(1));
        assert!(locks.acquire(0));
        assert!(locks.holds(3) && locks.holds(1) && locks.holds(0));
    }

    #[test]
    fn test_release_all_allows_reacquisition() {
        let parts = partitions(3);
        let mut locks = LockAccumulator::new(&parts);
        locks.acquire_all();
        assert!(locks.holds_all());
        locks.release_all();
        assert!(!locks.holds(0));
        let mut again = LockAccumulator::new(&parts);
        assert!(again.acquire_all());
        assert!(again.holds_all());
    }

    #[test]
    fn test_drop_releases() {
        let parts = partitions(2);
        {
            let mut locks = LockAccumulator::new(&parts);
            locks.acquire_all();
        }
        assert!(parts[0].try_acquire());
        assert!(parts[1].try_acquire());
        parts[1].release();
        parts[0].release();
    }

    #[test]
    fn test_contended_acquire_reports_disturbance() {
        let parts = partitions(3);
        // Another context holds partition 0, forcing the descending request
        // through the release-and-reacquire path.
        parts[0].acquire();
        let (held_tx, held_rx) = std::sync::mpsc::channel::<()>();
        std::thread::scope(|scope| {
            let parts = &parts;
            let handle = scope.spawn(move || {
                let mut locks = LockAccumulator::new(parts);
                assert!(locks.acquire(2));
                held_tx.send(()).unwrap();
                // Blocks until the main thread drops partition 0, then must
                // report that held state was disturbed.
                assert!(!locks.acquire(0));
                assert!(locks.holds(0) && locks.holds(2));
            });
            held_rx.recv().unwrap();
            // Give the worker time to block inside acquire(0) so its
            // try-lock is guaranteed to have failed first.
            std::thread::sleep(std::time::Duration::from_millis(100));
            parts[0].release();
            handle.join().unwrap();
        });
    }

    #[test]
    fn test_no_deadlock_under_adversarial_orders() {
        let parts = Arc::new(partitions(8));
        let done = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];
        for t in 0..4 {
            let parts = Arc::clone(&parts);
            let done = Arc::clone(&done);
            handles.push(std::thread::spawn(move || {
                // Each thread repeatedly accumulates locks in a different,
                // deliberately conflicting order.
                for round in 0..2_000usize {
                    let mut locks = LockAccumulator::new(&parts);
                    let start = (t * 3 + round) % parts.len();
                    for step in 0..parts.len() {
                        let idx = (start + parts.len() - step) % parts.len();
                        locks.acquire(idx);
                    }
                    assert!(locks.holds_all());
                }
                done.fetch_add(1, Ordering::Relaxed);
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(done.load(Ordering::Relaxed), 4);
    }
}
