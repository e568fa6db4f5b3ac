//! # Soglie - Partitioned Dual-Threshold Counters
//!
//! A Rust library providing a thread-safe counter that tracks its position
//! relative to a **low/high threshold pair** without paying for global
//! synchronization on every update. This library implements a **partitioned
//! threshold pattern**: both the count *and* the thresholds are sharded
//! across per-core partitions, so the common-case update stays on a single
//! cache line even though the counter can always answer "are we below,
//! between, or above the configured band?".
//!
//! ## The Problem
//!
//! Admission control, backpressure, and watermark logic all need the same
//! primitive: a shared counter compared against a low and a high bound. The
//! naive version is a mutex (or a single atomic plus careful compare logic)
//! around `count`, `low` and `high`. Under load every increment from every
//! core serializes on that one cache line, and the comparison that was the
//! whole point becomes the bottleneck.
//!
//! Plain sharded counters fix the contention but lose the comparison: with
//! the count scattered across shards, no single shard knows whether the
//! *total* crossed a threshold, and summing on every update brings the
//! contention right back.
//!
//! ## The Solution: Shard the Thresholds Too
//!
//! This library distributes the thresholds along with the count. Each
//! partition holds a `(count, low, high)` triple; the per-partition lows and
//! highs always sum to the configured global thresholds. A partition whose
//! count sits strictly inside (or strictly outside) its own slice of the
//! band knows the global answer too, because the partitions are kept
//! region-consistent: the array never has one partition strictly below its
//! low while another is strictly above its high.
//!
//! ### Design Principles
//!
//! 1. **Per-Thread Partitioning**: Each thread gets a home partition via
//!    `thread_local!` slot assignment, so concurrent updates from different
//!    threads normally touch different locks and different cache lines.
//!
//! 2. **Cache Line Padding**: Each partition is wrapped in
//!    [`crossbeam_utils::CachePadded`] so neighbouring partitions never
//!    false-share a cache line.
//!
//! 3. **Capacity Migration**: When a home partition exhausts its local
//!    slice of threshold (or of count, when subtracting), the operation
//!    borrows capacity from sibling partitions. Locks are taken through an
//!    internal accumulator that enforces an ascending-index order, so
//!    discovery-order acquisition can never deadlock.
//!
//! 4. **Crossings Under Full Lock**: An update that genuinely moves the
//!    global sum across a threshold finishes with every partition lock
//!    held and the state consolidated, so the recorded position and the
//!    transition counts reflect crossings that really happened, exactly
//!    once each.
//!
//! ## Quick Start
//!
//! ```rust
//! use soglie::counter::threshold::ThresholdCounter;
//! use soglie::counter::Position;
//!
//! // Create a counter (can be shared across threads via Arc).
//! let inflight = ThresholdCounter::new().with_name("inflight");
//! inflight.initialize(10, 20);
//!
//! inflight.add(5);
//! assert_eq!(inflight.sum(), 5);
//! assert_eq!(inflight.current_state(), Position::Below);
//!
//! inflight.add(20);
//! assert_eq!(inflight.current_state(), Position::Above);
//!
//! // How often did we cross into the overloaded region?
//! assert_eq!(inflight.transition_stats().to_above, 1);
//! ```
//!
//! ## Reading the Position
//!
//! [`current_state`](counter::threshold::ThresholdCounter::current_state)
//! is a single relaxed atomic load: it returns the position recorded by the
//! most recent operation that could prove it. While the sum hovers exactly
//! on a threshold the reading may lag by a boundary-touching step; as soon
//! as the sum moves strictly away from the boundary it firms up. This is
//! the intended trade for admission-control use, where the answer gates a
//! fast path and boundary-exact precision is not worth a global sum.
//!
//! ## Thread Safety
//!
//! [`ThresholdCounter`](counter::threshold::ThresholdCounter) is
//! `Send + Sync` and is shared across threads with `Arc`. Updates take the
//! home partition's lock; readers of `current_state` take no lock at all.
//!
//! ## Observers
//!
//! Optional observer modules export counter state in various formats, each
//! gated behind a feature flag:
//!
//! | Feature | Module | Description |
//! |---------|--------|-------------|
//! | `table` | [`observers::table`] | Pretty-print counters as ASCII tables |
//! | `json`  | [`observers::json`]  | Serialize counter snapshots to JSON |
//! | `serde` | [`snapshot`]         | Serde-ready point-in-time snapshots |
//! | `full`  | All observers        | Enables `table` and `json` |
//!
//! ### Example: Table Output
//!
//! ```toml
//! [dependencies]
//! soglie = { version = "0.1", features = ["table"] }
//! ```
//!
//! ```rust,ignore
//! use soglie::counter::Observable;
//! use soglie::counter::threshold::ThresholdCounter;
//! use soglie::observers::table::TableObserver;
//!
//! let inflight = ThresholdCounter::new().with_name("inflight");
//! inflight.initialize(10, 20);
//! inflight.add(1000);
//!
//! let counters: Vec<&dyn Observable> = vec![&inflight];
//! println!("{}", TableObserver::new().render(counters.into_iter()));
//! ```
//!
//! ### Example: JSON Output
//!
//! ```toml
//! [dependencies]
//! soglie = { version = "0.1", features = ["json"] }
//! ```
//!
//! ```rust,ignore
//! use soglie::observers::json::JsonObserver;
//!
//! let json = JsonObserver::new()
//!     .pretty(true)
//!     .to_json(counters.into_iter())?;
//! ```

pub mod counter;
pub mod observers;

#[cfg(feature = "serde")]
pub mod snapshot;
