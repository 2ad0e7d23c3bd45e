//! BlinkDB storage engine.
//!
//! Three tiers of residency for each key:
//!
//! - **Hot** - the small L1 [`LruLevel`], where writes land and frequently
//!   read keys are promoted.
//! - **Warm** - the larger L2 [`LruLevel`], holding hot evictees.
//! - **Disk** - the [`DiskStore`] cold tier, holding warm evictees as one
//!   file per key plus an in-memory index.
//!
//! [`TieredCache`] implements the in-memory policy (LRU ordering,
//! frequency-triggered promotion, one-step eviction cascades) and hands
//! evictees past the warm tier to a [`SpillSink`]. [`BlinkDb`] composes
//! the cache with a `DiskStore` and maintains the membership-exclusivity
//! invariant: a key lives in at most one tier at a time.

mod disk;
mod engine;
mod lru;
mod tiered;

pub use disk::DiskStore;
pub use engine::{BlinkDb, Builder, Stats};
pub use lru::LruLevel;
pub use tiered::{PROMOTION_THRESHOLD, SpillSink, TieredCache};
