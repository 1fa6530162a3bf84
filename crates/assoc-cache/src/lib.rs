//! A fixed-capacity, power-of-two set-associative cache with CLOCK-style
//! second-chance eviction, backed by bit-packed per-slot metadata.
//!
//! Single-owner, single-threaded by construction: the cache holds no
//! interior synchronization and is not meant to be shared across threads.

mod bitpacked;
mod cache;
mod error;

pub use bitpacked::{get_packed, set_packed, words_for, PackedArray};
pub use cache::{CacheAdapter, Layout, SetAssociativeCache};
pub use error::CacheError;
