//! Domain filtering
//!
//! # Components
//!
//! - [`Blacklist`]: bloom filter in front of a sorted domain list
//! - [`BloomFilter`]: the probabilistic first tier
//! - [`OverrideMap`]: optional static domain to IPv4 answers
//!
//! # Lookup path
//!
//! ```text
//! domain ──> lowercase ──> BloomFilter ── absent ──> not blocked
//!                               │
//!                             maybe
//!                               v
//!                     binary search (sorted list) ── present ──> blocked
//!                               │
//!                             absent
//!                               v
//!                          not blocked
//! ```

mod blacklist;
mod bloom;
mod override_map;

pub use blacklist::{Blacklist, BITS_PER_DOMAIN, BLOOM_HASHES};
pub use bloom::BloomFilter;
pub use override_map::OverrideMap;
