//! Cache module for persisting per-item upstream lookups to disk
//!
//! This module provides a store that persists one JSON file per dataset
//! (e.g. `booklog-cache.json`), mapping each item's canonical URL to its
//! cached payload and a write timestamp. Reads are tolerant: an absent,
//! empty or corrupt file behaves exactly like a cold cache, so a broken
//! disk can never fail a request.

mod store;

pub use store::{is_valid, CacheEntry, CacheStore};
