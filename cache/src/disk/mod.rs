//! Durable caching of fetched responses.
//!
//! [`DiskLruCache`] is a journaled LRU store of files keyed by legal keys.
//! [`DiskCache`] sits on top of it, hashing arbitrary keys and fixing each
//! entry to a metadata value and a data value.

mod builder;
mod cache;
mod cleanup;
mod entry;
mod fault;
mod journal;
pub mod lru;

pub use builder::{
  DiskCacheBuilder, DiskCacheConfig, DEFAULT_MAXIMUM_MAX_SIZE, DEFAULT_MAX_SIZE_PERCENT,
  DEFAULT_MINIMUM_MAX_SIZE,
};
pub use cache::{hash_key, DiskCache, DiskCacheEditor, DiskCacheSnapshot, ENTRY_DATA, ENTRY_METADATA};
pub use lru::{DiskLruCache, Editor, Snapshot, DEFAULT_REWRITE_THRESHOLD};
