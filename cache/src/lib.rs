//! The caching core of the glint image loader.
//!
//! # Components
//! - **Bitmap pool**: reusable pixel buffers bucketed by a pluggable
//!   [`PoolingStrategy`](pool::strategy::PoolingStrategy), bounded by bytes.
//! - **Reference counter**: tracks who still holds a bitmap and returns it
//!   to the pool once nobody does.
//! - **Memory cache**: a strong LRU tier in front of a weak tier, behind the
//!   [`MemoryCache`] facade.
//! - **Disk cache**: a crash-safe, journaled LRU store ([`DiskLruCache`]) and
//!   the [`DiskCache`] facade that stores a metadata and a data file per key.
//! - **HTTP freshness**: [`CacheStrategy`] decides whether a cached response
//!   may be served, must be revalidated or must be fetched again.
//!
//! Every type here is explicitly constructed and internally synchronized.
//! There is no global instance.

pub mod bitmap;
pub mod disk;
pub mod error;
pub mod http;
pub mod memory;
pub mod metrics;
pub mod pool;
pub mod reference;
pub mod trim;

// Internal, crate-only modules
mod lru_list;

pub use bitmap::{Bitmap, BitmapId, PixelConfig};
pub use disk::{DiskCache, DiskCacheBuilder, DiskLruCache};
pub use error::{BuildError, DiskCacheError};
pub use http::{CacheDecision, CacheResponse, CacheStrategy};
pub use memory::{MemoryCache, MemoryCacheBuilder, MemoryCacheKey, MemoryCacheValue};
pub use pool::{BitmapPool, EmptyBitmapPool, RealBitmapPool};
pub use reference::{BitmapReferenceCounter, RealBitmapReferenceCounter};
pub use trim::TrimLevel;
