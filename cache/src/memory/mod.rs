//! The two-tier in-memory bitmap cache.
//!
//! [`MemoryCache`] puts a size-bounded [`StrongMemoryCache`] in front of a
//! [`WeakMemoryCache`]. Values leaving the strong tier are released to the
//! [`BitmapReferenceCounter`], which returns them to the [`BitmapPool`] once
//! nothing else is using them, or else are kept reachable through the weak
//! tier for as long as some consumer holds them.
//!
//! All types here are internally synchronized. Lock order is strong tier,
//! then weak tier or reference counter, then pool.

mod key;
pub mod strong;
mod value;
pub mod weak;

pub use key::{Keyer, MemoryCacheKey};
pub use strong::StrongMemoryCache;
pub use value::{DecodedImage, MemoryCacheValue};
pub use weak::{EmptyWeakMemoryCache, RealWeakMemoryCache, WeakMemoryCache};

use crate::bitmap::PixelConfig;
use crate::error::BuildError;
use crate::metrics::{MemoryMetrics, MemoryMetricsSnapshot};
use crate::pool::{BitmapPool, BitmapPoolConfig, EmptyBitmapPool, PoolingStrategyKind, RealBitmapPool};
use crate::reference::{BitmapReferenceCounter, EmptyBitmapReferenceCounter, RealBitmapReferenceCounter};
use crate::trim::TrimLevel;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::debug;

/// Share of the available memory used when no explicit budget is given.
pub const DEFAULT_MEMORY_PERCENT: f64 = 0.25;

/// The memory cache facade.
pub struct MemoryCache {
  strong: StrongMemoryCache,
  weak: Arc<dyn WeakMemoryCache>,
  counter: Arc<dyn BitmapReferenceCounter>,
  pool: Arc<dyn BitmapPool>,
  metrics: MemoryMetrics,
}

impl MemoryCache {
  pub fn builder() -> MemoryCacheBuilder {
    MemoryCacheBuilder::new()
  }

  /// Looks `key` up in the strong tier, then in the weak tier.
  pub fn get(&self, key: &MemoryCacheKey) -> Option<MemoryCacheValue> {
    if let Some(value) = self.strong.get(key) {
      self.metrics.strong_hits.fetch_add(1, Ordering::Relaxed);
      return Some(value);
    }
    if let Some(value) = self.weak.get(key) {
      self.metrics.weak_hits.fetch_add(1, Ordering::Relaxed);
      return Some(value);
    }
    self.metrics.misses.fetch_add(1, Ordering::Relaxed);
    None
  }

  pub fn set(&self, key: MemoryCacheKey, value: impl Into<MemoryCacheValue>) {
    let value = value.into();
    self.strong.set(key, value.bitmap, value.extras);
    self.metrics.sets.fetch_add(1, Ordering::Relaxed);
  }

  /// Removes `key` from both tiers. Returns whether either tier held it.
  pub fn remove(&self, key: &MemoryCacheKey) -> bool {
    // Strong first: its removal may hand the value to the weak tier.
    let removed_strong = self.strong.remove(key);
    let removed_weak = self.weak.remove(key);
    let removed = removed_strong || removed_weak;
    if removed {
      self.metrics.removals.fetch_add(1, Ordering::Relaxed);
    }
    removed
  }

  pub fn clear(&self) {
    self.strong.clear();
    self.weak.clear();
  }

  /// Reacts to memory pressure in both tiers and the pool.
  pub fn trim_memory(&self, level: TrimLevel) {
    debug!(%level, size = self.size(), "trimming memory cache");
    self.strong.trim_memory(level);
    self.weak.trim_memory(level);
    self.pool.trim_memory(level);
  }

  /// Bytes held by the strong tier.
  pub fn size(&self) -> u64 {
    self.strong.size()
  }

  pub fn max_size(&self) -> u64 {
    self.strong.max_size()
  }

  /// Every key held by either tier.
  pub fn keys(&self) -> BTreeSet<MemoryCacheKey> {
    let mut keys: BTreeSet<_> = self.strong.keys().into_iter().collect();
    keys.extend(self.weak.keys());
    keys
  }

  pub fn strong(&self) -> &StrongMemoryCache {
    &self.strong
  }

  pub fn weak(&self) -> &Arc<dyn WeakMemoryCache> {
    &self.weak
  }

  pub fn reference_counter(&self) -> &Arc<dyn BitmapReferenceCounter> {
    &self.counter
  }

  pub fn bitmap_pool(&self) -> &Arc<dyn BitmapPool> {
    &self.pool
  }

  pub fn metrics(&self) -> MemoryMetricsSnapshot {
    self.metrics.snapshot(self.size(), self.max_size())
  }
}

impl fmt::Debug for MemoryCache {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MemoryCache")
      .field("strong", &self.strong)
      .field("weak", &self.weak)
      .field("pool", &self.pool)
      .finish_non_exhaustive()
  }
}

/// A builder for [`MemoryCache`].
pub struct MemoryCacheBuilder {
  max_size: Option<u64>,
  percent: f64,
  available_memory: Option<u64>,
  strong_references_enabled: bool,
  weak_references_enabled: bool,
  bitmap_pool: Option<Arc<dyn BitmapPool>>,
  pool_config: BitmapPoolConfig,
}

impl fmt::Debug for MemoryCacheBuilder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MemoryCacheBuilder")
      .field("max_size", &self.max_size)
      .field("percent", &self.percent)
      .field("available_memory", &self.available_memory)
      .field("strong_references_enabled", &self.strong_references_enabled)
      .field("weak_references_enabled", &self.weak_references_enabled)
      .field("has_bitmap_pool", &self.bitmap_pool.is_some())
      .field("pool_config", &self.pool_config)
      .finish()
  }
}

impl Default for MemoryCacheBuilder {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryCacheBuilder {
  pub fn new() -> Self {
    Self {
      max_size: None,
      percent: DEFAULT_MEMORY_PERCENT,
      available_memory: None,
      strong_references_enabled: true,
      weak_references_enabled: true,
      bitmap_pool: None,
      pool_config: BitmapPoolConfig::new(0),
    }
  }

  /// Sets an absolute byte budget for the strong tier.
  pub fn max_size_bytes(mut self, bytes: u64) -> Self {
    self.max_size = Some(bytes);
    self
  }

  /// Sizes the strong tier as a share of `available_memory_bytes`.
  pub fn max_size_percent(mut self, percent: f64, available_memory_bytes: u64) -> Self {
    self.max_size = None;
    self.percent = percent;
    self.available_memory = Some(available_memory_bytes);
    self
  }

  /// The memory the default percentage is taken from.
  pub fn available_memory(mut self, bytes: u64) -> Self {
    self.available_memory = Some(bytes);
    self
  }

  pub fn strong_references_enabled(mut self, enabled: bool) -> Self {
    self.strong_references_enabled = enabled;
    self
  }

  pub fn weak_references_enabled(mut self, enabled: bool) -> Self {
    self.weak_references_enabled = enabled;
    self
  }

  /// Uses an existing pool. Takes precedence over the pooling settings below.
  pub fn bitmap_pool(mut self, pool: Arc<dyn BitmapPool>) -> Self {
    self.bitmap_pool = Some(pool);
    self
  }

  /// Creates a pool with this budget. Zero disables pooling.
  pub fn bitmap_pooling_max_size(mut self, bytes: u64) -> Self {
    self.pool_config.max_size = bytes;
    self
  }

  pub fn pooling_strategy(mut self, strategy: PoolingStrategyKind) -> Self {
    self.pool_config.strategy = strategy;
    self
  }

  pub fn allowed_configs(mut self, configs: impl IntoIterator<Item = PixelConfig>) -> Self {
    self.pool_config.allowed_configs = configs.into_iter().collect();
    self
  }

  pub(crate) fn validate(&self) -> Result<(), BuildError> {
    if !(0.0..=1.0).contains(&self.percent) {
      return Err(BuildError::InvalidPercent(self.percent));
    }
    if self.max_size.is_none() && self.available_memory.is_none() {
      return Err(BuildError::MissingMaxSize);
    }
    Ok(())
  }

  fn resolved_max_size(&self) -> u64 {
    match (self.max_size, self.available_memory) {
      (Some(bytes), _) => bytes,
      (None, Some(available)) => (available as f64 * self.percent) as u64,
      (None, None) => 0,
    }
  }

  pub fn build(self) -> Result<MemoryCache, BuildError> {
    self.validate()?;
    let max_size = if self.strong_references_enabled {
      self.resolved_max_size()
    } else {
      0
    };

    let (pool, counter): (Arc<dyn BitmapPool>, Arc<dyn BitmapReferenceCounter>) =
      match self.bitmap_pool {
        Some(pool) => (pool.clone(), Arc::new(RealBitmapReferenceCounter::new(pool))),
        None if self.pool_config.max_size > 0 => {
          let pool: Arc<dyn BitmapPool> = Arc::new(RealBitmapPool::new(self.pool_config));
          (pool.clone(), Arc::new(RealBitmapReferenceCounter::new(pool)))
        }
        None => (Arc::new(EmptyBitmapPool), Arc::new(EmptyBitmapReferenceCounter)),
      };

    let weak: Arc<dyn WeakMemoryCache> = if self.weak_references_enabled {
      Arc::new(RealWeakMemoryCache::new())
    } else {
      Arc::new(EmptyWeakMemoryCache)
    };

    debug!(max_size, pool_max_size = pool.max_size(), "built memory cache");
    Ok(MemoryCache {
      strong: StrongMemoryCache::new(max_size, weak.clone(), counter.clone()),
      weak,
      counter,
      pool,
      metrics: MemoryMetrics::default(),
    })
  }
}
