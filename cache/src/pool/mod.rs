//! Reusable bitmap buffers.
//!
//! A [`BitmapPool`] holds on to bitmaps that are no longer displayed so that
//! the next decode of a similar size can write into an existing allocation
//! instead of allocating a new one.

mod linked_multimap;
pub mod strategy;

pub use strategy::{PoolingStrategy, PoolingStrategyKind};

use crate::bitmap::{Bitmap, PixelConfig};
use crate::metrics::{PoolMetrics, PoolMetricsSnapshot};
use crate::trim::TrimLevel;

use std::fmt;
use std::sync::atomic::Ordering;

use ahash::HashSet;
use parking_lot::Mutex;
use tracing::{debug, trace};

/// A pool of reusable bitmaps.
///
/// Implementations are internally synchronized and may be shared across
/// threads behind an `Arc`.
pub trait BitmapPool: Send + Sync + fmt::Debug {
  /// Offers a bitmap to the pool. Bitmaps the pool cannot use are dropped.
  fn put(&self, bitmap: Bitmap);

  /// Returns a pooled bitmap of the requested layout without clearing its
  /// pixels, or `None` if nothing suitable is pooled. The caller must
  /// overwrite every pixel.
  fn get_dirty_or_none(&self, width: u32, height: u32, config: PixelConfig) -> Option<Bitmap>;

  /// Shrinks or empties the pool in response to memory pressure.
  fn trim_memory(&self, level: TrimLevel);

  /// Drops every pooled bitmap.
  fn clear(&self);

  /// Bytes currently held by the pool.
  fn current_size(&self) -> u64;

  fn max_size(&self) -> u64;

  /// Returns a zero-filled pooled bitmap, or `None` if nothing is pooled.
  fn get_or_none(&self, width: u32, height: u32, config: PixelConfig) -> Option<Bitmap> {
    self.get_dirty_or_none(width, height, config).map(|mut bitmap| {
      bitmap.erase();
      bitmap
    })
  }

  /// Returns a zero-filled bitmap, allocating one if nothing is pooled.
  fn get(&self, width: u32, height: u32, config: PixelConfig) -> Bitmap {
    self
      .get_or_none(width, height, config)
      .unwrap_or_else(|| Bitmap::new(width, height, config))
  }

  /// Returns a bitmap whose contents are unspecified, allocating one if
  /// nothing is pooled.
  fn get_dirty(&self, width: u32, height: u32, config: PixelConfig) -> Bitmap {
    self
      .get_dirty_or_none(width, height, config)
      .unwrap_or_else(|| Bitmap::new(width, height, config))
  }
}

fn assert_not_hardware(config: PixelConfig) {
  assert!(
    !config.is_hardware(),
    "cannot create a mutable hardware bitmap"
  );
}

/// Configuration for a [`RealBitmapPool`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BitmapPoolConfig {
  /// The byte budget of the pool.
  pub max_size: u64,
  /// Configs the pool accepts.
  pub allowed_configs: Vec<PixelConfig>,
  pub strategy: PoolingStrategyKind,
}

impl BitmapPoolConfig {
  pub fn new(max_size: u64) -> Self {
    Self {
      max_size,
      allowed_configs: PixelConfig::ALL
        .into_iter()
        .filter(|config| !config.is_hardware())
        .collect(),
      strategy: PoolingStrategyKind::default(),
    }
  }

  pub fn allowed_configs(mut self, configs: impl IntoIterator<Item = PixelConfig>) -> Self {
    self.allowed_configs = configs.into_iter().collect();
    self
  }

  pub fn strategy(mut self, strategy: PoolingStrategyKind) -> Self {
    self.strategy = strategy;
    self
  }
}

#[derive(Debug)]
struct PoolState {
  strategy: Box<dyn PoolingStrategy>,
  current_size: u64,
}

/// A size-bounded bitmap pool that evicts least recently used buckets.
#[derive(Debug)]
pub struct RealBitmapPool {
  max_size: u64,
  allowed_configs: HashSet<PixelConfig>,
  state: Mutex<PoolState>,
  metrics: PoolMetrics,
}

impl RealBitmapPool {
  pub fn new(config: BitmapPoolConfig) -> Self {
    Self::with_strategy(config.max_size, config.allowed_configs, config.strategy.create())
  }

  /// Builds a pool around a caller-supplied strategy.
  pub fn with_strategy(
    max_size: u64,
    allowed_configs: impl IntoIterator<Item = PixelConfig>,
    strategy: Box<dyn PoolingStrategy>,
  ) -> Self {
    Self {
      max_size,
      allowed_configs: allowed_configs.into_iter().collect(),
      state: Mutex::new(PoolState {
        strategy,
        current_size: 0,
      }),
      metrics: PoolMetrics::default(),
    }
  }

  pub fn metrics(&self) -> PoolMetricsSnapshot {
    self.metrics.snapshot(self.current_size(), self.max_size)
  }

  fn trim_to_size(&self, state: &mut PoolState, size: u64) {
    while state.current_size > size {
      let Some(removed) = state.strategy.remove_last() else {
        // The strategy lost track of something; resynchronize.
        debug!(current_size = state.current_size, "pool strategy is empty while over budget");
        state.current_size = 0;
        return;
      };
      state.current_size = state
        .current_size
        .saturating_sub(removed.allocation_byte_count() as u64);
      self.metrics.evictions.fetch_add(1, Ordering::Relaxed);
      trace!(bitmap = ?removed, current_size = state.current_size, "evicted bitmap from pool");
    }
  }
}

impl BitmapPool for RealBitmapPool {
  fn put(&self, bitmap: Bitmap) {
    let size = bitmap.allocation_byte_count() as u64;
    if !bitmap.is_mutable() || size > self.max_size || !self.allowed_configs.contains(&bitmap.config()) {
      debug!(
        ?bitmap,
        max_size = self.max_size,
        "rejected bitmap from pool"
      );
      self.metrics.rejections.fetch_add(1, Ordering::Relaxed);
      return;
    }

    let mut state = self.state.lock();
    state.strategy.put(bitmap);
    state.current_size += size;
    self.metrics.puts.fetch_add(1, Ordering::Relaxed);
    self.trim_to_size(&mut state, self.max_size);
  }

  fn get_dirty_or_none(&self, width: u32, height: u32, config: PixelConfig) -> Option<Bitmap> {
    assert_not_hardware(config);

    let mut state = self.state.lock();
    match state.strategy.get(width, height, config) {
      Some(bitmap) => {
        state.current_size = state
          .current_size
          .saturating_sub(bitmap.allocation_byte_count() as u64);
        self.metrics.hits.fetch_add(1, Ordering::Relaxed);
        Some(bitmap)
      }
      None => {
        self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        None
      }
    }
  }

  fn trim_memory(&self, level: TrimLevel) {
    let mut state = self.state.lock();
    if level.should_clear() {
      self.trim_to_size(&mut state, 0);
    } else if level.should_halve() {
      let target = state.current_size / 2;
      self.trim_to_size(&mut state, target);
    }
    debug!(%level, current_size = state.current_size, "trimmed bitmap pool");
  }

  fn clear(&self) {
    let mut state = self.state.lock();
    self.trim_to_size(&mut state, 0);
  }

  fn current_size(&self) -> u64 {
    self.state.lock().current_size
  }

  fn max_size(&self) -> u64 {
    self.max_size
  }
}

/// A pool that holds nothing. Used when pooling is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyBitmapPool;

impl BitmapPool for EmptyBitmapPool {
  fn put(&self, _bitmap: Bitmap) {}

  fn get_dirty_or_none(&self, _width: u32, _height: u32, config: PixelConfig) -> Option<Bitmap> {
    assert_not_hardware(config);
    None
  }

  fn trim_memory(&self, _level: TrimLevel) {}

  fn clear(&self) {}

  fn current_size(&self) -> u64 {
    0
  }

  fn max_size(&self) -> u64 {
    0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pool(max_size: u64) -> RealBitmapPool {
    RealBitmapPool::new(BitmapPoolConfig::new(max_size))
  }

  #[test]
  fn stays_under_budget() {
    let pool = pool(100);
    for _ in 0..12 {
      pool.put(Bitmap::new(10, 1, PixelConfig::Alpha8));
    }

    let metrics = pool.metrics();
    assert_eq!(pool.current_size(), 100);
    assert_eq!(metrics.puts, 12);
    assert_eq!(metrics.evictions, 2);
  }

  #[test]
  fn rejects_unusable_bitmaps() {
    let pool = RealBitmapPool::new(
      BitmapPoolConfig::new(1024).allowed_configs([PixelConfig::Argb8888]),
    );
    pool.put(Bitmap::new_immutable(2, 2, PixelConfig::Argb8888));
    pool.put(Bitmap::new(2, 2, PixelConfig::Rgb565));
    pool.put(Bitmap::new(100, 100, PixelConfig::Argb8888));

    assert_eq!(pool.current_size(), 0);
    assert_eq!(pool.metrics().rejections, 3);
  }

  #[test]
  fn get_erases_reused_pixels() {
    let pool = pool(1024);
    let mut bitmap = Bitmap::new(4, 4, PixelConfig::Argb8888);
    bitmap.pixels_mut().fill(0xFF);
    let id = bitmap.id();
    pool.put(bitmap);

    let reused = pool.get(4, 4, PixelConfig::Argb8888);
    assert_eq!(reused.id(), id);
    assert!(reused.pixels().iter().all(|b| *b == 0));
    assert_eq!(pool.current_size(), 0);
  }

  #[test]
  fn get_dirty_keeps_pixels() {
    let pool = pool(1024);
    let mut bitmap = Bitmap::new(4, 4, PixelConfig::Argb8888);
    bitmap.pixels_mut().fill(0x7F);
    pool.put(bitmap);

    let reused = pool.get_dirty(4, 4, PixelConfig::Argb8888);
    assert!(reused.pixels().iter().all(|b| *b == 0x7F));
  }

  #[test]
  fn miss_allocates_fresh_bitmap() {
    let pool = pool(1024);
    assert!(pool.get_or_none(3, 3, PixelConfig::Alpha8).is_none());
    let fresh = pool.get(3, 3, PixelConfig::Alpha8);
    assert_eq!(fresh.byte_count(), 9);
    assert_eq!(pool.metrics().misses, 2);
  }

  #[test]
  #[should_panic(expected = "hardware")]
  fn hardware_requests_panic() {
    pool(1024).get(1, 1, PixelConfig::Hardware);
  }

  #[test]
  fn trim_memory_halves_then_clears() {
    let pool = pool(1000);
    for _ in 0..10 {
      pool.put(Bitmap::new(10, 10, PixelConfig::Alpha8));
    }
    assert_eq!(pool.current_size(), 1000);

    pool.trim_memory(TrimLevel::RunningLow);
    assert_eq!(pool.current_size(), 500);

    pool.trim_memory(TrimLevel::RunningModerate);
    assert_eq!(pool.current_size(), 500);

    pool.trim_memory(TrimLevel::Background);
    assert_eq!(pool.current_size(), 0);
  }

  #[test]
  fn empty_pool_holds_nothing() {
    let pool = EmptyBitmapPool;
    pool.put(Bitmap::new(4, 4, PixelConfig::Argb8888));
    assert!(pool.get_dirty_or_none(4, 4, PixelConfig::Argb8888).is_none());
    assert_eq!(pool.get(4, 4, PixelConfig::Argb8888).byte_count(), 64);
    assert_eq!(pool.current_size(), 0);
  }
}
