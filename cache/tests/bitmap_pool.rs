mod common;

use common::bitmap;
use glint_cache::pool::{BitmapPool, BitmapPoolConfig, EmptyBitmapPool, PoolingStrategyKind, RealBitmapPool};
use glint_cache::{Bitmap, PixelConfig, TrimLevel};

fn pool(max_size: u64, strategy: PoolingStrategyKind) -> RealBitmapPool {
  common::init_tracing();
  RealBitmapPool::new(BitmapPoolConfig::new(max_size).strategy(strategy))
}

#[test]
fn twelve_ten_byte_bitmaps_into_a_hundred_bytes() {
  for strategy in [
    PoolingStrategyKind::Attribute,
    PoolingStrategyKind::SizeConfig,
    PoolingStrategyKind::Size,
  ] {
    let pool = pool(100, strategy);
    for _ in 0..12 {
      pool.put(bitmap(10));
    }

    let metrics = pool.metrics();
    assert_eq!(metrics.puts, 12, "{strategy:?}");
    assert_eq!(metrics.evictions, 2, "{strategy:?}");
    assert_eq!(pool.current_size(), 100, "{strategy:?}");
  }
}

#[test]
fn size_never_exceeds_budget() {
  let pool = pool(1000, PoolingStrategyKind::SizeConfig);
  for bytes in [300, 10, 700, 50, 999, 1, 400] {
    pool.put(bitmap(bytes));
    assert!(pool.current_size() <= pool.max_size());
  }
}

#[test]
fn pooled_buffers_are_reused() {
  let pool = pool(1 << 20, PoolingStrategyKind::SizeConfig);
  let original = Bitmap::new(8, 8, PixelConfig::Argb8888);
  let id = original.id();
  pool.put(original);

  let reused = pool.get(8, 8, PixelConfig::Argb8888);
  assert_eq!(reused.id(), id);
  assert_eq!(pool.current_size(), 0);

  let fresh = pool.get(8, 8, PixelConfig::Argb8888);
  assert_ne!(fresh.id(), id);
  assert_eq!(pool.metrics().misses, 1);
}

#[test]
fn clean_get_zeroes_and_dirty_get_keeps_pixels() {
  let pool = pool(1 << 20, PoolingStrategyKind::Attribute);

  let mut painted = Bitmap::new(2, 2, PixelConfig::Alpha8);
  painted.pixels_mut().fill(7);
  pool.put(painted);
  let dirty = pool.get_dirty(2, 2, PixelConfig::Alpha8);
  assert!(dirty.pixels().iter().all(|&p| p == 7));

  pool.put(dirty);
  let clean = pool.get(2, 2, PixelConfig::Alpha8);
  assert!(clean.pixels().iter().all(|&p| p == 0));
}

#[test]
fn unusable_bitmaps_are_rejected() {
  let pool = pool(100, PoolingStrategyKind::SizeConfig);
  pool.put(Bitmap::new_immutable(10, 1, PixelConfig::Alpha8));
  pool.put(bitmap(101));
  pool.put(Bitmap::new(2, 2, PixelConfig::Hardware));

  assert_eq!(pool.current_size(), 0);
  assert_eq!(pool.metrics().rejections, 3);
}

#[test]
fn disallowed_configs_are_rejected() {
  common::init_tracing();
  let pool = RealBitmapPool::new(BitmapPoolConfig::new(1 << 20).allowed_configs([PixelConfig::Argb8888]));
  pool.put(Bitmap::new(4, 4, PixelConfig::Rgb565));
  assert_eq!(pool.current_size(), 0);
  pool.put(Bitmap::new(4, 4, PixelConfig::Argb8888));
  assert_eq!(pool.current_size(), 64);
}

#[test]
fn trim_memory_halves_then_clears() {
  let pool = pool(1000, PoolingStrategyKind::Size);
  for _ in 0..10 {
    pool.put(bitmap(100));
  }

  pool.trim_memory(TrimLevel::RunningModerate);
  assert_eq!(pool.current_size(), 1000);
  pool.trim_memory(TrimLevel::RunningLow);
  assert_eq!(pool.current_size(), 500);
  pool.trim_memory(TrimLevel::Background);
  assert_eq!(pool.current_size(), 0);
}

#[test]
#[should_panic(expected = "cannot create a mutable hardware bitmap")]
fn hardware_requests_panic() {
  let pool = pool(100, PoolingStrategyKind::SizeConfig);
  pool.get_dirty_or_none(1, 1, PixelConfig::Hardware);
}

#[test]
fn empty_pool_always_allocates() {
  let pool = EmptyBitmapPool;
  let first = bitmap(10);
  let id = first.id();
  pool.put(first);
  assert!(pool.get_or_none(10, 1, PixelConfig::Alpha8).is_none());
  assert_ne!(pool.get(10, 1, PixelConfig::Alpha8).id(), id);
  assert_eq!(pool.max_size(), 0);
}
