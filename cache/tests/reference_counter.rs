mod common;

use std::sync::Arc;

use glint_cache::pool::{BitmapPool, BitmapPoolConfig, RealBitmapPool};
use glint_cache::reference::{BitmapReferenceCounter, EmptyBitmapReferenceCounter, RealBitmapReferenceCounter};
use glint_cache::{Bitmap, PixelConfig};

fn counter() -> (Arc<RealBitmapPool>, RealBitmapReferenceCounter) {
  common::init_tracing();
  let pool = Arc::new(RealBitmapPool::new(BitmapPoolConfig::new(1 << 20)));
  let counter = RealBitmapReferenceCounter::new(pool.clone());
  (pool, counter)
}

fn bitmap() -> Arc<Bitmap> {
  Arc::new(Bitmap::new(10, 10, PixelConfig::Argb8888))
}

#[test]
fn balanced_counts_pool_exactly_once() {
  let (pool, counter) = counter();
  let bitmap = bitmap();

  for _ in 0..3 {
    counter.increment(&bitmap);
  }
  assert!(!counter.decrement(bitmap.clone()));
  assert!(!counter.decrement(bitmap.clone()));
  assert_eq!(pool.current_size(), 0);

  assert!(counter.decrement(bitmap));
  assert_eq!(pool.current_size(), 400);
  assert_eq!(pool.metrics().puts, 1);
  assert_eq!(counter.tracked(), 0);
}

#[test]
fn invalidated_bitmaps_are_never_pooled() {
  let (pool, counter) = counter();
  let bitmap = bitmap();
  counter.increment(&bitmap);
  counter.invalidate(&bitmap);
  assert!(!counter.is_valid(&bitmap));

  assert!(!counter.decrement(bitmap));
  assert_eq!(pool.current_size(), 0);
}

#[test]
fn shared_bitmaps_are_not_pooled() {
  let (pool, counter) = counter();
  let bitmap = bitmap();
  let held_elsewhere = bitmap.clone();
  counter.increment(&bitmap);

  assert!(!counter.decrement(bitmap));
  assert_eq!(pool.current_size(), 0);
  assert_eq!(counter.count(&held_elsewhere), 0);
}

#[test]
#[should_panic(expected = "decremented more times than it was incremented")]
fn unbalanced_decrement_panics() {
  let (_pool, counter) = counter();
  let bitmap = bitmap();
  counter.increment(&bitmap);
  counter.decrement(bitmap.clone());
  counter.decrement(bitmap);
}

#[test]
fn dead_bookkeeping_is_swept() {
  let (_pool, counter) = counter();
  for _ in 0..10 {
    let bitmap = bitmap();
    counter.invalidate(&bitmap);
  }
  assert_eq!(counter.tracked(), 10);

  // Enough operations to trigger a sweep; every bitmap above is gone.
  let live = bitmap();
  for _ in 0..50 {
    counter.increment(&live);
  }
  assert_eq!(counter.tracked(), 1);
  assert_eq!(counter.count(&live), 50);
}

#[test]
fn empty_counter_never_pools() {
  let counter = EmptyBitmapReferenceCounter;
  let bitmap = bitmap();
  counter.increment(&bitmap);
  assert!(!counter.decrement(bitmap));
}
