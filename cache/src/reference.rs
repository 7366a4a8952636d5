//! Reference counting for bitmaps shared between the memory cache and its
//! consumers.
//!
//! The strong memory cache increments a bitmap's count when it starts holding
//! it and decrements when it lets go. When the count drops to zero the bitmap
//! is handed back to the [`BitmapPool`] so its allocation can be reused,
//! unless it was [`invalidate`](BitmapReferenceCounter::invalidate)d first.

use crate::bitmap::{Bitmap, BitmapId};
use crate::pool::BitmapPool;

use std::fmt;
use std::sync::{Arc, Weak};

use ahash::HashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

/// Sweep dead bookkeeping after this many operations.
const CLEAN_UP_INTERVAL: u32 = 50;

/// Counts live consumers of each bitmap.
pub trait BitmapReferenceCounter: Send + Sync + fmt::Debug {
  /// Records one more consumer of `bitmap`.
  fn increment(&self, bitmap: &Arc<Bitmap>);

  /// Records that a consumer let go of `bitmap`, consuming its handle.
  ///
  /// Returns `true` if this was the last reference and the bitmap was
  /// returned to the pool. On `false` the bitmap is still usable by anyone
  /// who holds another handle to it.
  ///
  /// # Panics
  ///
  /// Panics if `bitmap` is not currently tracked with a positive count.
  fn decrement(&self, bitmap: Arc<Bitmap>) -> bool;

  /// Ensures `bitmap` is never returned to the pool, even once its count
  /// drops to zero.
  fn invalidate(&self, bitmap: &Arc<Bitmap>);
}

#[derive(Debug)]
struct Value {
  bitmap: Weak<Bitmap>,
  count: usize,
  is_valid: bool,
}

impl Value {
  fn new(bitmap: &Arc<Bitmap>) -> Self {
    Self {
      bitmap: Arc::downgrade(bitmap),
      count: 0,
      is_valid: true,
    }
  }

  fn is_for(&self, bitmap: &Arc<Bitmap>) -> bool {
    std::ptr::eq(self.bitmap.as_ptr(), Arc::as_ptr(bitmap))
  }
}

#[derive(Debug, Default)]
struct CounterState {
  values: HashMap<BitmapId, Value>,
  operations_since_clean_up: u32,
}

impl CounterState {
  /// The bookkeeping for `bitmap`, replacing a stale entry left behind by an
  /// earlier handle to the same allocation.
  fn value_for(&mut self, bitmap: &Arc<Bitmap>) -> &mut Value {
    let value = self
      .values
      .entry(bitmap.id())
      .or_insert_with(|| Value::new(bitmap));
    if !value.is_for(bitmap) {
      *value = Value::new(bitmap);
    }
    value
  }

  fn clean_up_if_necessary(&mut self) {
    self.operations_since_clean_up += 1;
    if self.operations_since_clean_up >= CLEAN_UP_INTERVAL {
      self.clean_up();
    }
  }

  fn clean_up(&mut self) {
    self.operations_since_clean_up = 0;
    let before = self.values.len();
    self.values.retain(|_, value| value.bitmap.strong_count() > 0);
    trace!(
      removed = before - self.values.len(),
      remaining = self.values.len(),
      "swept reference counter"
    );
  }
}

/// A reference counter that returns bitmaps to a pool.
pub struct RealBitmapReferenceCounter {
  pool: Arc<dyn BitmapPool>,
  state: Mutex<CounterState>,
}

impl RealBitmapReferenceCounter {
  pub fn new(pool: Arc<dyn BitmapPool>) -> Self {
    Self {
      pool,
      state: Mutex::new(CounterState::default()),
    }
  }

  pub fn pool(&self) -> &Arc<dyn BitmapPool> {
    &self.pool
  }

  /// The current count for `bitmap`, or zero if it is not tracked.
  pub fn count(&self, bitmap: &Arc<Bitmap>) -> usize {
    let state = self.state.lock();
    state
      .values
      .get(&bitmap.id())
      .filter(|value| value.is_for(bitmap))
      .map_or(0, |value| value.count)
  }

  /// Whether `bitmap` will be pooled when its count reaches zero.
  pub fn is_valid(&self, bitmap: &Arc<Bitmap>) -> bool {
    let state = self.state.lock();
    state
      .values
      .get(&bitmap.id())
      .filter(|value| value.is_for(bitmap))
      .map_or(true, |value| value.is_valid)
  }

  /// Number of bitmaps with bookkeeping, including not yet swept dead ones.
  pub fn tracked(&self) -> usize {
    self.state.lock().values.len()
  }
}

impl fmt::Debug for RealBitmapReferenceCounter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RealBitmapReferenceCounter")
      .field("pool", &self.pool)
      .field("tracked", &self.tracked())
      .finish()
  }
}

impl BitmapReferenceCounter for RealBitmapReferenceCounter {
  fn increment(&self, bitmap: &Arc<Bitmap>) {
    let mut state = self.state.lock();
    let value = state.value_for(bitmap);
    value.count += 1;
    trace!(bitmap = %bitmap.id(), count = value.count, valid = value.is_valid, "increment");
    state.clean_up_if_necessary();
  }

  fn decrement(&self, bitmap: Arc<Bitmap>) -> bool {
    let id = bitmap.id();
    let should_pool = {
      let mut state = self.state.lock();
      let value = match state.values.get_mut(&id) {
        Some(value) if value.is_for(&bitmap) && value.count > 0 => value,
        _ => panic!("{id} was decremented more times than it was incremented"),
      };
      value.count -= 1;
      trace!(bitmap = %id, count = value.count, valid = value.is_valid, "decrement");

      let should_pool = if value.count == 0 {
        let is_valid = value.is_valid;
        state.values.remove(&id);
        is_valid
      } else {
        false
      };
      state.clean_up_if_necessary();
      should_pool
    };

    if !should_pool {
      return false;
    }
    match Arc::try_unwrap(bitmap) {
      Ok(bitmap) => {
        self.pool.put(bitmap);
        true
      }
      Err(_) => {
        debug!(bitmap = %id, "bitmap is still shared outside the cache, not pooling");
        false
      }
    }
  }

  fn invalidate(&self, bitmap: &Arc<Bitmap>) {
    let mut state = self.state.lock();
    let value = state.value_for(bitmap);
    value.is_valid = false;
    trace!(bitmap = %bitmap.id(), count = value.count, "invalidate");
    state.clean_up_if_necessary();
  }
}

/// A counter that tracks nothing and never pools. Used when pooling is
/// disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyBitmapReferenceCounter;

impl BitmapReferenceCounter for EmptyBitmapReferenceCounter {
  fn increment(&self, _bitmap: &Arc<Bitmap>) {}

  fn decrement(&self, _bitmap: Arc<Bitmap>) -> bool {
    false
  }

  fn invalidate(&self, _bitmap: &Arc<Bitmap>) {}
}
