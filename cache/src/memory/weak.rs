//! The weak tier of the memory cache.
//!
//! Holds [`Weak`] handles to bitmaps the strong tier let go of. An entry is
//! only useful while some consumer still holds the bitmap; dead entries are
//! swept periodically.

use super::{MemoryCacheKey, MemoryCacheValue};
use crate::bitmap::Bitmap;
use crate::trim::TrimLevel;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Weak;

use ahash::HashMap;
use parking_lot::Mutex;
use tracing::trace;

/// Sweep dead entries after this many operations.
const CLEAN_UP_INTERVAL: u32 = 10;

/// A best-effort secondary index over bitmaps the strong tier no longer owns.
pub trait WeakMemoryCache: Send + Sync + fmt::Debug {
  /// The first live value stored for `key`.
  fn get(&self, key: &MemoryCacheKey) -> Option<MemoryCacheValue>;

  fn set(
    &self,
    key: MemoryCacheKey,
    bitmap: Weak<Bitmap>,
    extras: BTreeMap<String, String>,
    size: u64,
  );

  /// Drops every value stored for `key`. Returns whether anything was stored.
  fn remove(&self, key: &MemoryCacheKey) -> bool;

  fn keys(&self) -> Vec<MemoryCacheKey>;

  fn clear(&self);

  fn trim_memory(&self, level: TrimLevel);
}

#[derive(Debug)]
struct InternalValue {
  bitmap: Weak<Bitmap>,
  extras: BTreeMap<String, String>,
  size: u64,
}

#[derive(Debug, Default)]
struct WeakState {
  // Each list is sorted by size, largest first.
  cache: HashMap<MemoryCacheKey, Vec<InternalValue>>,
  operations_since_clean_up: u32,
}

impl WeakState {
  fn clean_up_if_necessary(&mut self) {
    self.operations_since_clean_up += 1;
    if self.operations_since_clean_up >= CLEAN_UP_INTERVAL {
      self.clean_up();
    }
  }

  fn clean_up(&mut self) {
    self.operations_since_clean_up = 0;
    let mut removed = 0usize;
    self.cache.retain(|_, values| {
      let before = values.len();
      values.retain(|value| value.bitmap.strong_count() > 0);
      removed += before - values.len();
      !values.is_empty()
    });
    trace!(removed, keys = self.cache.len(), "swept weak memory cache");
  }
}

/// A weak memory cache keyed by [`MemoryCacheKey`], keeping every candidate
/// bitmap for a key sorted by size so the largest live one is preferred.
#[derive(Debug, Default)]
pub struct RealWeakMemoryCache {
  state: Mutex<WeakState>,
}

impl RealWeakMemoryCache {
  pub fn new() -> Self {
    Self::default()
  }

  /// Drops every dead entry now.
  pub fn clean_up(&self) {
    self.state.lock().clean_up();
  }

  /// Number of stored values, live or not yet swept.
  pub fn len(&self) -> usize {
    self.state.lock().cache.values().map(Vec::len).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl WeakMemoryCache for RealWeakMemoryCache {
  fn get(&self, key: &MemoryCacheKey) -> Option<MemoryCacheValue> {
    let mut state = self.state.lock();
    let value = state.cache.get(key).and_then(|values| {
      values.iter().find_map(|value| {
        value.bitmap.upgrade().map(|bitmap| MemoryCacheValue {
          bitmap,
          extras: value.extras.clone(),
        })
      })
    });
    state.clean_up_if_necessary();
    value
  }

  fn set(
    &self,
    key: MemoryCacheKey,
    bitmap: Weak<Bitmap>,
    extras: BTreeMap<String, String>,
    size: u64,
  ) {
    let mut state = self.state.lock();
    let values = state.cache.entry(key).or_default();

    let new_value = InternalValue {
      bitmap,
      extras,
      size,
    };
    match values
      .iter()
      .position(|value| Weak::ptr_eq(&value.bitmap, &new_value.bitmap))
    {
      Some(index) => values[index] = new_value,
      None => {
        let index = values.partition_point(|value| value.size >= size);
        values.insert(index, new_value);
      }
    }
    state.clean_up_if_necessary();
  }

  fn remove(&self, key: &MemoryCacheKey) -> bool {
    self.state.lock().cache.remove(key).is_some()
  }

  fn keys(&self) -> Vec<MemoryCacheKey> {
    self.state.lock().cache.keys().cloned().collect()
  }

  fn clear(&self) {
    let mut state = self.state.lock();
    state.cache.clear();
    state.operations_since_clean_up = 0;
  }

  fn trim_memory(&self, level: TrimLevel) {
    if level >= TrimLevel::RunningLow && level != TrimLevel::UiHidden {
      self.clean_up();
    }
  }
}

/// A weak cache that stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyWeakMemoryCache;

impl WeakMemoryCache for EmptyWeakMemoryCache {
  fn get(&self, _key: &MemoryCacheKey) -> Option<MemoryCacheValue> {
    None
  }

  fn set(
    &self,
    _key: MemoryCacheKey,
    _bitmap: Weak<Bitmap>,
    _extras: BTreeMap<String, String>,
    _size: u64,
  ) {
  }

  fn remove(&self, _key: &MemoryCacheKey) -> bool {
    false
  }

  fn keys(&self) -> Vec<MemoryCacheKey> {
    Vec::new()
  }

  fn clear(&self) {}

  fn trim_memory(&self, _level: TrimLevel) {}
}
