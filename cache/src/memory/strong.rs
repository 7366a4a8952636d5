//! The strong tier of the memory cache.

use super::weak::WeakMemoryCache;
use super::{MemoryCacheKey, MemoryCacheValue};
use crate::bitmap::Bitmap;
use crate::lru_list::LruList;
use crate::reference::BitmapReferenceCounter;
use crate::trim::TrimLevel;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use ahash::HashMap;
use parking_lot::Mutex;
use tracing::trace;

#[derive(Debug)]
struct InternalValue {
  bitmap: Arc<Bitmap>,
  extras: BTreeMap<String, String>,
  size: u64,
}

#[derive(Debug, Default)]
struct StrongState {
  values: HashMap<MemoryCacheKey, InternalValue>,
  lru: LruList<MemoryCacheKey>,
}

impl StrongState {
  fn remove(&mut self, key: &MemoryCacheKey) -> Option<InternalValue> {
    self.lru.remove(key);
    self.values.remove(key)
  }

  fn trim_to_size(&mut self, size: u64, removed: &mut Vec<(MemoryCacheKey, InternalValue)>) {
    while self.lru.current_total_cost() > size {
      let Some((key, _)) = self.lru.pop_back() else {
        break;
      };
      if let Some(value) = self.values.remove(&key) {
        trace!(%key, size = value.size, "evicted from strong memory cache");
        removed.push((key, value));
      }
    }
  }
}

/// An LRU cache of strongly held bitmaps, bounded by total allocation size.
///
/// Every bitmap the cache holds is counted by the reference counter. Values
/// that leave the cache, whether removed or evicted, are released to the
/// counter and, unless that returned them to the pool, handed to the weak
/// tier.
pub struct StrongMemoryCache {
  max_size: u64,
  state: Mutex<StrongState>,
  weak: Arc<dyn WeakMemoryCache>,
  counter: Arc<dyn BitmapReferenceCounter>,
}

impl StrongMemoryCache {
  /// A `max_size` of zero disables the tier: every value goes straight to
  /// the weak tier.
  pub fn new(
    max_size: u64,
    weak: Arc<dyn WeakMemoryCache>,
    counter: Arc<dyn BitmapReferenceCounter>,
  ) -> Self {
    Self {
      max_size,
      state: Mutex::new(StrongState::default()),
      weak,
      counter,
    }
  }

  pub fn get(&self, key: &MemoryCacheKey) -> Option<MemoryCacheValue> {
    let mut state = self.state.lock();
    let value = state.values.get(key).map(|value| MemoryCacheValue {
      bitmap: value.bitmap.clone(),
      extras: value.extras.clone(),
    })?;
    state.lru.touch(key);
    Some(value)
  }

  pub fn set(&self, key: MemoryCacheKey, bitmap: Arc<Bitmap>, extras: BTreeMap<String, String>) {
    let size = bitmap.allocation_byte_count() as u64;
    let mut removed = Vec::new();

    if self.max_size == 0 || size > self.max_size {
      // Too large for the budget. Keep it reachable through the weak tier
      // instead of evicting everything else to make room.
      let previous = self.state.lock().remove(&key);
      if let Some(previous) = previous {
        removed.push((key.clone(), previous));
      }
      self.release(removed);
      self.weak.set(key, Arc::downgrade(&bitmap), extras, size);
      return;
    }

    self.counter.increment(&bitmap);
    {
      let mut state = self.state.lock();
      let previous = state.values.insert(
        key.clone(),
        InternalValue {
          bitmap,
          extras,
          size,
        },
      );
      if let Some(previous) = previous {
        removed.push((key.clone(), previous));
      }
      state.lru.push_front(key, size);
      state.trim_to_size(self.max_size, &mut removed);
    }
    self.release(removed);
  }

  pub fn remove(&self, key: &MemoryCacheKey) -> bool {
    let removed = self.state.lock().remove(key);
    match removed {
      Some(value) => {
        self.release(vec![(key.clone(), value)]);
        true
      }
      None => false,
    }
  }

  pub fn clear(&self) {
    self.trim_to_size(0);
  }

  /// Evicts least recently used values until the cache holds at most `size`
  /// bytes.
  pub fn trim_to_size(&self, size: u64) {
    let mut removed = Vec::new();
    self.state.lock().trim_to_size(size, &mut removed);
    self.release(removed);
  }

  pub fn trim_memory(&self, level: TrimLevel) {
    if level.should_clear() {
      self.clear();
    } else if level.should_halve() {
      self.trim_to_size(self.size() / 2);
    }
  }

  /// Bytes currently held.
  pub fn size(&self) -> u64 {
    self.state.lock().lru.current_total_cost()
  }

  pub fn max_size(&self) -> u64 {
    self.max_size
  }

  pub fn keys(&self) -> Vec<MemoryCacheKey> {
    self.state.lock().values.keys().cloned().collect()
  }

  pub fn len(&self) -> usize {
    self.state.lock().values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  // Called without the state lock held.
  fn release(&self, removed: Vec<(MemoryCacheKey, InternalValue)>) {
    for (key, value) in removed {
      let weak = Arc::downgrade(&value.bitmap);
      if !self.counter.decrement(value.bitmap) {
        self.weak.set(key, weak, value.extras, value.size);
      }
    }
  }
}

impl fmt::Debug for StrongMemoryCache {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("StrongMemoryCache")
      .field("size", &state.lru.current_total_cost())
      .field("max_size", &self.max_size)
      .field("len", &state.values.len())
      .finish()
  }
}
