use super::PoolingStrategy;
use crate::bitmap::{Bitmap, PixelConfig};
use crate::pool::linked_multimap::LinkedMultimap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key {
  width: u32,
  height: u32,
  config: PixelConfig,
}

/// Reuses a bitmap only if its width, height and config all match exactly.
#[derive(Debug, Default)]
pub struct AttributeStrategy {
  entries: LinkedMultimap<Key, Bitmap>,
}

impl AttributeStrategy {
  pub fn new() -> Self {
    Self::default()
  }
}

impl PoolingStrategy for AttributeStrategy {
  fn put(&mut self, bitmap: Bitmap) {
    let key = Key {
      width: bitmap.width(),
      height: bitmap.height(),
      config: bitmap.config(),
    };
    self.entries.put(key, bitmap);
  }

  fn get(&mut self, width: u32, height: u32, config: PixelConfig) -> Option<Bitmap> {
    self.entries.remove_last_for(&Key {
      width,
      height,
      config,
    })
  }

  fn remove_last(&mut self) -> Option<Bitmap> {
    self.entries.remove_last()
  }

  fn clear(&mut self) {
    self.entries.clear();
  }
}
