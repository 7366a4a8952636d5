use super::{PoolingStrategy, SortedSizes};
use crate::bitmap::{allocation_byte_count, Bitmap, PixelConfig};
use crate::pool::linked_multimap::LinkedMultimap;

use ahash::HashMap;

/// The largest allocation, as a multiple of the requested size, that may be
/// handed out for a request.
const MAX_SIZE_MULTIPLE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Key {
  size: usize,
  config: PixelConfig,
}

/// Configs whose buffers may be reconfigured into `config`, in order of
/// preference.
fn compatible_configs(config: PixelConfig) -> &'static [PixelConfig] {
  match config {
    PixelConfig::Argb8888 | PixelConfig::RgbaF16 => &[PixelConfig::Argb8888, PixelConfig::RgbaF16],
    PixelConfig::Rgb565 => &[PixelConfig::Rgb565],
    PixelConfig::Argb4444 => &[PixelConfig::Argb4444],
    PixelConfig::Alpha8 => &[PixelConfig::Alpha8],
    PixelConfig::Hardware => &[],
  }
}

/// Buckets bitmaps by allocation size and config. A request is served by the
/// smallest bucket of a compatible config whose size is within
/// `MAX_SIZE_MULTIPLE` of the request.
#[derive(Debug, Default)]
pub struct SizeConfigStrategy {
  entries: LinkedMultimap<Key, Bitmap>,
  sizes: HashMap<PixelConfig, SortedSizes>,
}

impl SizeConfigStrategy {
  pub fn new() -> Self {
    Self::default()
  }

  fn best_key(&self, size: usize, config: PixelConfig) -> Key {
    for &candidate in compatible_configs(config) {
      let found = self
        .sizes
        .get(&candidate)
        .and_then(|sizes| sizes.ceiling_within(size, MAX_SIZE_MULTIPLE));
      if let Some(found) = found {
        return Key {
          size: found,
          config: candidate,
        };
      }
    }
    Key { size, config }
  }

  fn decrement(&mut self, key: Key) {
    if let Some(sizes) = self.sizes.get_mut(&key.config) {
      sizes.decrement(key.size);
    }
  }
}

impl PoolingStrategy for SizeConfigStrategy {
  fn put(&mut self, bitmap: Bitmap) {
    let key = Key {
      size: bitmap.allocation_byte_count(),
      config: bitmap.config(),
    };
    self.entries.put(key, bitmap);
    self.sizes.entry(key.config).or_default().increment(key.size);
  }

  fn get(&mut self, width: u32, height: u32, config: PixelConfig) -> Option<Bitmap> {
    let size = allocation_byte_count(width, height, config);
    let key = self.best_key(size, config);

    let mut bitmap = self.entries.remove_last_for(&key)?;
    self.decrement(key);
    if !bitmap.reconfigure(width, height, config) {
      tracing::warn!(?bitmap, width, height, ?config, "pooled bitmap could not be reconfigured");
      return None;
    }
    Some(bitmap)
  }

  fn remove_last(&mut self) -> Option<Bitmap> {
    let bitmap = self.entries.remove_last()?;
    self.decrement(Key {
      size: bitmap.allocation_byte_count(),
      config: bitmap.config(),
    });
    Some(bitmap)
  }

  fn clear(&mut self) {
    self.entries.clear();
    self.sizes.clear();
  }
}
