use super::{PoolingStrategy, SortedSizes};
use crate::bitmap::{allocation_byte_count, Bitmap, PixelConfig};
use crate::pool::linked_multimap::LinkedMultimap;

/// The largest allocation, as a multiple of the requested size, that may be
/// handed out for a request.
const MAX_SIZE_MULTIPLE: usize = 4;

/// Buckets bitmaps purely by allocation size and reconfigures both the
/// dimensions and the config of a reused buffer.
#[derive(Debug, Default)]
pub struct SizeStrategy {
  entries: LinkedMultimap<usize, Bitmap>,
  sizes: SortedSizes,
}

impl SizeStrategy {
  pub fn new() -> Self {
    Self::default()
  }
}

impl PoolingStrategy for SizeStrategy {
  fn put(&mut self, bitmap: Bitmap) {
    let size = bitmap.allocation_byte_count();
    self.entries.put(size, bitmap);
    self.sizes.increment(size);
  }

  fn get(&mut self, width: u32, height: u32, config: PixelConfig) -> Option<Bitmap> {
    let size = allocation_byte_count(width, height, config);
    let best_size = self.sizes.ceiling_within(size, MAX_SIZE_MULTIPLE).unwrap_or(size);

    let mut bitmap = self.entries.remove_last_for(&best_size)?;
    self.sizes.decrement(best_size);
    if !bitmap.reconfigure(width, height, config) {
      // Immutable buffers never make it into a pool, so this only happens if
      // a strategy is misused directly.
      tracing::warn!(?bitmap, width, height, ?config, "pooled bitmap could not be reconfigured");
      return None;
    }
    Some(bitmap)
  }

  fn remove_last(&mut self) -> Option<Bitmap> {
    let bitmap = self.entries.remove_last()?;
    self.sizes.decrement(bitmap.allocation_byte_count());
    Some(bitmap)
  }

  fn clear(&mut self) {
    self.entries.clear();
    self.sizes.clear();
  }
}
