//! Bucketing policies that decide which pooled buffer satisfies a request.

pub mod attribute;
pub mod size;
pub mod size_config;

use crate::bitmap::{Bitmap, PixelConfig};

use std::collections::BTreeMap;
use std::fmt;

pub use attribute::AttributeStrategy;
pub use size::SizeStrategy;
pub use size_config::SizeConfigStrategy;

/// A bucketing and matching policy for pooled bitmaps.
///
/// Strategies only organize buffers; the owning pool is responsible for size
/// accounting, admission and clearing pixel contents.
pub trait PoolingStrategy: Send + fmt::Debug {
  /// Stores a bitmap for later reuse.
  fn put(&mut self, bitmap: Bitmap);

  /// Removes and returns a bitmap that can be used as a `width x height`
  /// bitmap of `config`. The returned bitmap is already reconfigured to the
  /// requested layout.
  fn get(&mut self, width: u32, height: u32, config: PixelConfig) -> Option<Bitmap>;

  /// Removes the least recently used bitmap.
  fn remove_last(&mut self) -> Option<Bitmap>;

  /// Drops every pooled bitmap.
  fn clear(&mut self);
}

/// Which strategy a pool should use. The choice depends on what the platform
/// can safely do with a reused buffer, so it is made once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PoolingStrategyKind {
  /// Width, height and config must all match. Works everywhere; reuses least.
  Attribute,
  /// Matches on allocation size within a bounded multiple and on compatible
  /// configs. Requires buffers to be reconfigurable.
  #[default]
  SizeConfig,
  /// Matches on allocation size alone and reconfigures the config too.
  Size,
}

impl PoolingStrategyKind {
  pub fn create(self) -> Box<dyn PoolingStrategy> {
    match self {
      PoolingStrategyKind::Attribute => Box::new(AttributeStrategy::new()),
      PoolingStrategyKind::SizeConfig => Box::new(SizeConfigStrategy::new()),
      PoolingStrategyKind::Size => Box::new(SizeStrategy::new()),
    }
  }
}

/// A count of pooled buffers per allocation size, used to find the smallest
/// bucket that can hold a request.
#[derive(Debug, Default)]
pub(crate) struct SortedSizes {
  counts: BTreeMap<usize, usize>,
}

impl SortedSizes {
  pub(crate) fn increment(&mut self, size: usize) {
    *self.counts.entry(size).or_insert(0) += 1;
  }

  pub(crate) fn decrement(&mut self, size: usize) {
    match self.counts.get_mut(&size) {
      Some(count) if *count > 1 => *count -= 1,
      Some(_) => {
        self.counts.remove(&size);
      }
      None => {
        tracing::warn!(size, "decremented a pooled size that was not tracked");
      }
    }
  }

  /// The smallest tracked size in `size..=size * max_multiple`.
  pub(crate) fn ceiling_within(&self, size: usize, max_multiple: usize) -> Option<usize> {
    self
      .counts
      .range(size..)
      .next()
      .map(|(&candidate, _)| candidate)
      .filter(|&candidate| candidate <= size.saturating_mul(max_multiple))
  }

  pub(crate) fn clear(&mut self) {
    self.counts.clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ceiling_respects_multiple() {
    let mut sizes = SortedSizes::default();
    sizes.increment(100);
    sizes.increment(1000);

    assert_eq!(sizes.ceiling_within(50, 4), Some(100));
    assert_eq!(sizes.ceiling_within(100, 4), Some(100));
    assert_eq!(sizes.ceiling_within(101, 4), None, "1000 > 4 * 101");
    assert_eq!(sizes.ceiling_within(300, 4), Some(1000));
    assert_eq!(sizes.ceiling_within(1001, 4), None);
  }

  #[test]
  fn decrement_removes_exhausted_sizes() {
    let mut sizes = SortedSizes::default();
    sizes.increment(64);
    sizes.increment(64);
    sizes.decrement(64);
    assert_eq!(sizes.ceiling_within(64, 1), Some(64));
    sizes.decrement(64);
    assert_eq!(sizes.ceiling_within(64, 1), None);
  }
}
