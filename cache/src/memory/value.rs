use crate::bitmap::Bitmap;

use std::collections::BTreeMap;
use std::sync::Arc;

const IS_SAMPLED: &str = "is_sampled";

/// A cached decode result.
#[derive(Debug, Clone)]
pub struct MemoryCacheValue {
  pub bitmap: Arc<Bitmap>,
  pub extras: BTreeMap<String, String>,
}

impl MemoryCacheValue {
  pub fn new(bitmap: Arc<Bitmap>) -> Self {
    Self {
      bitmap,
      extras: BTreeMap::new(),
    }
  }

  /// Whether the bitmap was decoded below the source's full resolution.
  pub fn is_sampled(&self) -> bool {
    self.extras.get(IS_SAMPLED).is_some_and(|value| value == "true")
  }
}

/// What a decoder hands back for caching.
#[derive(Debug)]
pub struct DecodedImage {
  pub bitmap: Bitmap,
  pub is_sampled: bool,
}

impl DecodedImage {
  pub fn new(bitmap: Bitmap, is_sampled: bool) -> Self {
    Self { bitmap, is_sampled }
  }

  pub fn into_value(self) -> MemoryCacheValue {
    let mut value = MemoryCacheValue::new(Arc::new(self.bitmap));
    value
      .extras
      .insert(IS_SAMPLED.to_owned(), self.is_sampled.to_string());
    value
  }
}

impl From<DecodedImage> for MemoryCacheValue {
  fn from(image: DecodedImage) -> Self {
    image.into_value()
  }
}
