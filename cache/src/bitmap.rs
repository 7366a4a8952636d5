//! Owned pixel buffers.
//!
//! A [`Bitmap`] is the unit that flows through the memory cache, the
//! reference counter and the bitmap pool. It carries an identity
//! ([`BitmapId`]) that is stable for the lifetime of the allocation, so a
//! buffer that is pooled and later handed out again is still the same bitmap.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_BITMAP_ID: AtomicU64 = AtomicU64::new(1);

/// The identity of a pixel allocation. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BitmapId(u64);

impl BitmapId {
  fn next() -> Self {
    BitmapId(NEXT_BITMAP_ID.fetch_add(1, Ordering::Relaxed))
  }
}

impl fmt::Display for BitmapId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "bitmap#{}", self.0)
  }
}

/// The pixel layout of a bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PixelConfig {
  Alpha8,
  Rgb565,
  Argb4444,
  Argb8888,
  RgbaF16,
  /// Pixels live in device memory. Hardware bitmaps are immutable and can
  /// never be pooled.
  Hardware,
}

impl PixelConfig {
  /// Every config, in declaration order.
  pub const ALL: [PixelConfig; 6] = [
    PixelConfig::Alpha8,
    PixelConfig::Rgb565,
    PixelConfig::Argb4444,
    PixelConfig::Argb8888,
    PixelConfig::RgbaF16,
    PixelConfig::Hardware,
  ];

  pub const fn bytes_per_pixel(self) -> usize {
    match self {
      PixelConfig::Alpha8 => 1,
      PixelConfig::Rgb565 | PixelConfig::Argb4444 => 2,
      PixelConfig::Argb8888 | PixelConfig::Hardware => 4,
      PixelConfig::RgbaF16 => 8,
    }
  }

  pub const fn is_hardware(self) -> bool {
    matches!(self, PixelConfig::Hardware)
  }
}

/// Number of bytes needed to hold `width * height` pixels of `config`.
#[inline]
pub fn allocation_byte_count(width: u32, height: u32, config: PixelConfig) -> usize {
  width as usize * height as usize * config.bytes_per_pixel()
}

/// A pixel buffer with dimensions and a pixel config.
///
/// The backing allocation may be larger than `byte_count()` after the bitmap
/// has been reconfigured to smaller dimensions by the pool.
pub struct Bitmap {
  id: BitmapId,
  width: u32,
  height: u32,
  config: PixelConfig,
  mutable: bool,
  pixels: Vec<u8>,
}

impl Bitmap {
  /// Allocates a zeroed bitmap. Hardware bitmaps are created immutable.
  pub fn new(width: u32, height: u32, config: PixelConfig) -> Self {
    Self {
      id: BitmapId::next(),
      width,
      height,
      config,
      mutable: !config.is_hardware(),
      pixels: vec![0; allocation_byte_count(width, height, config)],
    }
  }

  /// Allocates a bitmap that will be rejected by every pool.
  pub fn new_immutable(width: u32, height: u32, config: PixelConfig) -> Self {
    let mut bitmap = Self::new(width, height, config);
    bitmap.mutable = false;
    bitmap
  }

  #[inline]
  pub fn id(&self) -> BitmapId {
    self.id
  }

  #[inline]
  pub fn width(&self) -> u32 {
    self.width
  }

  #[inline]
  pub fn height(&self) -> u32 {
    self.height
  }

  #[inline]
  pub fn config(&self) -> PixelConfig {
    self.config
  }

  #[inline]
  pub fn is_mutable(&self) -> bool {
    self.mutable
  }

  /// Bytes used by the current dimensions and config.
  #[inline]
  pub fn byte_count(&self) -> usize {
    allocation_byte_count(self.width, self.height, self.config)
  }

  /// Bytes owned by the backing allocation.
  #[inline]
  pub fn allocation_byte_count(&self) -> usize {
    self.pixels.len()
  }

  pub fn pixels(&self) -> &[u8] {
    &self.pixels[..self.byte_count()]
  }

  pub fn pixels_mut(&mut self) -> &mut [u8] {
    let len = self.byte_count();
    &mut self.pixels[..len]
  }

  /// Zero-fills the whole allocation.
  pub fn erase(&mut self) {
    self.pixels.fill(0);
  }

  /// Reinterprets the allocation with new dimensions and config.
  ///
  /// Returns `false` and leaves the bitmap untouched if it is immutable or
  /// the new layout does not fit in the existing allocation.
  pub fn reconfigure(&mut self, width: u32, height: u32, config: PixelConfig) -> bool {
    if !self.mutable || config.is_hardware() {
      return false;
    }
    if allocation_byte_count(width, height, config) > self.allocation_byte_count() {
      return false;
    }
    self.width = width;
    self.height = height;
    self.config = config;
    true
  }
}

impl fmt::Debug for Bitmap {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Bitmap")
      .field("id", &self.id)
      .field("width", &self.width)
      .field("height", &self.height)
      .field("config", &self.config)
      .field("mutable", &self.mutable)
      .field("allocation_byte_count", &self.allocation_byte_count())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn ids_are_unique() {
    let a = Bitmap::new(1, 1, PixelConfig::Alpha8);
    let b = Bitmap::new(1, 1, PixelConfig::Alpha8);
    assert_ne!(a.id(), b.id());
  }

  #[test]
  fn reconfigure_within_allocation() {
    let mut bitmap = Bitmap::new(10, 10, PixelConfig::Argb8888);
    assert_eq!(bitmap.allocation_byte_count(), 400);

    assert!(bitmap.reconfigure(5, 10, PixelConfig::Argb8888));
    assert_eq!(bitmap.byte_count(), 200);
    assert_eq!(bitmap.allocation_byte_count(), 400);
    assert_eq!(bitmap.pixels().len(), 200);

    assert!(bitmap.reconfigure(20, 10, PixelConfig::Rgb565));
    assert_eq!(bitmap.config(), PixelConfig::Rgb565);

    assert!(!bitmap.reconfigure(21, 10, PixelConfig::Rgb565));
    assert_eq!(bitmap.width(), 20, "failed reconfigure leaves the bitmap as is");
  }

  #[test]
  fn hardware_bitmaps_are_immutable() {
    let mut bitmap = Bitmap::new(4, 4, PixelConfig::Hardware);
    assert!(!bitmap.is_mutable());
    assert!(!bitmap.reconfigure(2, 2, PixelConfig::Hardware));
  }

  #[test]
  fn erase_clears_every_byte() {
    let mut bitmap = Bitmap::new(2, 2, PixelConfig::Argb8888);
    bitmap.pixels_mut().fill(0xAB);
    bitmap.erase();
    assert!(bitmap.pixels().iter().all(|b| *b == 0));
  }
}
