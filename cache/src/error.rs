use std::io;

use thiserror::Error;

/// Errors that can occur when building a memory or disk cache.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
  /// The disk cache was configured with a maximum size of zero.
  #[error("disk cache max size must be greater than zero")]
  ZeroMaxSize,

  /// A size percentage outside of `0.0..=1.0` was supplied.
  #[error("size percent must be in the range 0.0..=1.0, got {0}")]
  InvalidPercent(f64),

  /// A disk cache was built without a directory.
  #[error("a disk cache requires a directory")]
  MissingDirectory,

  /// A memory cache was built with neither a byte budget nor the available
  /// memory to derive one from.
  #[error("a memory cache requires a max size or the available memory")]
  MissingMaxSize,

  /// The minimum disk size clamp is larger than the maximum clamp.
  #[error("minimum max size {min} is larger than maximum max size {max}")]
  InvertedSizeClamp { min: u64, max: u64 },
}

/// Errors surfaced by the journaled disk cache.
///
/// Contention (an edit already in flight, a reader holding the entry, a
/// faulted journal) is never an error: those cases return `Ok(None)`.
#[derive(Debug, Error)]
pub enum DiskCacheError {
  #[error("disk cache I/O failed: {0}")]
  Io(#[from] io::Error),

  #[error("corrupt journal: {reason}")]
  CorruptJournal { reason: String },

  #[error("keys must match regex [a-z0-9_-]{{1,120}}: \"{key}\"")]
  InvalidKey { key: String },

  #[error("cache is closed")]
  Closed,
}

impl DiskCacheError {
  pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
    DiskCacheError::CorruptJournal {
      reason: reason.into(),
    }
  }
}

/// A specialized `Result` type for disk cache operations.
pub type Result<T, E = DiskCacheError> = std::result::Result<T, E>;
