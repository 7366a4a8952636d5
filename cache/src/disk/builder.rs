use super::cache::{DiskCache, ENTRY_COUNT};
use super::lru::{DiskLruCache, DEFAULT_REWRITE_THRESHOLD};
use crate::error::BuildError;

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Share of the free space on the cache's filesystem used by default.
pub const DEFAULT_MAX_SIZE_PERCENT: f64 = 0.02;
pub const DEFAULT_MINIMUM_MAX_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAXIMUM_MAX_SIZE: u64 = 250 * 1024 * 1024;

/// Plain configuration for a [`DiskCache`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiskCacheConfig {
  pub directory: Option<PathBuf>,
  /// An absolute budget. Takes precedence over `max_size_percent`.
  pub max_size_bytes: Option<u64>,
  pub max_size_percent: f64,
  pub minimum_max_size_bytes: u64,
  pub maximum_max_size_bytes: u64,
  /// Bumping this discards every entry written by another version.
  pub app_version: u32,
  pub journal_rewrite_threshold: u32,
}

impl Default for DiskCacheConfig {
  fn default() -> Self {
    Self {
      directory: None,
      max_size_bytes: None,
      max_size_percent: DEFAULT_MAX_SIZE_PERCENT,
      minimum_max_size_bytes: DEFAULT_MINIMUM_MAX_SIZE,
      maximum_max_size_bytes: DEFAULT_MAXIMUM_MAX_SIZE,
      app_version: 1,
      journal_rewrite_threshold: DEFAULT_REWRITE_THRESHOLD,
    }
  }
}

/// A builder for [`DiskCache`].
#[derive(Debug, Clone, Default)]
pub struct DiskCacheBuilder {
  config: DiskCacheConfig,
}

impl DiskCacheBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn from_config(config: DiskCacheConfig) -> Self {
    Self { config }
  }

  pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
    self.config.directory = Some(directory.into());
    self
  }

  pub fn max_size_bytes(mut self, bytes: u64) -> Self {
    self.config.max_size_bytes = Some(bytes);
    self
  }

  /// Sizes the cache as a share of the free space on its filesystem,
  /// clamped to the minimum and maximum budgets.
  pub fn max_size_percent(mut self, percent: f64) -> Self {
    self.config.max_size_bytes = None;
    self.config.max_size_percent = percent;
    self
  }

  pub fn minimum_max_size_bytes(mut self, bytes: u64) -> Self {
    self.config.minimum_max_size_bytes = bytes;
    self
  }

  pub fn maximum_max_size_bytes(mut self, bytes: u64) -> Self {
    self.config.maximum_max_size_bytes = bytes;
    self
  }

  pub fn app_version(mut self, version: u32) -> Self {
    self.config.app_version = version;
    self
  }

  pub fn journal_rewrite_threshold(mut self, operations: u32) -> Self {
    self.config.journal_rewrite_threshold = operations;
    self
  }

  pub(crate) fn validate(&self) -> Result<(), BuildError> {
    let config = &self.config;
    if config.directory.is_none() {
      return Err(BuildError::MissingDirectory);
    }
    if config.max_size_bytes == Some(0) {
      return Err(BuildError::ZeroMaxSize);
    }
    if !(0.0..=1.0).contains(&config.max_size_percent) {
      return Err(BuildError::InvalidPercent(config.max_size_percent));
    }
    if config.minimum_max_size_bytes > config.maximum_max_size_bytes {
      return Err(BuildError::InvertedSizeClamp {
        min: config.minimum_max_size_bytes,
        max: config.maximum_max_size_bytes,
      });
    }
    Ok(())
  }

  fn resolve_max_size(&self, directory: &Path) -> u64 {
    let config = &self.config;
    if let Some(bytes) = config.max_size_bytes {
      return bytes;
    }
    let available = fs::create_dir_all(directory).and_then(|()| fs2::available_space(directory));
    match available {
      Ok(available) => ((available as f64 * config.max_size_percent) as u64)
        .clamp(config.minimum_max_size_bytes, config.maximum_max_size_bytes),
      Err(err) => {
        warn!(
          directory = %directory.display(),
          error = %err,
          "could not query free space, using the minimum disk cache size"
        );
        config.minimum_max_size_bytes
      }
    }
  }

  pub fn build(self) -> Result<DiskCache, BuildError> {
    self.validate()?;
    let directory = self.config.directory.clone().ok_or(BuildError::MissingDirectory)?;
    let max_size = self.resolve_max_size(&directory);
    if max_size == 0 {
      return Err(BuildError::ZeroMaxSize);
    }

    debug!(directory = %directory.display(), max_size, "building disk cache");
    let store = DiskLruCache::with_rewrite_threshold(
      directory,
      self.config.app_version,
      ENTRY_COUNT,
      max_size,
      self.config.journal_rewrite_threshold,
    );
    Ok(DiskCache::new(store))
  }
}
