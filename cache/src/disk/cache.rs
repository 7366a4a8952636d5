use super::builder::DiskCacheBuilder;
use super::lru::{DiskLruCache, Editor, Snapshot};
use crate::error::Result;
use crate::metrics::DiskMetricsSnapshot;

use std::fmt::Write as _;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Index of the metadata value (response headers) of an entry.
pub const ENTRY_METADATA: usize = 0;
/// Index of the data value (response body) of an entry.
pub const ENTRY_DATA: usize = 1;
pub(crate) const ENTRY_COUNT: usize = 2;

/// Maps an arbitrary key to a legal store key: the lowercase hex SHA-256.
pub fn hash_key(key: &str) -> String {
  let digest = Sha256::digest(key.as_bytes());
  let mut hex = String::with_capacity(digest.len() * 2);
  for byte in digest {
    let _ = write!(hex, "{byte:02x}");
  }
  hex
}

/// A disk cache of fetched responses, each stored as a metadata file and a
/// data file.
///
/// Keys may be any string; they are hashed before reaching the store.
#[derive(Debug, Clone)]
pub struct DiskCache {
  store: DiskLruCache,
}

impl DiskCache {
  pub fn builder() -> DiskCacheBuilder {
    DiskCacheBuilder::new()
  }

  pub(crate) fn new(store: DiskLruCache) -> Self {
    Self { store }
  }

  pub fn get(&self, key: &str) -> Result<Option<DiskCacheSnapshot>> {
    Ok(self.store.get(&hash_key(key))?.map(DiskCacheSnapshot))
  }

  pub fn edit(&self, key: &str) -> Result<Option<DiskCacheEditor>> {
    Ok(self.store.edit(&hash_key(key))?.map(DiskCacheEditor))
  }

  pub fn remove(&self, key: &str) -> Result<bool> {
    self.store.remove(&hash_key(key))
  }

  pub fn clear(&self) -> Result<()> {
    self.store.evict_all()
  }

  pub fn flush(&self) -> Result<()> {
    self.store.flush()
  }

  pub fn close(&self) -> Result<()> {
    self.store.close()
  }

  /// Closes the cache and deletes its directory contents.
  pub fn delete(&self) -> Result<()> {
    self.store.delete()
  }

  pub fn size(&self) -> Result<u64> {
    self.store.size()
  }

  pub fn max_size(&self) -> u64 {
    self.store.max_size()
  }

  pub fn directory(&self) -> &Path {
    self.store.directory()
  }

  pub fn metrics(&self) -> DiskMetricsSnapshot {
    self.store.metrics()
  }

  /// The underlying store.
  pub fn store(&self) -> &DiskLruCache {
    &self.store
  }
}

/// Read access to a cached response. Dropping it closes it.
#[derive(Debug)]
pub struct DiskCacheSnapshot(Snapshot);

impl DiskCacheSnapshot {
  pub fn metadata(&self) -> &Path {
    self.0.file(ENTRY_METADATA)
  }

  pub fn data(&self) -> &Path {
    self.0.file(ENTRY_DATA)
  }

  pub fn close(self) {
    self.0.close()
  }

  pub fn close_and_edit(self) -> Result<Option<DiskCacheEditor>> {
    Ok(self.0.close_and_edit()?.map(DiskCacheEditor))
  }
}

/// Write access to a cached response. Dropping it aborts the edit.
#[derive(Debug)]
pub struct DiskCacheEditor(Editor);

impl DiskCacheEditor {
  pub fn metadata(&mut self) -> Result<&Path> {
    self.0.file(ENTRY_METADATA)
  }

  pub fn data(&mut self) -> Result<&Path> {
    self.0.file(ENTRY_DATA)
  }

  pub fn commit(self) -> Result<()> {
    self.0.commit()
  }

  pub fn commit_and_get(self) -> Result<Option<DiskCacheSnapshot>> {
    Ok(self.0.commit_and_get()?.map(DiskCacheSnapshot))
  }

  pub fn abort(self) -> Result<()> {
    self.0.abort()
  }
}
