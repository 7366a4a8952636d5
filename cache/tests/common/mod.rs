#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::Once;
use std::thread;
use std::time::{Duration, Instant};

use glint_cache::disk::DiskLruCache;
use glint_cache::{Bitmap, PixelConfig};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Installs a test subscriber once per test binary. `RUST_LOG` controls it.
pub fn init_tracing() {
  static INIT: Once = Once::new();
  INIT.call_once(|| {
    let _ = tracing_subscriber::fmt()
      .with_env_filter(EnvFilter::from_default_env())
      .with_test_writer()
      .try_init();
  });
}

pub fn temp_dir() -> TempDir {
  init_tracing();
  tempfile::tempdir().expect("failed to create temp dir")
}

/// A mutable `bytes`-byte bitmap.
pub fn bitmap(bytes: u32) -> Bitmap {
  Bitmap::new(bytes, 1, PixelConfig::Alpha8)
}

/// Opens a two-value store in `dir`.
pub fn open_store(dir: &Path, max_size: u64) -> DiskLruCache {
  DiskLruCache::new(dir, 1, 2, max_size)
}

/// Writes and commits both values of `key`.
pub fn write_entry(cache: &DiskLruCache, key: &str, values: [&str; 2]) {
  let mut editor = cache.edit(key).unwrap().expect("entry should be editable");
  for (index, value) in values.iter().enumerate() {
    let path = editor.file(index).unwrap().to_owned();
    fs::write(path, value).unwrap();
  }
  editor.commit().unwrap();
}

/// Reads both values of `key`, or `None` if it can't be read.
pub fn read_entry(cache: &DiskLruCache, key: &str) -> Option<[String; 2]> {
  let snapshot = cache.get(key).unwrap()?;
  let values = [0, 1].map(|index| fs::read_to_string(snapshot.file(index)).unwrap());
  Some(values)
}

/// File names in `dir`, sorted.
pub fn file_names(dir: &Path) -> Vec<String> {
  let mut names: Vec<String> = fs::read_dir(dir)
    .unwrap()
    .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
    .collect();
  names.sort();
  names
}

/// Polls `condition` until it holds or `timeout` elapses.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
  let deadline = Instant::now() + timeout;
  while Instant::now() < deadline {
    if condition() {
      return true;
    }
    thread::sleep(Duration::from_millis(5));
  }
  condition()
}
