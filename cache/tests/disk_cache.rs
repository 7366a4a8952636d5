mod common;

use std::fs::{self, File};
use std::io::BufReader;

use common::temp_dir;
use glint_cache::disk::{hash_key, DiskCacheConfig};
use glint_cache::http::{combine_headers, CacheDecision, CacheResponse, CacheStrategy};
use glint_cache::{BuildError, DiskCache};
use http::{HeaderMap, HeaderValue, Request};
use pretty_assertions::assert_eq;

const URL: &str = "https://example.com/images/cat.png?size=large";

fn response(headers: &[(&'static str, &'static str)]) -> CacheResponse {
  let mut map = HeaderMap::new();
  for (name, value) in headers {
    map.append(*name, HeaderValue::from_static(value));
  }
  CacheResponse::new(1_000, 1_200, true, map)
}

fn store(cache: &DiskCache, key: &str, metadata: &CacheResponse, body: &[u8]) {
  let mut editor = cache.edit(key).unwrap().expect("entry should be editable");
  let mut out = File::create(editor.metadata().unwrap()).unwrap();
  metadata.write_to(&mut out).unwrap();
  fs::write(editor.data().unwrap(), body).unwrap();
  editor.commit().unwrap();
}

#[test]
fn arbitrary_keys_round_trip() {
  let dir = temp_dir();
  let cache = DiskCache::builder()
    .directory(dir.path())
    .max_size_bytes(1 << 20)
    .build()
    .unwrap();
  let metadata = response(&[("content-type", "image/png"), ("etag", "\"abc\"")]);
  store(&cache, URL, &metadata, b"png bytes");

  let snapshot = cache.get(URL).unwrap().expect("entry should be readable");
  let read = CacheResponse::read_from(&mut BufReader::new(File::open(snapshot.metadata()).unwrap())).unwrap();
  assert_eq!(read, metadata);
  assert_eq!(fs::read(snapshot.data()).unwrap(), b"png bytes");

  let stored = format!("{}.1", hash_key(URL));
  assert!(dir.path().join(stored).exists());
}

#[test]
fn hashed_keys_are_legal() {
  let key = hash_key(URL);
  assert_eq!(key.len(), 64);
  assert!(key.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
  assert_ne!(key, hash_key("https://example.com/images/dog.png"));
}

#[test]
fn not_modified_updates_metadata_in_place() {
  let dir = temp_dir();
  let cache = DiskCache::builder()
    .directory(dir.path())
    .max_size_bytes(1 << 20)
    .build()
    .unwrap();
  let cached = response(&[
    ("content-type", "image/png"),
    ("etag", "\"v1\""),
    ("cache-control", "max-age=0"),
  ]);
  store(&cache, URL, &cached, b"body");

  let request = Request::get(URL).body(()).unwrap();
  let snapshot = cache.get(URL).unwrap().unwrap();
  let stored = CacheResponse::read_from(&mut BufReader::new(File::open(snapshot.metadata()).unwrap())).unwrap();
  let decision = CacheStrategy::decide(&request, Some(stored), 10_000);
  let CacheDecision::Revalidate { cached: stored, .. } = decision else {
    panic!("a max-age=0 response must be revalidated");
  };

  // The server answered 304 with fresher caching headers.
  let mut network = HeaderMap::new();
  network.insert("cache-control", HeaderValue::from_static("max-age=600"));
  network.insert("content-type", HeaderValue::from_static("text/html"));
  let updated = CacheResponse::new(9_000, 9_500, true, combine_headers(&stored.headers, &network));

  let mut editor = snapshot.close_and_edit().unwrap().expect("only reader closed");
  let mut out = File::create(editor.metadata().unwrap()).unwrap();
  updated.write_to(&mut out).unwrap();
  drop(out);
  editor.commit().unwrap();

  let snapshot = cache.get(URL).unwrap().unwrap();
  assert_eq!(fs::read(snapshot.data()).unwrap(), b"body");
  let reread = CacheResponse::read_from(&mut BufReader::new(File::open(snapshot.metadata()).unwrap())).unwrap();
  assert_eq!(reread.content_type(), Some("image/png"));
  assert_eq!(reread.cache_control().max_age_seconds, Some(600));
  assert!(matches!(
    CacheStrategy::decide(&request, Some(reread), 10_000),
    CacheDecision::Cached(_)
  ));
}

#[test]
fn remove_and_clear() {
  let dir = temp_dir();
  let cache = DiskCache::builder()
    .directory(dir.path())
    .max_size_bytes(1 << 20)
    .build()
    .unwrap();
  let metadata = response(&[]);
  store(&cache, "first", &metadata, b"1");
  store(&cache, "second", &metadata, b"2");

  assert!(cache.remove("first").unwrap());
  assert!(!cache.remove("first").unwrap());
  assert!(cache.get("first").unwrap().is_none());

  cache.clear().unwrap();
  assert!(cache.get("second").unwrap().is_none());
  assert_eq!(cache.size().unwrap(), 0);
}

#[test]
fn aborted_edits_leave_nothing_behind() {
  let dir = temp_dir();
  let cache = DiskCache::builder()
    .directory(dir.path())
    .max_size_bytes(1 << 20)
    .build()
    .unwrap();
  let mut editor = cache.edit(URL).unwrap().unwrap();
  fs::write(editor.data().unwrap(), b"partial").unwrap();
  editor.abort().unwrap();

  assert!(cache.get(URL).unwrap().is_none());
  assert_eq!(common::file_names(dir.path()), vec!["journal".to_owned()]);
  assert_eq!(cache.metrics().aborts, 1);
}

#[test]
fn builds_from_config() {
  let dir = temp_dir();
  let config = DiskCacheConfig {
    directory: Some(dir.path().join("nested")),
    max_size_bytes: Some(4096),
    app_version: 3,
    ..DiskCacheConfig::default()
  };
  let cache = glint_cache::DiskCacheBuilder::from_config(config).build().unwrap();
  assert_eq!(cache.max_size(), 4096);
  assert_eq!(cache.directory(), dir.path().join("nested"));

  store(&cache, "k", &response(&[]), b"v");
  cache.close().unwrap();
  let journal = fs::read_to_string(dir.path().join("nested").join("journal")).unwrap();
  assert!(journal.starts_with("libcore.io.DiskLruCache\n1\n3\n2\n\n"));
}

#[test]
fn builder_rejects_bad_settings() {
  assert_eq!(DiskCache::builder().build().unwrap_err(), BuildError::MissingDirectory);
  assert_eq!(
    DiskCache::builder().directory("unused").max_size_percent(-0.5).build().unwrap_err(),
    BuildError::InvalidPercent(-0.5)
  );
}
