//! A journaled, size-bounded LRU store of files.
//!
//! Each entry has a string key and a fixed number of values, each stored as
//! one file in the cache directory. Entries are written through an
//! [`Editor`] and read through a [`Snapshot`]; both hold the store open for
//! the key until they are completed or closed. Every state change is appended
//! to a journal so the entry table survives a restart, and an edit that never
//! completed is discarded with its staged files when the journal is replayed.
//!
//! The store is internally synchronized by a single lock and may be shared
//! across threads. A directory must only be opened by one store at a time.

use super::cleanup::CleanupWorker;
use super::entry::Entry;
use super::fault::FaultHidingWriter;
use super::journal::{self, Record};
use crate::error::{DiskCacheError, Result};
use crate::lru_list::LruList;
use crate::metrics::{DiskMetrics, DiskMetricsSnapshot};

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use ahash::HashMap;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard};
use regex::Regex;
use tracing::{debug, trace, warn};

/// Journal operations tolerated before the journal is compacted, provided
/// they also outnumber the live entries.
pub const DEFAULT_REWRITE_THRESHOLD: u32 = 2000;

static LEGAL_KEY_PATTERN: Lazy<Regex> =
  Lazy::new(|| Regex::new("^[a-z0-9_-]{1,120}$").expect("key pattern is a valid regex"));

fn validate_key(key: &str) -> Result<()> {
  if LEGAL_KEY_PATTERN.is_match(key) {
    Ok(())
  } else {
    Err(DiskCacheError::InvalidKey {
      key: key.to_owned(),
    })
  }
}

fn delete_if_exists(path: &Path) -> io::Result<()> {
  match fs::remove_file(path) {
    Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
    _ => Ok(()),
  }
}

/// Deletes everything inside `directory`, keeping the directory itself.
fn delete_contents(directory: &Path) -> io::Result<()> {
  let entries = match fs::read_dir(directory) {
    Ok(entries) => entries,
    Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
    Err(err) => return Err(err),
  };
  for entry in entries {
    let entry = entry?;
    if entry.file_type()?.is_dir() {
      fs::remove_dir_all(entry.path())?;
    } else {
      delete_if_exists(&entry.path())?;
    }
  }
  Ok(())
}

#[derive(Debug, Default)]
struct State {
  entries: HashMap<String, Entry>,
  // Access order over the keys of `entries`; the cost of a key is the total
  // length of its values.
  order: LruList<String>,
  operations_since_rewrite: u32,
  journal: Option<FaultHidingWriter>,
  initialized: bool,
  closed: bool,
  most_recent_trim_failed: bool,
  most_recent_rebuild_failed: bool,
  next_editor_id: u64,
}

impl State {
  fn size(&self) -> u64 {
    self.order.current_total_cost()
  }

  fn write_journal(&mut self, write: impl FnOnce(&mut FaultHidingWriter) -> io::Result<()>) -> io::Result<()> {
    match self.journal.as_mut() {
      Some(journal) => write(journal),
      None => Ok(()),
    }
  }
}

pub(crate) struct Inner {
  directory: PathBuf,
  journal_file: PathBuf,
  journal_file_tmp: PathBuf,
  journal_file_backup: PathBuf,
  app_version: u32,
  value_count: usize,
  max_size: u64,
  rewrite_threshold: u32,
  state: Mutex<State>,
  cleanup_worker: CleanupWorker,
  metrics: DiskMetrics,
}

impl Inner {
  fn lock_initialized(&self) -> Result<MutexGuard<'_, State>> {
    let mut state = self.state.lock();
    if state.closed {
      return Err(DiskCacheError::Closed);
    }
    self.initialize(&mut state)?;
    Ok(state)
  }

  fn initialize(&self, state: &mut State) -> Result<()> {
    if state.initialized {
      return Ok(());
    }

    delete_if_exists(&self.journal_file_tmp)?;
    // A backup only survives if a rebuild was interrupted. A rebuild moves the
    // journal to the backup, renames the finished temp file into place and
    // only then deletes the backup, so when both exist the journal is the
    // complete, newer one.
    if self.journal_file_backup.exists() {
      if self.journal_file.exists() {
        delete_if_exists(&self.journal_file_backup)?;
      } else {
        fs::rename(&self.journal_file_backup, &self.journal_file)?;
      }
    }

    if self.journal_file.exists() {
      match self.read_journal(state) {
        Ok(()) => {
          state.initialized = true;
          debug!(
            directory = %self.directory.display(),
            entries = state.entries.len(),
            size = state.size(),
            "opened disk cache"
          );
          return Ok(());
        }
        Err(err) => {
          warn!(
            directory = %self.directory.display(),
            error = %err,
            "disk cache journal is corrupt, removing directory contents"
          );
          state.journal = None;
          state.entries.clear();
          state.order.clear();
          delete_contents(&self.directory)?;
        }
      }
    }

    self.rebuild_journal(state)?;
    state.initialized = true;
    Ok(())
  }

  fn read_journal(&self, state: &mut State) -> Result<()> {
    let bytes = fs::read(&self.journal_file)?;
    let text = String::from_utf8(bytes).map_err(|_| DiskCacheError::corrupt("journal is not valid UTF-8"))?;

    let mut lines: Vec<&str> = text.split('\n').collect();
    // Whatever follows the final newline. Empty unless the last write was cut
    // short.
    let truncated = lines.pop().is_some_and(|tail| !tail.is_empty());
    journal::check_header(&lines, self.app_version, self.value_count)?;

    let records = &lines[5..];
    for line in records {
      self.replay(state, Record::parse(line, self.value_count)?);
    }
    state.operations_since_rewrite = records.len().saturating_sub(state.entries.len()) as u32;
    self.purge_interrupted_edits(state)?;

    if truncated {
      self.rebuild_journal(state)?;
    } else {
      state.journal = Some(self.open_journal_writer()?);
    }
    Ok(())
  }

  fn replay(&self, state: &mut State, record: Record<'_>) {
    match record {
      Record::Clean { key, lengths } => {
        let total = lengths.iter().sum();
        let entry = self.touch_or_insert(state, key);
        entry.readable = true;
        entry.current_editor = None;
        entry.lengths = lengths;
        state.order.update_cost(key, total);
      }
      Record::Dirty { key } => {
        let id = state.next_editor_id;
        state.next_editor_id += 1;
        self.touch_or_insert(state, key).current_editor = Some(id);
      }
      Record::Remove { key } => {
        state.entries.remove(key);
        state.order.remove(key);
      }
      Record::Read { key } => {
        state.order.touch(key);
      }
    }
  }

  /// Drops entries whose last journal record is `DIRTY`, with their files.
  fn purge_interrupted_edits(&self, state: &mut State) -> io::Result<()> {
    let interrupted: Vec<String> = state
      .entries
      .iter()
      .filter(|(_, entry)| entry.current_editor.is_some())
      .map(|(key, _)| key.clone())
      .collect();

    for key in interrupted {
      if let Some(entry) = state.entries.remove(&key) {
        for file in entry.clean_files.iter().chain(&entry.dirty_files) {
          delete_if_exists(file)?;
        }
      }
      state.order.remove(&key);
      debug!(key, "discarded interrupted edit");
    }
    Ok(())
  }

  fn touch_or_insert<'s>(&self, state: &'s mut State, key: &str) -> &'s mut Entry {
    if !state.order.touch(key) {
      state.order.push_front(key.to_owned(), 0);
    }
    state
      .entries
      .entry(key.to_owned())
      .or_insert_with(|| Entry::new(&self.directory, key, self.value_count))
  }

  fn open_journal_writer(&self) -> io::Result<FaultHidingWriter> {
    let file = OpenOptions::new().create(true).append(true).open(&self.journal_file)?;
    Ok(FaultHidingWriter::new(Box::new(BufWriter::new(file))))
  }

  /// Writes a compact journal holding only the current entry table and
  /// atomically swaps it in.
  fn rebuild_journal(&self, state: &mut State) -> Result<()> {
    // Drop the old writer so its buffer reaches the old file first.
    state.journal = None;
    fs::create_dir_all(&self.directory)?;

    let mut out = BufWriter::new(File::create(&self.journal_file_tmp)?);
    journal::write_header(&mut out, self.app_version, self.value_count)?;
    for key in state.order.iter_lru() {
      let Some(entry) = state.entries.get(key) else {
        continue;
      };
      if entry.current_editor.is_some() || entry.zombie {
        journal::write_dirty(&mut out, key)?;
      } else {
        journal::write_clean(&mut out, key, &entry.lengths)?;
      }
    }
    out.into_inner().map_err(io::IntoInnerError::into_error)?.sync_all()?;

    if self.journal_file.exists() {
      fs::rename(&self.journal_file, &self.journal_file_backup)?;
      fs::rename(&self.journal_file_tmp, &self.journal_file)?;
      delete_if_exists(&self.journal_file_backup)?;
    } else {
      fs::rename(&self.journal_file_tmp, &self.journal_file)?;
    }

    state.journal = Some(self.open_journal_writer()?);
    state.operations_since_rewrite = 0;
    state.most_recent_rebuild_failed = false;
    if state.initialized {
      self.metrics.journal_rebuilds.fetch_add(1, Ordering::Relaxed);
    }
    trace!(entries = state.entries.len(), "rebuilt journal");
    Ok(())
  }

  fn journal_rewrite_required(&self, state: &State) -> bool {
    state.operations_since_rewrite >= self.rewrite_threshold
      && state.operations_since_rewrite as usize >= state.entries.len()
  }

  fn launch_cleanup(&self) {
    self.cleanup_worker.launch();
  }

  /// Runs on the cleanup worker.
  pub(crate) fn cleanup(&self) {
    let mut state = self.state.lock();
    if !state.initialized || state.closed {
      return;
    }
    debug!(size = state.size(), max_size = self.max_size, "running disk cache cleanup");

    if let Err(err) = self.trim_to_size(&mut state) {
      warn!(error = %err, "failed to trim disk cache");
      state.most_recent_trim_failed = true;
    }

    let journal_faulted = state.journal.as_ref().map_or(true, FaultHidingWriter::has_errors);
    if journal_faulted || self.journal_rewrite_required(&state) {
      if let Err(err) = self.rebuild_journal(&mut state) {
        warn!(error = %err, "failed to rebuild disk cache journal");
        state.most_recent_rebuild_failed = true;
        state.journal = Some(FaultHidingWriter::blackhole());
      }
    }
  }

  fn trim_to_size(&self, state: &mut State) -> Result<()> {
    while state.size() > self.max_size {
      if !self.remove_oldest_entry(state)? {
        return Ok(());
      }
    }
    state.most_recent_trim_failed = false;
    Ok(())
  }

  fn remove_oldest_entry(&self, state: &mut State) -> Result<bool> {
    let eldest = state
      .order
      .iter_lru()
      .find(|key| state.entries.get(*key).is_some_and(|entry| !entry.zombie))
      .cloned();
    match eldest {
      Some(key) => {
        self.remove_entry(state, &key)?;
        self.metrics.evictions.fetch_add(1, Ordering::Relaxed);
        trace!(key, "evicted disk cache entry");
        Ok(true)
      }
      None => Ok(false),
    }
  }

  fn remove_entry(&self, state: &mut State, key: &str) -> Result<bool> {
    let Some(entry) = state.entries.get_mut(key) else {
      return Ok(false);
    };

    if entry.locking_snapshot_count > 0 {
      // Readers still hold the files. Mark the entry dirty so a crash before
      // they close does not bring it back.
      if let Some(journal) = state.journal.as_mut() {
        journal::write_dirty(journal, key)?;
        journal.flush()?;
      }
    }
    if entry.is_in_use() {
      entry.zombie = true;
      return Ok(true);
    }

    for file in &entry.clean_files {
      delete_if_exists(file)?;
    }
    state.entries.remove(key);
    state.order.remove(key);

    state.operations_since_rewrite += 1;
    state.write_journal(|journal| {
      journal::write_remove(journal, key)?;
      journal.flush()
    })?;

    if self.journal_rewrite_required(state) {
      self.launch_cleanup();
    }
    Ok(true)
  }

  /// The committed files and lengths of `key`, if it can be read now. Takes
  /// a read lock on the entry.
  fn snapshot_locked(&self, state: &mut State, key: &str) -> Result<Option<(Vec<PathBuf>, Vec<u64>)>> {
    state.order.touch(key);

    let found = state
      .entries
      .get(key)
      .filter(|entry| entry.readable && entry.current_editor.is_none() && !entry.zombie)
      .map(|entry| {
        let complete = entry.clean_files.iter().all(|file| file.exists());
        (complete, entry.clean_files.clone(), entry.lengths.clone())
      });
    let found = match found {
      Some((true, files, lengths)) => Some((files, lengths)),
      Some((false, _, _)) => {
        warn!(key, "disk cache entry files are missing, removing entry");
        if let Err(err) = self.remove_entry(state, key) {
          debug!(key, error = %err, "failed to remove entry with missing files");
        }
        None
      }
      None => None,
    };

    let Some(found) = found else {
      self.metrics.misses.fetch_add(1, Ordering::Relaxed);
      return Ok(None);
    };
    if let Some(entry) = state.entries.get_mut(key) {
      entry.locking_snapshot_count += 1;
    }

    state.operations_since_rewrite += 1;
    state.write_journal(|journal| journal::write_read(journal, key))?;
    if self.journal_rewrite_required(state) {
      self.launch_cleanup();
    }
    self.metrics.hits.fetch_add(1, Ordering::Relaxed);
    Ok(Some(found))
  }

  fn close_snapshot(&self, state: &mut State, key: &str) {
    let Some(entry) = state.entries.get_mut(key) else {
      return;
    };
    entry.locking_snapshot_count = entry.locking_snapshot_count.saturating_sub(1);
    if entry.locking_snapshot_count == 0 && entry.zombie {
      if let Err(err) = self.remove_entry(state, key) {
        warn!(key, error = %err, "failed to remove zombie entry");
      }
    }
  }

  /// Starts an edit of `key`, returning the editor id and the staged files.
  fn edit_locked(&self, state: &mut State, key: &str) -> Result<Option<(u64, Vec<PathBuf>)>> {
    if let Some(entry) = state.entries.get(key) {
      if entry.current_editor.is_some() {
        trace!(key, "edit refused, another edit is in progress");
        return Ok(None);
      }
      if entry.locking_snapshot_count > 0 {
        trace!(key, "edit refused, entry is being read");
        return Ok(None);
      }
    }

    if state.most_recent_trim_failed || state.most_recent_rebuild_failed {
      // The store is over budget or its journal is gone. Let cleanup try
      // again rather than growing it further.
      self.launch_cleanup();
      return Ok(None);
    }

    // The DIRTY record must reach the journal before any file exists.
    let Some(journal) = state.journal.as_mut() else {
      return Ok(None);
    };
    journal::write_dirty(journal, key)?;
    journal.flush()?;
    if journal.has_errors() {
      self.launch_cleanup();
      return Ok(None);
    }

    let id = state.next_editor_id;
    state.next_editor_id += 1;
    let entry = self.touch_or_insert(state, key);
    entry.current_editor = Some(id);
    Ok(Some((id, entry.dirty_files.clone())))
  }

  fn complete_edit(&self, state: &mut State, key: &str, editor: u64, written: &[bool], success: bool) -> Result<()> {
    let Some(entry) = state.entries.get_mut(key) else {
      warn!(key, "completed an edit for an entry that no longer exists");
      return Ok(());
    };
    if entry.current_editor != Some(editor) {
      warn!(key, "completed an edit that no longer owns its entry");
      return Ok(());
    }

    // Every value the editor opened must still be staged.
    let success = success
      && !entry.zombie
      && entry
        .dirty_files
        .iter()
        .zip(written)
        .all(|(file, &written)| !written || file.exists());

    let outcome = if success {
      promote_dirty_files(entry)
    } else {
      discard_dirty_files(entry)
    };
    let committed = success && outcome.is_ok();
    if success && !committed {
      let _ = discard_dirty_files(entry);
    }
    entry.current_editor = None;

    if committed {
      self.metrics.commits.fetch_add(1, Ordering::Relaxed);
    } else {
      self.metrics.aborts.fetch_add(1, Ordering::Relaxed);
    }

    if entry.zombie {
      self.remove_entry(state, key)?;
      return outcome.map_err(DiskCacheError::from);
    }

    let total = entry.total_length();
    let keep = committed || entry.readable;
    if keep {
      entry.readable = true;
    }
    state.order.update_cost(key, total);
    state.operations_since_rewrite += 1;

    if keep {
      let lengths = state.entries.get(key).map(|entry| entry.lengths.clone()).unwrap_or_default();
      state.write_journal(|journal| {
        journal::write_clean(journal, key, &lengths)?;
        journal.flush()
      })?;
    } else {
      state.entries.remove(key);
      state.order.remove(key);
      state.write_journal(|journal| {
        journal::write_remove(journal, key)?;
        journal.flush()
      })?;
    }

    if state.size() > self.max_size || self.journal_rewrite_required(state) {
      self.launch_cleanup();
    }
    outcome.map_err(DiskCacheError::from)
  }
}

fn promote_dirty_files(entry: &mut Entry) -> io::Result<()> {
  for i in 0..entry.clean_files.len() {
    let dirty = &entry.dirty_files[i];
    let clean = &entry.clean_files[i];
    if dirty.exists() {
      fs::rename(dirty, clean)?;
    } else {
      // Values the editor never touched keep their committed contents, or
      // become empty if there are none.
      OpenOptions::new().create(true).write(true).open(clean)?;
    }
    entry.lengths[i] = fs::metadata(clean)?.len();
  }
  Ok(())
}

fn discard_dirty_files(entry: &Entry) -> io::Result<()> {
  for dirty in &entry.dirty_files {
    delete_if_exists(dirty)?;
  }
  Ok(())
}

/// A handle to a journaled LRU store. Cheap to clone; clones share the store.
#[derive(Clone)]
pub struct DiskLruCache {
  inner: Arc<Inner>,
}

impl DiskLruCache {
  /// Opens the store in `directory`. The journal is read lazily on first use.
  ///
  /// # Panics
  ///
  /// Panics if `value_count` or `max_size` is zero.
  pub fn new(directory: impl Into<PathBuf>, app_version: u32, value_count: usize, max_size: u64) -> Self {
    Self::with_rewrite_threshold(directory, app_version, value_count, max_size, DEFAULT_REWRITE_THRESHOLD)
  }

  pub fn with_rewrite_threshold(
    directory: impl Into<PathBuf>,
    app_version: u32,
    value_count: usize,
    max_size: u64,
    rewrite_threshold: u32,
  ) -> Self {
    assert!(max_size > 0, "max_size must be greater than zero");
    assert!(value_count > 0, "value_count must be greater than zero");

    let directory = directory.into();
    let inner = Arc::new_cyclic(|weak| Inner {
      journal_file: directory.join(journal::JOURNAL_FILE),
      journal_file_tmp: directory.join(journal::JOURNAL_FILE_TMP),
      journal_file_backup: directory.join(journal::JOURNAL_FILE_BACKUP),
      directory,
      app_version,
      value_count,
      max_size,
      rewrite_threshold,
      state: Mutex::new(State::default()),
      cleanup_worker: CleanupWorker::spawn(weak.clone()),
      metrics: DiskMetrics::default(),
    });
    Self { inner }
  }

  /// Returns a snapshot of the committed values of `key`, or `None` if the
  /// entry does not exist, was never committed or is being edited.
  pub fn get(&self, key: &str) -> Result<Option<Snapshot>> {
    validate_key(key)?;
    let mut state = self.inner.lock_initialized()?;
    let found = self.inner.snapshot_locked(&mut state, key)?;
    Ok(found.map(|(files, lengths)| Snapshot::new(self.inner.clone(), key, files, lengths)))
  }

  /// Returns an editor for `key`, or `None` if another edit is in progress,
  /// a snapshot of the entry is open or the store cannot currently accept
  /// writes.
  pub fn edit(&self, key: &str) -> Result<Option<Editor>> {
    validate_key(key)?;
    let mut state = self.inner.lock_initialized()?;
    let started = self.inner.edit_locked(&mut state, key)?;
    Ok(started.map(|(id, files)| Editor::new(self.inner.clone(), key, id, files)))
  }

  /// Removes `key`. An entry that is being read or edited is removed once
  /// its last user lets go. Returns whether the entry existed.
  pub fn remove(&self, key: &str) -> Result<bool> {
    validate_key(key)?;
    let mut state = self.inner.lock_initialized()?;
    let removed = self.inner.remove_entry(&mut state, key)?;
    if removed && state.size() <= self.inner.max_size {
      state.most_recent_trim_failed = false;
    }
    Ok(removed)
  }

  /// Removes every entry. Entries in use are removed once released.
  pub fn evict_all(&self) -> Result<()> {
    let mut state = self.inner.lock_initialized()?;
    let keys: Vec<String> = state.entries.keys().cloned().collect();
    for key in keys {
      self.inner.remove_entry(&mut state, &key)?;
    }
    state.most_recent_trim_failed = false;
    Ok(())
  }

  pub fn clear(&self) -> Result<()> {
    self.evict_all()
  }

  /// Trims the store to its budget and flushes the journal.
  pub fn flush(&self) -> Result<()> {
    let mut state = self.inner.state.lock();
    if !state.initialized {
      return Ok(());
    }
    if state.closed {
      return Err(DiskCacheError::Closed);
    }
    self.inner.trim_to_size(&mut state)?;
    state.write_journal(|journal| journal.flush())?;
    Ok(())
  }

  /// Closes the store. Edits still in flight complete as aborted and their
  /// entries are removed. Snapshots stay readable until closed.
  pub fn close(&self) -> Result<()> {
    let mut state = self.inner.state.lock();
    if !state.initialized || state.closed {
      state.closed = true;
      return Ok(());
    }

    for entry in state.entries.values_mut() {
      if entry.current_editor.is_some() {
        entry.zombie = true;
      }
    }
    let trimmed = self.inner.trim_to_size(&mut state);
    let flushed = match state.journal.take() {
      Some(mut journal) => journal.flush(),
      None => Ok(()),
    };
    state.closed = true;
    debug!(directory = %self.inner.directory.display(), "closed disk cache");
    trimmed?;
    flushed?;
    Ok(())
  }

  pub fn is_closed(&self) -> bool {
    self.inner.state.lock().closed
  }

  /// Closes the store and deletes everything in its directory.
  pub fn delete(&self) -> Result<()> {
    self.close()?;
    delete_contents(&self.inner.directory)?;
    Ok(())
  }

  /// Total bytes of all committed values.
  pub fn size(&self) -> Result<u64> {
    let mut state = self.inner.state.lock();
    if !state.closed {
      self.inner.initialize(&mut state)?;
    }
    Ok(state.size())
  }

  /// Keys of every readable entry, least recently used first.
  pub fn keys(&self) -> Result<Vec<String>> {
    let state = self.inner.lock_initialized()?;
    Ok(
      state
        .order
        .iter_lru()
        .filter(|key| {
          state
            .entries
            .get(*key)
            .is_some_and(|entry| entry.readable && !entry.zombie)
        })
        .cloned()
        .collect(),
    )
  }

  pub fn max_size(&self) -> u64 {
    self.inner.max_size
  }

  pub fn directory(&self) -> &Path {
    &self.inner.directory
  }

  pub fn value_count(&self) -> usize {
    self.inner.value_count
  }

  pub fn metrics(&self) -> DiskMetricsSnapshot {
    let size = self.inner.state.lock().size();
    self.inner.metrics.snapshot(size, self.inner.max_size)
  }
}

impl fmt::Debug for DiskLruCache {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.inner.state.lock();
    f.debug_struct("DiskLruCache")
      .field("directory", &self.inner.directory)
      .field("size", &state.size())
      .field("max_size", &self.inner.max_size)
      .field("entries", &state.entries.len())
      .field("closed", &state.closed)
      .finish()
  }
}

/// Read access to the committed values of one entry.
///
/// While a snapshot is open the entry cannot be edited and a removal is
/// deferred. Dropping the snapshot closes it.
pub struct Snapshot {
  store: Arc<Inner>,
  key: String,
  files: Vec<PathBuf>,
  lengths: Vec<u64>,
  closed: bool,
}

impl Snapshot {
  fn new(store: Arc<Inner>, key: &str, files: Vec<PathBuf>, lengths: Vec<u64>) -> Self {
    Self {
      store,
      key: key.to_owned(),
      files,
      lengths,
      closed: false,
    }
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  /// The committed file of value `index`.
  pub fn file(&self, index: usize) -> &Path {
    &self.files[index]
  }

  /// The length of value `index` when the snapshot was taken.
  pub fn length(&self, index: usize) -> u64 {
    self.lengths[index]
  }

  pub fn close(mut self) {
    self.release();
  }

  /// Closes the snapshot and starts an edit of the same entry without
  /// letting another thread in between.
  pub fn close_and_edit(mut self) -> Result<Option<Editor>> {
    let store = self.store.clone();
    let mut state = store.state.lock();
    self.closed = true;
    store.close_snapshot(&mut state, &self.key);
    if state.closed {
      return Err(DiskCacheError::Closed);
    }
    let started = store.edit_locked(&mut state, &self.key)?;
    drop(state);
    Ok(started.map(|(id, files)| Editor::new(store.clone(), &self.key, id, files)))
  }

  fn release(&mut self) {
    if self.closed {
      return;
    }
    self.closed = true;
    let mut state = self.store.state.lock();
    self.store.close_snapshot(&mut state, &self.key);
  }
}

impl Drop for Snapshot {
  fn drop(&mut self) {
    self.release();
  }
}

impl fmt::Debug for Snapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Snapshot")
      .field("key", &self.key)
      .field("lengths", &self.lengths)
      .finish()
  }
}

/// Exclusive write access to one entry.
///
/// Values are written to staged files returned by [`Editor::file`]. They
/// replace the committed values on [`commit`](Editor::commit) and are
/// discarded on [`abort`](Editor::abort). Dropping an editor aborts it.
pub struct Editor {
  store: Arc<Inner>,
  key: String,
  id: u64,
  files: Vec<PathBuf>,
  written: Vec<bool>,
  done: bool,
}

impl Editor {
  fn new(store: Arc<Inner>, key: &str, id: u64, files: Vec<PathBuf>) -> Self {
    let written = vec![false; files.len()];
    Self {
      store,
      key: key.to_owned(),
      id,
      files,
      written,
      done: false,
    }
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  /// The staged file for value `index`, created empty if it does not exist
  /// yet. Values whose file is never requested keep their committed
  /// contents.
  pub fn file(&mut self, index: usize) -> Result<&Path> {
    let path = &self.files[index];
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).write(true).open(path)?;
    self.written[index] = true;
    Ok(&self.files[index])
  }

  /// Publishes the staged values.
  pub fn commit(mut self) -> Result<()> {
    self.complete(true)
  }

  /// Publishes the staged values and opens a snapshot of the result.
  pub fn commit_and_get(mut self) -> Result<Option<Snapshot>> {
    self.done = true;
    let store = self.store.clone();
    let mut state = store.state.lock();
    store.complete_edit(&mut state, &self.key, self.id, &self.written, true)?;
    if state.closed {
      return Ok(None);
    }
    let found = store.snapshot_locked(&mut state, &self.key)?;
    drop(state);
    Ok(found.map(|(files, lengths)| Snapshot::new(store.clone(), &self.key, files, lengths)))
  }

  /// Discards the staged values.
  pub fn abort(mut self) -> Result<()> {
    self.complete(false)
  }

  fn complete(&mut self, success: bool) -> Result<()> {
    self.done = true;
    let mut state = self.store.state.lock();
    self
      .store
      .complete_edit(&mut state, &self.key, self.id, &self.written, success)
  }
}

impl Drop for Editor {
  fn drop(&mut self) {
    if self.done {
      return;
    }
    if let Err(err) = self.complete(false) {
      warn!(key = %self.key, error = %err, "failed to abort dropped editor");
    }
  }
}

impl fmt::Debug for Editor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Editor")
      .field("key", &self.key)
      .field("written", &self.written)
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn key_validation() {
    let longest = "k".repeat(120);
    let too_long = "k".repeat(121);
    for key in ["a", "abc_123-x", longest.as_str()] {
      assert!(validate_key(key).is_ok(), "{key} should be legal");
    }
    for key in ["", "A", "has space", "new\nline", "dot.dot", too_long.as_str()] {
      assert!(validate_key(key).is_err(), "{key:?} should be illegal");
    }
  }

  #[test]
  fn rewrite_requires_both_threshold_and_entry_count() {
    let dir = tempfile::tempdir().unwrap();
    let cache = DiskLruCache::with_rewrite_threshold(dir.path(), 1, 1, 1024, 3);
    let mut state = cache.inner.lock_initialized().unwrap();

    state.operations_since_rewrite = 3;
    assert!(cache.inner.journal_rewrite_required(&state));

    for i in 0..4 {
      let key = format!("k{i}");
      cache.inner.touch_or_insert(&mut state, &key);
    }
    assert!(!cache.inner.journal_rewrite_required(&state), "fewer ops than live entries");
  }

  struct BrokenJournal;

  impl Write for BrokenJournal {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
      Err(io::Error::new(io::ErrorKind::Other, "disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
      Ok(())
    }
  }

  #[test]
  fn faulted_journal_refuses_edits_until_rebuilt() {
    let dir = tempfile::tempdir().unwrap();
    let cache = DiskLruCache::new(dir.path(), 1, 1, 1024);
    cache.inner.lock_initialized().unwrap().journal = Some(FaultHidingWriter::new(Box::new(BrokenJournal)));

    assert!(cache.edit("k").unwrap().is_none());
    assert!(!cache.inner.state.lock().entries.contains_key("k"));

    cache.inner.cleanup();
    assert!(!cache.inner.state.lock().journal.as_ref().is_some_and(FaultHidingWriter::has_errors));
    let editor = cache.edit("k").unwrap().expect("edit should succeed after a rebuild");
    editor.abort().unwrap();
  }
}
