use std::path::{Path, PathBuf};

/// In-memory state of one key in the journaled store.
#[derive(Debug)]
pub(crate) struct Entry {
  pub(crate) lengths: Vec<u64>,
  /// Committed value files, `<key>.<index>`.
  pub(crate) clean_files: Vec<PathBuf>,
  /// Staged value files, `<key>.<index>.tmp`.
  pub(crate) dirty_files: Vec<PathBuf>,
  /// True once the entry has been committed at least once.
  pub(crate) readable: bool,
  /// Deleted while in use; files are removed once the last user lets go.
  pub(crate) zombie: bool,
  pub(crate) current_editor: Option<u64>,
  pub(crate) locking_snapshot_count: usize,
}

impl Entry {
  pub(crate) fn new(directory: &Path, key: &str, value_count: usize) -> Self {
    let clean_files = (0..value_count)
      .map(|i| directory.join(format!("{key}.{i}")))
      .collect();
    let dirty_files = (0..value_count)
      .map(|i| directory.join(format!("{key}.{i}.tmp")))
      .collect();
    Self {
      lengths: vec![0; value_count],
      clean_files,
      dirty_files,
      readable: false,
      zombie: false,
      current_editor: None,
      locking_snapshot_count: 0,
    }
  }

  pub(crate) fn total_length(&self) -> u64 {
    self.lengths.iter().sum()
  }

  /// Whether a reader or editor still needs the entry's files.
  pub(crate) fn is_in_use(&self) -> bool {
    self.locking_snapshot_count > 0 || self.current_editor.is_some()
  }
}
