//! The journal file format.
//!
//! ```text
//! libcore.io.DiskLruCache
//! 1
//! 100
//! 2
//!
//! CLEAN 3400330d1dfc7f3f7f4b8d4d803dfcf6 832 21054
//! DIRTY 335c4c6028171cfddfbaae1a9c313c52
//! CLEAN 335c4c6028171cfddfbaae1a9c313c52 3934 2342
//! REMOVE 335c4c6028171cfddfbaae1a9c313c52
//! DIRTY 1ab96a171faeeee38496d8b330771a7a
//! CLEAN 1ab96a171faeeee38496d8b330771a7a 1600 234
//! READ 335c4c6028171cfddfbaae1a9c313c52
//! READ 3400330d1dfc7f3f7f4b8d4d803dfcf6
//! ```
//!
//! The first five lines are the header: a magic string, the format version,
//! the application's version, the number of values per entry and a blank
//! line. Every following line records a state change for one key:
//!
//! * `DIRTY` an entry is being created or updated. It must be followed by a
//!   `CLEAN` or `REMOVE` for the same key, otherwise the staged files are
//!   leftovers of an interrupted edit.
//! * `CLEAN` an edit committed; the line carries the length of every value.
//! * `READ` an entry was read. Only used for LRU order.
//! * `REMOVE` an entry was deleted.

use crate::error::{DiskCacheError, Result};

use std::io::{self, Write};

pub(crate) const JOURNAL_FILE: &str = "journal";
pub(crate) const JOURNAL_FILE_TMP: &str = "journal.tmp";
pub(crate) const JOURNAL_FILE_BACKUP: &str = "journal.bkp";
pub(crate) const MAGIC: &str = "libcore.io.DiskLruCache";
pub(crate) const VERSION: &str = "1";

const CLEAN: &str = "CLEAN";
const DIRTY: &str = "DIRTY";
const REMOVE: &str = "REMOVE";
const READ: &str = "READ";

/// One journal line after the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Record<'a> {
  Clean { key: &'a str, lengths: Vec<u64> },
  Dirty { key: &'a str },
  Remove { key: &'a str },
  Read { key: &'a str },
}

impl Record<'_> {
  pub(crate) fn parse(line: &str, value_count: usize) -> Result<Record<'_>> {
    let unexpected = || DiskCacheError::corrupt(format!("unexpected journal line: {line}"));

    let (kind, rest) = line.split_once(' ').ok_or_else(unexpected)?;
    let (key, values) = match rest.split_once(' ') {
      Some((key, values)) => (key, Some(values)),
      None => (rest, None),
    };
    if key.is_empty() {
      return Err(unexpected());
    }

    match (kind, values) {
      (CLEAN, Some(values)) => {
        let lengths = values
          .split(' ')
          .map(|length| length.parse::<u64>().map_err(|_| unexpected()))
          .collect::<Result<Vec<_>>>()?;
        if lengths.len() != value_count {
          return Err(unexpected());
        }
        Ok(Record::Clean { key, lengths })
      }
      (DIRTY, None) => Ok(Record::Dirty { key }),
      (REMOVE, None) => Ok(Record::Remove { key }),
      (READ, None) => Ok(Record::Read { key }),
      _ => Err(unexpected()),
    }
  }
}

/// Validates the five header lines against the expected configuration.
pub(crate) fn check_header(lines: &[&str], app_version: u32, value_count: usize) -> Result<()> {
  let app_version = app_version.to_string();
  let value_count = value_count.to_string();
  let expected = [MAGIC, VERSION, app_version.as_str(), value_count.as_str(), ""];
  if lines.len() < expected.len() || lines[..expected.len()] != expected {
    return Err(DiskCacheError::corrupt(format!(
      "unexpected journal header: {:?}",
      &lines[..lines.len().min(expected.len())]
    )));
  }
  Ok(())
}

pub(crate) fn write_header(out: &mut impl Write, app_version: u32, value_count: usize) -> io::Result<()> {
  write!(out, "{MAGIC}\n{VERSION}\n{app_version}\n{value_count}\n\n")
}

pub(crate) fn write_clean(out: &mut impl Write, key: &str, lengths: &[u64]) -> io::Result<()> {
  write!(out, "{CLEAN} {key}")?;
  for length in lengths {
    write!(out, " {length}")?;
  }
  out.write_all(b"\n")
}

pub(crate) fn write_dirty(out: &mut impl Write, key: &str) -> io::Result<()> {
  writeln!(out, "{DIRTY} {key}")
}

pub(crate) fn write_remove(out: &mut impl Write, key: &str) -> io::Result<()> {
  writeln!(out, "{REMOVE} {key}")
}

pub(crate) fn write_read(out: &mut impl Write, key: &str) -> io::Result<()> {
  writeln!(out, "{READ} {key}")
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn parses_every_record_kind() {
    assert_eq!(
      Record::parse("CLEAN k 1 22", 2).unwrap(),
      Record::Clean {
        key: "k",
        lengths: vec![1, 22]
      }
    );
    assert_eq!(Record::parse("DIRTY k", 2).unwrap(), Record::Dirty { key: "k" });
    assert_eq!(Record::parse("REMOVE k", 2).unwrap(), Record::Remove { key: "k" });
    assert_eq!(Record::parse("READ k", 2).unwrap(), Record::Read { key: "k" });
  }

  #[test]
  fn rejects_malformed_lines() {
    for line in [
      "",
      "CLEAN",
      "CLEAN k",
      "CLEAN k 1",
      "CLEAN k 1 2 3",
      "CLEAN k 1 x",
      "DIRTY k extra",
      "READ",
      "BOGUS k",
      "CLEAN  1 2",
    ] {
      assert!(Record::parse(line, 2).is_err(), "{line:?} should be rejected");
    }
  }

  #[test]
  fn header_round_trips() {
    let mut out = Vec::new();
    write_header(&mut out, 7, 2).unwrap();
    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.split('\n').collect();
    check_header(&lines, 7, 2).unwrap();
    assert!(check_header(&lines, 8, 2).is_err());
    assert!(check_header(&lines, 7, 3).is_err());
    assert!(check_header(&lines[..3], 7, 2).is_err());
  }

  #[test]
  fn clean_record_lists_lengths() {
    let mut out = Vec::new();
    write_clean(&mut out, "k", &[3, 1024]).unwrap();
    assert_eq!(out, b"CLEAN k 3 1024\n");
  }
}
