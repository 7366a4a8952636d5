use std::fmt;
use std::io::{self, Write};

use tracing::error;

/// A journal writer that stops surfacing I/O errors after the first one.
///
/// Once a write or flush fails, `has_errors` is set, the failure is logged
/// and every later write is dropped. The store refuses new edits while the
/// flag is set; a successful journal rebuild replaces the writer.
pub(crate) struct FaultHidingWriter {
  inner: Box<dyn Write + Send>,
  has_errors: bool,
}

impl FaultHidingWriter {
  pub(crate) fn new(inner: Box<dyn Write + Send>) -> Self {
    Self {
      inner,
      has_errors: false,
    }
  }

  /// A writer that discards everything. Used after a journal rebuild failed.
  pub(crate) fn blackhole() -> Self {
    Self::new(Box::new(io::sink()))
  }

  pub(crate) fn has_errors(&self) -> bool {
    self.has_errors
  }

  fn on_error(&mut self, err: io::Error) {
    error!(error = %err, "journal write failed, dropping further journal writes");
    self.has_errors = true;
  }
}

impl Write for FaultHidingWriter {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    if self.has_errors {
      return Ok(buf.len());
    }
    match self.inner.write(buf) {
      Ok(written) => Ok(written),
      Err(err) => {
        self.on_error(err);
        Ok(buf.len())
      }
    }
  }

  fn flush(&mut self) -> io::Result<()> {
    if self.has_errors {
      return Ok(());
    }
    if let Err(err) = self.inner.flush() {
      self.on_error(err);
    }
    Ok(())
  }
}

impl fmt::Debug for FaultHidingWriter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FaultHidingWriter")
      .field("has_errors", &self.has_errors)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct FailingWriter {
    attempts: std::sync::Arc<std::sync::atomic::AtomicUsize>,
  }

  impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
      self.attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
      Err(io::Error::new(io::ErrorKind::Other, "disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
      Ok(())
    }
  }

  #[test]
  fn swallows_errors_after_the_first() {
    let attempts = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let mut writer = FaultHidingWriter::new(Box::new(FailingWriter {
      attempts: attempts.clone(),
    }));

    assert!(!writer.has_errors());
    writer.write_all(b"DIRTY k\n").unwrap();
    assert!(writer.has_errors());
    writer.write_all(b"CLEAN k 1 2\n").unwrap();
    writer.flush().unwrap();
    assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
  }
}
