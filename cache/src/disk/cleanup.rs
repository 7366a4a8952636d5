use super::lru::Inner;

use std::sync::Weak;
use std::thread;

use fibre::mpsc;
use fibre::TrySendError;
use tracing::{debug, warn};

/// A single background thread that trims the store and rebuilds its journal
/// on request.
///
/// Requests coalesce: the channel holds at most one pending request, so a
/// burst of launches while a cleanup is queued results in one run. The
/// thread exits once the store is dropped.
#[derive(Debug)]
pub(crate) struct CleanupWorker {
  tx: mpsc::BoundedSender<()>,
}

impl CleanupWorker {
  pub(crate) fn spawn(store: Weak<Inner>) -> Self {
    let (tx, rx): (mpsc::BoundedSender<()>, mpsc::BoundedReceiver<()>) = mpsc::bounded(1);

    let spawned = thread::Builder::new()
      .name("glint-disk-cleanup".into())
      .spawn(move || {
        while rx.recv().is_ok() {
          let Some(store) = store.upgrade() else {
            break;
          };
          store.cleanup();
        }
        debug!("disk cache cleanup worker exiting");
      });
    if let Err(err) = spawned {
      // Without the worker the store still works; it only trims on flush
      // and close.
      warn!(error = %err, "failed to spawn disk cache cleanup worker");
    }

    Self { tx }
  }

  pub(crate) fn launch(&self) {
    // A full channel means a run is already queued.
    if let Err(TrySendError::Closed(_)) = self.tx.try_send(()) {
      debug!("disk cache cleanup worker is gone");
    }
  }
}
