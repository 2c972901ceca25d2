//! Shared error channel for write workers.
//!
//! Workers report failures without stopping; one draining task logs each
//! error as it arrives and hands the full list back once every sender is
//! gone.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::error;

use crate::Error;

/// Sending half, cloned into every worker.
#[derive(Clone, Debug)]
pub struct ErrorSink {
    tx: mpsc::UnboundedSender<Error>,
}

impl ErrorSink {
    pub fn report(&self, err: Error) {
        // The drain only stops once every sink is dropped, so this cannot fail
        // while `self` is alive.
        let _ = self.tx.send(err);
    }
}

/// Draining half.
#[derive(Debug)]
pub struct ErrorDrain {
    handle: JoinHandle<Vec<Error>>,
}

impl ErrorDrain {
    /// Wait for every sink to drop and return what was reported, in order.
    pub async fn finish(self) -> Vec<Error> {
        match self.handle.await {
            Ok(errors) => errors,
            Err(join_err) => vec![Error::StorageError(format!("error drain died: {join_err}"))],
        }
    }
}

/// Open a channel and spawn its draining task.
pub fn error_channel() -> (ErrorSink, ErrorDrain) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Error>();
    let handle = tokio::spawn(async move {
        let mut errors = Vec::new();
        while let Some(err) = rx.recv().await {
            error!(error = %err, "write failed");
            errors.push(err);
        }
        errors
    });
    (ErrorSink { tx }, ErrorDrain { handle })
}
