//! Transaction management.
//!
//! One persistence call opens many sub-transactions (one per batch) from a
//! shared store. Finalization walks them sequentially in open order; it is
//! not atomic: a commit failure partway leaves earlier commits in place.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::{Category, GraphStore};
use crate::{Error, Result};

/// Transaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxMode {
    ReadOnly,
    ReadWrite,
}

/// Opaque transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub u64);

impl std::fmt::Display for TxId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction trait that all stores must implement.
pub trait Transaction: Send + Sync {
    fn mode(&self) -> TxMode;
    fn id(&self) -> TxId;
}

/// What to do with the sub-transactions of a call once every batch joined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// Commit everything if every batch succeeded, otherwise discard everything.
    #[default]
    AllOrNothing,
    /// Commit the sub-transactions whose batch succeeded, discard the rest.
    CommitSucceeded,
}

/// A sub-transaction opened during one call, tagged with its batch outcome.
#[derive(Debug)]
pub struct OpenedTx<T> {
    pub tx: T,
    pub category: Category,
    pub batch: usize,
    pub succeeded: bool,
}

/// Counts of a completed finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Finalized {
    pub committed: usize,
    pub discarded: usize,
}

/// Commit or discard every opened sub-transaction, in order.
///
/// `all_succeeded` covers batches that never got a transaction (failed to
/// open, or the worker died), which `opened` cannot show. The first
/// commit/discard error stops the walk and is returned as
/// `FinalizationError`; nothing already committed is rolled back.
pub async fn finalize<S: GraphStore>(
    store: &S,
    opened: Vec<OpenedTx<S::Tx>>,
    policy: CommitPolicy,
    all_succeeded: bool,
) -> Result<Finalized> {
    let mut finalized = Finalized::default();
    for entry in opened {
        let commit = match policy {
            CommitPolicy::AllOrNothing => all_succeeded,
            CommitPolicy::CommitSucceeded => entry.succeeded,
        };
        let id = entry.tx.id();
        if commit {
            store.commit_tx(entry.tx).await.map_err(|e| {
                Error::FinalizationError(format!(
                    "commit of tx {id} ({} batch {}) failed: {e}",
                    entry.category, entry.batch
                ))
            })?;
            debug!(tx = %id, category = %entry.category, batch = entry.batch, "committed");
            finalized.committed += 1;
        } else {
            store.discard_tx(entry.tx).await.map_err(|e| {
                Error::FinalizationError(format!(
                    "discard of tx {id} ({} batch {}) failed: {e}",
                    entry.category, entry.batch
                ))
            })?;
            warn!(tx = %id, category = %entry.category, batch = entry.batch, "discarded");
            finalized.discarded += 1;
        }
    }
    Ok(finalized)
}
