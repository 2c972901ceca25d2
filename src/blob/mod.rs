//! # Blob Offload
//!
//! Bulk tensor payloads bypass the graph transaction and go to a separate
//! blob store, one record per `(profile_id, node_id)`. Writes run as
//! independent tasks with their own join point; failures go to the shared
//! error channel and never hold up the metadata commit.
//!
//! | Store | Module | Description |
//! |-------|--------|-------------|
//! | `FsBlobStore` | `fs` | Length-prefixed bincode files under a root directory |
//! | `MemoryBlobStore` | `memory` | In-memory map, for tests/embedding |

pub mod fs;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::debug;

use crate::model::Variable;
use crate::persist::sink::ErrorSink;
use crate::transform::TransformedGraph;
use crate::{Error, Result};

pub use fs::FsBlobStore;
pub use memory::MemoryBlobStore;

/// Address of one blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlobKey {
    pub profile_id: String,
    pub node_id: String,
}

impl BlobKey {
    pub fn new(profile_id: impl Into<String>, node_id: impl Into<String>) -> Self {
        Self {
            profile_id: profile_id.into(),
            node_id: node_id.into(),
        }
    }
}

impl std::fmt::Display for BlobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.profile_id, self.node_id)
    }
}

/// The coerced payload of one variable node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobPayload {
    pub profile_id: String,
    pub node_id: String,
    pub data: Vec<f64>,
    pub inner_indices: Option<Vec<i32>>,
    pub outer_indices: Option<Vec<i64>>,
}

impl BlobPayload {
    pub fn from_variable(profile_id: &str, variable: &Variable) -> Self {
        Self {
            profile_id: profile_id.to_string(),
            node_id: variable.id.clone(),
            data: variable.data.clone(),
            inner_indices: variable.sparse.as_ref().map(|s| s.inner_indices.clone()),
            outer_indices: variable.sparse.as_ref().map(|s| s.outer_indices.clone()),
        }
    }

    pub fn key(&self) -> BlobKey {
        BlobKey::new(self.profile_id.as_str(), self.node_id.as_str())
    }
}

/// Blob storage contract.
#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Write (or overwrite) the blob at `payload.key()`.
    async fn save(&self, payload: &BlobPayload) -> Result<()>;

    /// Read a blob back. `None` if nothing was written under `key`.
    async fn load(&self, key: &BlobKey) -> Result<Option<BlobPayload>>;
}

/// Schedules blob writes and joins them.
pub struct BlobOffloader<O: BlobStore> {
    store: Arc<O>,
    sink: ErrorSink,
    writers: JoinSet<bool>,
    scheduled: Vec<BlobKey>,
}

impl<O: BlobStore> BlobOffloader<O> {
    pub fn new(store: Arc<O>, sink: ErrorSink) -> Self {
        Self {
            store,
            sink,
            writers: JoinSet::new(),
            scheduled: Vec::new(),
        }
    }

    /// Start writing one payload in the background.
    pub fn offload(&mut self, payload: BlobPayload) {
        let store = Arc::clone(&self.store);
        let sink = self.sink.clone();
        self.scheduled.push(payload.key());
        self.writers.spawn(async move {
            match store.save(&payload).await {
                Ok(()) => true,
                Err(e) => {
                    sink.report(Error::BlobWrite {
                        profile_id: payload.profile_id,
                        node_id: payload.node_id,
                        message: e.to_string(),
                    });
                    false
                }
            }
        });
    }

    /// Offload every variable of the graph that carries data.
    pub fn offload_graph(&mut self, profile_id: &str, graph: &TransformedGraph) -> usize {
        let before = self.scheduled.len();
        for variable in graph.variables().filter(|v| !v.data.is_empty()) {
            self.offload(BlobPayload::from_variable(profile_id, variable));
        }
        let count = self.scheduled.len() - before;
        debug!(profile = %profile_id, blobs = count, "scheduled blob writes");
        count
    }

    /// Keys scheduled so far, in scheduling order.
    pub fn scheduled(&self) -> &[BlobKey] {
        &self.scheduled
    }

    /// Wait for every write. Returns how many succeeded.
    pub async fn join(mut self) -> usize {
        let mut written = 0;
        while let Some(joined) = self.writers.join_next().await {
            match joined {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(join_err) => self.sink.report(Error::StorageError(format!("blob writer died: {join_err}"))),
            }
        }
        written
    }
}
