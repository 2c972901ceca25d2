//! In-memory blob store.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{Error, Result};
use super::{BlobKey, BlobPayload, BlobStore};

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<BlobKey, BlobPayload>>,
    failing: RwLock<HashSet<String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write for `node_id` fail.
    pub fn fail_node(&self, node_id: impl Into<String>) {
        self.failing.write().insert(node_id.into());
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    pub fn keys(&self) -> Vec<BlobKey> {
        self.blobs.read().keys().cloned().collect()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn save(&self, payload: &BlobPayload) -> Result<()> {
        if self.failing.read().contains(&payload.node_id) {
            return Err(Error::StorageError(format!("injected blob failure for {}", payload.key())));
        }
        self.blobs.write().insert(payload.key(), payload.clone());
        Ok(())
    }

    async fn load(&self, key: &BlobKey) -> Result<Option<BlobPayload>> {
        Ok(self.blobs.read().get(key).cloned())
    }
}
