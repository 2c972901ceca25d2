//! In-memory graph store.
//!
//! The reference implementation of `GraphStore`. Collections are plain maps
//! behind `RwLock`s; each transaction stages its decoded mutations and
//! applies them on commit.
//!
//! ## Semantics
//!
//! - **Upsert**: nodes are keyed by `(profile_id, id)`, annotations by id.
//! - **References resolve at commit**: an edge whose endpoints are not
//!   committed by the time its transaction commits fails the commit. A
//!   transaction either applies whole or not at all.
//! - **Fault injection**: mutations containing a marker string and the n-th
//!   commit can be made to fail; `begin_tx` and `mutate` can be stalled.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::model::AnnotationId;
use crate::persist::records::{
    parse_annotation_uid, parse_node_uid, AnnotationRecord, EdgeRecord, NodeRecord,
};
use crate::tx::{Transaction, TxId, TxMode};
use crate::{Error, Result};
use super::{Category, GraphStore, Mutation, StoredNode};

type NodeKey = (String, String);

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory property graph store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    schema: RwLock<Option<String>>,
    nodes: RwLock<BTreeMap<NodeKey, NodeRecord>>,
    annotations: RwLock<HashMap<AnnotationId, AnnotationRecord>>,
    /// (profile, source) → position → target
    args: RwLock<HashMap<NodeKey, BTreeMap<usize, String>>>,
    /// (profile, source) → annotation ids
    annotation_edges: RwLock<HashMap<NodeKey, BTreeSet<AnnotationId>>>,
    faults: Mutex<Faults>,
    next_tx_id: AtomicU64,
    schema_applies: AtomicU64,
    begun: AtomicU64,
    commits: AtomicU64,
    discards: AtomicU64,
}

#[derive(Default)]
struct Faults {
    fail_marker: Option<String>,
    fail_commit_at: Option<u64>,
    commit_calls: u64,
    mutation_delay: Option<Duration>,
    begin_delay: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Fault injection
    // ========================================================================

    /// Fail every mutation whose JSON payload contains `marker`.
    pub fn fail_mutations_containing(&self, marker: impl Into<String>) {
        self.inner.faults.lock().fail_marker = Some(marker.into());
    }

    /// Fail the n-th commit call (1-based).
    pub fn fail_commit_at(&self, n: u64) {
        self.inner.faults.lock().fail_commit_at = Some(n);
    }

    /// Stall every mutation for `delay` before applying it.
    pub fn delay_mutations(&self, delay: Duration) {
        self.inner.faults.lock().mutation_delay = Some(delay);
    }

    /// Stall every `begin_tx` for `delay`.
    pub fn delay_begin(&self, delay: Duration) {
        self.inner.faults.lock().begin_delay = Some(delay);
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    pub fn schema(&self) -> Option<String> {
        self.inner.schema.read().clone()
    }

    pub fn schema_applies(&self) -> u64 {
        self.inner.schema_applies.load(Ordering::Relaxed)
    }

    /// Transactions begun so far.
    pub fn tx_count(&self) -> u64 {
        self.inner.begun.load(Ordering::Relaxed)
    }

    pub fn commit_count(&self) -> u64 {
        self.inner.commits.load(Ordering::Relaxed)
    }

    pub fn discard_count(&self) -> u64 {
        self.inner.discards.load(Ordering::Relaxed)
    }

    pub fn node_count(&self) -> usize {
        self.inner.nodes.read().len()
    }

    pub fn annotation_count(&self) -> usize {
        self.inner.annotations.read().len()
    }

    /// Argument plus annotation edges.
    pub fn edge_count(&self) -> usize {
        let args: usize = self.inner.args.read().values().map(BTreeMap::len).sum();
        let anns: usize = self.inner.annotation_edges.read().values().map(BTreeSet::len).sum();
        args + anns
    }

    pub fn node(&self, profile_id: &str, id: &str) -> Option<NodeRecord> {
        self.inner
            .nodes
            .read()
            .get(&(profile_id.to_string(), id.to_string()))
            .cloned()
    }

    pub fn annotation(&self, id: &AnnotationId) -> Option<AnnotationRecord> {
        self.inner.annotations.read().get(id).cloned()
    }

    /// Annotation ids attached to a node.
    pub fn annotations_of(&self, profile_id: &str, id: &str) -> Vec<AnnotationId> {
        self.inner
            .annotation_edges
            .read()
            .get(&(profile_id.to_string(), id.to_string()))
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn validate_edges(&self, records: &[EdgeRecord]) -> Result<()> {
        let nodes = self.inner.nodes.read();
        let annotations = self.inner.annotations.read();
        let node_exists = |profile: &str, uid: &str| -> Result<()> {
            let id = parse_node_uid(uid)
                .ok_or_else(|| Error::StorageError(format!("malformed node uid {uid}")))?;
            if nodes.contains_key(&(profile.to_string(), id.to_string())) {
                Ok(())
            } else {
                Err(Error::StorageError(format!("dangling reference to node {id} in profile {profile}")))
            }
        };
        for record in records {
            node_exists(&record.profile_id, &record.uid)?;
            for arg in &record.arg {
                node_exists(&record.profile_id, &arg.uid)?;
            }
            for ann in &record.annotation {
                let id = parse_annotation_uid(&ann.uid)
                    .ok_or_else(|| Error::StorageError(format!("malformed annotation uid {}", ann.uid)))?;
                if !annotations.contains_key(&id) {
                    return Err(Error::StorageError(format!("dangling reference to annotation {id}")));
                }
            }
        }
        Ok(())
    }

    fn apply(&self, staged: Vec<Staged>) {
        for batch in staged {
            match batch {
                Staged::Annotations(records) => {
                    let mut annotations = self.inner.annotations.write();
                    for record in records {
                        annotations.insert(record.id.clone(), record);
                    }
                }
                Staged::Nodes(records) => {
                    let mut nodes = self.inner.nodes.write();
                    for record in records {
                        nodes.insert((record.profile_id.clone(), record.id.clone()), record);
                    }
                }
                Staged::Edges(records) => {
                    let mut args = self.inner.args.write();
                    let mut annotation_edges = self.inner.annotation_edges.write();
                    for record in records {
                        let Some(source) = parse_node_uid(&record.uid) else { continue };
                        let key = (record.profile_id.clone(), source.to_string());
                        for arg in &record.arg {
                            if let Some(target) = parse_node_uid(&arg.uid) {
                                args.entry(key.clone()).or_default().insert(arg.position, target.to_string());
                            }
                        }
                        for ann in &record.annotation {
                            if let Some(id) = parse_annotation_uid(&ann.uid) {
                                annotation_edges.entry(key.clone()).or_default().insert(id);
                            }
                        }
                    }
                }
            }
        }
    }
}

// ============================================================================
// MemoryTx
// ============================================================================

/// Decoded records waiting for commit.
enum Staged {
    Annotations(Vec<AnnotationRecord>),
    Nodes(Vec<NodeRecord>),
    Edges(Vec<EdgeRecord>),
}

/// In-memory transaction: a staging buffer.
pub struct MemoryTx {
    id: TxId,
    mode: TxMode,
    staged: Vec<Staged>,
}

impl Transaction for MemoryTx {
    fn mode(&self) -> TxMode { self.mode }
    fn id(&self) -> TxId { self.id }
}

// ============================================================================
// GraphStore impl
// ============================================================================

#[async_trait]
impl GraphStore for MemoryStore {
    type Tx = MemoryTx;

    async fn apply_schema(&self, schema: &str) -> Result<()> {
        *self.inner.schema.write() = Some(schema.to_string());
        self.inner.schema_applies.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn begin_tx(&self, mode: TxMode) -> Result<MemoryTx> {
        let delay = self.inner.faults.lock().begin_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let id = TxId(self.inner.next_tx_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.inner.begun.fetch_add(1, Ordering::Relaxed);
        Ok(MemoryTx { id, mode, staged: Vec::new() })
    }

    async fn mutate(&self, tx: &mut MemoryTx, mutation: Mutation) -> Result<()> {
        if tx.mode == TxMode::ReadOnly {
            return Err(Error::TxError(format!("tx {} is read-only", tx.id)));
        }
        let (delay, marker) = {
            let faults = self.inner.faults.lock();
            (faults.mutation_delay, faults.fail_marker.clone())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(marker) = marker {
            if mutation.set_json.to_string().contains(&marker) {
                return Err(Error::StorageError(format!("injected failure on {marker}")));
            }
        }
        let staged = match mutation.category {
            Category::Annotations => Staged::Annotations(serde_json::from_value(mutation.set_json)?),
            Category::Nodes => Staged::Nodes(serde_json::from_value(mutation.set_json)?),
            Category::Edges => Staged::Edges(serde_json::from_value(mutation.set_json)?),
        };
        tx.staged.push(staged);
        Ok(())
    }

    async fn commit_tx(&self, tx: MemoryTx) -> Result<()> {
        {
            let mut faults = self.inner.faults.lock();
            faults.commit_calls += 1;
            if faults.fail_commit_at == Some(faults.commit_calls) {
                return Err(Error::TxError(format!("injected commit failure on tx {}", tx.id)));
            }
        }
        for staged in &tx.staged {
            if let Staged::Edges(records) = staged {
                self.validate_edges(records)?;
            }
        }
        self.apply(tx.staged);
        self.inner.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn discard_tx(&self, _tx: MemoryTx) -> Result<()> {
        self.inner.discards.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn profiles(&self) -> Result<Vec<String>> {
        let nodes = self.inner.nodes.read();
        let profiles: BTreeSet<&String> = nodes.keys().map(|(profile, _)| profile).collect();
        Ok(profiles.into_iter().cloned().collect())
    }

    async fn profile_nodes(&self, profile_id: &str) -> Result<Vec<StoredNode>> {
        let nodes = self.inner.nodes.read();
        let args = self.inner.args.read();
        let found = nodes
            .iter()
            .filter(|((profile, _), _)| profile == profile_id)
            .map(|(key, record)| StoredNode {
                id: record.id.clone(),
                label: record.label.clone(),
                args: args
                    .get(key)
                    .map(|by_position| {
                        by_position.iter().map(|(position, target)| (*position, target.clone())).collect()
                    })
                    .unwrap_or_default(),
            })
            .collect();
        Ok(found)
    }
}
