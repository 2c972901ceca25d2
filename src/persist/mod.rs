//! # Batch Transaction Coordinator
//!
//! Splits the flattened graph into fixed-size batches per record category
//! and submits them concurrently, one sub-transaction per batch.
//!
//! ```text
//! annotations ─┐
//!              ├─ fan out ─ join ─┐
//! nodes ───────┘                  ├─ edges: fan out ─ join ─→ Persisted
//! ```
//!
//! Categories run in order (annotations, nodes, edges); batches inside a
//! category complete in any order. A failed batch is reported on the shared
//! error channel and never cancels its siblings. What gets committed is
//! decided afterwards by [`crate::tx::finalize`].

pub mod records;
pub mod sink;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::IngestConfig;
use crate::storage::{Category, GraphStore, Mutation};
use crate::transform::TransformedGraph;
use crate::tx::{OpenedTx, TxMode};
use crate::{Error, Result};
use records::{AnnotationRecord, EdgeRecord, NodeRecord};
use sink::ErrorSink;

/// Split `items` into consecutive batches of `batch_size`; the last batch
/// holds the remainder. A `batch_size` of 0 is treated as 1.
pub fn partition<T>(items: &[T], batch_size: usize) -> Vec<&[T]> {
    items.chunks(batch_size.max(1)).collect()
}

/// Outcome of one submitted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub category: Category,
    pub batch: usize,
    pub size: usize,
    pub succeeded: bool,
}

/// Summary of a persistence call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PersistReport {
    pub batches: Vec<BatchResult>,
    pub committed: usize,
    pub discarded: usize,
    pub blobs_scheduled: usize,
    pub blobs_written: usize,
}

impl PersistReport {
    pub fn failed_batches(&self) -> impl Iterator<Item = &BatchResult> {
        self.batches.iter().filter(|b| !b.succeeded)
    }

    pub fn batch_count(&self, category: Category) -> usize {
        self.batches.iter().filter(|b| b.category == category).count()
    }
}

/// Everything a coordinator run leaves behind for finalization.
#[derive(Debug)]
pub struct Persisted<T> {
    /// Every sub-transaction opened, ordered by category then batch.
    pub opened: Vec<OpenedTx<T>>,
    pub batches: Vec<BatchResult>,
}

impl<T> Persisted<T> {
    pub fn all_succeeded(&self) -> bool {
        self.batches.iter().all(|b| b.succeeded)
    }
}

/// Build the mutations of every category, in persistence order.
///
/// Serialization happens up front so that an encoding error surfaces
/// before any transaction is opened.
pub fn build_mutations(
    profile_id: &str,
    graph: &TransformedGraph,
    batch_size: usize,
) -> Result<Vec<(Category, Vec<Mutation>)>> {
    let annotations: Vec<AnnotationRecord> = graph
        .annotations
        .values()
        .map(|a| AnnotationRecord::from(a.as_ref()))
        .collect();
    let nodes: Vec<NodeRecord> = graph
        .nodes
        .iter()
        .map(|(id, node)| NodeRecord::from_node(profile_id, node, graph.roots.contains(id)))
        .collect();
    let edges: Vec<EdgeRecord> = graph
        .edges()
        .iter()
        .map(|edge| EdgeRecord::from_edge(profile_id, edge))
        .collect();

    Ok(vec![
        (Category::Annotations, batch_mutations(Category::Annotations, &annotations, batch_size)?),
        (Category::Nodes, batch_mutations(Category::Nodes, &nodes, batch_size)?),
        (Category::Edges, batch_mutations(Category::Edges, &edges, batch_size)?),
    ])
}

fn batch_mutations<T: Serialize>(category: Category, records: &[T], batch_size: usize) -> Result<Vec<Mutation>> {
    partition(records, batch_size)
        .into_iter()
        .map(|batch| Mutation::set(category, batch))
        .collect()
}

// ============================================================================
// Coordinator
// ============================================================================

/// Fans batches out over the store, one worker task per batch.
pub struct BatchCoordinator<S: GraphStore> {
    store: Arc<S>,
    batch_size: usize,
    mutation_timeout: Duration,
    deadline: Option<Instant>,
    sink: ErrorSink,
}

impl<S: GraphStore> BatchCoordinator<S> {
    pub fn new(store: Arc<S>, config: &IngestConfig, sink: ErrorSink) -> Self {
        Self {
            store,
            batch_size: config.batch_size,
            mutation_timeout: config.mutation_timeout(),
            deadline: None,
            sink,
        }
    }

    /// Bound opening and submitting every batch by an overall scope deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Submit every batch of the graph and collect the opened
    /// sub-transactions. Only an encoding error fails the call itself;
    /// batch failures are reported on the sink and recorded per batch.
    pub async fn persist(self, profile_id: &str, graph: &TransformedGraph) -> Result<Persisted<S::Tx>> {
        let categories = build_mutations(profile_id, graph, self.batch_size)?;
        let mut persisted = Persisted {
            opened: Vec::new(),
            batches: Vec::new(),
        };
        for (category, mutations) in categories {
            let (opened, batches) = self.run_category(category, mutations).await;
            persisted.opened.extend(opened);
            persisted.batches.extend(batches);
        }
        info!(
            profile = %profile_id,
            batches = persisted.batches.len(),
            failed = persisted.batches.iter().filter(|b| !b.succeeded).count(),
            "graph batches joined"
        );
        Ok(persisted)
    }

    async fn run_category(
        &self,
        category: Category,
        mutations: Vec<Mutation>,
    ) -> (Vec<OpenedTx<S::Tx>>, Vec<BatchResult>) {
        let sizes: Vec<usize> = mutations.iter().map(Mutation::len).collect();
        debug!(%category, batches = sizes.len(), "dispatching batches");

        let mut workers = JoinSet::new();
        for (batch, mutation) in mutations.into_iter().enumerate() {
            let store = Arc::clone(&self.store);
            let sink = self.sink.clone();
            let limit = self.limit();
            workers.spawn(submit(store, sink, category, batch, mutation, limit));
        }

        let mut opened = Vec::with_capacity(sizes.len());
        let mut results: Vec<Option<BatchResult>> = vec![None; sizes.len()];
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((result, tx)) => {
                    results[result.batch] = Some(result);
                    opened.extend(tx);
                }
                // A panicked worker takes its sub-transaction with it. It is
                // never finalized; the store drops it uncommitted.
                Err(join_err) => debug!(%category, error = %join_err, "batch worker died"),
            }
        }
        opened.sort_by_key(|o: &OpenedTx<S::Tx>| o.batch);

        let batches = results
            .into_iter()
            .enumerate()
            .map(|(batch, result)| {
                result.unwrap_or_else(|| {
                    self.sink.report(Error::BatchWrite {
                        category,
                        batch,
                        message: "worker task did not complete".into(),
                    });
                    BatchResult { category, batch, size: sizes[batch], succeeded: false }
                })
            })
            .collect();
        (opened, batches)
    }

    fn limit(&self) -> Instant {
        let per_mutation = Instant::now() + self.mutation_timeout;
        match self.deadline {
            Some(deadline) => per_mutation.min(deadline),
            None => per_mutation,
        }
    }
}

/// One worker: open a sub-transaction, submit the batch, report failure.
async fn submit<S: GraphStore>(
    store: Arc<S>,
    sink: ErrorSink,
    category: Category,
    batch: usize,
    mutation: Mutation,
    limit: Instant,
) -> (BatchResult, Option<OpenedTx<S::Tx>>) {
    let size = mutation.len();
    let fail = |message: String| {
        sink.report(Error::BatchWrite { category, batch, message });
        BatchResult { category, batch, size, succeeded: false }
    };

    let mut tx = match tokio::time::timeout_at(limit, store.begin_tx(TxMode::ReadWrite)).await {
        Ok(Ok(tx)) => tx,
        Ok(Err(e)) => return (fail(format!("could not open sub-transaction: {e}")), None),
        Err(_) => return (fail(format!("{category} batch {batch} exceeded its deadline opening a sub-transaction")), None),
    };
    let outcome = match tokio::time::timeout_at(limit, store.mutate(&mut tx, mutation)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(Error::Timeout(format!("{category} batch {batch} exceeded its deadline"))),
    };
    let result = match outcome {
        Ok(()) => {
            debug!(%category, batch, size, "batch written");
            BatchResult { category, batch, size, succeeded: true }
        }
        Err(e) => fail(e.to_string()),
    };
    let succeeded = result.succeeded;
    (result, Some(OpenedTx { tx, category, batch, succeeded }))
}
