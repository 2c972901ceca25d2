//! # profile-graph: model graphs as persisted property graphs
//!
//! Turns a nested, ONNX-style model graph into a flat property graph of
//! placeholders, variables, operators and content-addressed annotations, and
//! persists it into a transactional graph store in concurrent batches. Bulk
//! tensor payloads go to a separate blob store.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `GraphStore` and `BlobStore` are the contracts with the backing stores
//! 2. **Clean DTOs**: descriptions in, `GraphNode` / `Annotation` / `Edge` out
//! 3. **Transformation is a pure function**: nothing is persisted unless the whole graph flattens
//! 4. **Best-effort persistence**: every batch runs to completion, failures are aggregated
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use profile_graph::{GraphDescription, OperatorDescription, ProfileGraph, TensorDescription};
//!
//! # async fn example() -> profile_graph::Result<()> {
//! let graph = ProfileGraph::open_memory().await?;
//!
//! let model = GraphDescription::new("matmul")
//!     .with_input("x")
//!     .with_output("y")
//!     .with_initializer(TensorDescription::float("w", &[2, 2], vec![1.0, 0.0, 0.0, 1.0]))
//!     .with_node(OperatorDescription::new("y", "MatMul").with_inputs(["x", "w"]));
//!
//! let report = graph.create_profile("run-1", &model, &HashMap::new()).await?;
//! println!("committed {} sub-transactions", report.committed);
//! # Ok(())
//! # }
//! ```
//!
//! ## Backends
//!
//! | Store | Kind | Description |
//! |-------|------|-------------|
//! | `MemoryStore` | graph | In-memory graph for testing/embedding |
//! | `MemoryBlobStore` | blob | In-memory blobs for testing/embedding |
//! | `FsBlobStore` | blob | Length-prefixed bincode files on local disk |

// ============================================================================
// Modules
// ============================================================================

pub mod blob;
pub mod config;
pub mod model;
pub mod persist;
pub mod storage;
pub mod transform;
pub mod tx;
pub mod view;

use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::info;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Annotation, AnnotationId, AttrValue, AttributeValue, DataType, Edge, GraphDescription,
    GraphNode, NodeKind, OperatorDescription, SparseTensorDescription, TensorAnnotation,
    TensorDescription,
};

// ============================================================================
// Re-exports: Transformation
// ============================================================================

pub use transform::{transform, OpProfile, TransformError, TransformedGraph};

// ============================================================================
// Re-exports: Storage
// ============================================================================

pub use blob::{BlobKey, BlobPayload, BlobStore, FsBlobStore, MemoryBlobStore};
pub use config::IngestConfig;
pub use persist::{BatchResult, PersistReport};
pub use storage::{Category, GraphStore, MemoryStore, Mutation, StoredNode};
pub use tx::{CommitPolicy, Transaction, TxId, TxMode};
pub use view::ProfileView;

use blob::BlobOffloader;
use persist::sink::error_channel;
use persist::BatchCoordinator;
use storage::Bootstrap;

// ============================================================================
// Top-level ProfileGraph handle
// ============================================================================

/// The primary entry point. Wraps a graph store and a blob store and
/// ingests model graphs as profiles.
pub struct ProfileGraph<S: GraphStore, O: BlobStore> {
    store: Arc<S>,
    blobs: Arc<O>,
    config: IngestConfig,
    bootstrap: Bootstrap,
}

impl<S: GraphStore, O: BlobStore> ProfileGraph<S, O> {
    /// Create a handle. The schema is published lazily, on first ingestion.
    pub fn new(store: S, blobs: O, config: IngestConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: Arc::new(store),
            blobs: Arc::new(blobs),
            config,
            bootstrap: Bootstrap::new(),
        })
    }

    /// Create a handle and publish the schema right away.
    pub async fn open(store: S, blobs: O, config: IngestConfig) -> Result<Self> {
        let graph = Self::new(store, blobs, config)?;
        graph.bootstrap.ensure(graph.store.as_ref()).await?;
        Ok(graph)
    }

    /// Transform `description` and persist it under `profile_id`.
    ///
    /// A transformation error returns before any transaction is opened.
    /// Otherwise every batch and every blob write runs to completion; if any
    /// of them failed the result is `Error::PartialPersist`, carrying the
    /// report of what was committed and discarded.
    pub async fn create_profile(
        &self,
        profile_id: &str,
        description: &GraphDescription,
        op_profiles: &HashMap<String, OpProfile>,
    ) -> Result<PersistReport> {
        self.bootstrap.ensure(self.store.as_ref()).await?;

        let mut graph = transform(description)?;
        let profiled = graph.apply_profiles(op_profiles);
        info!(
            profile = %profile_id,
            nodes = graph.nodes.len(),
            annotations = graph.annotations.len(),
            profiled,
            "graph transformed"
        );

        let (sink, drain) = error_channel();
        let mut offloader = BlobOffloader::new(Arc::clone(&self.blobs), sink.clone());
        let blobs_scheduled = offloader.offload_graph(profile_id, &graph);

        let mut coordinator = BatchCoordinator::new(Arc::clone(&self.store), &self.config, sink);
        if let Some(deadline) = self.config.deadline() {
            coordinator = coordinator.with_deadline(Instant::now() + deadline);
        }

        let persisted = match coordinator.persist(profile_id, &graph).await {
            Ok(persisted) => persisted,
            Err(e) => {
                offloader.join().await;
                drain.finish().await;
                return Err(e);
            }
        };
        let all_succeeded = persisted.all_succeeded();
        let finalized = tx::finalize(
            self.store.as_ref(),
            persisted.opened,
            self.config.commit_policy,
            all_succeeded,
        )
        .await;

        // Blob writes are joined even when finalization failed.
        let blobs_written = offloader.join().await;
        let failures = drain.finish().await;
        let finalized = finalized?;

        let report = PersistReport {
            batches: persisted.batches,
            committed: finalized.committed,
            discarded: finalized.discarded,
            blobs_scheduled,
            blobs_written,
        };
        if !failures.is_empty() {
            return Err(Error::PartialPersist {
                failures,
                report: Box::new(report),
            });
        }
        info!(
            profile = %profile_id,
            committed = report.committed,
            blobs = report.blobs_written,
            "profile persisted"
        );
        Ok(report)
    }

    /// Ids of every stored profile.
    pub async fn list_profiles(&self) -> Result<Vec<String>> {
        self.store.profiles().await
    }

    /// Rebuild a stored profile as a grid layout.
    pub async fn profile_view(&self, profile_id: &str) -> Result<ProfileView> {
        let nodes = self.store.profile_nodes(profile_id).await?;
        if nodes.is_empty() {
            return Err(Error::NotFound(format!("profile {profile_id}")));
        }
        Ok(view::layout(&nodes))
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Access the graph store (for advanced use).
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Access the blob store (for advanced use).
    pub fn blobs(&self) -> &O {
        &self.blobs
    }
}

/// In-memory stores for testing and embedding.
impl ProfileGraph<MemoryStore, MemoryBlobStore> {
    pub async fn open_memory() -> Result<Self> {
        Self::open(MemoryStore::new(), MemoryBlobStore::new(), IngestConfig::default()).await
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("Batch write error ({category} batch {batch}): {message}")]
    BatchWrite {
        category: Category,
        batch: usize,
        message: String,
    },

    #[error("Blob write error ({profile_id}/{node_id}): {message}")]
    BlobWrite {
        profile_id: String,
        node_id: String,
        message: String,
    },

    #[error("Finalization error: {0}")]
    FinalizationError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Transaction error: {0}")]
    TxError(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Partial persist: {} write(s) failed, {} sub-transaction(s) committed", .failures.len(), .report.committed)]
    PartialPersist {
        failures: Vec<Error>,
        report: Box<PersistReport>,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
