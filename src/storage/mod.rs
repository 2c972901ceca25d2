//! # Graph Store Trait
//!
//! The contract between the persistence layer and the backing graph
//! database. Writes arrive as JSON upsert mutations, one per batch, each
//! inside its own sub-transaction.
//!
//! ## Implementations
//!
//! | Backend | Module | Description |
//! |---------|--------|-------------|
//! | `MemoryStore` | `memory` | In-memory reference backend for testing/embedding |

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::info;

use crate::tx::{Transaction, TxMode};
use crate::{Error, Result};

pub use memory::MemoryStore;

// ============================================================================
// Schema
// ============================================================================

/// Predicates the persisted records rely on.
pub const SCHEMA: &str = r#"id: string @index(exact) .
profile_id: string @index(term) .
label: string .
kind: string .
shape: [int] .
runtime: int .
nnz: int .
root: bool .
key: string .
val: string .
arg: [uid] @reverse .
annotation: [uid] @reverse .
"#;

/// One-time schema bootstrap.
///
/// Owned by the top-level handle rather than held in a global; `ensure`
/// applies the schema on first call and is a no-op afterwards.
#[derive(Debug, Default)]
pub struct Bootstrap {
    done: OnceCell<()>,
}

impl Bootstrap {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn ensure<S: GraphStore + ?Sized>(&self, store: &S) -> Result<()> {
        self.done
            .get_or_try_init(|| async {
                info!("publishing graph schema");
                store.apply_schema(SCHEMA).await
            })
            .await?;
        Ok(())
    }

    pub fn is_done(&self) -> bool {
        self.done.initialized()
    }
}

// ============================================================================
// Mutations
// ============================================================================

/// Record family a mutation writes. Ordered by persistence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Annotations,
    Nodes,
    Edges,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Annotations, Category::Nodes, Category::Edges];

    pub fn name(&self) -> &'static str {
        match self {
            Category::Annotations => "annotations",
            Category::Nodes => "nodes",
            Category::Edges => "edges",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A JSON upsert of one batch of records.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub category: Category,
    /// JSON array of records.
    pub set_json: serde_json::Value,
}

impl Mutation {
    pub fn set<T: Serialize>(category: Category, records: &[T]) -> Result<Self> {
        Ok(Self {
            category,
            set_json: serde_json::to_value(records)?,
        })
    }

    /// Number of records carried.
    pub fn len(&self) -> usize {
        self.set_json.as_array().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Read path
// ============================================================================

/// A persisted node as read back for a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredNode {
    pub id: String,
    pub label: String,
    /// `(position, argument id)`, ordered by position.
    pub args: Vec<(usize, String)>,
}

// ============================================================================
// GraphStore Trait
// ============================================================================

/// The backing-store contract.
///
/// A transaction handle is not safe for concurrent use: every worker
/// opens its own through `begin_tx`.
#[async_trait]
pub trait GraphStore: Send + Sync + 'static {
    /// The transaction type for this store.
    type Tx: Transaction + Send + 'static;

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Publish the schema. Must be idempotent.
    async fn apply_schema(&self, schema: &str) -> Result<()>;

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begin a new transaction.
    async fn begin_tx(&self, mode: TxMode) -> Result<Self::Tx>;

    /// Submit one mutation inside a transaction.
    async fn mutate(&self, tx: &mut Self::Tx, mutation: Mutation) -> Result<()>;

    /// Commit a transaction.
    async fn commit_tx(&self, tx: Self::Tx) -> Result<()>;

    /// Discard a transaction and everything it staged.
    async fn discard_tx(&self, tx: Self::Tx) -> Result<()>;

    // ========================================================================
    // Read path
    // ========================================================================

    /// Ids of every stored profile.
    ///
    /// Default returns "not supported".
    async fn profiles(&self) -> Result<Vec<String>> {
        Err(Error::StorageError("profile listing not supported".into()))
    }

    /// Nodes and argument ids of one profile, in storage order.
    ///
    /// Default returns "not supported".
    async fn profile_nodes(&self, _profile_id: &str) -> Result<Vec<StoredNode>> {
        Err(Error::StorageError("profile lookup not supported".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;

    #[tokio::test]
    async fn test_bootstrap_applies_schema_once() {
        let store = MemoryStore::new();
        let bootstrap = Bootstrap::new();
        assert!(!bootstrap.is_done());

        bootstrap.ensure(&store).await.unwrap();
        bootstrap.ensure(&store).await.unwrap();
        assert!(bootstrap.is_done());
        assert_eq!(store.schema_applies(), 1);
        assert_eq!(store.schema().as_deref(), Some(SCHEMA));
    }
}
