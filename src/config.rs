//! Ingestion configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::tx::CommitPolicy;
use crate::{Error, Result};

/// Tunables for one `ProfileGraph`.
///
/// Deserializable so the service layer can load it from its own config
/// file; every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Records per mutation.
    pub batch_size: usize,
    /// Round-trip bound for a single mutation.
    pub mutation_timeout_secs: u64,
    /// Optional bound on opening and submitting every batch. Finalization
    /// and blob writes run after it and are not covered.
    pub deadline_secs: Option<u64>,
    pub commit_policy: CommitPolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            mutation_timeout_secs: 500,
            deadline_secs: None,
            commit_policy: CommitPolicy::AllOrNothing,
        }
    }
}

impl IngestConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Whole seconds only; a sub-second remainder is dropped.
    pub fn with_mutation_timeout(mut self, timeout: Duration) -> Self {
        self.mutation_timeout_secs = timeout.as_secs();
        self
    }

    /// Whole seconds only; a sub-second remainder is dropped.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline_secs = Some(deadline.as_secs());
        self
    }

    pub fn with_commit_policy(mut self, policy: CommitPolicy) -> Self {
        self.commit_policy = policy;
        self
    }

    pub fn mutation_timeout(&self) -> Duration {
        Duration::from_secs(self.mutation_timeout_secs)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::ConfigError("batch_size must be at least 1".into()));
        }
        if self.mutation_timeout_secs == 0 {
            return Err(Error::ConfigError("mutation_timeout_secs must be at least 1".into()));
        }
        if self.deadline_secs == Some(0) {
            return Err(Error::ConfigError("deadline_secs must be at least 1".into()));
        }
        Ok(())
    }
}
