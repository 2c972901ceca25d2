//! Edges of the flattened graph.
//!
//! Edges are implied by node contents (operator arguments, annotation
//! references) and only materialized when the persistence layer needs to
//! serialize them.

use serde::{Deserialize, Serialize};
use super::AnnotationId;

/// What an edge points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeTarget {
    /// Operator → argument node, at a given argument position.
    Argument { node: String, position: usize },
    /// Any node → annotation it carries.
    Annotation(AnnotationId),
}

/// A directed edge out of a graph node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: EdgeTarget,
}

impl Edge {
    pub fn argument(source: impl Into<String>, node: impl Into<String>, position: usize) -> Self {
        Self {
            source: source.into(),
            target: EdgeTarget::Argument {
                node: node.into(),
                position,
            },
        }
    }

    pub fn annotation(source: impl Into<String>, id: AnnotationId) -> Self {
        Self {
            source: source.into(),
            target: EdgeTarget::Annotation(id),
        }
    }
}
