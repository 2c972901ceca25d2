//! Nodes of a flattened model graph.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::Annotation;

/// Tensor dimensions, unsigned.
pub type Shape = SmallVec<[u64; 4]>;

/// Index arrays of a sparse initializer, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SparseInfo {
    pub non_zero_count: usize,
    pub inner_indices: Vec<i32>,
    pub outer_indices: Vec<i64>,
}

impl SparseInfo {
    pub fn new(inner_indices: Vec<i32>, outer_indices: Vec<i64>) -> Self {
        Self {
            non_zero_count: inner_indices.len(),
            inner_indices,
            outer_indices,
        }
    }
}

/// An input placeholder: identity only.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Placeholder {
    pub id: String,
    pub annotations: Vec<Arc<Annotation>>,
}

/// A constant or trainable initializer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Variable {
    pub id: String,
    pub data: Vec<f64>,
    pub shape: Shape,
    pub sparse: Option<SparseInfo>,
    pub annotations: Vec<Arc<Annotation>>,
}

/// An operator application.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Operator {
    pub id: String,
    pub op_type: String,
    /// Argument node ids by declared position. An empty id marks an
    /// omitted optional input and holds its slot.
    pub args: Vec<String>,
    /// Measured runtime, 0 when unprofiled.
    pub runtime: u64,
    /// One annotation per attribute, in attribute order.
    pub annotations: Vec<Arc<Annotation>>,
}

/// Variant discriminant of a [`GraphNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Placeholder,
    Variable,
    Operator,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Placeholder => "placeholder",
            NodeKind::Variable => "variable",
            NodeKind::Operator => "operator",
        }
    }
}

/// A node of the flattened graph.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphNode {
    Placeholder(Placeholder),
    Variable(Variable),
    Operator(Operator),
}

impl GraphNode {
    pub fn placeholder(id: impl Into<String>) -> Self {
        GraphNode::Placeholder(Placeholder {
            id: id.into(),
            annotations: Vec::new(),
        })
    }

    pub fn id(&self) -> &str {
        match self {
            GraphNode::Placeholder(p) => &p.id,
            GraphNode::Variable(v) => &v.id,
            GraphNode::Operator(o) => &o.id,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            GraphNode::Placeholder(_) => NodeKind::Placeholder,
            GraphNode::Variable(_) => NodeKind::Variable,
            GraphNode::Operator(_) => NodeKind::Operator,
        }
    }

    /// Display label: the operator type, or the variant name for leaves.
    pub fn label(&self) -> &str {
        match self {
            GraphNode::Operator(o) => &o.op_type,
            other => other.kind().name(),
        }
    }

    pub fn annotations(&self) -> &[Arc<Annotation>] {
        match self {
            GraphNode::Placeholder(p) => &p.annotations,
            GraphNode::Variable(v) => &v.annotations,
            GraphNode::Operator(o) => &o.annotations,
        }
    }

    pub fn annotations_mut(&mut self) -> &mut Vec<Arc<Annotation>> {
        match self {
            GraphNode::Placeholder(p) => &mut p.annotations,
            GraphNode::Variable(v) => &mut v.annotations,
            GraphNode::Operator(o) => &mut o.annotations,
        }
    }

    /// Argument ids by position, omitted slots included; empty for leaves.
    pub fn args(&self) -> &[String] {
        match self {
            GraphNode::Operator(o) => &o.args,
            _ => &[],
        }
    }

    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            GraphNode::Variable(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_operator(&self) -> Option<&Operator> {
        match self {
            GraphNode::Operator(o) => Some(o),
            _ => None,
        }
    }
}
