//! JSON record shapes written to the graph store.
//!
//! ```text
//! node:        { uid, profile_id, id, label, kind, shape?, runtime?, nnz?, root? }
//! annotation:  { uid, id, key, val }
//! arg edge:    { uid, profile_id, arg: [{ uid, "arg|position" }] }
//! annot edge:  { uid, profile_id, annotation: [{ uid }] }
//! ```
//!
//! Node uids are `_:n.<id>` and annotation uids `_:a.<hex id>`, so the two
//! namespaces never meet inside one mutation.

use serde::{Deserialize, Serialize};

use crate::model::{AnnotationId, Annotation, Edge, EdgeTarget, GraphNode, NodeKind, Shape};

pub const NODE_UID_PREFIX: &str = "_:n.";
pub const ANNOTATION_UID_PREFIX: &str = "_:a.";

pub fn node_uid(id: &str) -> String {
    format!("{NODE_UID_PREFIX}{id}")
}

pub fn annotation_uid(id: &AnnotationId) -> String {
    format!("{ANNOTATION_UID_PREFIX}{id}")
}

pub fn parse_node_uid(uid: &str) -> Option<&str> {
    uid.strip_prefix(NODE_UID_PREFIX)
}

pub fn parse_annotation_uid(uid: &str) -> Option<AnnotationId> {
    uid.strip_prefix(ANNOTATION_UID_PREFIX).map(|id| AnnotationId(id.to_string()))
}

fn is_false(b: &bool) -> bool {
    !*b
}

fn is_empty_shape(shape: &Shape) -> bool {
    shape.is_empty()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub uid: String,
    pub profile_id: String,
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "is_empty_shape")]
    pub shape: Shape,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nnz: Option<usize>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub root: bool,
}

impl NodeRecord {
    pub fn from_node(profile_id: &str, node: &GraphNode, root: bool) -> Self {
        let (shape, runtime, nnz) = match node {
            GraphNode::Placeholder(_) => (Shape::new(), None, None),
            GraphNode::Variable(v) => (
                v.shape.clone(),
                None,
                v.sparse.as_ref().map(|s| s.non_zero_count),
            ),
            GraphNode::Operator(o) => (Shape::new(), (o.runtime > 0).then_some(o.runtime), None),
        };
        Self {
            uid: node_uid(node.id()),
            profile_id: profile_id.to_string(),
            id: node.id().to_string(),
            label: node.label().to_string(),
            kind: node.kind(),
            shape,
            runtime,
            nnz,
            root,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub uid: String,
    pub id: AnnotationId,
    pub key: String,
    pub val: String,
}

impl From<&Annotation> for AnnotationRecord {
    fn from(annotation: &Annotation) -> Self {
        Self {
            uid: annotation_uid(&annotation.id),
            id: annotation.id.clone(),
            key: annotation.key.clone(),
            val: annotation.value.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgRef {
    pub uid: String,
    #[serde(rename = "arg|position")]
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UidRef {
    pub uid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub uid: String,
    pub profile_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arg: Vec<ArgRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotation: Vec<UidRef>,
}

impl EdgeRecord {
    pub fn from_edge(profile_id: &str, edge: &Edge) -> Self {
        let mut record = Self {
            uid: node_uid(&edge.source),
            profile_id: profile_id.to_string(),
            arg: Vec::new(),
            annotation: Vec::new(),
        };
        match &edge.target {
            EdgeTarget::Argument { node, position } => record.arg.push(ArgRef {
                uid: node_uid(node),
                position: *position,
            }),
            EdgeTarget::Annotation(id) => record.annotation.push(UidRef {
                uid: annotation_uid(id),
            }),
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Operator, SparseInfo, Variable};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_operator_record_shape() {
        let node = GraphNode::Operator(Operator {
            id: "y".into(),
            op_type: "matmul".into(),
            args: vec!["x".into(), "w".into()],
            runtime: 12,
            annotations: Vec::new(),
        });
        let record = NodeRecord::from_node("p1", &node, true);
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "uid": "_:n.y",
                "profile_id": "p1",
                "id": "y",
                "label": "matmul",
                "kind": "operator",
                "runtime": 12,
                "root": true,
            })
        );
    }

    #[test]
    fn test_sparse_variable_record_carries_nnz() {
        let node = GraphNode::Variable(Variable {
            id: "s".into(),
            data: vec![1.0, 2.0],
            shape: Shape::from_slice(&[2]),
            sparse: Some(SparseInfo::new(vec![0, 3], vec![2, 2])),
            annotations: Vec::new(),
        });
        let value = serde_json::to_value(NodeRecord::from_node("p1", &node, false)).unwrap();
        assert_eq!(value["nnz"], json!(2));
        assert_eq!(value["shape"], json!([2]));
        assert!(value.get("root").is_none());
        // payload data never goes into the graph record
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_edge_records() {
        let arg = EdgeRecord::from_edge("p1", &Edge::argument("y", "w", 1));
        assert_eq!(
            serde_json::to_value(&arg).unwrap(),
            json!({ "uid": "_:n.y", "profile_id": "p1", "arg": [{ "uid": "_:n.w", "arg|position": 1 }] })
        );

        let id = AnnotationId::of("lr", "0.01");
        let ann = EdgeRecord::from_edge("p1", &Edge::annotation("y", id.clone()));
        let value = serde_json::to_value(&ann).unwrap();
        assert_eq!(value["annotation"][0]["uid"], json!(annotation_uid(&id)));
        assert!(value.get("arg").is_none());
    }

    #[test]
    fn test_annotation_record() {
        let record = AnnotationRecord::from(&Annotation::new("lr", "0.01"));
        assert_eq!(record.key, "lr");
        assert_eq!(record.val, "0.01");
        assert_eq!(parse_annotation_uid(&record.uid), Some(record.id.clone()));
    }

    #[test]
    fn test_uid_parsing() {
        assert_eq!(parse_node_uid(&node_uid("a/b:0")), Some("a/b:0"));
        assert_eq!(parse_node_uid("_:a.ff"), None);
    }
}
