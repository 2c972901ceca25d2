//! # Graph Transformer
//!
//! Walks a [`GraphDescription`], recursively inlining nested subgraphs, and
//! produces a flat id → [`GraphNode`] map plus the set of content-addressed
//! annotations the nodes reference.
//!
//! ```text
//! inputs            → Placeholder
//! initializers      → Variable            (coerce)
//! sparse inits      → Variable + Sparse   (coerce_sparse)
//! operators         → Operator            (attributes → annotations)
//!   └─ graph attrs  → flatten recursively, merge into the outer map
//! quantization      → annotations on the named node
//! ```
//!
//! All-or-nothing: the first error aborts the pass and nothing partial is
//! returned. Argument and attribute references are validated once the whole
//! graph has been flattened, so an operator may reference nodes declared
//! later or contributed by a nested scope.

pub mod coerce;
pub mod registry;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::*;
pub use coerce::{coerce, coerce_sparse, Coerced};
pub use registry::AnnotationRegistry;

// ============================================================================
// Errors
// ============================================================================

/// Why a transformation pass failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransformError {
    #[error("unsupported tensor `{tensor}`: {reason}")]
    UnsupportedType { tensor: String, reason: String },

    #[error("`{owner}` references missing node `{name}`")]
    MissingReference { owner: String, name: String },

    #[error("node id `{id}` is declared more than once")]
    IdCollision { id: String },
}

// ============================================================================
// Output
// ============================================================================

/// The flattened graph of one model.
#[derive(Debug, Clone, Default)]
pub struct TransformedGraph {
    pub nodes: BTreeMap<String, GraphNode>,
    pub annotations: BTreeMap<AnnotationId, Arc<Annotation>>,
    /// Ids of the top-level graph outputs.
    pub roots: BTreeSet<String>,
}

/// Measured per-operator data supplied alongside a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OpProfile {
    pub runtime: u64,
}

impl TransformedGraph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn variables(&self) -> impl Iterator<Item = &Variable> {
        self.nodes.values().filter_map(GraphNode::as_variable)
    }

    /// Materialize argument and annotation edges, in node-id order.
    pub fn edges(&self) -> Vec<Edge> {
        let mut edges = Vec::new();
        for (id, node) in &self.nodes {
            for (position, arg) in node.args().iter().enumerate().filter(|(_, arg)| !arg.is_empty()) {
                edges.push(Edge::argument(id.as_str(), arg.as_str(), position));
            }
            for annotation in node.annotations() {
                edges.push(Edge::annotation(id.as_str(), annotation.id.clone()));
            }
        }
        edges
    }

    /// Attach measured runtimes to operators. Returns how many were applied.
    pub fn apply_profiles(&mut self, profiles: &HashMap<String, OpProfile>) -> usize {
        let mut applied = 0;
        for (id, profile) in profiles {
            match self.nodes.get_mut(id) {
                Some(GraphNode::Operator(op)) => {
                    op.runtime = profile.runtime;
                    applied += 1;
                }
                Some(_) => debug!(node = %id, "ignoring profile for non-operator node"),
                None => debug!(node = %id, "ignoring profile for unknown node"),
            }
        }
        applied
    }
}

// ============================================================================
// Transformation pass
// ============================================================================

/// Flatten a model graph.
pub fn transform(graph: &GraphDescription) -> Result<TransformedGraph, TransformError> {
    let mut pass = Pass::default();
    let mut nodes = pass.flatten(graph)?;

    for reference in &pass.references {
        if !nodes.contains_key(&reference.name) {
            return Err(TransformError::MissingReference {
                owner: reference.owner.clone(),
                name: reference.name.clone(),
            });
        }
    }

    for (name, annotations) in pass.quantization {
        let node = nodes.get_mut(&name).ok_or_else(|| TransformError::MissingReference {
            owner: "quantization_annotation".into(),
            name: name.clone(),
        })?;
        node.annotations_mut().extend(annotations);
    }

    let mut roots = BTreeSet::new();
    for output in &graph.outputs {
        if !nodes.contains_key(output) {
            return Err(TransformError::MissingReference {
                owner: graph.name.clone(),
                name: output.clone(),
            });
        }
        roots.insert(output.clone());
    }

    let annotations = pass.registry.into_map();
    debug!(
        graph = %graph.name,
        nodes = nodes.len(),
        annotations = annotations.len(),
        "flattened model graph"
    );
    Ok(TransformedGraph {
        nodes,
        annotations,
        roots,
    })
}

struct Reference {
    owner: String,
    name: String,
}

/// State shared across every scope of one pass.
#[derive(Default)]
struct Pass {
    registry: AnnotationRegistry,
    references: Vec<Reference>,
    /// Deferred until every scope is flattened.
    quantization: Vec<(String, Vec<Arc<Annotation>>)>,
}

impl Pass {
    fn flatten(&mut self, graph: &GraphDescription) -> Result<BTreeMap<String, GraphNode>, TransformError> {
        let mut nodes = BTreeMap::new();

        for input in &graph.inputs {
            insert_unique(&mut nodes, GraphNode::placeholder(input.as_str()))?;
        }

        for init in &graph.initializers {
            let Coerced { values, shape } = coerce(init)?;
            insert_initializer(&mut nodes, GraphNode::Variable(Variable {
                id: init.name.clone(),
                data: values,
                shape,
                sparse: None,
                annotations: Vec::new(),
            }))?;
        }

        for sinit in &graph.sparse_initializers {
            let (Coerced { values, shape }, info) = coerce_sparse(sinit)?;
            insert_initializer(&mut nodes, GraphNode::Variable(Variable {
                id: sinit.name().to_string(),
                data: values,
                shape,
                sparse: Some(info),
                annotations: Vec::new(),
            }))?;
        }

        for op in &graph.nodes {
            let mut subgraphs = op.subgraphs().peekable();
            if subgraphs.peek().is_some() {
                for subgraph in subgraphs {
                    let inner = self.flatten(subgraph)?;
                    for (_, node) in inner {
                        insert_unique(&mut nodes, node)?;
                    }
                }
                continue;
            }
            let node = self.operator(op);
            insert_unique(&mut nodes, node)?;
        }

        for qa in &graph.quantization_annotations {
            let annotations = qa
                .quant_parameters
                .iter()
                .map(|(key, value)| self.registry.intern(key, value))
                .collect();
            self.quantization.push((qa.tensor_name.clone(), annotations));
        }

        Ok(nodes)
    }

    fn operator(&mut self, op: &OperatorDescription) -> GraphNode {
        let mut annotations = Vec::with_capacity(op.attributes.len());
        for attr in &op.attributes {
            let Some(value) = resolve_attribute(&attr.value) else {
                continue;
            };
            for name in value.references() {
                self.references.push(Reference {
                    owner: op.name.clone(),
                    name: name.clone(),
                });
            }
            annotations.push(self.registry.intern(&attr.name, &value.render()));
        }

        // Empty names mark omitted optional inputs; they keep their slot.
        let args = op.inputs.clone();
        for arg in args.iter().filter(|name| !name.is_empty()) {
            self.references.push(Reference {
                owner: op.name.clone(),
                name: arg.clone(),
            });
        }

        GraphNode::Operator(Operator {
            id: op.name.clone(),
            op_type: op.op_type.clone(),
            args,
            runtime: 0,
            annotations,
        })
    }
}

/// Resolve an attribute to its renderable form. Graph attributes yield `None`.
fn resolve_attribute(value: &AttributeValue) -> Option<AttrValue> {
    let resolved = match value {
        AttributeValue::Float(f) => AttrValue::Float(*f),
        AttributeValue::Int(i) => AttrValue::Int(*i),
        AttributeValue::String(s) => AttrValue::String(s.clone()),
        AttributeValue::Floats(fs) => AttrValue::Floats(fs.clone()),
        AttributeValue::Ints(is) => AttrValue::Ints(is.clone()),
        AttributeValue::Strings(ss) => AttrValue::Strings(ss.clone()),
        AttributeValue::Tensor(t) => AttrValue::NodeRef(t.name.clone()),
        AttributeValue::SparseTensor(s) => AttrValue::NodeRef(s.name().to_string()),
        AttributeValue::Tensors(ts) => AttrValue::NodeRefs(ts.iter().map(|t| t.name.clone()).collect()),
        AttributeValue::SparseTensors(ss) => {
            AttrValue::NodeRefs(ss.iter().map(|s| s.name().to_string()).collect())
        }
        AttributeValue::Graph(_) | AttributeValue::Graphs(_) => return None,
    };
    Some(resolved)
}

fn insert_unique(nodes: &mut BTreeMap<String, GraphNode>, node: GraphNode) -> Result<(), TransformError> {
    if nodes.contains_key(node.id()) {
        return Err(TransformError::IdCollision { id: node.id().to_string() });
    }
    nodes.insert(node.id().to_string(), node);
    Ok(())
}

/// Initializers may re-declare an input; the initializer wins.
fn insert_initializer(nodes: &mut BTreeMap<String, GraphNode>, node: GraphNode) -> Result<(), TransformError> {
    if let Some(GraphNode::Placeholder(_)) = nodes.get(node.id()) {
        nodes.remove(node.id());
    }
    insert_unique(nodes, node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn matmul_graph() -> GraphDescription {
        GraphDescription::new("main")
            .with_input("x")
            .with_initializer(TensorDescription::float("w", &[2, 2], vec![1.0, 2.0, 3.0, 4.0]))
            .with_node(OperatorDescription::new("y", "matmul").with_inputs(["x", "w"]))
            .with_output("y")
    }

    #[test]
    fn test_matmul_graph() {
        let g = transform(&matmul_graph()).unwrap();
        assert_eq!(g.nodes.len(), 3);
        assert!(g.annotations.is_empty());
        assert_eq!(g.nodes["x"], GraphNode::placeholder("x"));

        let w = g.nodes["w"].as_variable().unwrap();
        assert_eq!(w.data, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(w.shape.as_slice(), &[2, 2]);
        assert!(w.sparse.is_none());

        let y = g.nodes["y"].as_operator().unwrap();
        assert_eq!(y.op_type, "matmul");
        assert_eq!(y.args, vec!["x".to_string(), "w".to_string()]);
        assert!(g.roots.contains("y"));
    }

    #[test]
    fn test_float_attribute_becomes_one_annotation() {
        let graph = GraphDescription::new("main")
            .with_input("x")
            .with_node(
                OperatorDescription::new("step", "sgd")
                    .with_inputs(["x"])
                    .with_attribute("lr", AttributeValue::Float(0.01)),
            );
        let g = transform(&graph).unwrap();
        assert_eq!(g.annotations.len(), 1);
        let annotation = g.annotations.values().next().unwrap();
        assert_eq!(annotation.key, "lr");
        assert_eq!(annotation.value, "0.01");

        let step = g.nodes["step"].annotations();
        assert_eq!(step.len(), 1);
        assert!(Arc::ptr_eq(&step[0], annotation));
    }

    #[test]
    fn test_shared_attributes_are_interned_once() {
        let graph = GraphDescription::new("main")
            .with_input("x")
            .with_node(OperatorDescription::new("a", "relu").with_inputs(["x"]).with_attribute("axis", AttributeValue::Int(1)))
            .with_node(OperatorDescription::new("b", "relu").with_inputs(["a"]).with_attribute("axis", AttributeValue::Int(1)));
        let g = transform(&graph).unwrap();
        assert_eq!(g.annotations.len(), 1);
        assert!(Arc::ptr_eq(&g.nodes["a"].annotations()[0], &g.nodes["b"].annotations()[0]));
    }

    #[test]
    fn test_missing_argument_fails() {
        let graph = GraphDescription::new("main")
            .with_input("x")
            .with_node(OperatorDescription::new("y", "add").with_inputs(["x", "ghost"]));
        let err = transform(&graph).unwrap_err();
        assert_eq!(
            err,
            TransformError::MissingReference { owner: "y".into(), name: "ghost".into() }
        );
    }

    #[test]
    fn test_missing_tensor_attribute_reference_fails() {
        let graph = GraphDescription::new("main").with_input("x").with_node(
            OperatorDescription::new("c", "const")
                .with_attribute("value", AttributeValue::Tensor(TensorDescription::float("k", &[1], vec![1.0]))),
        );
        assert!(matches!(transform(&graph), Err(TransformError::MissingReference { .. })));
    }

    #[test]
    fn test_tensor_attribute_renders_node_id() {
        let graph = GraphDescription::new("main")
            .with_initializer(TensorDescription::float("k", &[1], vec![1.0]))
            .with_node(OperatorDescription::new("c", "const").with_attribute(
                "value",
                AttributeValue::Tensors(vec![TensorDescription::float("k", &[1], vec![1.0])]),
            ));
        let g = transform(&graph).unwrap();
        assert_eq!(g.nodes["c"].annotations()[0].value, "[k]");
    }

    #[test]
    fn test_forward_reference_resolves() {
        let graph = GraphDescription::new("main")
            .with_input("x")
            .with_node(OperatorDescription::new("b", "neg").with_inputs(["a"]))
            .with_node(OperatorDescription::new("a", "neg").with_inputs(["x"]));
        assert!(transform(&graph).is_ok());
    }

    #[test]
    fn test_nested_graph_is_flattened() {
        let body = GraphDescription::new("body")
            .with_initializer(TensorDescription::double("k", &[1], vec![2.0]))
            .with_node(
                OperatorDescription::new("inner", "mul")
                    .with_inputs(["x", "k"])
                    .with_attribute("mode", AttributeValue::String("fast".into())),
            );
        let graph = GraphDescription::new("main")
            .with_input("x")
            .with_node(OperatorDescription::new("loop", "loop").with_attribute("body", AttributeValue::Graph(Box::new(body))))
            .with_node(OperatorDescription::new("out", "relu").with_inputs(["inner"]));
        let g = transform(&graph).unwrap();

        // outer {x, out} + inner {k, inner}; the enclosing operator is dropped
        assert_eq!(g.nodes.len(), 4);
        assert!(!g.nodes.contains_key("loop"));
        assert_eq!(g.nodes["inner"].args(), ["x".to_string(), "k".to_string()]);
        assert!(g.annotations.contains_key(&AnnotationId::of("mode", "fast")));
    }

    #[test]
    fn test_every_branch_is_flattened() {
        let then_branch = GraphDescription::new("then").with_node(OperatorDescription::new("t", "id").with_inputs(["x"]));
        let else_branch = GraphDescription::new("else").with_node(OperatorDescription::new("e", "id").with_inputs(["x"]));
        let graph = GraphDescription::new("main")
            .with_input("x")
            .with_node(
                OperatorDescription::new("if", "if")
                    .with_attribute("then_branch", AttributeValue::Graph(Box::new(then_branch)))
                    .with_attribute("else_branch", AttributeValue::Graph(Box::new(else_branch))),
            );
        let g = transform(&graph).unwrap();
        assert!(g.nodes.contains_key("t"));
        assert!(g.nodes.contains_key("e"));
    }

    #[test]
    fn test_collision_between_scopes_is_rejected() {
        let body = GraphDescription::new("body").with_node(OperatorDescription::new("y", "neg").with_inputs(["x"]));
        let graph = GraphDescription::new("main")
            .with_input("x")
            .with_node(OperatorDescription::new("y", "neg").with_inputs(["x"]))
            .with_node(OperatorDescription::new("scan", "scan").with_attribute("body", AttributeValue::Graph(Box::new(body))));
        assert_eq!(transform(&graph).unwrap_err(), TransformError::IdCollision { id: "y".into() });
    }

    #[test]
    fn test_initializer_replaces_same_named_input() {
        let graph = GraphDescription::new("main")
            .with_input("w")
            .with_initializer(TensorDescription::float("w", &[1], vec![5.0]));
        let g = transform(&graph).unwrap();
        assert_eq!(g.nodes.len(), 1);
        assert_eq!(g.nodes["w"].kind(), NodeKind::Variable);
    }

    #[test]
    fn test_duplicate_operator_is_rejected() {
        let graph = GraphDescription::new("main")
            .with_input("x")
            .with_node(OperatorDescription::new("x", "neg"));
        assert!(matches!(transform(&graph), Err(TransformError::IdCollision { .. })));
    }

    #[test]
    fn test_sparse_initializer() {
        let values = TensorDescription::float("s", &[2], vec![1.0, 2.0]);
        let graph = GraphDescription::new("main")
            .with_sparse_initializer(SparseTensorDescription::new(values, vec![0, 3], &[2, 2]));
        let g = transform(&graph).unwrap();
        let s = g.nodes["s"].as_variable().unwrap();
        let info = s.sparse.as_ref().unwrap();
        assert_eq!(info.non_zero_count, 2);
        assert_eq!(info.outer_indices, vec![2, 2]);
    }

    #[test]
    fn test_unsupported_tensor_aborts_pass() {
        let graph = GraphDescription::new("main")
            .with_input("x")
            .with_initializer(TensorDescription::new("b", DataType::Bool));
        assert!(matches!(transform(&graph), Err(TransformError::UnsupportedType { .. })));
    }

    #[test]
    fn test_quantization_attaches_to_named_node() {
        let graph = GraphDescription::new("main")
            .with_input("x")
            .with_node(OperatorDescription::new("q", "quantize").with_inputs(["x"]))
            .with_quantization(TensorAnnotation::new("x").with_parameter("SCALE_TENSOR", "x_scale"));
        let g = transform(&graph).unwrap();
        assert_eq!(g.nodes["x"].annotations().len(), 1);
        assert!(g.nodes["q"].annotations().is_empty());
        assert_eq!(g.nodes["x"].annotations()[0].key, "SCALE_TENSOR");
    }

    #[test]
    fn test_quantization_for_missing_node_fails() {
        let graph = GraphDescription::new("main")
            .with_quantization(TensorAnnotation::new("nope").with_parameter("ZERO_POINT_TENSOR", "z"));
        assert!(matches!(transform(&graph), Err(TransformError::MissingReference { .. })));
    }

    #[test]
    fn test_missing_output_fails() {
        let graph = GraphDescription::new("main").with_input("x").with_output("y");
        assert!(matches!(transform(&graph), Err(TransformError::MissingReference { .. })));
    }

    #[test]
    fn test_omitted_inputs_keep_later_positions() {
        let graph = GraphDescription::new("main")
            .with_input("x")
            .with_input("hi")
            .with_node(OperatorDescription::new("clip", "Clip").with_inputs(["x", "", "hi"]));
        let g = transform(&graph).unwrap();
        assert_eq!(g.nodes["clip"].args(), ["x".to_string(), String::new(), "hi".to_string()]);

        let edges: Vec<Edge> = g.edges().into_iter().filter(|e| e.source == "clip").collect();
        assert_eq!(edges, vec![Edge::argument("clip", "x", 0), Edge::argument("clip", "hi", 2)]);
    }

    #[test]
    fn test_trailing_omitted_inputs_emit_no_edges() {
        let graph = GraphDescription::new("main")
            .with_input("x")
            .with_node(OperatorDescription::new("clip", "Clip").with_inputs(["x", "", ""]));
        let g = transform(&graph).unwrap();
        assert_eq!(g.edges(), vec![Edge::argument("clip", "x", 0)]);
    }

    #[test]
    fn test_edges_keep_argument_positions() {
        let g = transform(&matmul_graph()).unwrap();
        assert_eq!(
            g.edges(),
            vec![Edge::argument("y", "x", 0), Edge::argument("y", "w", 1)]
        );
    }

    #[test]
    fn test_apply_profiles_only_touches_operators() {
        let mut g = transform(&matmul_graph()).unwrap();
        let profiles = HashMap::from([
            ("y".to_string(), OpProfile { runtime: 42 }),
            ("w".to_string(), OpProfile { runtime: 7 }),
            ("zz".to_string(), OpProfile { runtime: 1 }),
        ]);
        assert_eq!(g.apply_profiles(&profiles), 1);
        assert_eq!(g.nodes["y"].as_operator().unwrap().runtime, 42);
    }
}
