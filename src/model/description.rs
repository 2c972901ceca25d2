//! Model graph description: the declarative input to the transformer.
//!
//! Decoded by the service layer from whatever wire format it speaks; this
//! crate only sees the structured form.

use serde::{Deserialize, Serialize};
use super::{SparseTensorDescription, TensorDescription};

/// One (possibly nested) computation graph.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphDescription {
    pub name: String,
    /// Declared input placeholders, by name.
    pub inputs: Vec<String>,
    /// Declared graph outputs, by name.
    pub outputs: Vec<String>,
    pub initializers: Vec<TensorDescription>,
    pub sparse_initializers: Vec<SparseTensorDescription>,
    /// Operators in declaration order.
    pub nodes: Vec<OperatorDescription>,
    pub quantization_annotations: Vec<TensorAnnotation>,
}

impl GraphDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_input(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(name.into());
        self
    }

    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }

    pub fn with_initializer(mut self, tensor: TensorDescription) -> Self {
        self.initializers.push(tensor);
        self
    }

    pub fn with_sparse_initializer(mut self, tensor: SparseTensorDescription) -> Self {
        self.sparse_initializers.push(tensor);
        self
    }

    pub fn with_node(mut self, node: OperatorDescription) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_quantization(mut self, annotation: TensorAnnotation) -> Self {
        self.quantization_annotations.push(annotation);
        self
    }
}

/// An operator application.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorDescription {
    pub name: String,
    pub op_type: String,
    /// Argument names, position-significant.
    pub inputs: Vec<String>,
    pub attributes: Vec<AttributeDescription>,
}

impl OperatorDescription {
    pub fn new(name: impl Into<String>, op_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op_type: op_type.into(),
            ..Default::default()
        }
    }

    pub fn with_inputs(mut self, inputs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.push(AttributeDescription {
            name: name.into(),
            value,
        });
        self
    }

    /// Every graph-valued attribute, in declaration order.
    pub fn subgraphs(&self) -> impl Iterator<Item = &GraphDescription> {
        self.attributes.iter().flat_map(|attr| match &attr.value {
            AttributeValue::Graph(g) => std::slice::from_ref(g.as_ref()),
            AttributeValue::Graphs(gs) => gs.as_slice(),
            _ => &[][..],
        })
    }
}

/// A named operator attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDescription {
    pub name: String,
    pub value: AttributeValue,
}

/// Every attribute kind a description can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    Float(f32),
    Int(i64),
    String(String),
    Floats(Vec<f32>),
    Ints(Vec<i64>),
    Strings(Vec<String>),
    Tensor(TensorDescription),
    SparseTensor(SparseTensorDescription),
    Tensors(Vec<TensorDescription>),
    SparseTensors(Vec<SparseTensorDescription>),
    Graph(Box<GraphDescription>),
    Graphs(Vec<GraphDescription>),
}

/// Graph-level quantization parameters for one named tensor.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TensorAnnotation {
    pub tensor_name: String,
    /// `(key, value)` pairs, e.g. `("SCALE_TENSOR", "x_scale")`.
    pub quant_parameters: Vec<(String, String)>,
}

impl TensorAnnotation {
    pub fn new(tensor_name: impl Into<String>) -> Self {
        Self {
            tensor_name: tensor_name.into(),
            quant_parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.quant_parameters.push((key.into(), value.into()));
        self
    }
}
