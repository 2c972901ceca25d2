//! # Model Graph Types
//!
//! Two families of DTOs:
//!
//! - **Descriptions** (`description`, `tensor`): the declarative, nested model
//!   graph as handed over by the service layer.
//! - **Flattened graph** (`node`, `annotation`, `edge`, `value`): what the
//!   transformer produces and the persistence layer writes.
//!
//! Pure data. Nothing here does I/O.

pub mod annotation;
pub mod description;
pub mod edge;
pub mod node;
pub mod tensor;
pub mod value;

pub use annotation::{Annotation, AnnotationId};
pub use description::{
    AttributeDescription, AttributeValue, GraphDescription, OperatorDescription,
    TensorAnnotation,
};
pub use edge::{Edge, EdgeTarget};
pub use node::{GraphNode, NodeKind, Operator, Placeholder, Shape, SparseInfo, Variable};
pub use tensor::{DataType, SparseTensorDescription, TensorDescription};
pub use value::AttrValue;
