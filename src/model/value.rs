//! Resolved operator attribute values and their display rendering.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An attribute value after node references have been resolved to ids.
///
/// Graph-valued attributes never reach this type: they are flattened
/// into the enclosing graph instead of being rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum AttrValue {
    Float(f32),
    Int(i64),
    String(String),
    Floats(Vec<f32>),
    Ints(Vec<i64>),
    Strings(Vec<String>),
    NodeRef(String),
    NodeRefs(Vec<String>),
}

impl AttrValue {
    /// Node ids this value points at.
    pub fn references(&self) -> &[String] {
        match self {
            AttrValue::NodeRef(id) => std::slice::from_ref(id),
            AttrValue::NodeRefs(ids) => ids,
            _ => &[],
        }
    }

    /// The string stored as the annotation value.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    f.write_str("[")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str("]")
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Float(v) => write!(f, "{v}"),
            AttrValue::Int(v) => write!(f, "{v}"),
            AttrValue::String(s) | AttrValue::NodeRef(s) => f.write_str(s),
            AttrValue::Floats(vs) => write_list(f, vs),
            AttrValue::Ints(vs) => write_list(f, vs),
            AttrValue::Strings(vs) | AttrValue::NodeRefs(vs) => write_list(f, vs),
        }
    }
}
