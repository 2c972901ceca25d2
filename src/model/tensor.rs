//! Tensor payloads as they arrive in a model description.
//!
//! A tensor carries its numeric payload in exactly one of several typed
//! fields (or as little-endian `raw_data`), selected by its declared
//! [`DataType`]. Narrow integer types share the `int32_data` field and
//! unsigned 32/64-bit types share `uint64_data`.

use serde::{Deserialize, Serialize};

/// Declared element type of a tensor.
///
/// The numeric codes follow the ONNX `TensorProto.DataType` enumeration so
/// that descriptions decoded by the service layer map across directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Undefined,
    Float,
    Uint8,
    Int8,
    Uint16,
    Int16,
    Int32,
    Int64,
    String,
    Bool,
    Float16,
    Double,
    Uint32,
    Uint64,
    Complex64,
    Complex128,
    Bfloat16,
}

impl DataType {
    /// Map an ONNX element type code. Unknown codes map to `Undefined`.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => DataType::Float,
            2 => DataType::Uint8,
            3 => DataType::Int8,
            4 => DataType::Uint16,
            5 => DataType::Int16,
            6 => DataType::Int32,
            7 => DataType::Int64,
            8 => DataType::String,
            9 => DataType::Bool,
            10 => DataType::Float16,
            11 => DataType::Double,
            12 => DataType::Uint32,
            13 => DataType::Uint64,
            14 => DataType::Complex64,
            15 => DataType::Complex128,
            16 => DataType::Bfloat16,
            _ => DataType::Undefined,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataType::Undefined => "UNDEFINED",
            DataType::Float => "FLOAT",
            DataType::Uint8 => "UINT8",
            DataType::Int8 => "INT8",
            DataType::Uint16 => "UINT16",
            DataType::Int16 => "INT16",
            DataType::Int32 => "INT32",
            DataType::Int64 => "INT64",
            DataType::String => "STRING",
            DataType::Bool => "BOOL",
            DataType::Float16 => "FLOAT16",
            DataType::Double => "DOUBLE",
            DataType::Uint32 => "UINT32",
            DataType::Uint64 => "UINT64",
            DataType::Complex64 => "COMPLEX64",
            DataType::Complex128 => "COMPLEX128",
            DataType::Bfloat16 => "BFLOAT16",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A dense tensor initializer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TensorDescription {
    pub name: String,
    pub data_type: Option<DataType>,
    pub dims: Vec<i64>,
    pub float_data: Vec<f32>,
    pub double_data: Vec<f64>,
    pub int32_data: Vec<i32>,
    pub int64_data: Vec<i64>,
    pub uint64_data: Vec<u64>,
    /// Little-endian packed payload, used when the typed field is empty.
    pub raw_data: Vec<u8>,
}

impl TensorDescription {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type: Some(data_type),
            ..Default::default()
        }
    }

    /// A float32 tensor with the given dims and values.
    pub fn float(name: impl Into<String>, dims: &[i64], values: Vec<f32>) -> Self {
        Self {
            dims: dims.to_vec(),
            float_data: values,
            ..Self::new(name, DataType::Float)
        }
    }

    /// A float64 tensor with the given dims and values.
    pub fn double(name: impl Into<String>, dims: &[i64], values: Vec<f64>) -> Self {
        Self {
            dims: dims.to_vec(),
            double_data: values,
            ..Self::new(name, DataType::Double)
        }
    }

    /// An int32-family tensor (`Int32`, `Int16`, `Uint16`, `Uint8`).
    pub fn int32(name: impl Into<String>, data_type: DataType, dims: &[i64], values: Vec<i32>) -> Self {
        Self {
            dims: dims.to_vec(),
            int32_data: values,
            ..Self::new(name, data_type)
        }
    }

    pub fn int64(name: impl Into<String>, dims: &[i64], values: Vec<i64>) -> Self {
        Self {
            dims: dims.to_vec(),
            int64_data: values,
            ..Self::new(name, DataType::Int64)
        }
    }

    /// An unsigned tensor (`Uint32` or `Uint64`).
    pub fn uint64(name: impl Into<String>, data_type: DataType, dims: &[i64], values: Vec<u64>) -> Self {
        Self {
            dims: dims.to_vec(),
            uint64_data: values,
            ..Self::new(name, data_type)
        }
    }

    /// A tensor whose payload is packed little-endian bytes.
    pub fn raw(name: impl Into<String>, data_type: DataType, dims: &[i64], bytes: Vec<u8>) -> Self {
        Self {
            dims: dims.to_vec(),
            raw_data: bytes,
            ..Self::new(name, data_type)
        }
    }

    pub fn data_type(&self) -> DataType {
        self.data_type.unwrap_or(DataType::Undefined)
    }
}

/// A sparse tensor initializer.
///
/// `values` carries the non-zero entries (and the node name); `indices`
/// carries the inner index array in its `int32_data`; `dims` is the dense
/// shape, stored verbatim as the outer index array.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SparseTensorDescription {
    pub values: TensorDescription,
    pub indices: TensorDescription,
    pub dims: Vec<i64>,
}

impl SparseTensorDescription {
    pub fn new(values: TensorDescription, inner_indices: Vec<i32>, dims: &[i64]) -> Self {
        let indices = TensorDescription {
            name: format!("{}_indices", values.name),
            data_type: Some(DataType::Int32),
            int32_data: inner_indices,
            ..Default::default()
        };
        Self {
            values,
            indices,
            dims: dims.to_vec(),
        }
    }

    /// The node identifier: the name of the values tensor.
    pub fn name(&self) -> &str {
        &self.values.name
    }
}
