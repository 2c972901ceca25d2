//! Tensor coercion: heterogeneous numeric payloads → `f64`.
//!
//! Integer and single-precision payloads are widened to double precision.
//! `Uint64` values above 2^53 lose precision in the widening; that loss is
//! accepted, not corrected.

use bytes::Buf;

use crate::model::{DataType, Shape, SparseInfo, SparseTensorDescription, TensorDescription};
use super::TransformError;

/// A coerced payload plus its unsigned shape.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Coerced {
    pub values: Vec<f64>,
    pub shape: Shape,
}

/// Coerce a dense tensor.
pub fn coerce(tensor: &TensorDescription) -> Result<Coerced, TransformError> {
    let coerced = coerce_unchecked(tensor)?;
    if !coerced.values.is_empty() {
        let expected = element_count(&tensor.name, &coerced.shape)?;
        if expected != coerced.values.len() {
            return Err(unsupported(
                &tensor.name,
                format!(
                    "payload has {} elements but shape {:?} holds {expected}",
                    coerced.values.len(),
                    coerced.shape.as_slice(),
                ),
            ));
        }
    }
    Ok(coerced)
}

/// Coerce a sparse tensor's values; index arrays are kept verbatim.
///
/// The shape is the shape of the values tensor. The non-zero count is the
/// inner index length.
pub fn coerce_sparse(
    tensor: &SparseTensorDescription,
) -> Result<(Coerced, SparseInfo), TransformError> {
    let coerced = coerce_unchecked(&tensor.values)?;
    let info = SparseInfo::new(tensor.indices.int32_data.clone(), tensor.dims.clone());
    Ok((coerced, info))
}

fn coerce_unchecked(tensor: &TensorDescription) -> Result<Coerced, TransformError> {
    let shape = coerce_shape(&tensor.name, &tensor.dims)?;
    let values = coerce_values(tensor)?;
    Ok(Coerced { values, shape })
}

/// Reinterpret dims as unsigned. Negative (symbolic) dims are rejected.
pub fn coerce_shape(name: &str, dims: &[i64]) -> Result<Shape, TransformError> {
    dims.iter()
        .map(|&d| {
            u64::try_from(d).map_err(|_| unsupported(name, format!("negative dimension {d} in {dims:?}")))
        })
        .collect()
}

fn coerce_values(tensor: &TensorDescription) -> Result<Vec<f64>, TransformError> {
    let dtype = tensor.data_type();
    let typed = match dtype {
        DataType::Double => tensor.double_data.clone(),
        DataType::Float => tensor.float_data.iter().map(|&f| f as f64).collect(),
        DataType::Int32 | DataType::Int16 | DataType::Uint16 | DataType::Uint8 => {
            tensor.int32_data.iter().map(|&i| i as f64).collect()
        }
        DataType::Uint32 | DataType::Uint64 => {
            tensor.uint64_data.iter().map(|&u| u as f64).collect()
        }
        DataType::Int64 => tensor.int64_data.iter().map(|&i| i as f64).collect(),
        other => {
            return Err(unsupported(&tensor.name, format!("element type {other} is not numeric-coercible")));
        }
    };
    if typed.is_empty() && !tensor.raw_data.is_empty() {
        return decode_raw(&tensor.name, dtype, &tensor.raw_data);
    }
    Ok(typed)
}

fn decode_raw(name: &str, dtype: DataType, bytes: &[u8]) -> Result<Vec<f64>, TransformError> {
    let (width, read): (usize, fn(&mut &[u8]) -> f64) = match dtype {
        DataType::Double => (8, |b| b.get_f64_le()),
        DataType::Float => (4, |b| b.get_f32_le() as f64),
        DataType::Uint8 => (1, |b| b.get_u8() as f64),
        DataType::Int16 => (2, |b| b.get_i16_le() as f64),
        DataType::Uint16 => (2, |b| b.get_u16_le() as f64),
        DataType::Int32 => (4, |b| b.get_i32_le() as f64),
        DataType::Uint32 => (4, |b| b.get_u32_le() as f64),
        DataType::Int64 => (8, |b| b.get_i64_le() as f64),
        DataType::Uint64 => (8, |b| b.get_u64_le() as f64),
        other => return Err(unsupported(name, format!("element type {other} is not numeric-coercible"))),
    };
    if bytes.len() % width != 0 {
        return Err(unsupported(
            name,
            format!("raw payload of {} bytes is not a multiple of {dtype} width {width}", bytes.len()),
        ));
    }
    let mut buf = bytes;
    let mut values = Vec::with_capacity(bytes.len() / width);
    while buf.has_remaining() {
        values.push(read(&mut buf));
    }
    Ok(values)
}

fn element_count(name: &str, shape: &Shape) -> Result<usize, TransformError> {
    shape
        .iter()
        .try_fold(1usize, |acc, &d| {
            usize::try_from(d).ok().and_then(|d| acc.checked_mul(d))
        })
        .ok_or_else(|| unsupported(name, format!("shape {:?} overflows", shape.as_slice())))
}

fn unsupported(name: &str, reason: String) -> TransformError {
    TransformError::UnsupportedType {
        tensor: name.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_float32_widens_exactly() {
        let t = TensorDescription::float("w", &[2, 2], vec![1.0, 2.0, 3.0, 4.0]);
        let c = coerce(&t).unwrap();
        assert_eq!(c.values, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(c.shape.as_slice(), &[2, 2]);
    }

    #[test]
    fn test_int32_round_trips() {
        let vals = vec![i32::MIN, -1, 0, 7, i32::MAX];
        let t = TensorDescription::int32("i", DataType::Int32, &[5], vals.clone());
        let c = coerce(&t).unwrap();
        let back: Vec<i32> = c.values.iter().map(|&v| v as i32).collect();
        assert_eq!(back, vals);
    }

    #[test]
    fn test_narrow_types_share_int32_field() {
        for dtype in [DataType::Int16, DataType::Uint16, DataType::Uint8] {
            let t = TensorDescription::int32("n", dtype, &[3], vec![0, 5, 255]);
            assert_eq!(coerce(&t).unwrap().values, vec![0.0, 5.0, 255.0]);
        }
    }

    #[test]
    fn test_int64_and_double() {
        let t = TensorDescription::int64("i", &[2], vec![-4, 1 << 40]);
        assert_eq!(coerce(&t).unwrap().values, vec![-4.0, (1u64 << 40) as f64]);
        let t = TensorDescription::double("d", &[1], vec![0.1]);
        assert_eq!(coerce(&t).unwrap().values, vec![0.1]);
    }

    #[test]
    fn test_uint64_beyond_2_pow_53_loses_precision() {
        let big = (1u64 << 53) + 1;
        let t = TensorDescription::uint64("u", DataType::Uint64, &[1], vec![big]);
        let c = coerce(&t).unwrap();
        // 2^53 + 1 is not representable; it rounds to 2^53.
        assert_eq!(c.values[0], (1u64 << 53) as f64);
        assert_ne!(c.values[0] as u64, big);
    }

    #[test]
    fn test_unsupported_element_types() {
        for dtype in [DataType::String, DataType::Bool, DataType::Float16, DataType::Int8, DataType::Undefined] {
            let t = TensorDescription::new("bad", dtype);
            let err = coerce(&t).unwrap_err();
            assert!(matches!(err, TransformError::UnsupportedType { ref tensor, .. } if tensor == "bad"));
        }
    }

    #[test]
    fn test_negative_dim_is_rejected() {
        let t = TensorDescription::float("w", &[-1, 4], vec![]);
        assert!(matches!(coerce(&t), Err(TransformError::UnsupportedType { .. })));
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let t = TensorDescription::float("w", &[3], vec![1.0, 2.0]);
        assert!(matches!(coerce(&t), Err(TransformError::UnsupportedType { .. })));
    }

    #[test]
    fn test_empty_payload_keeps_shape() {
        let t = TensorDescription::float("w", &[2, 3], vec![]);
        let c = coerce(&t).unwrap();
        assert!(c.values.is_empty());
        assert_eq!(c.shape.as_slice(), &[2, 3]);
    }

    #[test]
    fn test_raw_payload_decodes_little_endian() {
        let bytes: Vec<u8> = [1.5f32, -2.0].iter().flat_map(|f| f.to_le_bytes()).collect();
        let t = TensorDescription::raw("r", DataType::Float, &[2], bytes);
        assert_eq!(coerce(&t).unwrap().values, vec![1.5, -2.0]);

        let bytes: Vec<u8> = [-3i16, 9].iter().flat_map(|i| i.to_le_bytes()).collect();
        let t = TensorDescription::raw("r", DataType::Int16, &[2], bytes);
        assert_eq!(coerce(&t).unwrap().values, vec![-3.0, 9.0]);
    }

    #[test]
    fn test_raw_payload_wide_and_unsigned_types() {
        let bytes: Vec<u8> = [7u32, u32::MAX].iter().flat_map(|i| i.to_le_bytes()).collect();
        let t = TensorDescription::raw("r", DataType::Uint32, &[2], bytes);
        assert_eq!(coerce(&t).unwrap().values, vec![7.0, u32::MAX as f64]);

        let bytes: Vec<u8> = [-0.25f64, 1e10].iter().flat_map(|f| f.to_le_bytes()).collect();
        let t = TensorDescription::raw("r", DataType::Double, &[2], bytes);
        assert_eq!(coerce(&t).unwrap().values, vec![-0.25, 1e10]);

        let t = TensorDescription::raw("r", DataType::Uint8, &[3], vec![0, 128, 255]);
        assert_eq!(coerce(&t).unwrap().values, vec![0.0, 128.0, 255.0]);
    }

    #[test]
    fn test_raw_payload_of_non_numeric_type() {
        let t = TensorDescription::raw("r", DataType::String, &[1], vec![0; 8]);
        assert!(matches!(coerce(&t), Err(TransformError::UnsupportedType { .. })));
    }

    #[test]
    fn test_raw_payload_with_ragged_length() {
        let t = TensorDescription::raw("r", DataType::Int32, &[1], vec![0, 0, 0]);
        assert!(matches!(coerce(&t), Err(TransformError::UnsupportedType { .. })));
    }

    #[test]
    fn test_sparse_keeps_indices_verbatim() {
        let values = TensorDescription::double("s", &[3], vec![1.0, 2.0, 3.0]);
        let sparse = SparseTensorDescription::new(values, vec![0, 4, 8], &[3, 3]);
        let (c, info) = coerce_sparse(&sparse).unwrap();
        assert_eq!(c.values, vec![1.0, 2.0, 3.0]);
        assert_eq!(info.non_zero_count, 3);
        assert_eq!(info.inner_indices, vec![0, 4, 8]);
        assert_eq!(info.outer_indices, vec![3, 3]);
    }

    #[test]
    fn test_sparse_rejects_unsupported_values() {
        let values = TensorDescription::new("s", DataType::Complex64);
        let sparse = SparseTensorDescription::new(values, vec![0], &[1]);
        assert!(coerce_sparse(&sparse).is_err());
    }
}
