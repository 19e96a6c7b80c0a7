use crate::domain::model::{Normalized, Scalar};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArrayError {
    #[error("shape {shape:?} holds {expected} elements but {actual} were supplied")]
    ShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("inhomogeneous shape at depth {depth}: {first:?} vs {other:?}")]
    Ragged {
        depth: usize,
        first: Vec<usize>,
        other: Vec<usize>,
    },

    #[error("a mapping has no array representation")]
    Mapping,

    #[error("shape {shape:?} has more elements than fit in memory")]
    TooLarge { shape: Vec<usize> },
}

/// Number of elements a shape holds, or `None` if the product overflows.
pub fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
}

/// Homogeneous, row-major element buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
    Str(Vec<String>),
    Bytes(Vec<Vec<u8>>),
}

impl ArrayData {
    pub fn len(&self) -> usize {
        match self {
            ArrayData::Bool(v) => v.len(),
            ArrayData::Int(v) => v.len(),
            ArrayData::Float(v) => v.len(),
            ArrayData::Str(v) => v.len(),
            ArrayData::Bytes(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ArrayData::Bool(_) => "bool",
            ArrayData::Int(_) => "int64",
            ArrayData::Float(_) => "float64",
            ArrayData::Str(_) => "str",
            ArrayData::Bytes(_) => "bytes",
        }
    }

    pub fn get(&self, index: usize) -> Option<Scalar> {
        match self {
            ArrayData::Bool(v) => v.get(index).copied().map(Scalar::Bool),
            ArrayData::Int(v) => v.get(index).copied().map(Scalar::Int),
            ArrayData::Float(v) => v.get(index).copied().map(Scalar::Float),
            ArrayData::Str(v) => v.get(index).cloned().map(Scalar::Str),
            ArrayData::Bytes(v) => v.get(index).cloned().map(Scalar::Bytes),
        }
    }
}

/// An n-dimensional array: the only thing the container stores.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    data: ArrayData,
}

// Promotion order for mixed leaves. A later variant absorbs every earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Kind {
    Bool,
    Int,
    Float,
    Bytes,
    Str,
}

fn kind_of(scalar: &Scalar) -> Kind {
    match scalar {
        Scalar::Bool(_) => Kind::Bool,
        Scalar::Int(_) => Kind::Int,
        Scalar::Float(_) => Kind::Float,
        Scalar::Bytes(_) => Kind::Bytes,
        Scalar::Str(_) => Kind::Str,
    }
}

impl NdArray {
    pub fn new(shape: Vec<usize>, data: ArrayData) -> Result<Self, ArrayError> {
        let Some(expected) = element_count(&shape) else {
            return Err(ArrayError::TooLarge { shape });
        };
        if expected != data.len() {
            return Err(ArrayError::ShapeMismatch {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// One-dimensional array over `data`.
    pub fn vector(data: ArrayData) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Builds the array a normalized value stands for.
    ///
    /// Arrays are returned as-is and scalars become a single-element array.
    /// Sequences are stacked into a rectangular array whose element type is
    /// the widest leaf type found (bool < int < float < bytes < str).
    pub fn from_normalized(value: &Normalized) -> Result<Self, ArrayError> {
        match value {
            Normalized::Array(array) => Ok(array.clone()),
            Normalized::Scalar(scalar) => Ok(Self::from_scalars(vec![1], vec![scalar.clone()])),
            Normalized::Mapping(_) => Err(ArrayError::Mapping),
            Normalized::Sequence(_) => {
                let shape = shape_of(value, 0)?;
                let mut leaves = Vec::new();
                flatten(value, &mut leaves);
                Ok(Self::from_scalars(shape, leaves))
            }
        }
    }

    fn from_scalars(shape: Vec<usize>, leaves: Vec<Scalar>) -> Self {
        // An empty array defaults to float64.
        let kind = leaves.iter().map(kind_of).max().unwrap_or(Kind::Float);

        let data = match kind {
            Kind::Bool => ArrayData::Bool(
                leaves
                    .iter()
                    .map(|s| matches!(s, Scalar::Bool(true)))
                    .collect(),
            ),
            Kind::Int => ArrayData::Int(
                leaves
                    .iter()
                    .map(|s| match s {
                        Scalar::Bool(b) => i64::from(*b),
                        Scalar::Int(v) => *v,
                        _ => 0,
                    })
                    .collect(),
            ),
            Kind::Float => ArrayData::Float(
                leaves
                    .iter()
                    .map(|s| match s {
                        Scalar::Bool(b) => f64::from(u8::from(*b)),
                        Scalar::Int(v) => *v as f64,
                        Scalar::Float(v) => *v,
                        _ => f64::NAN,
                    })
                    .collect(),
            ),
            Kind::Bytes => ArrayData::Bytes(
                leaves
                    .into_iter()
                    .map(|s| match s {
                        Scalar::Bytes(b) => b,
                        other => other.to_text().into_bytes(),
                    })
                    .collect(),
            ),
            Kind::Str => ArrayData::Str(leaves.iter().map(Scalar::to_text).collect()),
        };

        Self { shape, data }
    }
}

fn shape_of(value: &Normalized, depth: usize) -> Result<Vec<usize>, ArrayError> {
    match value {
        Normalized::Scalar(_) => Ok(Vec::new()),
        Normalized::Array(array) => Ok(array.shape().to_vec()),
        Normalized::Mapping(_) => Err(ArrayError::Mapping),
        Normalized::Sequence(items) => {
            let Some((head, rest)) = items.split_first() else {
                return Ok(vec![0]);
            };
            let first = shape_of(head, depth + 1)?;
            for item in rest {
                let other = shape_of(item, depth + 1)?;
                if other != first {
                    return Err(ArrayError::Ragged {
                        depth: depth + 1,
                        first,
                        other,
                    });
                }
            }
            let mut shape = Vec::with_capacity(first.len() + 1);
            shape.push(items.len());
            shape.extend(first);
            Ok(shape)
        }
    }
}

fn flatten(value: &Normalized, out: &mut Vec<Scalar>) {
    match value {
        Normalized::Scalar(scalar) => out.push(scalar.clone()),
        Normalized::Array(array) => {
            out.extend((0..array.len()).filter_map(|i| array.data().get(i)));
        }
        Normalized::Sequence(items) => {
            for item in items {
                flatten(item, out);
            }
        }
        // rejected by shape_of
        Normalized::Mapping(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(v: i64) -> Normalized {
        Normalized::Scalar(Scalar::Int(v))
    }

    fn seq(items: Vec<Normalized>) -> Normalized {
        Normalized::Sequence(items)
    }

    #[test]
    fn test_new_rejects_shape_mismatch() {
        let err = NdArray::new(vec![2, 2], ArrayData::Int(vec![1, 2, 3])).unwrap_err();
        assert_eq!(
            err,
            ArrayError::ShapeMismatch {
                shape: vec![2, 2],
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn test_new_rejects_overflowing_shape() {
        let shape = vec![usize::MAX, 2];
        assert_eq!(element_count(&shape), None);
        assert_eq!(
            NdArray::new(shape.clone(), ArrayData::Int(vec![])),
            Err(ArrayError::TooLarge { shape })
        );
        assert_eq!(element_count(&[]), Some(1));
        assert_eq!(element_count(&[3, 0, usize::MAX]), Some(0));
    }

    #[test]
    fn test_scalar_becomes_single_element_array() {
        let array =
            NdArray::from_normalized(&Normalized::Scalar(Scalar::Str("hello".into()))).unwrap();
        assert_eq!(array.shape(), &[1]);
        assert_eq!(array.data(), &ArrayData::Str(vec!["hello".to_string()]));
    }

    #[test]
    fn test_nested_sequences_build_matrix() {
        let value = seq(vec![seq(vec![int(1), int(2), int(3)]), seq(vec![int(4), int(5), int(6)])]);
        let array = NdArray::from_normalized(&value).unwrap();
        assert_eq!(array.shape(), &[2, 3]);
        assert_eq!(array.data(), &ArrayData::Int(vec![1, 2, 3, 4, 5, 6]));
    }

    #[test]
    fn test_ragged_sequence_is_rejected() {
        let value = seq(vec![seq(vec![int(1), int(2)]), seq(vec![int(3)])]);
        let err = NdArray::from_normalized(&value).unwrap_err();
        assert!(matches!(err, ArrayError::Ragged { depth: 1, .. }));
    }

    #[test]
    fn test_mapping_is_rejected() {
        let value = seq(vec![Normalized::Mapping(vec![("a".into(), int(1))])]);
        assert_eq!(NdArray::from_normalized(&value), Err(ArrayError::Mapping));
    }

    #[test]
    fn test_leaf_promotion() {
        let mixed_numeric = seq(vec![
            Normalized::Scalar(Scalar::Bool(true)),
            int(2),
            Normalized::Scalar(Scalar::Float(0.5)),
        ]);
        let array = NdArray::from_normalized(&mixed_numeric).unwrap();
        assert_eq!(array.data(), &ArrayData::Float(vec![1.0, 2.0, 0.5]));

        let with_text = seq(vec![int(1), Normalized::Scalar(Scalar::Str("x".into()))]);
        let array = NdArray::from_normalized(&with_text).unwrap();
        assert_eq!(
            array.data(),
            &ArrayData::Str(vec!["1".to_string(), "x".to_string()])
        );

        let with_bytes = seq(vec![int(7), Normalized::Scalar(Scalar::Bytes(b"ab".to_vec()))]);
        let array = NdArray::from_normalized(&with_bytes).unwrap();
        assert_eq!(
            array.data(),
            &ArrayData::Bytes(vec![b"7".to_vec(), b"ab".to_vec()])
        );
    }

    #[test]
    fn test_empty_sequence_is_float() {
        let array = NdArray::from_normalized(&seq(vec![])).unwrap();
        assert_eq!(array.shape(), &[0]);
        assert_eq!(array.data(), &ArrayData::Float(vec![]));
    }

    #[test]
    fn test_arrays_inside_sequence_are_stacked() {
        let row = NdArray::vector(ArrayData::Int(vec![1, 2]));
        let value = seq(vec![Normalized::Array(row.clone()), Normalized::Array(row)]);
        let array = NdArray::from_normalized(&value).unwrap();
        assert_eq!(array.shape(), &[2, 2]);
        assert_eq!(array.data(), &ArrayData::Int(vec![1, 2, 1, 2]));
    }
}
