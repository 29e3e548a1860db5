//! Leaf values of nested observations and actions.
use crate::{
    array::{Array, DType, Element},
    error::{Result, SpaceError},
};
use ndarray::ArrayD;

/// A leaf of a nested structure.
///
/// Plain scalars are kept apart from zero-dimensional arrays, as environments
/// hand out both and [`coerce_dtype`](crate::coerce_dtype) treats them
/// differently.
#[derive(Clone, Debug, PartialEq)]
pub enum Leaf {
    /// A plain integer.
    Int(i64),

    /// A plain float.
    Float(f64),

    /// A non-numeric value.
    Text(String),

    /// An array.
    Array(Array),

    /// An array whose leading axis is already a batch axis.
    ///
    /// [`batch`](crate::batch) concatenates these instead of stacking them
    /// when called with [`BatchMode::Auto`](crate::BatchMode::Auto).
    Batched(Array),
}

impl Leaf {
    /// Marks an array as already carrying a batch dimension.
    pub fn batched(array: impl Into<Array>) -> Self {
        Leaf::Batched(array.into())
    }

    /// Returns `true` for [`Leaf::Batched`].
    pub fn is_batched(&self) -> bool {
        matches!(self, Leaf::Batched(_))
    }

    /// Returns `true` for plain scalars.
    pub fn is_scalar(&self) -> bool {
        matches!(self, Leaf::Int(_) | Leaf::Float(_))
    }

    /// Borrows the array of [`Leaf::Array`] or [`Leaf::Batched`].
    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Leaf::Array(a) | Leaf::Batched(a) => Some(a),
            _ => None,
        }
    }

    /// Returns the numeric content as an array.
    ///
    /// Plain scalars become zero-dimensional `I64` or `F64` arrays.
    pub fn to_array(&self) -> Result<Array> {
        match self {
            Leaf::Int(x) => Ok(Array::scalar(*x)),
            Leaf::Float(x) => Ok(Array::scalar(*x)),
            Leaf::Array(a) | Leaf::Batched(a) => Ok(a.clone()),
            Leaf::Text(s) => Err(SpaceError::IncompatibleLeafType(format!(
                "non-numeric leaf {:?} where a numeric value is expected",
                s
            ))),
        }
    }

    /// Returns the dtype of numeric leaves.
    pub fn dtype(&self) -> Option<DType> {
        match self {
            Leaf::Int(_) => Some(DType::I64),
            Leaf::Float(_) => Some(DType::F64),
            Leaf::Array(a) | Leaf::Batched(a) => Some(a.dtype()),
            Leaf::Text(_) => None,
        }
    }
}

impl From<i64> for Leaf {
    fn from(x: i64) -> Self {
        Leaf::Int(x)
    }
}

impl From<f64> for Leaf {
    fn from(x: f64) -> Self {
        Leaf::Float(x)
    }
}

impl From<Array> for Leaf {
    fn from(a: Array) -> Self {
        Leaf::Array(a)
    }
}

impl<T: Element> From<ArrayD<T>> for Leaf {
    fn from(a: ArrayD<T>) -> Self {
        Leaf::Array(T::wrap(a))
    }
}
