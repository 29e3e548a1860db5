//! Dynamically-shaped arrays tagged with their element type.
use crate::error::{Result, SpaceError};
use ndarray::{concatenate, stack, ArrayD, ArrayViewD, Axis, IxDyn};
use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Element type of an [`Array`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 8-bit unsigned integer.
    U8,
}

impl DType {
    /// Returns `true` for floating point types.
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }

    /// Returns `true` for integer types.
    pub fn is_integer(&self) -> bool {
        !self.is_float()
    }

    /// Returns the type two arrays of `self` and `other` are concatenated in.
    ///
    /// Identical types are kept, `U8` goes into `F32` without loss and any other
    /// mixture is widened to `F64` (with a float) or `I64` (integers only).
    pub fn promote(self, other: DType) -> DType {
        match (self, other) {
            (a, b) if a == b => a,
            (DType::F32, DType::U8) | (DType::U8, DType::F32) => DType::F32,
            (a, b) if a.is_float() || b.is_float() => DType::F64,
            _ => DType::I64,
        }
    }
}

/// Scalar types that can be held in an [`Array`].
pub trait Element:
    Copy
    + Debug
    + PartialEq
    + 'static
    + AsPrimitive<f32>
    + AsPrimitive<f64>
    + AsPrimitive<i32>
    + AsPrimitive<i64>
    + AsPrimitive<u8>
{
    /// The dtype tag of this scalar type.
    const DTYPE: DType;

    /// Borrows the data of `array` if it holds this scalar type.
    fn view(array: &Array) -> Option<ArrayViewD<'_, Self>>;

    /// Wraps typed data.
    fn wrap(data: ArrayD<Self>) -> Array;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            const DTYPE: DType = DType::$variant;

            fn view(array: &Array) -> Option<ArrayViewD<'_, Self>> {
                match array {
                    Array::$variant(a) => Some(a.view()),
                    _ => None,
                }
            }

            fn wrap(data: ArrayD<Self>) -> Array {
                Array::$variant(data)
            }
        }

        impl From<ArrayD<$ty>> for Array {
            fn from(data: ArrayD<$ty>) -> Self {
                Array::$variant(data)
            }
        }
    };
}

/// Runs `$body` with `$t` bound to the scalar type of `$dtype`.
macro_rules! with_dtype {
    ($dtype:expr, $t:ident => $body:expr) => {
        match $dtype {
            DType::F32 => {
                type $t = f32;
                $body
            }
            DType::F64 => {
                type $t = f64;
                $body
            }
            DType::I32 => {
                type $t = i32;
                $body
            }
            DType::I64 => {
                type $t = i64;
                $body
            }
            DType::U8 => {
                type $t = u8;
                $body
            }
        }
    };
}

/// Runs `$body` with `$a` bound to the typed data of `$array`.
macro_rules! dispatch {
    ($array:expr, $a:ident => $body:expr) => {
        match $array {
            Array::F32($a) => $body,
            Array::F64($a) => $body,
            Array::I32($a) => $body,
            Array::I64($a) => $body,
            Array::U8($a) => $body,
        }
    };
}

/// A dynamically-shaped array with a runtime dtype tag.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Array {
    /// `f32` data.
    F32(ArrayD<f32>),
    /// `f64` data.
    F64(ArrayD<f64>),
    /// `i32` data.
    I32(ArrayD<i32>),
    /// `i64` data.
    I64(ArrayD<i64>),
    /// `u8` data.
    U8(ArrayD<u8>),
}

impl_element!(f32, F32);
impl_element!(f64, F64);
impl_element!(i32, I32);
impl_element!(i64, I64);
impl_element!(u8, U8);

fn cast_typed<S: Element>(a: &ArrayD<S>, dtype: DType) -> Array {
    with_dtype!(dtype, T => T::wrap(a.mapv(|x| AsPrimitive::<T>::as_(x))))
}

fn views<'a, T: Element>(arrays: &'a [&'a Array]) -> Vec<ArrayViewD<'a, T>> {
    arrays.iter().filter_map(|a| T::view(a)).collect()
}

impl Array {
    /// Creates an array of `shape` filled with `value` cast to `dtype`.
    pub fn full(shape: &[usize], value: f64, dtype: DType) -> Self {
        with_dtype!(dtype, T => T::wrap(ArrayD::from_elem(
            IxDyn(shape),
            AsPrimitive::<T>::as_(value)
        )))
    }

    /// Creates a zero-dimensional array.
    pub fn scalar<T: Element>(value: T) -> Self {
        T::wrap(ArrayD::from_elem(IxDyn(&[]), value))
    }

    /// Creates an array from a flat vector in standard layout.
    pub fn from_shape_vec<T: Element>(shape: &[usize], data: Vec<T>) -> Result<Self> {
        let a = ArrayD::from_shape_vec(IxDyn(shape), data)
            .map_err(|e| SpaceError::LeafShapeMismatch(e.to_string()))?;
        Ok(T::wrap(a))
    }

    /// Returns the dtype tag.
    pub fn dtype(&self) -> DType {
        match self {
            Array::F32(_) => DType::F32,
            Array::F64(_) => DType::F64,
            Array::I32(_) => DType::I32,
            Array::I64(_) => DType::I64,
            Array::U8(_) => DType::U8,
        }
    }

    /// Returns the shape.
    pub fn shape(&self) -> &[usize] {
        dispatch!(self, a => a.shape())
    }

    /// Returns the number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Returns the number of elements.
    pub fn len(&self) -> usize {
        dispatch!(self, a => a.len())
    }

    /// Returns `true` if the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of the array with its elements cast to `dtype`.
    ///
    /// Floats are truncated toward zero when cast to an integer type.
    pub fn cast(&self, dtype: DType) -> Self {
        if self.dtype() == dtype {
            return self.clone();
        }
        dispatch!(self, a => cast_typed(a, dtype))
    }

    /// Returns the elements as `f64`.
    pub fn to_f64(&self) -> ArrayD<f64> {
        match self {
            Array::F64(a) => a.clone(),
            _ => dispatch!(self, a => a.mapv(|x| AsPrimitive::<f64>::as_(x))),
        }
    }

    /// Creates an array of `dtype` from `f64` elements.
    pub fn from_f64(data: ArrayD<f64>, dtype: DType) -> Self {
        Array::F64(data).cast(dtype)
    }

    /// Returns the elements as `i64`.
    pub fn to_i64(&self) -> ArrayD<i64> {
        match self {
            Array::I64(a) => a.clone(),
            _ => dispatch!(self, a => a.mapv(|x| AsPrimitive::<i64>::as_(x))),
        }
    }

    /// Returns the elements in standard (row-major) order.
    pub fn to_flat_vec<T: Element>(&self) -> Vec<T> {
        let a = self.cast(T::DTYPE);
        T::view(&a)
            .map(|v| v.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the sub-array at `ix` along the leading axis.
    pub fn index_axis0(&self, ix: usize) -> Result<Self> {
        match self.shape().first() {
            Some(&n) if ix < n => Ok(dispatch!(self, a => Element::wrap(
                a.index_axis(Axis(0), ix).to_owned()
            ))),
            _ => Err(SpaceError::LeafShapeMismatch(format!(
                "index {} out of range for leading axis of shape {:?}",
                ix,
                self.shape()
            ))),
        }
    }

    /// Returns a copy with the given shape, keeping standard element order.
    pub fn reshape(&self, shape: &[usize]) -> Result<Self> {
        let shape_err = |e: ndarray::ShapeError| SpaceError::LeafShapeMismatch(e.to_string());
        dispatch!(self, a => {
            let data = a.iter().cloned().collect::<Vec<_>>();
            ArrayD::from_shape_vec(IxDyn(shape), data)
                .map(Element::wrap)
                .map_err(shape_err)
        })
    }

    /// Stacks arrays of identical shape and dtype along a new leading axis.
    pub fn stack(arrays: &[&Array]) -> Result<Self> {
        let first = arrays.first().ok_or(SpaceError::EmptyBatch)?;
        for a in arrays.iter().skip(1) {
            if a.dtype() != first.dtype() || a.shape() != first.shape() {
                return Err(SpaceError::LeafShapeMismatch(format!(
                    "cannot stack {:?}{:?} with {:?}{:?}",
                    first.dtype(),
                    first.shape(),
                    a.dtype(),
                    a.shape()
                )));
            }
        }
        with_dtype!(first.dtype(), T => {
            stack(Axis(0), &views::<T>(arrays))
                .map(T::wrap)
                .map_err(|e| SpaceError::LeafShapeMismatch(e.to_string()))
        })
    }

    /// Concatenates arrays along their existing leading axis.
    ///
    /// Leading sizes may differ; dtypes and trailing dimensions must agree.
    pub fn concatenate(arrays: &[&Array]) -> Result<Self> {
        let first = arrays.first().ok_or(SpaceError::EmptyBatch)?;
        for a in arrays.iter() {
            if a.ndim() == 0 {
                return Err(SpaceError::LeafShapeMismatch(
                    "cannot concatenate zero-dimensional arrays".to_string(),
                ));
            }
            if a.dtype() != first.dtype() || a.shape()[1..] != first.shape()[1..] {
                return Err(SpaceError::LeafShapeMismatch(format!(
                    "cannot concatenate {:?}{:?} with {:?}{:?}",
                    first.dtype(),
                    first.shape(),
                    a.dtype(),
                    a.shape()
                )));
            }
        }
        with_dtype!(first.dtype(), T => {
            concatenate(Axis(0), &views::<T>(arrays))
                .map(T::wrap)
                .map_err(|e| SpaceError::LeafShapeMismatch(e.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Array, DType};
    use ndarray::{arr1, arr2};

    #[test]
    fn test_cast_truncates_floats() {
        let a = Array::from(arr1(&[1.7f32, -2.5, 3.0]).into_dyn());
        let b = a.cast(DType::I64);
        assert_eq!(b, Array::from(arr1(&[1i64, -2, 3]).into_dyn()));
        assert_eq!(b.cast(DType::F32).dtype(), DType::F32);
    }

    #[test]
    fn test_stack_adds_leading_axis() {
        let a = Array::from(arr1(&[1.0f32, 2.0]).into_dyn());
        let b = Array::from(arr1(&[3.0f32, 4.0]).into_dyn());
        let s = Array::stack(&[&a, &b]).unwrap();
        assert_eq!(s, Array::from(arr2(&[[1.0f32, 2.0], [3.0, 4.0]]).into_dyn()));
        assert_eq!(s.index_axis0(1).unwrap(), b);
    }

    #[test]
    fn test_stack_rejects_dtype_mismatch() {
        let a = Array::scalar(1i64);
        let b = Array::scalar(1.0f64);
        assert!(Array::stack(&[&a, &b]).is_err());
    }

    #[test]
    fn test_concatenate_variable_leading_axis() {
        let a = Array::from(arr2(&[[1i32, 2]]).into_dyn());
        let b = Array::from(arr2(&[[3i32, 4], [5, 6]]).into_dyn());
        let c = Array::concatenate(&[&a, &b]).unwrap();
        assert_eq!(c.shape(), &[3, 2]);
        assert_eq!(c.to_flat_vec::<i32>(), vec![1, 2, 3, 4, 5, 6]);

        let d = Array::from(arr2(&[[1i32, 2, 3]]).into_dyn());
        assert!(Array::concatenate(&[&a, &d]).is_err());
    }

    #[test]
    fn test_full_and_reshape() {
        let a = Array::full(&[2, 3], 1.5, DType::F64);
        assert_eq!(a.shape(), &[2, 3]);
        assert!(a.to_f64().iter().all(|&x| x == 1.5));
        let b = a.reshape(&[3, 2]).unwrap();
        assert_eq!(b.shape(), &[3, 2]);
        assert!(a.reshape(&[4]).is_err());

        let z = Array::full(&[], 7.0, DType::U8);
        assert_eq!(z.ndim(), 0);
        assert_eq!(z.to_flat_vec::<u8>(), vec![7]);
    }

    #[test]
    fn test_promote() {
        assert_eq!(DType::F32.promote(DType::F32), DType::F32);
        assert_eq!(DType::F32.promote(DType::U8), DType::F32);
        assert_eq!(DType::F32.promote(DType::I64), DType::F64);
        assert_eq!(DType::I32.promote(DType::U8), DType::I64);
    }
}
