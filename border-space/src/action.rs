//! Space-aware transforms of actions.
//!
//! Each transform walks an action in lock-step with the
//! [base struct](Space::base_struct) of its space and rewrites the leaves whose
//! subspace it applies to. Bounds are broadcast against the leaf following
//! numpy rules, so a leaf may carry extra leading (batch) axes.
use crate::{
    array::{Array, DType},
    error::{Result, SpaceError},
    leaf::Leaf,
    space::Space,
    tree::Tree,
};
use log::trace;
use ndarray::{ArrayD, IxDyn, Zip};

/// How a leaf is rebuilt after being transformed.
#[derive(Clone, Copy, Debug)]
enum Form {
    Int,
    Float,
    Array(DType),
    Batched(DType),
}

impl Form {
    fn of(leaf: &Leaf) -> Result<Self> {
        match leaf {
            Leaf::Int(_) => Ok(Form::Int),
            Leaf::Float(_) => Ok(Form::Float),
            Leaf::Array(a) => Ok(Form::Array(a.dtype())),
            Leaf::Batched(a) => Ok(Form::Batched(a.dtype())),
            Leaf::Text(_) => Err(SpaceError::IncompatibleLeafType(format!(
                "cannot transform non-numeric leaf {:?}",
                leaf
            ))),
        }
    }

    fn dtype(self) -> DType {
        match self {
            Form::Int => DType::I64,
            Form::Float => DType::F64,
            Form::Array(d) | Form::Batched(d) => d,
        }
    }

    fn float_dtype_or(self, dtype: DType) -> DType {
        match self.dtype() {
            d if d.is_float() => d,
            _ => dtype,
        }
    }

    fn rebuild(self, values: Array, dtype: DType) -> Leaf {
        match self {
            Form::Int | Form::Float if values.ndim() == 0 => {
                if dtype.is_float() {
                    Leaf::Float(values.to_f64().iter().next().cloned().unwrap_or_default())
                } else {
                    Leaf::Int(values.to_i64().iter().next().cloned().unwrap_or_default())
                }
            }
            Form::Batched(_) => Leaf::Batched(values.cast(dtype)),
            _ => Leaf::Array(values.cast(dtype)),
        }
    }
}

fn numeric(leaf: &Leaf) -> Result<(ArrayD<f64>, Form)> {
    let form = Form::of(leaf)?;
    Ok((leaf.to_array()?.to_f64(), form))
}

fn broadcast_shape(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
    let n = a.len().max(b.len());
    let dim = |s: &[usize], i: usize| {
        if i + s.len() >= n {
            s[i + s.len() - n]
        } else {
            1
        }
    };
    (0..n)
        .map(|i| match (dim(a, i), dim(b, i)) {
            (x, y) if x == y || y == 1 => Some(x),
            (1, y) => Some(y),
            _ => None,
        })
        .collect()
}

/// Applies `f(x, low, high)` elementwise with `low`/`high` broadcast to `x`.
fn elementwise<A, F>(x: &ArrayD<A>, low: &ArrayD<A>, high: &ArrayD<A>, f: F) -> Result<ArrayD<A>>
where
    A: Copy,
    F: Fn(A, A, A) -> A,
{
    let mismatch = || {
        SpaceError::LeafShapeMismatch(format!(
            "leaf of shape {:?} does not broadcast with bounds of shape {:?}",
            x.shape(),
            low.shape()
        ))
    };
    let shape = broadcast_shape(x.shape(), low.shape())
        .and_then(|s| broadcast_shape(&s, high.shape()))
        .ok_or_else(mismatch)?;
    let shape = IxDyn(&shape);
    let x = x.broadcast(shape.clone()).ok_or_else(mismatch)?;
    let low = low.broadcast(shape.clone()).ok_or_else(mismatch)?;
    let high = high.broadcast(shape).ok_or_else(mismatch)?;
    Ok(Zip::from(&x)
        .and(&low)
        .and(&high)
        .map_collect(|&x, &l, &h| f(x, l, h)))
}

/// Shifts a zero-based index leaf into the index range starting at `start`.
///
/// Integer leaves are shifted in `i64`, float leaves in `f64`.
fn shift(leaf: &Leaf, start: &ArrayD<i64>) -> Result<Leaf> {
    let form = Form::of(leaf)?;
    let a = leaf.to_array()?;
    let y = if a.dtype().is_integer() {
        let y = elementwise(&a.to_i64(), start, start, |x: i64, s: i64, _: i64| {
            x.saturating_add(s)
        })?;
        Array::I64(y)
    } else {
        let start = start.mapv(|s| s as f64);
        Array::F64(elementwise(&a.to_f64(), &start, &start, |x: f64, s: f64, _: f64| x + s)?)
    };
    Ok(form.rebuild(y, form.dtype()))
}

/// Clips the continuous components of `action` to the bounds of `space`.
///
/// Leaves of [`Space::Box`] subspaces are clamped elementwise to `[low, high]`
/// and keep their dtype. Other leaves are returned unchanged.
pub fn clip(action: &Tree<Leaf>, space: &Space) -> Result<Tree<Leaf>> {
    trace!("Clip action with {} leaves", action.num_leaves());
    action.zip_with(&space.base_struct(), |a, s| match s {
        Space::Box(b) => {
            let (x, form) = numeric(a)?;
            let y = elementwise(&x, &b.low, &b.high, |x: f64, l: f64, h: f64| x.max(l).min(h))?;
            Ok(form.rebuild(Array::F64(y), form.dtype()))
        }
        _ => Ok(a.clone()),
    })
}

/// Maps the components of `action` from the canonical `[-1, 1]` range into
/// `space`. Inverse of [`normalize`].
///
/// * Float [`Space::Box`] subspaces bounded on both sides: `low + (a + 1) * (high - low) / 2`,
///   clamped to `[low, high]` for values outside `[-1, 1]`.
/// * Integer [`Space::Box`] subspaces bounded on both sides: `low + a`.
/// * [`Space::Discrete`] and [`Space::MultiDiscrete`] subspaces: `start + a`,
///   moving a zero-based index into the index range of the space.
///
/// Leaves of partially bounded or unbounded boxes are returned unchanged.
pub fn unsquash(action: &Tree<Leaf>, space: &Space) -> Result<Tree<Leaf>> {
    trace!("Unsquash action with {} leaves", action.num_leaves());
    action.zip_with(&space.base_struct(), |a, s| match s {
        Space::Box(b) if b.is_bounded() && b.dtype.is_float() => {
            let (x, form) = numeric(a)?;
            let y = elementwise(&x, &b.low, &b.high, |x: f64, l: f64, h: f64| {
                (l + (x + 1.0) * (h - l) / 2.0).max(l).min(h)
            })?;
            Ok(form.rebuild(Array::F64(y), form.float_dtype_or(b.dtype)))
        }
        Space::Box(b) if b.is_bounded() => shift(a, &b.low.mapv(|l| l as i64)),
        Space::Discrete(d) => shift(a, &ArrayD::from_elem(IxDyn(&[]), d.start)),
        Space::MultiDiscrete(m) => shift(a, &m.start),
        _ => Ok(a.clone()),
    })
}

/// Maps the components of `action` from the bounds of `space` into `[-1, 1]`.
/// Inverse of [`unsquash`].
///
/// Only leaves of float [`Space::Box`] subspaces bounded on both sides are
/// transformed, with `(a - low) * 2 / (high - low) - 1`. Values are not clamped.
pub fn normalize(action: &Tree<Leaf>, space: &Space) -> Result<Tree<Leaf>> {
    trace!("Normalize action with {} leaves", action.num_leaves());
    action.zip_with(&space.base_struct(), |a, s| match s {
        Space::Box(b) if b.is_bounded() && b.dtype.is_float() => {
            let (x, form) = numeric(a)?;
            let y = elementwise(&x, &b.low, &b.high, |x: f64, l: f64, h: f64| {
                (x - l) * 2.0 / (h - l) - 1.0
            })?;
            Ok(form.rebuild(Array::F64(y), form.float_dtype_or(b.dtype)))
        }
        _ => Ok(a.clone()),
    })
}

/// Converts the leaves of `element` to the dtypes of a sample of its space.
///
/// `sampled` is a concrete sample (for instance from [`Space::sample`]), not the
/// space itself. Per co-located leaf:
///
/// * Array reference, array element: cast to the reference dtype.
/// * Zero-dimensional array reference, scalar element: wrapped into a
///   zero-dimensional array of the reference dtype.
/// * Integer scalar reference, float scalar element holding an exact integer:
///   converted to an integer.
///
/// Fails with [`SpaceError::IncompatibleLeafType`] if a non-array element meets
/// an array reference and is not a scalar that can be wrapped.
pub fn coerce_dtype(element: &Tree<Leaf>, sampled: &Tree<Leaf>) -> Result<Tree<Leaf>> {
    element.zip_with(sampled, |elem, s| match (elem, s) {
        (Leaf::Array(x), Leaf::Array(r)) | (Leaf::Array(x), Leaf::Batched(r)) => {
            Ok(Leaf::Array(x.cast(r.dtype())))
        }
        (Leaf::Batched(x), Leaf::Array(r)) | (Leaf::Batched(x), Leaf::Batched(r)) => {
            Ok(Leaf::Batched(x.cast(r.dtype())))
        }
        (Leaf::Int(_), Leaf::Array(r)) | (Leaf::Float(_), Leaf::Array(r)) if r.ndim() == 0 => {
            Ok(Leaf::Array(elem.to_array()?.cast(r.dtype())))
        }
        (_, Leaf::Array(r)) | (_, Leaf::Batched(r)) => Err(SpaceError::IncompatibleLeafType(
            format!(
                "leaf {:?} should be an array of shape {:?}",
                elem,
                r.shape()
            ),
        )),
        // Only floats holding an exact integer are converted, other floats
        // pass through as floats. Callers rely on this looseness.
        (Leaf::Float(x), Leaf::Int(_)) if x.fract() == 0.0 => Ok(Leaf::Int(*x as i64)),
        _ => Ok(elem.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::{BoxSpace, DiscreteSpace, MultiDiscreteSpace};
    use ndarray::{arr1, arr2};

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn leaf(a: impl Into<Leaf>) -> Tree<Leaf> {
        Tree::Leaf(a.into())
    }

    fn values(t: &Tree<Leaf>) -> Vec<f64> {
        t.as_leaf()
            .and_then(|l| l.to_array().ok())
            .map(|a| a.to_flat_vec::<f64>())
            .unwrap_or_default()
    }

    fn box_space() -> Space {
        BoxSpace::new(
            arr1(&[-2.0, 0.0]).into_dyn(),
            arr1(&[2.0, 10.0]).into_dyn(),
            DType::F32,
        )
        .unwrap()
        .into()
    }

    fn assert_close(x: &[f64], y: &[f64]) {
        assert_eq!(x.len(), y.len());
        for (a, b) in x.iter().zip(y.iter()) {
            assert!((a - b).abs() < 1e-5, "{:?} != {:?}", x, y);
        }
    }

    #[test]
    fn test_clip() {
        init();
        let space = Space::dict(vec![
            ("c", box_space()),
            ("d", Space::from(DiscreteSpace::new(3))),
        ]);
        let action = Tree::dict(vec![
            ("c", leaf(arr1(&[-5.0f32, 20.0]).into_dyn())),
            ("d", leaf(7i64)),
        ]);
        let clipped = clip(&action, &space).unwrap();
        assert_eq!(
            clipped.get("c"),
            Some(&leaf(arr1(&[-2.0f32, 10.0]).into_dyn()))
        );
        assert_eq!(clipped.get("d"), Some(&leaf(7i64)));
    }

    #[test]
    fn test_clip_batched_leaf() {
        let action = leaf(arr2(&[[-5.0f64, 5.0], [1.0, 11.0]]).into_dyn());
        let clipped = clip(&action, &box_space()).unwrap();
        assert_eq!(values(&clipped), vec![-2.0, 5.0, 1.0, 10.0]);

        let bad = leaf(arr1(&[1.0f32, 2.0, 3.0]).into_dyn());
        assert!(matches!(
            clip(&bad, &box_space()),
            Err(SpaceError::LeafShapeMismatch(_))
        ));
    }

    #[test]
    fn test_unsquash_and_normalize() {
        init();
        let space = box_space();
        let a = leaf(arr1(&[-0.5f32, 0.25]).into_dyn());
        let unsquashed = unsquash(&a, &space).unwrap();
        assert_close(&values(&unsquashed), &[-1.0, 6.25]);
        let normalized = normalize(&unsquashed, &space).unwrap();
        assert_close(&values(&normalized), &values(&a));
        assert_eq!(
            normalized.as_leaf().and_then(Leaf::dtype),
            Some(DType::F32)
        );

        // Out of range values are clamped into the bounds.
        let a = leaf(arr1(&[-3.0f32, 3.0]).into_dyn());
        assert_close(&values(&unsquash(&a, &space).unwrap()), &[-2.0, 10.0]);
    }

    #[test]
    fn test_unsquash_discrete_shift() {
        let space = Space::tuple(vec![
            Space::from(DiscreteSpace::new(3).start(5)),
            Space::from(
                MultiDiscreteSpace::new(arr1(&[2i64, 2]).into_dyn())
                    .start(arr1(&[-1i64, 10]).into_dyn())
                    .unwrap(),
            ),
            Space::from(BoxSpace::uniform(1.0, 4.0, &[], DType::I64)),
        ]);
        let action = Tree::tuple(vec![
            leaf(1i64),
            leaf(arr1(&[1i64, 0]).into_dyn()),
            leaf(2i64),
        ]);
        let out = unsquash(&action, &space).unwrap();
        assert_eq!(
            out,
            Tree::tuple(vec![
                leaf(6i64),
                leaf(arr1(&[0i64, 10]).into_dyn()),
                leaf(3i64),
            ])
        );
    }

    #[test]
    fn test_unsquash_of_normalized_out_of_range_is_clamped() {
        let space = Space::from(BoxSpace::uniform(-2.0, 2.0, &[2], DType::F32));
        let a = leaf(arr1(&[-5.0f32, 5.0]).into_dyn());
        let normalized = normalize(&a, &space).unwrap();
        assert_close(&values(&normalized), &[-2.5, 2.5]);
        let unsquashed = unsquash(&normalized, &space).unwrap();
        assert_close(&values(&unsquashed), &[-2.0, 2.0]);
        assert!(space.contains(&unsquashed));
    }

    #[test]
    fn test_unsquash_large_indices_are_exact() {
        let start = 1i64 << 60;
        let space = Space::tuple(vec![
            Space::from(DiscreteSpace::new(3).start(start)),
            Space::from(
                MultiDiscreteSpace::new(arr1(&[4i64, 4]).into_dyn())
                    .start(arr1(&[start, -start]).into_dyn())
                    .unwrap(),
            ),
        ]);
        let action = Tree::tuple(vec![leaf(1i64), leaf(arr1(&[3i64, 1]).into_dyn())]);
        let out = unsquash(&action, &space).unwrap();
        assert_eq!(
            out,
            Tree::tuple(vec![
                leaf(start + 1),
                leaf(arr1(&[start + 3, 1 - start]).into_dyn()),
            ])
        );

        // Float indices are shifted as floats and keep their dtype.
        let space = Space::from(DiscreteSpace::new(3).start(2));
        let out = unsquash(&leaf(1.0f64), &space).unwrap();
        assert_eq!(out, leaf(3.0f64));
    }

    #[test]
    fn test_unbounded_box_passes_through() {
        let space = Space::from(BoxSpace::uniform(
            f64::NEG_INFINITY,
            f64::INFINITY,
            &[2],
            DType::F32,
        ));
        let a = leaf(arr1(&[100.0f32, -100.0]).into_dyn());
        assert_eq!(unsquash(&a, &space).unwrap(), a);
        assert_eq!(normalize(&a, &space).unwrap(), a);
        assert_eq!(clip(&a, &space).unwrap(), a);
    }

    #[test]
    fn test_transform_structure_mismatch() {
        let space = Space::tuple(vec![box_space()]);
        let a = leaf(arr1(&[0.0f32, 0.0]).into_dyn());
        assert!(matches!(
            clip(&a, &space),
            Err(SpaceError::StructureMismatch(_))
        ));
    }

    #[test]
    fn test_coerce_dtype() {
        let sampled = Tree::dict(vec![
            ("a", leaf(arr1(&[0.0f32, 0.0]).into_dyn())),
            ("b", leaf(ndarray::arr0(0i64).into_dyn())),
            ("c", leaf(0i64)),
            ("d", leaf(0i64)),
        ]);
        let element = Tree::dict(vec![
            ("a", leaf(arr1(&[1.0f64, 2.0]).into_dyn())),
            ("b", leaf(3i64)),
            ("c", leaf(4.0f64)),
            ("d", leaf(4.5f64)),
        ]);
        let out = coerce_dtype(&element, &sampled).unwrap();
        assert_eq!(
            out,
            Tree::dict(vec![
                ("a", leaf(arr1(&[1.0f32, 2.0]).into_dyn())),
                ("b", leaf(ndarray::arr0(3i64).into_dyn())),
                ("c", leaf(4i64)),
                ("d", leaf(4.5f64)),
            ])
        );
    }

    #[test]
    fn test_coerce_dtype_incompatible_leaf() {
        let sampled = leaf(arr1(&[0.0f32, 0.0]).into_dyn());
        assert!(matches!(
            coerce_dtype(&leaf(1.0f64), &sampled),
            Err(SpaceError::IncompatibleLeafType(_))
        ));
        assert!(matches!(
            coerce_dtype(&leaf(Leaf::Text("up".to_string())), &sampled),
            Err(SpaceError::IncompatibleLeafType(_))
        ));
    }
}
