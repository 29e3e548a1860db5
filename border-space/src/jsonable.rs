//! JSON representation of samples of composite spaces.
//!
//! Samples are converted in batched layout: a [`Space::Box`] or
//! [`Space::MultiDiscrete`] leaf becomes a list with one nested list per sample,
//! a [`Space::Discrete`] leaf a list of integers, a [`Space::Dict`] an object of
//! per-key values and a [`Space::Tuple`] a list of per-position values.
use crate::{
    array::Array,
    error::{Result, SpaceError},
    leaf::Leaf,
    space::Space,
    tree::Tree,
};
use log::trace;
use ndarray::{ArrayD, IxDyn};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// A sample on either side of the JSON boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum Jsonable {
    /// A sample of a primitive space, passed through unchanged.
    Native(Tree<Leaf>),

    /// A sample of a composite space in batched JSON layout.
    Json(Value),
}

fn invalid(msg: impl Into<String>) -> SpaceError {
    SpaceError::InvalidJsonable(msg.into())
}

fn nested(shape: &[usize], data: &mut impl Iterator<Item = Value>) -> Value {
    match shape.split_first() {
        None => data.next().unwrap_or(Value::Null),
        Some((&n, rest)) => Value::Array((0..n).map(|_| nested(rest, data)).collect()),
    }
}

fn array_to_json(a: &Array) -> Value {
    let data: Vec<Value> = if a.dtype().is_float() {
        a.to_f64()
            .iter()
            .map(|&x| Number::from_f64(x).map_or(Value::Null, Value::Number))
            .collect()
    } else {
        a.to_i64().iter().map(|&x| Value::from(x)).collect()
    };
    nested(a.shape(), &mut data.into_iter())
}

fn collect_json(v: &Value, shape: &[usize], out: &mut Vec<f64>) -> Result<()> {
    match shape.split_first() {
        None => {
            out.push(
                v.as_f64()
                    .ok_or_else(|| invalid(format!("expected a number, found {}", v)))?,
            );
            Ok(())
        }
        Some((&n, rest)) => match v.as_array() {
            Some(items) if items.len() == n => {
                items.iter().try_for_each(|item| collect_json(item, rest, out))
            }
            _ => Err(invalid(format!("expected a list of length {}, found {}", n, v))),
        },
    }
}

fn json_to_array(v: &Value, space: &Space) -> Result<Array> {
    let (shape, dtype) = match (space.shape(), space.dtype()) {
        (Some(shape), Some(dtype)) => (shape, dtype),
        _ => return Err(invalid("composite space at a leaf position")),
    };
    let mut data = Vec::with_capacity(shape.iter().product());
    collect_json(v, shape, &mut data)?;
    let data = ArrayD::from_shape_vec(IxDyn(shape), data).map_err(|e| invalid(e.to_string()))?;
    Ok(Array::from_f64(data, dtype))
}

fn sample_list(v: &Value) -> Result<&Vec<Value>> {
    v.as_array()
        .ok_or_else(|| invalid(format!("expected a list of samples, found {}", v)))
}

impl Space {
    /// Converts samples of the space into a single JSON value in batched layout.
    ///
    /// Fails with [`SpaceError::StructureMismatch`] if a sample does not have the
    /// topology of the space.
    pub fn to_jsonable(&self, samples: &[&Tree<Leaf>]) -> Result<Value> {
        match self {
            Space::Dict(m) => {
                let mut out = Map::new();
                for (k, s) in m.iter() {
                    let children = samples
                        .iter()
                        .map(|t| {
                            t.get(k).ok_or_else(|| {
                                SpaceError::StructureMismatch(format!(
                                    "sample has no key {:?}",
                                    k
                                ))
                            })
                        })
                        .collect::<Result<Vec<_>>>()?;
                    out.insert(k.clone(), s.to_jsonable(&children)?);
                }
                Ok(Value::Object(out))
            }
            Space::Tuple(v) => v
                .iter()
                .enumerate()
                .map(|(i, s)| {
                    let children = samples
                        .iter()
                        .map(|t| match t {
                            Tree::Tuple(items) if items.len() == v.len() => Ok(&items[i]),
                            _ => Err(SpaceError::StructureMismatch(format!(
                                "sample is not a sequence of length {}",
                                v.len()
                            ))),
                        })
                        .collect::<Result<Vec<_>>>()?;
                    s.to_jsonable(&children)
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Space::Discrete(_) => samples
                .iter()
                .map(|t| match t.as_leaf() {
                    Some(leaf) => {
                        let a = leaf.to_array()?;
                        match a.to_i64().iter().next() {
                            Some(&x) if a.ndim() == 0 => Ok(Value::from(x)),
                            _ => Err(SpaceError::IncompatibleLeafType(format!(
                                "discrete sample of shape {:?}",
                                a.shape()
                            ))),
                        }
                    }
                    None => Err(SpaceError::StructureMismatch(
                        "discrete sample is not a leaf".to_string(),
                    )),
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            Space::Box(_) | Space::MultiDiscrete(_) => samples
                .iter()
                .map(|t| match t.as_leaf() {
                    Some(leaf) => Ok(array_to_json(&leaf.to_array()?)),
                    None => Err(SpaceError::StructureMismatch(
                        "array sample is not a leaf".to_string(),
                    )),
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
        }
    }

    /// Converts a JSON value in batched layout back into samples of the space.
    ///
    /// Fails with [`SpaceError::InvalidJsonable`] if the value does not follow
    /// the layout of the space.
    pub fn from_jsonable(&self, value: &Value) -> Result<Vec<Tree<Leaf>>> {
        match self {
            Space::Dict(m) => {
                let obj = value
                    .as_object()
                    .ok_or_else(|| invalid(format!("expected an object, found {}", value)))?;
                let mut columns = BTreeMap::new();
                let mut len = None;
                for (k, s) in m.iter() {
                    let v = obj
                        .get(k)
                        .ok_or_else(|| invalid(format!("missing key {:?}", k)))?;
                    let column = s.from_jsonable(v)?;
                    check_len(&mut len, column.len())?;
                    columns.insert(k.clone(), column.into_iter());
                }
                (0..len.unwrap_or(0))
                    .map(|_| {
                        columns
                            .iter_mut()
                            .map(|(k, it)| it.next().map(|t| (k.clone(), t)))
                            .collect::<Option<BTreeMap<_, _>>>()
                            .map(Tree::Dict)
                            .ok_or_else(|| invalid("ragged samples"))
                    })
                    .collect()
            }
            Space::Tuple(v) => {
                let items = sample_list(value)?;
                if items.len() != v.len() {
                    return Err(invalid(format!(
                        "expected a list of length {}, found {}",
                        v.len(),
                        value
                    )));
                }
                let mut columns = Vec::with_capacity(v.len());
                let mut len = None;
                for (s, item) in v.iter().zip(items.iter()) {
                    let column = s.from_jsonable(item)?;
                    check_len(&mut len, column.len())?;
                    columns.push(column.into_iter());
                }
                (0..len.unwrap_or(0))
                    .map(|_| {
                        columns
                            .iter_mut()
                            .map(Iterator::next)
                            .collect::<Option<Vec<_>>>()
                            .map(Tree::Tuple)
                            .ok_or_else(|| invalid("ragged samples"))
                    })
                    .collect()
            }
            Space::Discrete(_) => sample_list(value)?
                .iter()
                .map(|v| match v.as_i64() {
                    Some(x) => Ok(Tree::Leaf(Leaf::Array(Array::scalar(x)))),
                    None => Err(invalid(format!("expected an integer, found {}", v))),
                })
                .collect(),
            Space::Box(_) | Space::MultiDiscrete(_) => sample_list(value)?
                .iter()
                .map(|v| json_to_array(v, self).map(|a| Tree::Leaf(Leaf::Array(a))))
                .collect(),
        }
    }
}

fn check_len(len: &mut Option<usize>, n: usize) -> Result<()> {
    match *len {
        Some(l) if l != n => Err(invalid(format!(
            "subspaces hold {} and {} samples",
            l, n
        ))),
        _ => {
            *len = Some(n);
            Ok(())
        }
    }
}

/// Converts `sample` to JSON if `space` is composite.
///
/// Samples of primitive spaces are returned as [`Jsonable::Native`].
pub fn to_jsonable_if_needed(sample: &Tree<Leaf>, space: &Space) -> Result<Jsonable> {
    if space.is_composite() {
        trace!("Convert sample to JSON");
        Ok(Jsonable::Json(space.to_jsonable(&[sample])?))
    } else {
        Ok(Jsonable::Native(sample.clone()))
    }
}

/// Converts the output of [`to_jsonable_if_needed`] back into a sample.
///
/// A [`Jsonable::Json`] value must hold exactly one sample.
pub fn from_jsonable_if_needed(value: Jsonable, space: &Space) -> Result<Tree<Leaf>> {
    match value {
        Jsonable::Native(sample) => Ok(sample),
        Jsonable::Json(v) => {
            let mut samples = space.from_jsonable(&v)?;
            match samples.len() {
                1 => samples.pop().ok_or_else(|| invalid("no sample")),
                n => Err(invalid(format!("expected one sample, found {}", n))),
            }
        }
    }
}
