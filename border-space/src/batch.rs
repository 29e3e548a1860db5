//! Conversion between lists of nested structures and nested batches.
//!
//! [`batch`] turns
//!
//! ```text
//! [
//!     {"a": 1, "b": (4, 7.0)},  <- item 1
//!     {"a": 2, "b": (5, 8.0)},  <- item 2
//!     {"a": 3, "b": (6, 9.0)},  <- item 3
//! ]
//! ```
//!
//! into `{"a": [1, 2, 3], "b": ([4, 5, 6], [7.0, 8.0, 9.0])}` and [`unbatch`]
//! goes the other way.
use crate::{
    array::{Array, DType},
    error::{Result, SpaceError},
    leaf::Leaf,
    tree::Tree,
};
use log::trace;
use serde::{Deserialize, Serialize};

/// How co-located leaves are combined by [`batch`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchMode {
    /// Items have no batch dimension; a new leading axis is added.
    Stack,

    /// Items already have a batch dimension; leaves are joined along it.
    Concat,

    /// [`BatchMode::Concat`] if the first leaf of the first item is
    /// [`Leaf::Batched`], [`BatchMode::Stack`] otherwise.
    Auto,
}

impl Default for BatchMode {
    fn default() -> Self {
        BatchMode::Stack
    }
}

impl BatchMode {
    /// Resolves [`BatchMode::Auto`] against the first item of a batch.
    pub fn resolve(self, first: &Tree<Leaf>) -> BatchMode {
        match self {
            BatchMode::Auto => match first.flatten().first() {
                Some(leaf) if leaf.is_batched() => BatchMode::Concat,
                _ => BatchMode::Stack,
            },
            mode => mode,
        }
    }
}

/// Converts a list of nested structures into a nested structure of batches.
///
/// Every leaf of the output holds the co-located leaves of all items, either
/// stacked along a new leading axis ([`BatchMode::Stack`]) or concatenated
/// along their existing one ([`BatchMode::Concat`]). Plain scalar leaves are
/// treated as zero-dimensional arrays. Output arrays are in standard layout.
///
/// Fails with [`SpaceError::EmptyBatch`] for an empty list,
/// [`SpaceError::StructureMismatch`] if the items differ in topology and
/// [`SpaceError::LeafShapeMismatch`] if co-located leaves cannot be combined.
pub fn batch(items: &[Tree<Leaf>], mode: BatchMode) -> Result<Tree<Leaf>> {
    let first = items.first().ok_or(SpaceError::EmptyBatch)?;
    let mode = mode.resolve(first);
    trace!("Batch {} items with {:?}", items.len(), mode);

    let items = items.iter().collect::<Vec<_>>();
    Tree::zip_all(&items, |leaves| {
        let arrays = leaves
            .iter()
            .map(|leaf| leaf.to_array())
            .collect::<Result<Vec<_>>>()?;
        let arrays = arrays.iter().collect::<Vec<_>>();
        let batch = match mode {
            BatchMode::Concat => Array::concatenate(&arrays)?,
            _ => Array::stack(&arrays)?,
        };
        Ok(Leaf::Array(batch))
    })
}

/// Converts a nested structure of batches into a list of nested structures.
///
/// Item `i` takes the slice at `i` along the leading axis of every leaf.
/// A structure without leaves gives an empty list.
///
/// Fails with [`SpaceError::InconsistentBatchSize`] if leaves disagree on the
/// size of the leading axis and with [`SpaceError::IncompatibleLeafType`] if a
/// leaf has no leading axis.
pub fn unbatch(batches: &Tree<Leaf>) -> Result<Vec<Tree<Leaf>>> {
    let arrays = batches.try_map(|leaf| {
        let array = leaf.to_array()?;
        if array.ndim() == 0 {
            return Err(SpaceError::IncompatibleLeafType(format!(
                "leaf {:?} has no batch dimension",
                leaf
            )));
        }
        Ok(array)
    })?;

    let flat = arrays.flatten();
    let batch_size = match flat.first() {
        Some(a) => a.shape()[0],
        None => return Ok(vec![]),
    };
    for a in flat.iter() {
        if a.shape()[0] != batch_size {
            return Err(SpaceError::InconsistentBatchSize {
                expected: batch_size,
                actual: a.shape()[0],
            });
        }
    }
    trace!("Unbatch {} items from {} leaves", batch_size, flat.len());

    (0..batch_size)
        .map(|ix| arrays.try_map(|a| a.index_axis0(ix).map(Leaf::Array)))
        .collect()
}

/// Returns a single array holding all elements of a nested structure.
///
/// A structure that is a single leaf is returned as its array. Otherwise every
/// leaf is flattened to one dimension and the leaves are concatenated in
/// canonical order, promoting mixed dtypes with [`DType::promote`].
pub fn flatten_to_single_array(structure: &Tree<Leaf>) -> Result<Array> {
    if let Tree::Leaf(leaf) = structure {
        return leaf.to_array();
    }
    let arrays = structure
        .flatten()
        .into_iter()
        .map(|leaf| leaf.to_array().and_then(|a| a.reshape(&[a.len()])))
        .collect::<Result<Vec<_>>>()?;
    let dtype = arrays
        .iter()
        .map(Array::dtype)
        .fold(None, |acc: Option<DType>, d| match acc {
            None => Some(d),
            Some(acc) => Some(acc.promote(d)),
        })
        .unwrap_or(DType::F64);
    let arrays = arrays.iter().map(|a| a.cast(dtype)).collect::<Vec<_>>();
    if arrays.is_empty() {
        return Ok(Array::full(&[0], 0.0, dtype));
    }
    Array::concatenate(&arrays.iter().collect::<Vec<_>>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, ArrayD};

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn item(a: i64, b0: i64, b1: f64) -> Tree<Leaf> {
        Tree::dict(vec![
            ("a", Tree::Leaf(Leaf::Int(a))),
            (
                "b",
                Tree::tuple(vec![Tree::Leaf(Leaf::Int(b0)), Tree::Leaf(Leaf::Float(b1))]),
            ),
        ])
    }

    fn leaf(a: impl Into<Leaf>) -> Tree<Leaf> {
        Tree::Leaf(a.into())
    }

    #[test]
    fn test_batch_stack_scalars() {
        init();
        let items = vec![item(1, 4, 7.0), item(2, 5, 8.0), item(3, 6, 9.0)];
        let batched = batch(&items, BatchMode::Stack).unwrap();
        let expected = Tree::dict(vec![
            ("a", leaf(arr1(&[1i64, 2, 3]).into_dyn())),
            (
                "b",
                Tree::tuple(vec![
                    leaf(arr1(&[4i64, 5, 6]).into_dyn()),
                    leaf(arr1(&[7.0f64, 8.0, 9.0]).into_dyn()),
                ]),
            ),
        ]);
        assert_eq!(batched, expected);

        let items_ = unbatch(&batched).unwrap();
        assert_eq!(items_.len(), 3);
        for (x, y) in items.iter().zip(items_.iter()) {
            let x = x.try_map(|l| l.to_array()).unwrap();
            let y = y.try_map(|l| l.to_array()).unwrap();
            assert_eq!(x, y);
        }
    }

    #[test]
    fn test_batch_concat_marked_items() {
        init();
        let items = vec![
            leaf(Leaf::batched(arr2(&[[1.0f32, 2.0]]).into_dyn())),
            leaf(Leaf::batched(arr2(&[[3.0f32, 4.0], [5.0, 6.0]]).into_dyn())),
        ];
        let batched = batch(&items, BatchMode::Auto).unwrap();
        assert_eq!(
            batched,
            leaf(arr2(&[[1.0f32, 2.0], [3.0, 4.0], [5.0, 6.0]]).into_dyn())
        );

        // Unmarked items resolve to stacking.
        let items = vec![
            leaf(arr1(&[1.0f32, 2.0]).into_dyn()),
            leaf(arr1(&[3.0f32, 4.0]).into_dyn()),
        ];
        assert_eq!(BatchMode::Auto.resolve(&items[0]), BatchMode::Stack);
        let batched = batch(&items, BatchMode::Auto).unwrap();
        assert_eq!(batched.as_leaf().and_then(Leaf::as_array).map(|a| a.shape().to_vec()), Some(vec![2, 2]));
    }

    #[test]
    fn test_batch_errors() {
        init();
        assert_eq!(batch(&[], BatchMode::Stack), Err(SpaceError::EmptyBatch));

        let items = vec![
            leaf(arr1(&[1.0f32, 2.0]).into_dyn()),
            leaf(arr1(&[3.0f32]).into_dyn()),
        ];
        assert!(matches!(
            batch(&items, BatchMode::Stack),
            Err(SpaceError::LeafShapeMismatch(_))
        ));

        let items = vec![item(1, 2, 3.0), Tree::dict(vec![("a", leaf(1i64))])];
        assert!(matches!(
            batch(&items, BatchMode::Stack),
            Err(SpaceError::StructureMismatch(_))
        ));

        let items = vec![leaf(Leaf::Text("x".to_string()))];
        assert!(matches!(
            batch(&items, BatchMode::Stack),
            Err(SpaceError::IncompatibleLeafType(_))
        ));
    }

    #[test]
    fn test_unbatch_errors() {
        init();
        let batches = Tree::tuple(vec![
            leaf(arr1(&[1i64, 2, 3]).into_dyn()),
            leaf(arr1(&[1i64, 2]).into_dyn()),
        ]);
        assert_eq!(
            unbatch(&batches),
            Err(SpaceError::InconsistentBatchSize {
                expected: 3,
                actual: 2
            })
        );

        assert!(matches!(
            unbatch(&leaf(1.0f64)),
            Err(SpaceError::IncompatibleLeafType(_))
        ));

        let empty: Tree<Leaf> = Tree::tuple(vec![]);
        assert_eq!(unbatch(&empty), Ok(vec![]));
    }

    #[test]
    fn test_flatten_to_single_array() {
        let structure = Tree::tuple(vec![
            leaf(arr2(&[[1.0f32, 2.0], [3.0, 4.0], [5.0, 6.0]]).into_dyn()),
            leaf(arr1(&[7i64, 8, 9]).into_dyn()),
        ]);
        let flat = flatten_to_single_array(&structure).unwrap();
        assert_eq!(flat.dtype(), DType::F64);
        assert_eq!(
            flat.to_flat_vec::<f64>(),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]
        );

        let single = leaf(arr2(&[[1u8, 2]]).into_dyn());
        let a: ArrayD<u8> = arr2(&[[1u8, 2]]).into_dyn();
        assert_eq!(flatten_to_single_array(&single).unwrap(), Array::from(a));
    }
}
