//! Nested structures and their traversal.
//!
//! A [`Tree`] is either a leaf, a mapping from string keys to subtrees or an
//! ordered sequence of subtrees. Mapping keys are held in a [`BTreeMap`], so the
//! canonical traversal order (sorted keys, ascending positions) is the
//! iteration order of the containers themselves.
//!
//! Every other operation of this crate (flattening, batching, dummy batches and
//! the space-aware action transforms) is built on the traversals defined here:
//! [`Tree::map`], [`Tree::try_map`], [`Tree::zip_with`] and [`Tree::zip_all`].
use crate::error::{Result, SpaceError};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Display};

/// Kind of a node in a [`Tree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Keyed container.
    Mapping,

    /// Ordered container.
    Sequence,

    /// Primitive value.
    Leaf,
}

/// A nested structure whose leaves are of type `T`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Tree<T> {
    /// A primitive value.
    Leaf(T),

    /// A mapping of subtrees, visited in sorted key order.
    Dict(BTreeMap<String, Tree<T>>),

    /// A sequence of subtrees, visited in positional order.
    Tuple(Vec<Tree<T>>),
}

impl<T> From<T> for Tree<T> {
    fn from(value: T) -> Self {
        Tree::Leaf(value)
    }
}

fn child_path(path: &str, segment: impl Display) -> String {
    if path.is_empty() {
        format!("{}", segment)
    } else {
        format!("{}.{}", path, segment)
    }
}

fn location(path: &str) -> &str {
    if path.is_empty() {
        "<root>"
    } else {
        path
    }
}

fn kind_mismatch(path: &str, expected: NodeKind, actual: NodeKind) -> SpaceError {
    SpaceError::StructureMismatch(format!(
        "expected {:?} but found {:?} at {}",
        expected,
        actual,
        location(path)
    ))
}

fn keys_mismatch<'a>(
    path: &str,
    expected: impl Iterator<Item = &'a String>,
    actual: impl Iterator<Item = &'a String>,
) -> SpaceError {
    SpaceError::StructureMismatch(format!(
        "keys {:?} differ from {:?} at {}",
        actual.collect::<Vec<_>>(),
        expected.collect::<Vec<_>>(),
        location(path)
    ))
}

fn len_mismatch(path: &str, expected: usize, actual: usize) -> SpaceError {
    SpaceError::StructureMismatch(format!(
        "sequence of length {} differs from {} at {}",
        actual,
        expected,
        location(path)
    ))
}

impl<T> Tree<T> {
    /// Creates a mapping node from key-subtree pairs.
    pub fn dict<K, I>(items: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Tree<T>)>,
    {
        Tree::Dict(items.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Creates a sequence node.
    pub fn tuple<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Tree<T>>,
    {
        Tree::Tuple(items.into_iter().collect())
    }

    /// Returns the kind of the root node.
    pub fn kind(&self) -> NodeKind {
        match self {
            Tree::Leaf(_) => NodeKind::Leaf,
            Tree::Dict(_) => NodeKind::Mapping,
            Tree::Tuple(_) => NodeKind::Sequence,
        }
    }

    /// Returns the value if the root node is a leaf.
    pub fn as_leaf(&self) -> Option<&T> {
        match self {
            Tree::Leaf(x) => Some(x),
            _ => None,
        }
    }

    /// Returns the subtree under `key` of a mapping node.
    pub fn get(&self, key: &str) -> Option<&Tree<T>> {
        match self {
            Tree::Dict(m) => m.get(key),
            _ => None,
        }
    }

    /// Returns the subtree at position `ix` of a sequence node.
    pub fn at(&self, ix: usize) -> Option<&Tree<T>> {
        match self {
            Tree::Tuple(v) => v.get(ix),
            _ => None,
        }
    }

    /// Returns the number of leaves.
    pub fn num_leaves(&self) -> usize {
        match self {
            Tree::Leaf(_) => 1,
            Tree::Dict(m) => m.values().map(Tree::num_leaves).sum(),
            Tree::Tuple(v) => v.iter().map(Tree::num_leaves).sum(),
        }
    }

    /// Returns the topology of the tree without its values.
    pub fn structure(&self) -> Tree<()> {
        self.map(|_| ())
    }

    /// Applies `f` to every leaf, keeping the topology.
    pub fn map<U, F>(&self, mut f: F) -> Tree<U>
    where
        F: FnMut(&T) -> U,
    {
        self.map_inner(&mut f)
    }

    fn map_inner<U, F>(&self, f: &mut F) -> Tree<U>
    where
        F: FnMut(&T) -> U,
    {
        match self {
            Tree::Leaf(x) => Tree::Leaf(f(x)),
            Tree::Dict(m) => Tree::Dict(
                m.iter()
                    .map(|(k, v)| (k.clone(), v.map_inner(f)))
                    .collect(),
            ),
            Tree::Tuple(v) => Tree::Tuple(v.iter().map(|t| t.map_inner(f)).collect()),
        }
    }

    /// Applies a fallible `f` to every leaf, keeping the topology.
    ///
    /// Traversal stops at the first error.
    pub fn try_map<U, E, F>(&self, mut f: F) -> std::result::Result<Tree<U>, E>
    where
        F: FnMut(&T) -> std::result::Result<U, E>,
    {
        self.try_map_inner(&mut f)
    }

    fn try_map_inner<U, E, F>(&self, f: &mut F) -> std::result::Result<Tree<U>, E>
    where
        F: FnMut(&T) -> std::result::Result<U, E>,
    {
        match self {
            Tree::Leaf(x) => Ok(Tree::Leaf(f(x)?)),
            Tree::Dict(m) => {
                let mut out = BTreeMap::new();
                for (k, v) in m.iter() {
                    out.insert(k.clone(), v.try_map_inner(f)?);
                }
                Ok(Tree::Dict(out))
            }
            Tree::Tuple(v) => {
                let mut out = Vec::with_capacity(v.len());
                for t in v.iter() {
                    out.push(t.try_map_inner(f)?);
                }
                Ok(Tree::Tuple(out))
            }
        }
    }

    /// Walks `self` and `other` in lock-step, applying `f` to co-located leaves.
    ///
    /// The leaf types of the two trees may differ, which is how values are
    /// paired with the [`Space`](crate::Space) that describes them.
    /// Fails with [`SpaceError::StructureMismatch`] if the topologies differ.
    pub fn zip_with<U, V, F>(&self, other: &Tree<U>, mut f: F) -> Result<Tree<V>>
    where
        F: FnMut(&T, &U) -> Result<V>,
    {
        self.zip_with_inner(other, &mut f, "")
    }

    fn zip_with_inner<U, V, F>(&self, other: &Tree<U>, f: &mut F, path: &str) -> Result<Tree<V>>
    where
        F: FnMut(&T, &U) -> Result<V>,
    {
        match (self, other) {
            (Tree::Leaf(x), Tree::Leaf(y)) => Ok(Tree::Leaf(f(x, y)?)),
            (Tree::Dict(m1), Tree::Dict(m2)) => {
                if !m1.keys().eq(m2.keys()) {
                    return Err(keys_mismatch(path, m1.keys(), m2.keys()));
                }
                let mut out = BTreeMap::new();
                for ((k, v1), v2) in m1.iter().zip(m2.values()) {
                    out.insert(k.clone(), v1.zip_with_inner(v2, f, &child_path(path, k))?);
                }
                Ok(Tree::Dict(out))
            }
            (Tree::Tuple(v1), Tree::Tuple(v2)) => {
                if v1.len() != v2.len() {
                    return Err(len_mismatch(path, v1.len(), v2.len()));
                }
                let mut out = Vec::with_capacity(v1.len());
                for (i, (t1, t2)) in v1.iter().zip(v2.iter()).enumerate() {
                    out.push(t1.zip_with_inner(t2, f, &child_path(path, i))?);
                }
                Ok(Tree::Tuple(out))
            }
            (t1, t2) => Err(kind_mismatch(path, t1.kind(), t2.kind())),
        }
    }

    /// Walks any number of trees in lock-step.
    ///
    /// `f` receives the co-located leaves of all trees, in the order the trees
    /// are given. The output takes the topology of the first tree.
    /// Fails with [`SpaceError::StructureMismatch`] if any tree differs in
    /// topology from the first one, or if no tree is given.
    pub fn zip_all<U, F>(trees: &[&Tree<T>], mut f: F) -> Result<Tree<U>>
    where
        F: FnMut(&[&T]) -> Result<U>,
    {
        if trees.is_empty() {
            return Err(SpaceError::StructureMismatch(
                "no structures to traverse".to_string(),
            ));
        }
        Self::zip_all_inner(trees, &mut f, "")
    }

    fn zip_all_inner<U, F>(trees: &[&Tree<T>], f: &mut F, path: &str) -> Result<Tree<U>>
    where
        F: FnMut(&[&T]) -> Result<U>,
    {
        match trees[0] {
            Tree::Leaf(_) => {
                let leaves = trees
                    .iter()
                    .map(|t| match t {
                        Tree::Leaf(x) => Ok(x),
                        other => Err(kind_mismatch(path, NodeKind::Leaf, other.kind())),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Tree::Leaf(f(&leaves)?))
            }
            Tree::Dict(first) => {
                let maps = trees
                    .iter()
                    .map(|t| match t {
                        Tree::Dict(m) if m.keys().eq(first.keys()) => Ok(m),
                        Tree::Dict(m) => Err(keys_mismatch(path, first.keys(), m.keys())),
                        other => Err(kind_mismatch(path, NodeKind::Mapping, other.kind())),
                    })
                    .collect::<Result<Vec<_>>>()?;
                let mut out = BTreeMap::new();
                for key in first.keys() {
                    let children = maps.iter().map(|m| &m[key]).collect::<Vec<_>>();
                    out.insert(
                        key.clone(),
                        Self::zip_all_inner(&children, f, &child_path(path, key))?,
                    );
                }
                Ok(Tree::Dict(out))
            }
            Tree::Tuple(first) => {
                let seqs = trees
                    .iter()
                    .map(|t| match t {
                        Tree::Tuple(v) if v.len() == first.len() => Ok(v),
                        Tree::Tuple(v) => Err(len_mismatch(path, first.len(), v.len())),
                        other => Err(kind_mismatch(path, NodeKind::Sequence, other.kind())),
                    })
                    .collect::<Result<Vec<_>>>()?;
                let mut out = Vec::with_capacity(first.len());
                for i in 0..first.len() {
                    let children = seqs.iter().map(|v| &v[i]).collect::<Vec<_>>();
                    out.push(Self::zip_all_inner(&children, f, &child_path(path, i))?);
                }
                Ok(Tree::Tuple(out))
            }
        }
    }

    /// Returns references to the leaves in canonical order.
    ///
    /// Mapping keys are visited in ascending order and sequence elements by
    /// position. Container nodes are never emitted.
    pub fn flatten(&self) -> Vec<&T> {
        let mut out = Vec::with_capacity(self.num_leaves());
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a T>) {
        match self {
            Tree::Leaf(x) => out.push(x),
            Tree::Dict(m) => m.values().for_each(|t| t.collect_leaves(out)),
            Tree::Tuple(v) => v.iter().for_each(|t| t.collect_leaves(out)),
        }
    }

    /// Consumes the tree and returns its leaves in canonical order.
    pub fn into_leaves(self) -> Vec<T> {
        let mut out = Vec::new();
        self.drain_leaves(&mut out);
        out
    }

    fn drain_leaves(self, out: &mut Vec<T>) {
        match self {
            Tree::Leaf(x) => out.push(x),
            Tree::Dict(m) => m.into_iter().for_each(|(_, t)| t.drain_leaves(out)),
            Tree::Tuple(v) => v.into_iter().for_each(|t| t.drain_leaves(out)),
        }
    }

    /// Rebuilds a tree with the topology of `template` from leaves in
    /// canonical order. Inverse of [`Tree::into_leaves`].
    ///
    /// Fails with [`SpaceError::ArityMismatch`] if the number of leaves differs
    /// from that of the template.
    pub fn unflatten_as<U>(template: &Tree<U>, leaves: Vec<T>) -> Result<Tree<T>> {
        let expected = template.num_leaves();
        let actual = leaves.len();
        if expected != actual {
            return Err(SpaceError::ArityMismatch { expected, actual });
        }
        let mut leaves = leaves.into_iter();
        template.try_map(|_| {
            leaves
                .next()
                .ok_or(SpaceError::ArityMismatch { expected, actual })
        })
    }
}

/// Returns the leaves of `structure` in canonical order.
///
/// Same as [`Tree::flatten`].
pub fn flatten<T>(structure: &Tree<T>) -> Vec<&T> {
    structure.flatten()
}

/// Rebuilds a structure with the topology of `template` from leaves in
/// canonical order.
///
/// Same as [`Tree::unflatten_as`].
pub fn unflatten<T, U>(template: &Tree<U>, leaves: Vec<T>) -> Result<Tree<T>> {
    Tree::unflatten_as(template, leaves)
}
