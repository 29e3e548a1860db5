//! Declarative descriptions of observation and action spaces.
//!
//! A [`Space`] describes the shape, dtype, bounds and discreteness of a value.
//! Primitive spaces ([`BoxSpace`], [`DiscreteSpace`], [`MultiDiscreteSpace`])
//! describe a single array; composite spaces ([`Space::Dict`], [`Space::Tuple`])
//! nest other spaces. Spaces are built once by the environment or policy and
//! only read by the functions of this crate.
//!
//! Spaces can be declared in YAML experiment files:
//!
//! ```yaml
//! Dict:
//!   position:
//!     Box:
//!       low: { v: 1, dim: [2], data: [-1.0, -1.0] }
//!       high: { v: 1, dim: [2], data: [1.0, 1.0] }
//!       dtype: F32
//!   tool:
//!     Discrete:
//!       n: 3
//!       start: 0
//! ```
use crate::{
    array::{Array, DType},
    error::{Result, SpaceError},
    leaf::Leaf,
    tree::Tree,
};
use ndarray::{ArrayD, IxDyn, Zip};
use rand::Rng;
use rand_distr::{Exp1, StandardNormal};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Discreteness of a primitive space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpaceKind {
    /// Real-valued, possibly bounded ([`BoxSpace`]).
    Continuous,

    /// A single categorical index ([`DiscreteSpace`]).
    Discrete,

    /// An array of categorical indices ([`MultiDiscreteSpace`]).
    MultiDiscrete,
}

/// A possibly-bounded box in `R^n`.
///
/// Bounds are elementwise and may be infinite.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxSpace {
    /// Lower bounds.
    pub low: ArrayD<f64>,

    /// Upper bounds.
    pub high: ArrayD<f64>,

    /// Element type of values in the space.
    pub dtype: DType,
}

impl BoxSpace {
    /// Creates a box from elementwise bounds of the same shape.
    pub fn new(low: ArrayD<f64>, high: ArrayD<f64>, dtype: DType) -> Result<Self> {
        if low.shape() != high.shape() {
            return Err(SpaceError::LeafShapeMismatch(format!(
                "low {:?} and high {:?} of a box differ in shape",
                low.shape(),
                high.shape()
            )));
        }
        Ok(Self { low, high, dtype })
    }

    /// Creates a box of `shape` with the same bounds for every element.
    pub fn uniform(low: f64, high: f64, shape: &[usize], dtype: DType) -> Self {
        Self {
            low: ArrayD::from_elem(IxDyn(shape), low),
            high: ArrayD::from_elem(IxDyn(shape), high),
            dtype,
        }
    }

    /// Returns the shape of values in the space.
    pub fn shape(&self) -> &[usize] {
        self.low.shape()
    }

    /// Returns `true` if every element is bounded on both sides.
    pub fn is_bounded(&self) -> bool {
        self.low.iter().all(|x| x.is_finite()) && self.high.iter().all(|x| x.is_finite())
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Array {
        let integer = self.dtype.is_integer();
        let data = Zip::from(&self.low).and(&self.high).map_collect(|&l, &h| {
            // Integer boxes draw from [low, high + 1) and floor the result.
            let h = if integer { h + 1.0 } else { h };
            let x = match (l.is_finite(), h.is_finite()) {
                (true, true) if h > l && (h - l).is_finite() => rng.gen_range(l..h),
                // Bounds too far apart for a uniform range are interpolated.
                (true, true) if h > l => {
                    let u: f64 = rng.gen();
                    (l * (1.0 - u) + h * u).max(l).min(h)
                }
                (true, true) => l,
                (true, false) => l + rng.sample::<f64, _>(Exp1),
                (false, true) => h - rng.sample::<f64, _>(Exp1),
                (false, false) => rng.sample::<f64, _>(StandardNormal),
            };
            if integer {
                x.floor()
            } else {
                x
            }
        });
        Array::from_f64(data, self.dtype)
    }

    fn contains(&self, a: &Array) -> bool {
        if a.shape() != self.shape() {
            return false;
        }
        let values = a.to_f64();
        Zip::from(&values)
            .and(&self.low)
            .and(&self.high)
            .all(|&x, &l, &h| l <= x && x <= h)
    }
}

/// A categorical space `{start, start + 1, ..., start + n - 1}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DiscreteSpace {
    /// Number of categories.
    pub n: i64,

    /// Smallest index.
    pub start: i64,
}

impl DiscreteSpace {
    /// Creates a space of `n` categories starting at zero.
    pub fn new(n: i64) -> Self {
        Self { n, start: 0 }
    }

    /// Sets the smallest index.
    pub fn start(mut self, start: i64) -> Self {
        self.start = start;
        self
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Array {
        let offset = if self.n > 0 { rng.gen_range(0..self.n) } else { 0 };
        Array::scalar(self.start + offset)
    }

    fn contains(&self, a: &Array) -> bool {
        if a.ndim() != 0 || !a.dtype().is_integer() {
            return false;
        }
        a.to_i64()
            .iter()
            .all(|&x| self.start <= x && x < self.start + self.n)
    }
}

/// An array of independent categorical spaces.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MultiDiscreteSpace {
    /// Number of categories of each slot.
    pub nvec: ArrayD<i64>,

    /// Smallest index of each slot.
    pub start: ArrayD<i64>,
}

impl MultiDiscreteSpace {
    /// Creates a space whose slots start at zero.
    pub fn new(nvec: ArrayD<i64>) -> Self {
        let start = ArrayD::zeros(nvec.raw_dim());
        Self { nvec, start }
    }

    /// Sets the smallest index of each slot.
    pub fn start(mut self, start: ArrayD<i64>) -> Result<Self> {
        if start.shape() != self.nvec.shape() {
            return Err(SpaceError::LeafShapeMismatch(format!(
                "start {:?} differs from nvec {:?}",
                start.shape(),
                self.nvec.shape()
            )));
        }
        self.start = start;
        Ok(self)
    }

    /// Returns the shape of values in the space.
    pub fn shape(&self) -> &[usize] {
        self.nvec.shape()
    }

    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Array {
        let data = Zip::from(&self.nvec)
            .and(&self.start)
            .map_collect(|&n, &s| if n > 0 { s + rng.gen_range(0..n) } else { s });
        Array::I64(data)
    }

    fn contains(&self, a: &Array) -> bool {
        if a.shape() != self.shape() || !a.dtype().is_integer() {
            return false;
        }
        let values = a.to_i64();
        Zip::from(&values)
            .and(&self.nvec)
            .and(&self.start)
            .all(|&x, &n, &s| s <= x && x < s + n)
    }
}

/// Description of a (possibly nested) value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Space {
    /// Continuous values.
    Box(BoxSpace),

    /// A categorical index.
    Discrete(DiscreteSpace),

    /// An array of categorical indices.
    MultiDiscrete(MultiDiscreteSpace),

    /// Named subspaces, in sorted key order.
    Dict(BTreeMap<String, Space>),

    /// Positional subspaces.
    Tuple(Vec<Space>),
}

impl From<BoxSpace> for Space {
    fn from(s: BoxSpace) -> Self {
        Space::Box(s)
    }
}

impl From<DiscreteSpace> for Space {
    fn from(s: DiscreteSpace) -> Self {
        Space::Discrete(s)
    }
}

impl From<MultiDiscreteSpace> for Space {
    fn from(s: MultiDiscreteSpace) -> Self {
        Space::MultiDiscrete(s)
    }
}

impl Space {
    /// Creates a composite space of named subspaces.
    pub fn dict<K, I>(items: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Space)>,
    {
        Space::Dict(items.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Creates a composite space of positional subspaces.
    pub fn tuple<I: IntoIterator<Item = Space>>(items: I) -> Self {
        Space::Tuple(items.into_iter().collect())
    }

    /// Returns `true` if the space holds other spaces.
    pub fn is_composite(&self) -> bool {
        matches!(self, Space::Dict(_) | Space::Tuple(_))
    }

    /// Returns the kind of a primitive space.
    pub fn kind(&self) -> Option<SpaceKind> {
        match self {
            Space::Box(_) => Some(SpaceKind::Continuous),
            Space::Discrete(_) => Some(SpaceKind::Discrete),
            Space::MultiDiscrete(_) => Some(SpaceKind::MultiDiscrete),
            Space::Dict(_) | Space::Tuple(_) => None,
        }
    }

    /// Returns the shape of values in a primitive space.
    ///
    /// Composite spaces have no shape of their own.
    pub fn shape(&self) -> Option<&[usize]> {
        match self {
            Space::Box(s) => Some(s.shape()),
            Space::Discrete(_) => Some(&[]),
            Space::MultiDiscrete(s) => Some(s.shape()),
            Space::Dict(_) | Space::Tuple(_) => None,
        }
    }

    /// Returns the dtype of values in a primitive space.
    pub fn dtype(&self) -> Option<DType> {
        match self {
            Space::Box(s) => Some(s.dtype),
            Space::Discrete(_) | Space::MultiDiscrete(_) => Some(DType::I64),
            Space::Dict(_) | Space::Tuple(_) => None,
        }
    }

    /// Returns the space as a plain nested structure whose leaves are the
    /// primitive spaces.
    ///
    /// `Dict(a: Box, b: Tuple(Discrete, Discrete))` becomes
    /// `Tree::Dict(a: Leaf(Box), b: Tree::Tuple(Leaf(Discrete), Leaf(Discrete)))`.
    pub fn base_struct(&self) -> Tree<&Space> {
        match self {
            Space::Dict(m) => Tree::Dict(
                m.iter()
                    .map(|(k, s)| (k.clone(), s.base_struct()))
                    .collect(),
            ),
            Space::Tuple(v) => Tree::Tuple(v.iter().map(Space::base_struct).collect()),
            s => Tree::Leaf(s),
        }
    }

    /// Returns the primitive subspaces in canonical order.
    pub fn flatten_space(&self) -> Vec<&Space> {
        self.base_struct().into_leaves()
    }

    /// Returns the continuous space a discrete space is one-hot encoded in.
    ///
    /// A [`DiscreteSpace`] of `n` categories maps to a `[0, 1]` box of shape `[n]`,
    /// a [`MultiDiscreteSpace`] to a box as wide as the sum of its `nvec`.
    /// Other spaces are returned unchanged.
    pub fn one_hot(&self) -> Space {
        match self {
            Space::Discrete(s) => {
                Space::Box(BoxSpace::uniform(0.0, 1.0, &[s.n.max(0) as usize], DType::F32))
            }
            Space::MultiDiscrete(s) => {
                let width = s.nvec.iter().map(|&n| n.max(0)).sum::<i64>() as usize;
                Space::Box(BoxSpace::uniform(0.0, 1.0, &[width], DType::F32))
            }
            s => s.clone(),
        }
    }

    /// Draws a random sample.
    ///
    /// Bounded box elements are uniform, half-bounded ones are shifted
    /// exponentials, unbounded ones are standard normal. Discrete indices are
    /// uniform over their categories.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Tree<Leaf> {
        match self {
            Space::Box(s) => Tree::Leaf(Leaf::Array(s.sample(rng))),
            Space::Discrete(s) => Tree::Leaf(Leaf::Array(s.sample(rng))),
            Space::MultiDiscrete(s) => Tree::Leaf(Leaf::Array(s.sample(rng))),
            Space::Dict(m) => Tree::Dict(
                m.iter()
                    .map(|(k, s)| (k.clone(), s.sample(rng)))
                    .collect(),
            ),
            Space::Tuple(v) => Tree::Tuple(v.iter().map(|s| s.sample(rng)).collect()),
        }
    }

    /// Returns `true` if `sample` has the topology of the space and every leaf
    /// has the shape and lies within the bounds of its subspace.
    pub fn contains(&self, sample: &Tree<Leaf>) -> bool {
        match (self, sample) {
            (Space::Dict(m), Tree::Dict(t)) => {
                m.keys().eq(t.keys())
                    && m.values().zip(t.values()).all(|(s, x)| s.contains(x))
            }
            (Space::Tuple(v), Tree::Tuple(t)) => {
                v.len() == t.len() && v.iter().zip(t.iter()).all(|(s, x)| s.contains(x))
            }
            (Space::Box(s), Tree::Leaf(x)) => x.to_array().map_or(false, |a| s.contains(&a)),
            (Space::Discrete(s), Tree::Leaf(x)) => {
                x.to_array().map_or(false, |a| s.contains(&a))
            }
            (Space::MultiDiscrete(s), Tree::Leaf(x)) => {
                x.to_array().map_or(false, |a| s.contains(&a))
            }
            _ => false,
        }
    }

    /// Constructs [`Space`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`Space`] as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Returns `space` as a plain nested structure of its primitive subspaces.
///
/// Same as [`Space::base_struct`].
pub fn base_struct(space: &Space) -> Tree<&Space> {
    space.base_struct()
}
