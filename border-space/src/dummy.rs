//! Placeholder batches synthesized from a [`Space`].
use crate::{
    array::Array,
    error::{Result, SpaceError},
    leaf::Leaf,
    space::Space,
    tree::Tree,
};
use log::debug;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Values of a dummy batch.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum FillValue {
    /// Every element is set to the value, cast to the dtype of its space.
    Value(f64),

    /// Every element is drawn with [`Space::sample`].
    Random,
}

impl Default for FillValue {
    fn default() -> Self {
        FillValue::Value(0.0)
    }
}

/// Configuration of [`dummy_batch`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DummyBatchConfig {
    /// Size of the batch axis. `0` gives a single sample without batch axis.
    pub batch_size: usize,

    /// Values of the batch.
    pub fill: FillValue,

    /// Size of the optional time axis.
    pub time_size: Option<usize>,

    /// If `true`, leaves are `[T, B, ...]` instead of `[B, T, ...]`.
    ///
    /// Ignored without `time_size`.
    pub time_major: bool,

    /// If `true`, discrete subspaces are generated as one-hot vectors.
    ///
    /// With a fill value of `0.0` these are all-zero vectors.
    pub one_hot_discrete: bool,

    /// Seed of random fills. Drawn from the OS if `None`.
    pub seed: Option<u64>,
}

impl Default for DummyBatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            fill: FillValue::default(),
            time_size: None,
            time_major: false,
            one_hot_discrete: false,
            seed: None,
        }
    }
}

impl DummyBatchConfig {
    /// Sets the batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the fill value.
    pub fn fill(mut self, v: FillValue) -> Self {
        self.fill = v;
        self
    }

    /// Sets the size of the time axis.
    pub fn time_size(mut self, v: Option<usize>) -> Self {
        self.time_size = v;
        self
    }

    /// Sets the position of the time axis.
    pub fn time_major(mut self, v: bool) -> Self {
        self.time_major = v;
        self
    }

    /// Sets one-hot generation of discrete subspaces.
    pub fn one_hot_discrete(mut self, v: bool) -> Self {
        self.one_hot_discrete = v;
        self
    }

    /// Sets the seed of random fills.
    pub fn seed(mut self, v: Option<u64>) -> Self {
        self.seed = v;
        self
    }

    /// Returns the axes prepended to the shape of every leaf.
    ///
    /// Fails with [`SpaceError::InvalidBatchTimeCombination`] if a time axis is
    /// requested with `batch_size == 0`, or with a time axis of size zero.
    pub fn leading_shape(&self) -> Result<Vec<usize>> {
        match self.time_size {
            Some(t) if self.batch_size == 0 || t == 0 => {
                Err(SpaceError::InvalidBatchTimeCombination {
                    batch_size: self.batch_size,
                    time_size: t,
                })
            }
            Some(t) if self.time_major => Ok(vec![t, self.batch_size]),
            Some(t) => Ok(vec![self.batch_size, t]),
            None if self.batch_size > 0 => Ok(vec![self.batch_size]),
            None => Ok(vec![]),
        }
    }

    /// Constructs [`DummyBatchConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`DummyBatchConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// Returns a dummy batch for `space`.
///
/// The batch has the topology of the space. Each leaf is an array of the
/// subspace dtype whose shape is the leading axes of
/// [`DummyBatchConfig::leading_shape`] followed by the subspace shape. Note that
/// a batch does not pass [`Space::contains`] unless `batch_size` is `0`.
///
/// Random fills are seeded with [`DummyBatchConfig::seed`].
pub fn dummy_batch(space: &Space, config: &DummyBatchConfig) -> Result<Tree<Leaf>> {
    let mut rng = match config.seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_entropy(),
    };
    dummy_batch_with_rng(space, config, &mut rng)
}

/// Same as [`dummy_batch`], drawing random fills from `rng`.
pub fn dummy_batch_with_rng<R: Rng + ?Sized>(
    space: &Space,
    config: &DummyBatchConfig,
    rng: &mut R,
) -> Result<Tree<Leaf>> {
    let leading = config.leading_shape()?;
    debug!(
        "Dummy batch with leading axes {:?}, fill {:?}",
        leading, config.fill
    );
    space
        .base_struct()
        .try_map(|s| dummy_leaf(s, &leading, config, rng).map(Leaf::Array))
}

fn dummy_leaf<R: Rng + ?Sized>(
    space: &Space,
    leading: &[usize],
    config: &DummyBatchConfig,
    rng: &mut R,
) -> Result<Array> {
    let space = match config.one_hot_discrete {
        true => Cow::Owned(space.one_hot()),
        false => Cow::Borrowed(space),
    };
    let (leaf_shape, dtype) = match (space.shape(), space.dtype()) {
        (Some(shape), Some(dtype)) => (shape.to_vec(), dtype),
        _ => {
            return Err(SpaceError::StructureMismatch(
                "composite space at a leaf position".to_string(),
            ))
        }
    };
    let shape = leading.iter().chain(leaf_shape.iter()).cloned().collect::<Vec<_>>();

    match config.fill {
        FillValue::Value(v) => Ok(Array::full(&shape, v, dtype)),
        FillValue::Random => {
            let n = leading.iter().product::<usize>();
            let samples = (0..n)
                .map(|_| match space.sample(rng) {
                    Tree::Leaf(leaf) => leaf.to_array(),
                    _ => Err(SpaceError::StructureMismatch(
                        "composite sample at a leaf position".to_string(),
                    )),
                })
                .collect::<Result<Vec<_>>>()?;
            match leading.is_empty() {
                true => samples.into_iter().next().ok_or(SpaceError::EmptyBatch),
                false => Array::stack(&samples.iter().collect::<Vec<_>>())?.reshape(&shape),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        array::DType,
        space::{BoxSpace, DiscreteSpace, MultiDiscreteSpace},
    };
    use ndarray::arr1;
    use tempdir::TempDir;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn space() -> Space {
        Space::dict(vec![
            (
                "obs",
                Space::from(BoxSpace::uniform(-1.0, 1.0, &[3, 2], DType::F32)),
            ),
            (
                "act",
                Space::tuple(vec![
                    Space::from(DiscreteSpace::new(4)),
                    Space::from(MultiDiscreteSpace::new(arr1(&[2i64, 3]).into_dyn())),
                ]),
            ),
        ])
    }

    fn shapes(batch: &Tree<Leaf>) -> Vec<Vec<usize>> {
        batch
            .flatten()
            .iter()
            .map(|l| l.as_array().map(|a| a.shape().to_vec()).unwrap_or_default())
            .collect()
    }

    #[test]
    fn test_zero_filled_batch() {
        init();
        let config = DummyBatchConfig::default().batch_size(5);
        let batch = dummy_batch(&space(), &config).unwrap();
        // act.0, act.1, obs
        assert_eq!(shapes(&batch), vec![vec![5], vec![5, 2], vec![5, 3, 2]]);
        let obs = batch.get("obs").and_then(Tree::as_leaf).and_then(Leaf::as_array).unwrap();
        assert_eq!(obs.dtype(), DType::F32);
        assert!(obs.to_f64().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_time_axis() {
        init();
        let space = Space::from(BoxSpace::uniform(-1.0, 1.0, &[1], DType::F32));
        let config = DummyBatchConfig::default()
            .batch_size(2)
            .time_size(Some(3))
            .time_major(true);
        let batch = dummy_batch(&space, &config).unwrap();
        assert_eq!(shapes(&batch), vec![vec![3, 2, 1]]);

        let batch = dummy_batch(&space, &config.clone().time_major(false)).unwrap();
        assert_eq!(shapes(&batch), vec![vec![2, 3, 1]]);
    }

    #[test]
    fn test_unbatched_sample() {
        let config = DummyBatchConfig::default()
            .batch_size(0)
            .fill(FillValue::Value(1.0));
        let batch = dummy_batch(&space(), &config).unwrap();
        assert_eq!(shapes(&batch), vec![vec![], vec![2], vec![3, 2]]);
        assert!(space().contains(&batch));
    }

    #[test]
    fn test_invalid_batch_time_combination() {
        let config = DummyBatchConfig::default().batch_size(0).time_size(Some(3));
        assert_eq!(
            dummy_batch(&space(), &config),
            Err(SpaceError::InvalidBatchTimeCombination {
                batch_size: 0,
                time_size: 3
            })
        );
    }

    #[test]
    fn test_one_hot_discrete() {
        let config = DummyBatchConfig::default()
            .batch_size(2)
            .one_hot_discrete(true);
        let batch = dummy_batch(&space(), &config).unwrap();
        assert_eq!(shapes(&batch), vec![vec![2, 4], vec![2, 5], vec![2, 3, 2]]);
        let one_hot = batch.get("act").and_then(|t| t.at(0)).and_then(Tree::as_leaf).unwrap();
        assert_eq!(one_hot.dtype(), Some(DType::F32));
    }

    #[test]
    fn test_random_fill() {
        init();
        let config = DummyBatchConfig::default()
            .batch_size(4)
            .time_size(Some(2))
            .fill(FillValue::Random)
            .seed(Some(42));
        let batch = dummy_batch(&space(), &config).unwrap();
        assert_eq!(shapes(&batch), vec![vec![4, 2], vec![4, 2, 2], vec![4, 2, 3, 2]]);

        // Every item of the batch is a sample of the space.
        let space = space();
        for b in crate::unbatch(&batch).unwrap() {
            for t in crate::unbatch(&b).unwrap() {
                assert!(space.contains(&t));
            }
        }

        // Seeded fills are reproducible.
        assert_eq!(batch, dummy_batch(&space, &config).unwrap());
    }

    #[test]
    fn test_random_fill_of_extremely_wide_box() {
        let space = Space::from(BoxSpace::uniform(-f64::MAX, f64::MAX, &[2], DType::F64));
        let config = DummyBatchConfig::default()
            .batch_size(2)
            .fill(FillValue::Random)
            .seed(Some(1));
        let batch = dummy_batch(&space, &config).unwrap();
        assert_eq!(shapes(&batch), vec![vec![2, 2]]);
        for sample in crate::unbatch(&batch).unwrap() {
            assert!(space.contains(&sample));
        }
    }

    #[test]
    fn test_serde_dummy_batch_config() -> anyhow::Result<()> {
        let config = DummyBatchConfig::default()
            .batch_size(8)
            .time_size(Some(4))
            .fill(FillValue::Random)
            .seed(Some(1));
        let dir = TempDir::new("dummy_batch_config")?;
        let path = dir.path().join("dummy_batch_config.yaml");
        config.save(&path)?;
        let config_ = DummyBatchConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }
}
