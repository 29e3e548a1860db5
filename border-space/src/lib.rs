#![warn(missing_docs)]
//! Nested observations and actions for reinforcement learning.
//!
//! Environments with dictionary or tuple spaces hand out observations as nested
//! structures of arrays. This crate moves such structures between a per-item
//! representation and a batched one, synthesizes placeholder batches from a
//! [`Space`] and applies the bounds-aware action transforms a policy needs.
//!
//! ```
//! use border_space::{batch, unbatch, BatchMode, Leaf, Tree};
//!
//! let item = |a: i64, b: f64| Tree::dict(vec![
//!     ("a", Tree::Leaf(Leaf::Int(a))),
//!     ("b", Tree::Leaf(Leaf::Float(b))),
//! ]);
//! let items = vec![item(1, 7.0), item(2, 8.0), item(3, 9.0)];
//! let batched = batch(&items, BatchMode::Stack).unwrap();
//! assert_eq!(unbatch(&batched).unwrap().len(), 3);
//! ```
pub mod error;

mod tree;
pub use tree::{flatten, unflatten, NodeKind, Tree};

mod array;
pub use array::{Array, DType, Element};

mod leaf;
pub use leaf::Leaf;

mod space;
pub use space::{base_struct, BoxSpace, DiscreteSpace, MultiDiscreteSpace, Space, SpaceKind};

mod batch;
pub use batch::{batch, flatten_to_single_array, unbatch, BatchMode};

mod dummy;
pub use dummy::{dummy_batch, dummy_batch_with_rng, DummyBatchConfig, FillValue};

mod action;
pub use action::{clip, coerce_dtype, normalize, unsquash};

mod jsonable;
pub use jsonable::{from_jsonable_if_needed, to_jsonable_if_needed, Jsonable};

pub use error::{Result, SpaceError};
