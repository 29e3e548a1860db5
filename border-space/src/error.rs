//! Errors in the library.
use thiserror::Error;

/// Errors raised by operations on nested structures and spaces.
///
/// All of them are raised synchronously by the call that detects the problem
/// and no partial result is returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpaceError {
    /// Structures traversed together do not share the same topology.
    #[error("Structure mismatch: {0}")]
    StructureMismatch(String),

    /// The number of flattened leaves disagrees with the template.
    #[error("Arity mismatch: template has {expected} leaves, got {actual}")]
    ArityMismatch {
        /// Number of leaves implied by the template.
        expected: usize,
        /// Number of leaves given.
        actual: usize,
    },

    /// No structure was given to [`batch`](crate::batch).
    #[error("Input list of structures does not contain any items")]
    EmptyBatch,

    /// Co-located leaves cannot be combined because of their shapes or dtypes.
    #[error("Leaf shape mismatch: {0}")]
    LeafShapeMismatch(String),

    /// Leaves of a batch disagree on the size of the leading dimension.
    #[error("Inconsistent batch size: expected {expected}, got {actual}")]
    InconsistentBatchSize {
        /// Leading dimension of the first leaf.
        expected: usize,
        /// Leading dimension of the offending leaf.
        actual: usize,
    },

    /// A time axis was requested without a batch axis.
    #[error("Invalid combination of batch_size={batch_size} and time_size={time_size}")]
    InvalidBatchTimeCombination {
        /// Requested batch size.
        batch_size: usize,
        /// Requested time size.
        time_size: usize,
    },

    /// A leaf has a type that the operation cannot handle at its position.
    #[error("Incompatible leaf type: {0}")]
    IncompatibleLeafType(String),

    /// A JSON value does not conform to the space it is decoded with.
    #[error("Invalid jsonable: {0}")]
    InvalidJsonable(String),
}

/// Result type of the library.
pub type Result<T> = std::result::Result<T, SpaceError>;
