//! Compile-time-rank array views over shared or borrowed storage.
//!
//! This crate provides the index-mapping and storage-ownership model that lets
//! several array and view objects alias the same buffer with different
//! shapes and strides.
//!
//! # Core Types
//!
//! - [`IndexMap`]: shape, strides and origin offset for a fixed rank `N`
//! - [`Handle`] / [`ConstHandle`]: writable and read-only storage handles with
//!   [`MemPolicy::Borrowed`] or [`MemPolicy::Shared`] ownership
//! - [`ArrayView`] / [`ArrayViewMut`]: const and mutable views (shallow copy on `clone`)
//! - [`Array`]: regular array that owns its buffer and may reallocate it
//!
//! # Example
//!
//! ```rust
//! use nda_view::{s, Array, ArrayLike};
//!
//! let mut a = Array::<i64, 2>::from_fn([3, 4], |[i, j]| (10 * i + j) as i64);
//! let row = a.view().slice::<1>(&s![1, ..]).unwrap();
//! assert_eq!(row.to_vec(), vec![10, 11, 12, 13]);
//!
//! // Views alias the array's buffer.
//! let mut col = a.view_mut().slice_mut::<1>(&s![.., 2]).unwrap();
//! col.fill(-1);
//! assert_eq!(a.get([2, 2]), -1);
//! ```

mod array;
mod idx_map;
mod storage;
mod view;

pub use array::Array;
pub use idx_map::{col_major_strides, row_major_strides, Ellipsis, IndexMap, Indices, SliceArg};
pub use storage::{ConstHandle, Handle, MemPolicy, Storage};
pub use view::{ArrayLike, ArrayView, ArrayViewMut};

use serde::{Deserialize, Serialize};

// ============================================================================
// Error types
// ============================================================================

/// Errors that can occur while building or using layouts, views and arrays.
///
/// Errors are serializable so that a collective can report one rank's
/// failure on every rank.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum NdaError {
    /// Multi-index or slice argument outside the declared shape.
    #[error("index {index:?} out of range for shape {shape:?}")]
    OutOfRange { index: Vec<usize>, shape: Vec<usize> },

    /// Malformed slicing argument list.
    #[error("invalid slice: {0}")]
    InvalidSlice(String),

    /// Operand shapes are incompatible for the operation.
    #[error("shape mismatch: {0:?} vs {1:?}")]
    ShapeMismatch(Vec<usize>, Vec<usize>),

    /// Array ranks do not match.
    #[error("rank mismatch: {0} vs {1}")]
    RankMismatch(usize, usize),

    /// Invalid axis index for the given array rank.
    #[error("invalid axis {axis} for rank {rank}")]
    InvalidAxis { axis: usize, rank: usize },

    /// A layout addresses memory outside its buffer.
    #[error("layout spans offsets {min}..={max} but buffer holds {len} elements")]
    BufferOverrun { min: isize, max: isize, len: usize },

    /// The operation requires ownership the handle does not have.
    #[error("ownership violation: {0}")]
    OwnershipViolation(String),
}

/// Result type for array operations.
pub type Result<T> = std::result::Result<T, NdaError>;
