//! Partitioning and MPI-style collectives over [`nda_view`] arrays.
//!
//! The collectives in this crate move whole arrays between the ranks of a
//! group. They are written against the [`Communicator`] trait, which only
//! needs point-to-point byte messages; typed messages are encoded with
//! `bincode`, and group primitives (broadcast, gather, reduce) come with
//! linear default implementations a real transport may override.
//!
//! # Core Types
//!
//! - [`chunk_range`] / [`Partition`]: contiguous split of an index range across ranks
//! - [`Communicator`]: transport boundary
//! - [`LocalWorld`]: in-process group, one thread per rank
//! - `MpiComm` (feature `mpi`): one rank of an MPI communicator, one process per rank
//! - [`ReduceOp`] / [`Reducible`]: built-in combination operators, applied
//!   recursively to arrays of arrays
//!
//! # Example
//!
//! ```rust
//! use nda_mpi::{all_reduce, Communicator, LocalWorld, ReduceOp};
//! use nda_view::{Array, ArrayLike};
//!
//! let results = LocalWorld::run(3, |comm| {
//!     let rank = comm.rank() as i32;
//!     let a = Array::from_elem([4], rank);
//!     all_reduce(&a, comm, ReduceOp::Sum)
//! })
//! .unwrap();
//!
//! for r in results {
//!     assert_eq!(r.unwrap().to_vec(), vec![3, 3, 3, 3]);
//! }
//! ```

mod collectives;
mod comm;
mod local;
#[cfg(feature = "mpi")]
mod mpi_comm;
mod partition;
mod reduce;

pub use collectives::{
    all_gather, all_reduce, all_reduce_with, broadcast, broadcast_view, gather, reduce,
    reduce_with, scatter,
};
pub use comm::{Communicator, Tag, MAX_TAG};
pub use local::{LocalComm, LocalWorld, SelfComm, WorldConfig, WORLD_SIZE_ENV};
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;
pub use partition::{chunk_range, partitions, Partition};
pub use reduce::{ReduceOp, Reducible};

use nda_view::NdaError;
use serde::{Deserialize, Serialize};

// ============================================================================
// Error types
// ============================================================================

/// Errors raised by the transport or by a collective operation.
///
/// Errors travel between ranks, so they are serializable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum MpiError {
    /// The peer left the group while a message was expected from it.
    #[error("rank {peer} disconnected")]
    Disconnected { peer: usize },

    /// A value could not be encoded, or a message did not decode as the
    /// type the receiver asked for.
    #[error("message codec error: {0}")]
    Codec(String),

    /// Rank outside the communicator.
    #[error("rank {rank} out of range for a group of size {size}")]
    InvalidRank { rank: usize, size: usize },

    /// Tag above [`MAX_TAG`].
    #[error("tag {tag} exceeds the largest valid tag {}", MAX_TAG)]
    InvalidTag { tag: Tag },

    /// The reduce operation is not defined for the element type.
    #[error("{op:?} is not defined for {ty}")]
    UnsupportedOp { op: ReduceOp, ty: String },

    /// A rank thread could not be started.
    #[error("failed to spawn rank {rank}: {reason}")]
    Spawn { rank: usize, reason: String },

    /// Layout or shape error from the array layer.
    #[error(transparent)]
    Array(#[from] NdaError),
}

/// Result type for transport and collective operations.
pub type Result<T> = std::result::Result<T, MpiError>;
