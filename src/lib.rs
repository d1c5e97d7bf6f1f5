//! Strided multidimensional arrays with aliasing views, plus MPI-style
//! collectives that move them between the ranks of a group.
//!
//! This crate re-exports the two layers:
//!
//! - [`nda_view`]: [`IndexMap`], storage [`Handle`]s and read-only
//!   [`ConstHandle`]s, [`ArrayView`] /
//!   [`ArrayViewMut`] and the owning [`Array`]
//! - [`nda_mpi`]: [`chunk_range`], the [`Communicator`] transport boundary,
//!   the in-process [`LocalWorld`] and the collectives ([`scatter`],
//!   [`gather`], [`all_gather`], [`broadcast`], [`reduce`], [`all_reduce`])
//!
//! # Features
//!
//! - `bounds-check`: check every element access against the shape and panic
//!   with the [`NdaError::OutOfRange`] message instead of relying on debug
//!   assertions
//! - `mpi`: `MpiComm`, a [`Communicator`] backed by an installed MPI library,
//!   for running the collectives with one process per rank
//!
//! # Example
//!
//! ```rust
//! use nda::{gather, s, scatter, Array, ArrayLike, LocalWorld};
//!
//! let a = Array::from_fn([7, 3], |[i, j]| (i + 10 * j) as f64);
//! let pieces = LocalWorld::run(3, |comm| {
//!     let local = scatter(&a, comm, 0)?;
//!     gather(&local, comm, 0)
//! })
//! .unwrap();
//!
//! let back = pieces[0].as_ref().unwrap().as_ref().unwrap();
//! assert_eq!(back, &a);
//! assert_eq!(a.view().slice::<1>(&s![.., 2]).unwrap().get([6]), 26.0);
//! ```

pub use nda_view::{
    col_major_strides, row_major_strides, s, Array, ArrayLike, ArrayView, ArrayViewMut,
    ConstHandle, Ellipsis, Handle, IndexMap, Indices, MemPolicy, NdaError, SliceArg, Storage,
};

pub use nda_mpi::{
    all_gather, all_reduce, all_reduce_with, broadcast, broadcast_view, chunk_range, gather,
    partitions, reduce, reduce_with, scatter, Communicator, LocalComm, LocalWorld, MpiError,
    Partition, ReduceOp, Reducible, SelfComm, Tag, WorldConfig, MAX_TAG, WORLD_SIZE_ENV,
};

#[cfg(feature = "mpi")]
pub use nda_mpi::MpiComm;

pub use nda_mpi;
pub use nda_view;
