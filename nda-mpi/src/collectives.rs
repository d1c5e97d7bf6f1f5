//! Group operations on whole arrays.
//!
//! Scatter and the gathers split or join arrays along their leading
//! dimension; the trailing dimensions travel as one block per row. Each
//! operation returns a freshly allocated [`Array`] that shares nothing with
//! the arrays of other ranks.
//!
//! Operations that can fail on shape first exchange the shapes of all ranks,
//! so every rank reaches the same verdict and returns the same error. Shapes
//! and elements travel serialized, so element types must implement
//! `Serialize` and `DeserializeOwned`.

use crate::comm::{Communicator, TAG_SCATTER};
use crate::partition::chunk_range;
use crate::reduce::{ReduceOp, Reducible};
use crate::{MpiError, Result};
use nda_view::{Array, ArrayLike, ArrayView, ArrayViewMut, NdaError, SliceArg};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::ops::Range;
use tracing::debug;

/// Rank that reduces and redistributes for the `all_` operations.
const ALL_ROOT: usize = 0;

fn leading_axis<const N: usize>() -> Result<()> {
    if N == 0 {
        return Err(NdaError::InvalidAxis { axis: 0, rank: 0 }.into());
    }
    Ok(())
}

/// Rows `range` of `view`, without copying.
fn rows<'a, T, const N: usize>(
    view: &ArrayView<'a, T, N>,
    range: Range<usize>,
) -> Result<ArrayView<'a, T, N>> {
    let args = [SliceArg::range(range.start, range.end, 1), SliceArg::Ellipsis];
    Ok(view.slice::<N>(&args)?)
}

/// Shape received from another rank, checked against the local rank.
fn to_shape<const N: usize>(dims: Vec<usize>) -> Result<[usize; N]> {
    <[usize; N]>::try_from(dims).map_err(|dims| NdaError::RankMismatch(dims.len(), N).into())
}

/// Shape with the leading extent replaced.
fn with_rows<const N: usize>(mut shape: [usize; N], rows: usize) -> [usize; N] {
    shape[0] = rows;
    shape
}

/// Exchange shapes and check that all ranks agree on the trailing extents.
fn agree_on_rows<C: Communicator, const N: usize>(
    comm: &C,
    shape: [usize; N],
) -> Result<Vec<Vec<usize>>> {
    let shapes = comm.all_gather_values(shape.to_vec())?;
    if let Some(first) = shapes.first() {
        if let Some(bad) = shapes.iter().find(|s| s[1..] != first[1..]) {
            return Err(NdaError::ShapeMismatch(first.clone(), bad.clone()).into());
        }
    }
    Ok(shapes)
}

/// Exchange shapes and check that all ranks hold the same shape.
fn agree_on_shape<C: Communicator, const N: usize>(comm: &C, shape: [usize; N]) -> Result<()> {
    let shapes = comm.all_gather_values(shape.to_vec())?;
    if let Some(first) = shapes.first() {
        if let Some(bad) = shapes.iter().find(|&s| s != first) {
            return Err(NdaError::ShapeMismatch(first.clone(), bad.clone()).into());
        }
    }
    Ok(())
}

// ============================================================================
// Scatter / gather
// ============================================================================

/// Split the root's array along its leading dimension, one contiguous block
/// of rows per rank ([`chunk_range`]). Every rank gets its own block.
///
/// Only the root's `src` is read; other ranks may pass anything of the
/// right rank.
///
/// # Errors
/// [`NdaError::InvalidAxis`] for rank-0 arrays, [`MpiError::InvalidRank`]
/// for a bad root, or a transport error.
pub fn scatter<T, const N: usize, A, C>(src: &A, comm: &C, root: usize) -> Result<Array<T, N>>
where
    T: Clone + Serialize + DeserializeOwned,
    A: ArrayLike<T, N> + ?Sized,
    C: Communicator,
{
    leading_axis::<N>()?;
    comm.check_rank(root)?;

    let mut dims = src.shape().to_vec();
    comm.broadcast_value(&mut dims, root)?;
    let shape = to_shape::<N>(dims)?;
    debug!(rank = comm.rank(), root, shape = ?shape, "scatter");

    let local = chunk_range(0, shape[0], comm.size(), comm.rank());
    if comm.rank() == root {
        let view = ArrayView::from_array_like(src);
        for dest in (0..comm.size()).filter(|&d| d != root) {
            let block = rows(&view, chunk_range(0, shape[0], comm.size(), dest))?;
            comm.send(&block.to_vec(), dest, TAG_SCATTER)?;
        }
        Ok(rows(&view, local)?.to_array())
    } else {
        let data: Vec<T> = comm.recv(root, TAG_SCATTER)?;
        Ok(Array::from_vec(with_rows(shape, local.len()), data)?)
    }
}

/// Concatenate the arrays of all ranks along the leading dimension, in rank
/// order, at the root. The root gets `Some(result)`, other ranks `None`.
///
/// # Errors
/// [`NdaError::ShapeMismatch`] on every rank if the trailing extents differ.
pub fn gather<T, const N: usize, A, C>(
    src: &A,
    comm: &C,
    root: usize,
) -> Result<Option<Array<T, N>>>
where
    T: Clone + Serialize + DeserializeOwned,
    A: ArrayLike<T, N> + ?Sized,
    C: Communicator,
{
    leading_axis::<N>()?;
    comm.check_rank(root)?;
    let shapes = agree_on_rows(comm, src.shape())?;
    debug!(rank = comm.rank(), root, shape = ?src.shape(), "gather");

    let blocks = comm.gather_values(src.to_vec(), root)?;
    if comm.rank() != root {
        return Ok(None);
    }
    let total = shapes.iter().map(|s| s[0]).sum();
    let data = blocks.into_iter().flatten().collect();
    Ok(Some(Array::from_vec(with_rows(src.shape(), total), data)?))
}

/// [`gather`] with the result delivered to every rank.
pub fn all_gather<T, const N: usize, A, C>(src: &A, comm: &C) -> Result<Array<T, N>>
where
    T: Clone + Serialize + DeserializeOwned,
    A: ArrayLike<T, N> + ?Sized,
    C: Communicator,
{
    leading_axis::<N>()?;
    let shapes = agree_on_rows(comm, src.shape())?;
    debug!(rank = comm.rank(), shape = ?src.shape(), "all_gather");

    let blocks = comm.all_gather_values(src.to_vec())?;
    let total = shapes.iter().map(|s| s[0]).sum();
    let data = blocks.into_iter().flatten().collect();
    Ok(Array::from_vec(with_rows(src.shape(), total), data)?)
}

// ============================================================================
// Broadcast
// ============================================================================

/// Copy the root's array to every rank.
///
/// A rank whose array already has the root's shape is overwritten in place,
/// so views of it see the new values. Otherwise its array is replaced by a
/// new one of the right shape.
pub fn broadcast<T, const N: usize, C>(array: &mut Array<T, N>, comm: &C, root: usize) -> Result<()>
where
    T: Clone + Serialize + DeserializeOwned,
    C: Communicator,
{
    comm.check_rank(root)?;
    let mut dims = array.shape().to_vec();
    comm.broadcast_value(&mut dims, root)?;
    let shape = to_shape::<N>(dims)?;
    debug!(rank = comm.rank(), root, shape = ?shape, "broadcast");

    let mut data = if comm.rank() == root { array.to_vec() } else { Vec::new() };
    comm.broadcast_value(&mut data, root)?;
    if comm.rank() == root {
        return Ok(());
    }

    let received = Array::from_vec(shape, data)?;
    if array.shape() == shape {
        array.assign(&received)?;
    } else {
        *array = received;
    }
    Ok(())
}

/// Copy the elements of the root's view into the views of all ranks.
///
/// Views cannot be resized, so all ranks must pass the same shape.
///
/// # Errors
/// [`NdaError::ShapeMismatch`] on every rank if the shapes differ.
pub fn broadcast_view<T, const N: usize, C>(
    view: &mut ArrayViewMut<'_, T, N>,
    comm: &C,
    root: usize,
) -> Result<()>
where
    T: Clone + Serialize + DeserializeOwned,
    C: Communicator,
{
    comm.check_rank(root)?;
    agree_on_shape(comm, view.shape())?;
    debug!(rank = comm.rank(), root, shape = ?view.shape(), "broadcast_view");

    let mut data = if comm.rank() == root { view.to_vec() } else { Vec::new() };
    comm.broadcast_value(&mut data, root)?;
    if comm.rank() != root {
        view.assign(&Array::from_vec(view.shape(), data)?)?;
    }
    Ok(())
}

// ============================================================================
// Reduce
// ============================================================================

fn reduce_impl<T, const N: usize, A, C, F>(
    src: &A,
    comm: &C,
    root: usize,
    combine: F,
) -> Result<Option<Array<T, N>>>
where
    T: Clone + Serialize + DeserializeOwned,
    A: ArrayLike<T, N> + ?Sized,
    C: Communicator,
    F: FnMut(&mut T, &T) -> Result<()>,
{
    comm.check_rank(root)?;
    agree_on_shape(comm, src.shape())?;
    comm
        .reduce_vec(src.to_vec(), root, combine)?
        .map(|data| Array::from_vec(src.shape(), data))
        .transpose()
        .map_err(MpiError::from)
}

fn all_reduce_impl<T, const N: usize, A, C, F>(src: &A, comm: &C, combine: F) -> Result<Array<T, N>>
where
    T: Clone + Serialize + DeserializeOwned,
    A: ArrayLike<T, N> + ?Sized,
    C: Communicator,
    F: FnMut(&mut T, &T) -> Result<()>,
{
    agree_on_shape(comm, src.shape())?;
    let mut data = comm
        .reduce_vec(src.to_vec(), ALL_ROOT, combine)?
        .unwrap_or_default();
    comm.broadcast_value(&mut data, ALL_ROOT)?;
    Ok(Array::from_vec(src.shape(), data)?)
}

fn check_op<T: Reducible>(op: ReduceOp) -> Result<()> {
    if !T::supports(op) {
        return Err(MpiError::UnsupportedOp {
            op,
            ty: std::any::type_name::<T>().to_string(),
        });
    }
    Ok(())
}

/// Combine the arrays of all ranks elementwise with `op`. The root gets
/// `Some(result)`, other ranks `None`.
///
/// Arrays of arrays are combined recursively ([`Reducible`]). The root folds
/// the contributions in ascending rank order starting from rank 0, whatever
/// the root.
///
/// # Errors
/// [`NdaError::ShapeMismatch`] on every rank if the shapes differ;
/// [`MpiError::UnsupportedOp`] if `op` is not defined for `T`.
pub fn reduce<T, const N: usize, A, C>(
    src: &A,
    comm: &C,
    root: usize,
    op: ReduceOp,
) -> Result<Option<Array<T, N>>>
where
    T: Reducible + Serialize + DeserializeOwned,
    A: ArrayLike<T, N> + ?Sized,
    C: Communicator,
{
    check_op::<T>(op)?;
    debug!(rank = comm.rank(), root, ?op, shape = ?src.shape(), "reduce");
    reduce_impl(src, comm, root, |a: &mut T, b: &T| a.combine(b, op))
}

/// [`reduce`] with the result delivered to every rank.
pub fn all_reduce<T, const N: usize, A, C>(src: &A, comm: &C, op: ReduceOp) -> Result<Array<T, N>>
where
    T: Reducible + Serialize + DeserializeOwned,
    A: ArrayLike<T, N> + ?Sized,
    C: Communicator,
{
    check_op::<T>(op)?;
    debug!(rank = comm.rank(), ?op, shape = ?src.shape(), "all_reduce");
    all_reduce_impl(src, comm, |a: &mut T, b: &T| a.combine(b, op))
}

/// [`reduce`] with a caller-supplied operator, `f(acc, rhs)` updating `acc`.
///
/// Like the built-in operators, `f` is applied to the leaf scalars
/// ([`Reducible::Leaf`]), recursing through arrays of arrays. It should be
/// associative and commutative.
///
/// # Errors
/// [`NdaError::ShapeMismatch`] on every rank if the shapes differ, at any
/// nesting level.
pub fn reduce_with<T, const N: usize, A, C, F>(
    src: &A,
    comm: &C,
    root: usize,
    mut f: F,
) -> Result<Option<Array<T, N>>>
where
    T: Reducible + Serialize + DeserializeOwned,
    A: ArrayLike<T, N> + ?Sized,
    C: Communicator,
    F: FnMut(&mut T::Leaf, &T::Leaf),
{
    debug!(rank = comm.rank(), root, shape = ?src.shape(), "reduce_with");
    reduce_impl(src, comm, root, |a: &mut T, b: &T| a.combine_with(b, &mut f))
}

/// [`reduce_with`] with the result delivered to every rank.
pub fn all_reduce_with<T, const N: usize, A, C, F>(
    src: &A,
    comm: &C,
    mut f: F,
) -> Result<Array<T, N>>
where
    T: Reducible + Serialize + DeserializeOwned,
    A: ArrayLike<T, N> + ?Sized,
    C: Communicator,
    F: FnMut(&mut T::Leaf, &T::Leaf),
{
    debug!(rank = comm.rank(), shape = ?src.shape(), "all_reduce_with");
    all_reduce_impl(src, comm, |a: &mut T, b: &T| a.combine_with(b, &mut f))
}
