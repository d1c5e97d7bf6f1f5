//! Array views: an [`IndexMap`] coupled with a storage [`Handle`].
//!
//! This module provides [`ArrayView`] and [`ArrayViewMut`]:
//!
//! - Const-generic rank for type safety
//! - Zero-copy transformations (slice, permute, transpose)
//! - `clone` copies the *view* and aliases the buffer; [`ArrayViewMut::assign`]
//!   copies values
//! - Capability in the type: a mutable view widens to a const view, never the
//!   other way around

use crate::array::Array;
use crate::idx_map::{IndexMap, SliceArg};
use crate::storage::{ConstHandle, Handle, Storage};
use crate::NdaError;
use crate::Result;

/// Anything that exposes an index map and a storage handle.
///
/// Views can be built from any implementor without copying
/// ([`ArrayView::from_array_like`]), and every implementor gets the read
/// operations below.
pub trait ArrayLike<T, const N: usize> {
    fn indexmap(&self) -> &IndexMap<N>;

    /// The underlying buffer, readable only.
    fn storage(&self) -> &Storage<T>;

    /// A new read-only handle on the underlying buffer, aliasing it.
    fn share(&self) -> ConstHandle<'_, T>;

    #[inline]
    fn shape(&self) -> [usize; N] {
        *self.indexmap().shape()
    }

    #[inline]
    fn extent(&self, dim: usize) -> usize {
        self.indexmap().extent(dim)
    }

    /// Total number of elements.
    #[inline]
    fn len(&self) -> usize {
        self.indexmap().size()
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.indexmap().is_empty()
    }

    /// Get a copy of the element at `index`.
    ///
    /// # Panics
    /// Panics if the computed offset falls outside the buffer. Indices
    /// outside the shape but inside the buffer are only caught with the
    /// `bounds-check` feature.
    #[inline]
    fn get(&self, index: [usize; N]) -> T
    where
        T: Clone,
    {
        let pos = self.indexmap().offset_of(&index);
        self.storage().read()[pos].clone()
    }

    /// Get a copy of the element at `index`, checking it against the shape.
    fn try_get(&self, index: [usize; N]) -> Result<T>
    where
        T: Clone,
    {
        let pos = self.indexmap().checked_offset(&index)?;
        Ok(self.storage().read()[pos].clone())
    }

    /// Copy all elements out in row-major order.
    fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        let map = self.indexmap();
        let data = self.storage().read();
        map.indices()
            .map(|index| data[map.offset_of(&index)].clone())
            .collect()
    }

    /// Deep copy into a new row-major [`Array`].
    fn to_array(&self) -> Array<T, N>
    where
        T: Clone,
    {
        Array::from_raw(IndexMap::new(self.shape()), self.to_vec())
    }
}

// ============================================================================
// ArrayView
// ============================================================================

/// A read-only view over a buffer.
///
/// # Type Parameters
/// - `'a`: Lifetime of a borrowed buffer (unconstrained for shared views)
/// - `T`: Element type
/// - `N`: Number of dimensions (const generic)
///
/// A const view holds a [`ConstHandle`], so no mutable view can be built
/// from it:
///
/// ```compile_fail
/// use nda_view::{Array, ArrayLike, ArrayViewMut};
///
/// let a = Array::from_vec([3], vec![1, 2, 3]).unwrap();
/// let ro = a.view();
/// let _rw = ArrayViewMut::new(*ro.indexmap(), ro.handle().clone());
/// ```
///
/// and its buffer cannot be written directly either:
///
/// ```compile_fail
/// use nda_view::{Array, ArrayLike};
///
/// let a = Array::from_vec([3], vec![1, 2, 3]).unwrap();
/// let ro = a.view();
/// ro.storage().write()[1] = 200;
/// ```
///
/// ```compile_fail
/// use nda_view::{Array, ArrayLike, ArrayViewMut, Handle};
///
/// let a = Array::from_vec([3], vec![1, 2, 3]).unwrap();
/// let ro = a.view();
/// let _rw = ArrayViewMut::new(*ro.indexmap(), Handle::borrowed(ro.storage()));
/// ```
pub struct ArrayView<'a, T, const N: usize> {
    map: IndexMap<N>,
    handle: ConstHandle<'a, T>,
}

/// A mutable view over a buffer.
///
/// Same as [`ArrayView`] but allows mutation.
pub struct ArrayViewMut<'a, T, const N: usize> {
    map: IndexMap<N>,
    handle: Handle<'a, T>,
}

impl<T, const N: usize> Clone for ArrayView<'_, T, N> {
    fn clone(&self) -> Self {
        Self {
            map: self.map,
            handle: self.handle.clone(),
        }
    }
}

impl<T, const N: usize> Clone for ArrayViewMut<'_, T, N> {
    fn clone(&self) -> Self {
        Self {
            map: self.map,
            handle: self.handle.clone(),
        }
    }
}

impl<T, const N: usize> std::fmt::Debug for ArrayView<'_, T, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayView")
            .field("shape", self.map.shape())
            .field("strides", self.map.strides())
            .field("offset", &self.map.offset())
            .field("policy", &self.handle.policy())
            .finish()
    }
}

impl<T, const N: usize> std::fmt::Debug for ArrayViewMut<'_, T, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayViewMut")
            .field("shape", self.map.shape())
            .field("strides", self.map.strides())
            .field("offset", &self.map.offset())
            .field("policy", &self.handle.policy())
            .finish()
    }
}

impl<T, const N: usize> ArrayLike<T, N> for ArrayView<'_, T, N> {
    #[inline]
    fn indexmap(&self) -> &IndexMap<N> {
        &self.map
    }

    #[inline]
    fn storage(&self) -> &Storage<T> {
        self.handle.storage()
    }

    fn share(&self) -> ConstHandle<'_, T> {
        self.handle.clone()
    }
}

impl<T, const N: usize> ArrayLike<T, N> for ArrayViewMut<'_, T, N> {
    #[inline]
    fn indexmap(&self) -> &IndexMap<N> {
        &self.map
    }

    #[inline]
    fn storage(&self) -> &Storage<T> {
        self.handle.storage()
    }

    fn share(&self) -> ConstHandle<'_, T> {
        self.handle.clone().into()
    }
}

impl<'a, T, const N: usize> ArrayView<'a, T, N> {
    /// Create a view from an index map and a storage handle. A writable
    /// [`Handle`] is accepted too and loses its write access.
    ///
    /// # Errors
    /// Returns an error if the index map addresses memory outside the buffer.
    pub fn new(map: IndexMap<N>, handle: impl Into<ConstHandle<'a, T>>) -> Result<Self> {
        let handle = handle.into();
        map.validate(handle.len())?;
        Ok(Self { map, handle })
    }

    /// Pair a layout with a handle it is already known to fit.
    pub(crate) fn from_parts(map: IndexMap<N>, handle: ConstHandle<'a, T>) -> Self {
        debug_assert!(map.validate(handle.len()).is_ok());
        Self { map, handle }
    }

    /// The read-only storage handle this view holds.
    #[inline]
    pub fn handle(&self) -> &ConstHandle<'a, T> {
        &self.handle
    }

    /// View the buffer of any array-like object, without copying.
    pub fn from_array_like<A>(src: &'a A) -> Self
    where
        A: ArrayLike<T, N> + ?Sized,
    {
        Self {
            map: *src.indexmap(),
            handle: src.share(),
        }
    }

    /// Point this view at the layout and buffer of `other`.
    pub fn rebind(&mut self, other: &ArrayView<'a, T, N>) {
        self.map = other.map;
        self.handle = other.handle.clone();
    }

    /// Point this view at the layout and buffer of a mutable view.
    pub fn rebind_mut(&mut self, other: &ArrayViewMut<'a, T, N>) {
        self.map = other.map;
        self.handle = other.handle.clone().into();
    }

    /// Restrict the view; see [`IndexMap::slice`].
    pub fn slice<const M: usize>(&self, args: &[SliceArg]) -> Result<ArrayView<'a, T, M>> {
        Ok(ArrayView {
            map: self.map.slice(args)?,
            handle: self.handle.clone(),
        })
    }

    /// Permute dimensions.
    pub fn permute(&self, perm: [usize; N]) -> Result<Self> {
        Ok(Self {
            map: self.map.permute(perm)?,
            handle: self.handle.clone(),
        })
    }

    /// Reverse all dimensions. Zero-copy.
    pub fn transpose(&self) -> Self {
        Self {
            map: self.map.transpose(),
            handle: self.handle.clone(),
        }
    }
}

impl<'a, T, const N: usize> From<ArrayViewMut<'a, T, N>> for ArrayView<'a, T, N> {
    fn from(view: ArrayViewMut<'a, T, N>) -> Self {
        Self {
            map: view.map,
            handle: view.handle.into(),
        }
    }
}

// ============================================================================
// ArrayViewMut
// ============================================================================

impl<'a, T, const N: usize> ArrayViewMut<'a, T, N> {
    /// Create a mutable view from an index map and a storage handle.
    ///
    /// # Errors
    /// Returns an error if the index map addresses memory outside the buffer.
    pub fn new(map: IndexMap<N>, handle: Handle<'a, T>) -> Result<Self> {
        map.validate(handle.len())?;
        Ok(Self { map, handle })
    }

    /// Pair a layout with a handle it is already known to fit.
    pub(crate) fn from_parts(map: IndexMap<N>, handle: Handle<'a, T>) -> Self {
        debug_assert!(map.validate(handle.len()).is_ok());
        Self { map, handle }
    }

    /// The storage handle this view holds.
    #[inline]
    pub fn handle(&self) -> &Handle<'a, T> {
        &self.handle
    }

    /// Widen to a read-only view of the same elements.
    pub fn as_view(&self) -> ArrayView<'a, T, N> {
        ArrayView {
            map: self.map,
            handle: self.handle.clone().into(),
        }
    }

    /// Point this view at the layout and buffer of `other`.
    pub fn rebind(&mut self, other: &ArrayViewMut<'a, T, N>) {
        self.map = other.map;
        self.handle = other.handle.clone();
    }

    /// Restrict the view; see [`IndexMap::slice`].
    pub fn slice_mut<const M: usize>(&self, args: &[SliceArg]) -> Result<ArrayViewMut<'a, T, M>> {
        Ok(ArrayViewMut {
            map: self.map.slice(args)?,
            handle: self.handle.clone(),
        })
    }

    /// Permute dimensions.
    pub fn permute(&self, perm: [usize; N]) -> Result<Self> {
        Ok(Self {
            map: self.map.permute(perm)?,
            handle: self.handle.clone(),
        })
    }

    /// Reverse all dimensions. Zero-copy.
    pub fn transpose(&self) -> Self {
        Self {
            map: self.map.transpose(),
            handle: self.handle.clone(),
        }
    }

    /// Set the element at `index`.
    ///
    /// # Panics
    /// Panics if the computed offset falls outside the buffer.
    #[inline]
    pub fn set(&mut self, index: [usize; N], value: T) {
        let pos = self.map.offset_of(&index);
        self.handle.write()[pos] = value;
    }

    /// Set the element at `index`, checking it against the shape.
    pub fn try_set(&mut self, index: [usize; N], value: T) -> Result<()> {
        let pos = self.map.checked_offset(&index)?;
        self.handle.write()[pos] = value;
        Ok(())
    }

    /// Modify the element at `index`.
    ///
    /// `f` works on a copy of the element, so it may read views aliasing
    /// this buffer; the result is written back afterwards.
    pub fn update<R>(&mut self, index: [usize; N], f: impl FnOnce(&mut T) -> R) -> R
    where
        T: Clone,
    {
        let pos = self.map.offset_of(&index);
        let mut value = self.handle.read()[pos].clone();
        let out = f(&mut value);
        self.handle.write()[pos] = value;
        out
    }

    /// Write `value` into every element.
    pub fn fill(&mut self, value: T)
    where
        T: Clone,
    {
        let mut data = self.handle.write();
        for index in self.map.indices() {
            data[self.map.offset_of(&index)] = value.clone();
        }
    }

    /// Write `f(index)` into every element, in row-major order.
    ///
    /// All values are computed before the first write, so `f` may read
    /// views aliasing this buffer.
    pub fn assign_fn(&mut self, f: impl FnMut([usize; N]) -> T) {
        let values: Vec<T> = self.map.indices().map(f).collect();
        let mut data = self.handle.write();
        for (index, value) in self.map.indices().zip(values) {
            data[self.map.offset_of(&index)] = value;
        }
    }

    /// Apply `f` to every element in place.
    ///
    /// # Deadlocks
    /// The buffer stays locked while `f` runs: `f` must not touch views
    /// aliasing it.
    pub fn map_inplace(&mut self, mut f: impl FnMut(&mut T)) {
        let mut data = self.handle.write();
        for index in self.map.indices() {
            f(&mut data[self.map.offset_of(&index)]);
        }
    }

    /// Copy the elements of `src` into this view.
    ///
    /// For every index of this view, `self[index] = src[index]`. The source
    /// must be at least as large as this view in every dimension. A source
    /// sharing this view's buffer is read completely before anything is
    /// written.
    ///
    /// # Errors
    /// Returns [`NdaError::ShapeMismatch`] if `src` is smaller in some dimension.
    pub fn assign<A>(&mut self, src: &A) -> Result<()>
    where
        A: ArrayLike<T, N> + ?Sized,
        T: Clone,
    {
        let src_map = *src.indexmap();
        if src_map
            .shape()
            .iter()
            .zip(self.map.shape().iter())
            .any(|(s, d)| s < d)
        {
            return Err(NdaError::ShapeMismatch(
                src_map.shape().to_vec(),
                self.map.shape().to_vec(),
            ));
        }

        let src_storage = src.storage();
        if std::ptr::eq(self.handle.storage(), src_storage) {
            let values: Vec<T> = {
                let data = src_storage.read();
                self.map
                    .indices()
                    .map(|index| data[src_map.offset_of(&index)].clone())
                    .collect()
            };
            let mut data = self.handle.write();
            for (index, value) in self.map.indices().zip(values) {
                data[self.map.offset_of(&index)] = value;
            }
        } else {
            let src_data = src_storage.read();
            let mut data = self.handle.write();
            for index in self.map.indices() {
                data[self.map.offset_of(&index)] = src_data[src_map.offset_of(&index)].clone();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemPolicy, Storage};
    use crate::{s, Ellipsis};

    fn iota(n: usize) -> Handle<'static, i32> {
        Handle::from_vec((0..n as i32).collect())
    }

    #[test]
    fn test_new_view() {
        let view = ArrayView::new(IndexMap::new([2, 3]), iota(6)).unwrap();
        assert_eq!(view.shape(), [2, 3]);
        assert_eq!(view.len(), 6);
        assert_eq!(view.get([1, 2]), 5);
    }

    #[test]
    fn test_new_view_rejects_overrun() {
        let err = ArrayView::new(IndexMap::new([2, 3]), iota(5)).unwrap_err();
        assert!(matches!(err, NdaError::BufferOverrun { .. }));
    }

    #[test]
    fn test_negative_stride() {
        let view = ArrayView::new(IndexMap::from_parts([4], [-1], 3), iota(4)).unwrap();
        assert_eq!(view.to_vec(), vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_try_get_out_of_range() {
        let view = ArrayView::new(IndexMap::new([2, 3]), iota(6)).unwrap();
        assert_eq!(view.try_get([1, 1]), Ok(4));
        assert!(matches!(
            view.try_get([0, 3]),
            Err(NdaError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_shallow_copy_aliases() {
        let mut a = ArrayViewMut::new(IndexMap::new([2, 2]), iota(4)).unwrap();
        let mut b = a.clone();
        b.set([0, 1], 42);
        assert_eq!(a.get([0, 1]), 42);
        a.set([1, 1], -7);
        assert_eq!(b.get([1, 1]), -7);
    }

    #[test]
    fn test_assign_copies_values() {
        let src = ArrayView::new(IndexMap::new([2, 2]), iota(4)).unwrap();
        let mut dst = ArrayViewMut::new(IndexMap::new([2, 2]), Handle::alloc(4)).unwrap();
        dst.assign(&src).unwrap();
        assert_eq!(dst.to_vec(), vec![0, 1, 2, 3]);
        dst.set([0, 0], 100);
        assert_eq!(src.get([0, 0]), 0);
    }

    #[test]
    fn test_assign_from_larger_source() {
        let src = ArrayView::new(IndexMap::new([3, 3]), iota(9)).unwrap();
        let mut dst = ArrayViewMut::new(IndexMap::new([2, 2]), Handle::alloc(4)).unwrap();
        dst.assign(&src).unwrap();
        assert_eq!(dst.to_vec(), vec![0, 1, 3, 4]);
    }

    #[test]
    fn test_assign_shape_mismatch() {
        let src = ArrayView::new(IndexMap::new([2, 1]), iota(2)).unwrap();
        let mut dst = ArrayViewMut::new(IndexMap::new([2, 2]), Handle::alloc(4)).unwrap();
        assert_eq!(
            dst.assign(&src),
            Err(NdaError::ShapeMismatch(vec![2, 1], vec![2, 2]))
        );
    }

    #[test]
    fn test_assign_transposed_self() {
        let mut m = ArrayViewMut::new(IndexMap::new([2, 2]), iota(4)).unwrap();
        let t = m.as_view().transpose();
        m.assign(&t).unwrap();
        assert_eq!(m.to_vec(), vec![0, 2, 1, 3]);
    }

    #[test]
    fn test_slice_aliases_parent() {
        let m = ArrayViewMut::new(IndexMap::new([3, 4]), iota(12)).unwrap();
        let mut col = m.slice_mut::<1>(&s![.., 1]).unwrap();
        assert_eq!(col.to_vec(), vec![1, 5, 9]);
        col.fill(0);
        assert_eq!(m.get([2, 1]), 0);
        assert_eq!(m.get([2, 2]), 10);
    }

    #[test]
    fn test_slice_of_slice_matches_translated_index() {
        let v = ArrayView::new(IndexMap::new([4, 5, 6]), iota(120)).unwrap();
        let s1 = v.slice::<3>(&s![1.., Ellipsis, 2..5]).unwrap();
        let s2 = s1.slice::<2>(&s![.., 3, ..]).unwrap();
        for [i, k] in s2.indexmap().indices() {
            assert_eq!(s2.get([i, k]), v.get([i + 1, 3, k + 2]));
        }
    }

    #[test]
    fn test_permute_view() {
        let v = ArrayView::new(IndexMap::new([2, 3]), iota(6)).unwrap();
        let p = v.permute([1, 0]).unwrap();
        assert_eq!(p.shape(), [3, 2]);
        assert_eq!(p.get([2, 1]), 5);
        assert_eq!(p.to_vec(), vec![0, 3, 1, 4, 2, 5]);
    }

    #[test]
    fn test_widening_and_rebind() {
        let m = ArrayViewMut::new(IndexMap::new([2]), iota(2)).unwrap();
        let other = ArrayViewMut::new(IndexMap::new([3]), iota(3)).unwrap();

        let mut c: ArrayView<'_, i32, 1> = m.clone().into();
        assert_eq!(c.to_vec(), vec![0, 1]);
        c.rebind_mut(&other);
        assert_eq!(c.to_vec(), vec![0, 1, 2]);
        c.rebind(&m.as_view());
        assert_eq!(c.shape(), [2]);

        let mut w = m.clone();
        w.rebind(&other);
        w.set([2], 9);
        assert_eq!(other.get([2]), 9);
        // The view that was rebound leaves independent views untouched.
        assert_eq!(m.shape(), [2]);
    }

    #[test]
    fn test_borrowed_view() {
        let mut storage = Storage::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
        {
            let mut v =
                ArrayViewMut::new(IndexMap::new([2, 2]), Handle::borrowed(&mut storage)).unwrap();
            assert_eq!(v.handle().policy(), MemPolicy::Borrowed);
            v.map_inplace(|x| *x *= 10.0);
        }
        assert_eq!(*storage.read(), vec![10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn test_assign_fn_and_update() {
        let mut v = ArrayViewMut::new(IndexMap::col_major([2, 3]), Handle::alloc(6)).unwrap();
        v.assign_fn(|[i, j]| (10 * i + j) as i32);
        assert_eq!(v.to_vec(), vec![0, 1, 2, 10, 11, 12]);
        assert_eq!(*v.handle().read(), vec![0, 10, 1, 11, 2, 12]);
        let old = v.update([1, 2], |x| std::mem::replace(x, -1));
        assert_eq!(old, 12);
        assert_eq!(v.get([1, 2]), -1);
    }

    #[test]
    fn test_const_view_handle_is_read_only_alias() {
        let m = ArrayViewMut::new(IndexMap::new([2]), iota(2)).unwrap();
        let ro = m.as_view();
        let h: ConstHandle<'_, i32> = ro.handle().clone();
        assert!(h.ptr_eq(m.handle()));
        assert_eq!(h.policy(), MemPolicy::Shared);
        assert_eq!(*h.read(), vec![0, 1]);

        let from_storage =
            ArrayView::new(IndexMap::new([2]), ConstHandle::borrowed(ro.storage())).unwrap();
        assert_eq!(from_storage.to_vec(), vec![0, 1]);
    }

    #[test]
    fn test_update_may_read_aliasing_view() {
        let mut v = ArrayViewMut::new(IndexMap::new([3]), iota(3)).unwrap();
        let alias = v.as_view();
        v.update([0], |x| *x += alias.get([2]));
        assert_eq!(v.to_vec(), vec![2, 1, 2]);
    }

    #[test]
    fn test_assign_fn_may_read_aliasing_view() {
        let mut v = ArrayViewMut::new(IndexMap::new([3]), iota(3)).unwrap();
        let alias = v.clone();
        v.assign_fn(|[i]| alias.get([2 - i]) * 10);
        assert_eq!(v.to_vec(), vec![20, 10, 0]);
    }

    #[test]
    fn test_from_array_like_shares_buffer() {
        let m = ArrayViewMut::new(IndexMap::new([3]), iota(3)).unwrap();
        let v = ArrayView::from_array_like(&m);
        assert!(v.handle().ptr_eq(m.handle()));
        assert_eq!(m.handle().use_count(), Some(2));
    }
}
