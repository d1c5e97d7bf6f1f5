//! Regular arrays: the owning counterpart of the views.

use crate::idx_map::IndexMap;
use crate::storage::{ConstHandle, Handle, Storage};
use crate::view::{ArrayLike, ArrayView, ArrayViewMut};
use crate::{NdaError, Result};
use num_traits::Zero;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::Arc;

/// Owned multidimensional array.
///
/// The buffer is held through a shared handle, so views taken with
/// [`Array::view`] keep it alive on their own. Only the array may reallocate
/// ([`Array::resize`]); views taken earlier keep the old buffer.
///
/// `clone` is a deep copy. The serialized form is the shape followed by the
/// elements in row-major order, whatever the memory layout.
pub struct Array<T, const N: usize> {
    map: IndexMap<N>,
    storage: Arc<Storage<T>>,
}

impl<T, const N: usize> Array<T, N> {
    pub(crate) fn from_raw(map: IndexMap<N>, data: Vec<T>) -> Self {
        debug_assert!(map.validate(data.len()).is_ok());
        Self {
            map,
            storage: Arc::new(Storage::from_vec(data)),
        }
    }

    /// Create a row-major array from a buffer.
    ///
    /// # Errors
    /// Returns [`NdaError::ShapeMismatch`] if `data.len()` is not the product of `shape`.
    pub fn from_vec(shape: [usize; N], data: Vec<T>) -> Result<Self> {
        let map = IndexMap::new(shape);
        if map.size() != data.len() {
            return Err(NdaError::ShapeMismatch(vec![data.len()], shape.to_vec()));
        }
        Ok(Self::from_raw(map, data))
    }

    /// Create a row-major array with values produced by a function.
    pub fn from_fn(shape: [usize; N], f: impl FnMut([usize; N]) -> T) -> Self {
        let map = IndexMap::new(shape);
        let data = map.indices().map(f).collect();
        Self::from_raw(map, data)
    }

    /// Shared-policy view of the whole array. It keeps the buffer alive by
    /// itself, so it may outlive the array.
    pub fn view<'a>(&self) -> ArrayView<'a, T, N> {
        ArrayView::from_parts(self.map, ConstHandle::shared(Arc::clone(&self.storage)))
    }

    /// Shared-policy mutable view of the whole array.
    pub fn view_mut<'a>(&mut self) -> ArrayViewMut<'a, T, N> {
        ArrayViewMut::from_parts(self.map, Handle::shared(Arc::clone(&self.storage)))
    }

    /// Borrowed-policy view, tied to the lifetime of this array.
    pub fn borrowed_view(&self) -> ArrayView<'_, T, N> {
        ArrayView::from_parts(self.map, ConstHandle::borrowed(&self.storage))
    }

    /// Borrowed-policy mutable view, tied to the lifetime of this array.
    pub fn borrowed_view_mut(&mut self) -> ArrayViewMut<'_, T, N> {
        ArrayViewMut::from_parts(self.map, Handle::borrowed_ref(&self.storage))
    }

    /// Number of shared handles on the buffer, this array included.
    pub fn use_count(&self) -> usize {
        Arc::strong_count(&self.storage)
    }

    pub fn set(&mut self, index: [usize; N], value: T) {
        self.borrowed_view_mut().set(index, value);
    }

    pub fn map_inplace(&mut self, f: impl FnMut(&mut T)) {
        self.borrowed_view_mut().map_inplace(f);
    }

    pub fn assign_fn(&mut self, f: impl FnMut([usize; N]) -> T) {
        self.borrowed_view_mut().assign_fn(f);
    }

    /// Take the buffer back, in memory order.
    ///
    /// # Errors
    /// Returns [`NdaError::OwnershipViolation`] while views still share the buffer.
    pub fn into_vec(self) -> Result<Vec<T>> {
        Handle::shared(self.storage).into_vec()
    }
}

impl<T: Clone, const N: usize> Array<T, N> {
    /// Create a row-major array filled with `value`.
    pub fn from_elem(shape: [usize; N], value: T) -> Self {
        let map = IndexMap::new(shape);
        Self::from_raw(map, vec![value; map.size()])
    }

    /// Modify the element at `index`; see [`ArrayViewMut::update`].
    pub fn update<R>(&mut self, index: [usize; N], f: impl FnOnce(&mut T) -> R) -> R {
        self.borrowed_view_mut().update(index, f)
    }

    pub fn fill(&mut self, value: T) {
        self.borrowed_view_mut().fill(value);
    }

    /// Copy the elements of `src` into this array; see [`ArrayViewMut::assign`].
    pub fn assign<A>(&mut self, src: &A) -> Result<()>
    where
        A: ArrayLike<T, N> + ?Sized,
    {
        self.borrowed_view_mut().assign(src)
    }
}

impl<T: Zero + Clone, const N: usize> Array<T, N> {
    pub fn zeros(shape: [usize; N]) -> Self {
        Self::from_elem(shape, T::zero())
    }
}

impl<T: Default, const N: usize> Array<T, N> {
    /// Create a row-major array filled with default values.
    pub fn new(shape: [usize; N]) -> Self {
        Self::with_map(IndexMap::new(shape))
    }

    /// Create a default-filled array with an explicit dimension ordering.
    ///
    /// See [`IndexMap::with_order`].
    pub fn with_order(shape: [usize; N], order: [usize; N]) -> Result<Self> {
        Ok(Self::with_map(IndexMap::with_order(shape, order)?))
    }

    fn with_map(map: IndexMap<N>) -> Self {
        Self {
            map,
            storage: Arc::new(Storage::from_vec(
                std::iter::repeat_with(T::default).take(map.size()).collect(),
            )),
        }
    }

    /// Reallocate to `shape` (row-major, default-filled) unless the shape is unchanged.
    ///
    /// Views taken before the call keep the previous buffer.
    pub fn resize(&mut self, shape: [usize; N]) {
        if *self.map.shape() != shape {
            *self = Self::new(shape);
        }
    }
}

impl<T, const N: usize> ArrayLike<T, N> for Array<T, N> {
    #[inline]
    fn indexmap(&self) -> &IndexMap<N> {
        &self.map
    }

    #[inline]
    fn storage(&self) -> &Storage<T> {
        &self.storage
    }

    fn share(&self) -> ConstHandle<'_, T> {
        ConstHandle::shared(Arc::clone(&self.storage))
    }
}

impl<T: Default, const N: usize> Default for Array<T, N> {
    fn default() -> Self {
        Self::new([0; N])
    }
}

impl<T: Clone, const N: usize> Clone for Array<T, N> {
    fn clone(&self) -> Self {
        Self::from_raw(self.map, self.storage.read().clone())
    }
}

impl<T: Clone + PartialEq, const N: usize> PartialEq for Array<T, N> {
    fn eq(&self, other: &Self) -> bool {
        self.shape() == other.shape() && self.to_vec() == other.to_vec()
    }
}

impl<T: std::fmt::Debug, const N: usize> std::fmt::Debug for Array<T, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Array")
            .field("shape", self.map.shape())
            .field("strides", self.map.strides())
            .field("data", &*self.storage.read())
            .finish()
    }
}

impl<T: Clone, const N: usize> From<ArrayView<'_, T, N>> for Array<T, N> {
    fn from(view: ArrayView<'_, T, N>) -> Self {
        view.to_array()
    }
}

#[derive(Serialize, Deserialize)]
struct ArrayRepr<T> {
    shape: Vec<usize>,
    data: Vec<T>,
}

impl<T: Serialize + Clone, const N: usize> Serialize for Array<T, N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        ArrayRepr {
            shape: self.shape().to_vec(),
            data: self.to_vec(),
        }
        .serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>, const N: usize> Deserialize<'de> for Array<T, N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let repr = ArrayRepr::<T>::deserialize(deserializer)?;
        let shape = <[usize; N]>::try_from(repr.shape)
            .map_err(|shape| D::Error::custom(NdaError::RankMismatch(shape.len(), N)))?;
        Array::from_vec(shape, repr.data).map_err(D::Error::custom)
    }
}
