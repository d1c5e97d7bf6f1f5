//! Storage handles: who owns the buffer behind a view, and who may write it.
//!
//! A [`Storage`] is one heap buffer. A handle refers to it under one of two
//! policies:
//!
//! - [`MemPolicy::Borrowed`]: a plain reference. The lifetime `'a` ties the
//!   handle to the owner of the storage, so it can never outlive the memory and
//!   never frees it.
//! - [`MemPolicy::Shared`]: a reference-counted owner. Cloning bumps the count,
//!   and the buffer is released when the last shared handle is dropped.
//!
//! Write access is a capability of the handle type: [`Handle`] backs mutable
//! views, [`ConstHandle`] backs const views and only ever reads. A `Handle`
//! widens into a `ConstHandle`; nothing converts back. A borrowed `Handle` can
//! only be made from `&mut Storage`.
//!
//! The buffer sits behind a read-write lock so that several aliasing mutable
//! views can write through shared references.

use crate::{NdaError, Result};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// Ownership policy of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemPolicy {
    Borrowed,
    Shared,
}

/// A contiguous element buffer.
#[derive(Debug, Default)]
pub struct Storage<T> {
    data: RwLock<Vec<T>>,
}

impl<T> Storage<T> {
    pub fn from_vec(data: Vec<T>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Number of elements in the buffer.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<T>> {
        self.data.read()
    }

    #[inline]
    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Vec<T>> {
        self.data.write()
    }

    fn into_vec(self) -> Vec<T> {
        self.data.into_inner()
    }
}

#[derive(Debug)]
enum Repr<'a, T> {
    Borrowed(&'a Storage<T>),
    Shared(Arc<Storage<T>>),
}

impl<T> Clone for Repr<'_, T> {
    fn clone(&self) -> Self {
        match self {
            Repr::Borrowed(storage) => Repr::Borrowed(storage),
            Repr::Shared(storage) => Repr::Shared(Arc::clone(storage)),
        }
    }
}

impl<T> Repr<'_, T> {
    #[inline]
    fn storage(&self) -> &Storage<T> {
        match self {
            Repr::Borrowed(storage) => storage,
            Repr::Shared(storage) => storage,
        }
    }
}

/// Reference to a [`Storage`] with write access, backing mutable views.
#[derive(Debug)]
pub struct Handle<'a, T> {
    repr: Repr<'a, T>,
}

/// Read-only reference to a [`Storage`], backing const views.
#[derive(Debug)]
pub struct ConstHandle<'a, T> {
    repr: Repr<'a, T>,
}

macro_rules! impl_handle_common {
    ($name:ident) => {
        impl<T> Clone for $name<'_, T> {
            fn clone(&self) -> Self {
                Self {
                    repr: self.repr.clone(),
                }
            }
        }

        impl<T> AsRef<Storage<T>> for $name<'_, T> {
            fn as_ref(&self) -> &Storage<T> {
                self.repr.storage()
            }
        }

        impl<'a, T> $name<'a, T> {
            pub(crate) fn shared(storage: Arc<Storage<T>>) -> Self {
                Self {
                    repr: Repr::Shared(storage),
                }
            }

            pub fn policy(&self) -> MemPolicy {
                match self.repr {
                    Repr::Borrowed(_) => MemPolicy::Borrowed,
                    Repr::Shared(_) => MemPolicy::Shared,
                }
            }

            /// The referenced buffer.
            #[inline]
            pub fn storage(&self) -> &Storage<T> {
                self.repr.storage()
            }

            /// Number of elements in the referenced buffer.
            pub fn len(&self) -> usize {
                self.storage().len()
            }

            pub fn is_empty(&self) -> bool {
                self.storage().is_empty()
            }

            /// Number of shared handles keeping the buffer alive; `None` when borrowed.
            pub fn use_count(&self) -> Option<usize> {
                match &self.repr {
                    Repr::Borrowed(_) => None,
                    Repr::Shared(storage) => Some(Arc::strong_count(storage)),
                }
            }

            /// Whether both refer to the same buffer, whatever their policy
            /// or capability.
            pub fn ptr_eq<H>(&self, other: &H) -> bool
            where
                H: AsRef<Storage<T>> + ?Sized,
            {
                std::ptr::eq(self.storage(), other.as_ref())
            }

            #[inline]
            pub fn read(&self) -> RwLockReadGuard<'_, Vec<T>> {
                self.storage().read()
            }
        }
    };
}

impl_handle_common!(Handle);
impl_handle_common!(ConstHandle);

impl<'a, T> Handle<'a, T> {
    /// Non-owning handle on `storage`. Clone it for further aliasing views.
    pub fn borrowed(storage: &'a mut Storage<T>) -> Self {
        Self::borrowed_ref(storage)
    }

    /// Borrowed handle on storage whose owner already holds write rights.
    pub(crate) fn borrowed_ref(storage: &'a Storage<T>) -> Self {
        Self {
            repr: Repr::Borrowed(storage),
        }
    }

    /// Take sole ownership of `data`.
    pub fn from_vec(data: Vec<T>) -> Self {
        Self::shared(Arc::new(Storage::from_vec(data)))
    }

    /// Allocate `count` default-initialized elements under sole ownership.
    pub fn alloc(count: usize) -> Self
    where
        T: Default,
    {
        Self::from_vec(std::iter::repeat_with(T::default).take(count).collect())
    }

    #[inline]
    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Vec<T>> {
        self.storage().write()
    }

    /// Reclaim the buffer. Only the last shared handle owns it outright.
    pub fn into_vec(self) -> Result<Vec<T>> {
        match self.repr {
            Repr::Borrowed(_) => Err(NdaError::OwnershipViolation(
                "a borrowed handle does not own its buffer".into(),
            )),
            Repr::Shared(storage) => Arc::try_unwrap(storage)
                .map(Storage::into_vec)
                .map_err(|_| {
                    NdaError::OwnershipViolation(
                        "buffer is still referenced by other handles".into(),
                    )
                }),
        }
    }
}

impl<'a, T> ConstHandle<'a, T> {
    /// Non-owning read-only handle on `storage`.
    pub fn borrowed(storage: &'a Storage<T>) -> Self {
        Self {
            repr: Repr::Borrowed(storage),
        }
    }
}

impl<'a, T> From<Handle<'a, T>> for ConstHandle<'a, T> {
    fn from(handle: Handle<'a, T>) -> Self {
        Self { repr: handle.repr }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_is_sole_owner() {
        let h = Handle::<f64>::alloc(4);
        assert_eq!(h.policy(), MemPolicy::Shared);
        assert_eq!(h.len(), 4);
        assert_eq!(h.use_count(), Some(1));
        assert_eq!(*h.read(), vec![0.0; 4]);
    }

    #[test]
    fn test_shared_clone_counts_references() {
        let h = Handle::from_vec(vec![1, 2, 3]);
        let h2 = h.clone();
        assert_eq!(h.use_count(), Some(2));
        assert!(h.ptr_eq(&h2));

        h2.write()[0] = 10;
        assert_eq!(h.read()[0], 10);

        drop(h2);
        assert_eq!(h.use_count(), Some(1));
    }

    #[test]
    fn test_buffer_released_with_last_handle() {
        let h = Handle::from_vec(vec![1, 2, 3]);
        let weak = match &h.repr {
            Repr::Shared(arc) => Arc::downgrade(arc),
            Repr::Borrowed(_) => unreachable!(),
        };
        let h2 = ConstHandle::from(h.clone());
        drop(h);
        assert!(weak.upgrade().is_some());
        drop(h2);
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_borrowed_handle() {
        let mut storage = Storage::from_vec(vec![1.0, 2.0]);
        {
            let b = Handle::borrowed(&mut storage);
            let b2 = b.clone();
            assert_eq!(b.policy(), MemPolicy::Borrowed);
            assert_eq!(b.use_count(), None);
            assert!(b.ptr_eq(&b2));
            b2.write()[1] = 5.0;
        }
        assert_eq!(*storage.read(), vec![1.0, 5.0]);

        let c = ConstHandle::borrowed(&storage);
        assert_eq!(c.policy(), MemPolicy::Borrowed);
        assert_eq!(c.read()[1], 5.0);
    }

    #[test]
    fn test_const_handle_keeps_policy_and_buffer() {
        let h = Handle::from_vec(vec![7u8]);
        let c = ConstHandle::from(h.clone());
        assert_eq!(c.policy(), MemPolicy::Shared);
        assert!(c.ptr_eq(&h));
        assert_eq!(h.use_count(), Some(2));
    }

    #[test]
    fn test_into_vec_requires_sole_ownership() {
        let mut storage = Storage::from_vec(vec![1u8]);
        assert!(matches!(
            Handle::borrowed(&mut storage).into_vec(),
            Err(NdaError::OwnershipViolation(_))
        ));

        let h = Handle::from_vec(vec![1u8, 2]);
        let h2 = h.clone();
        assert!(matches!(h.into_vec(), Err(NdaError::OwnershipViolation(_))));
        assert_eq!(h2.into_vec().unwrap(), vec![1, 2]);
    }
}
