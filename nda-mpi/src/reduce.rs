//! Built-in reduce operators and the element types they apply to.

use crate::{MpiError, Result};
use nda_view::{Array, ArrayLike, NdaError};
use num_complex::Complex;
use serde::{Deserialize, Serialize};

/// Built-in elementwise combination operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReduceOp {
    Sum,
    Min,
    Max,
}

/// Element types that can be combined by a [`ReduceOp`].
///
/// Arrays of reducible elements are reducible themselves: the operator is
/// applied element by element, recursing into nested arrays down to the
/// [`Leaf`](Reducible::Leaf) scalars.
pub trait Reducible: Clone {
    /// The scalar type at the bottom of the nesting.
    type Leaf;

    /// Whether `op` is defined for this type.
    fn supports(op: ReduceOp) -> bool {
        let _ = op;
        true
    }

    /// `self = op(self, other)`.
    fn combine(&mut self, other: &Self, op: ReduceOp) -> Result<()>;

    /// Apply `f(acc, rhs)` to each pair of matching leaves.
    ///
    /// # Errors
    /// [`NdaError::ShapeMismatch`] if nested arrays differ in shape.
    fn combine_with<F>(&mut self, other: &Self, f: &mut F) -> Result<()>
    where
        F: FnMut(&mut Self::Leaf, &Self::Leaf);
}

macro_rules! impl_reducible_ord {
    ($($t:ty),*) => {$(
        impl Reducible for $t {
            type Leaf = $t;

            #[inline]
            fn combine(&mut self, other: &Self, op: ReduceOp) -> Result<()> {
                match op {
                    ReduceOp::Sum => *self += *other,
                    ReduceOp::Min => *self = (*self).min(*other),
                    ReduceOp::Max => *self = (*self).max(*other),
                }
                Ok(())
            }

            #[inline]
            fn combine_with<F>(&mut self, other: &Self, f: &mut F) -> Result<()>
            where
                F: FnMut(&mut $t, &$t),
            {
                f(self, other);
                Ok(())
            }
        }
    )*};
}

impl_reducible_ord!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);

impl<T: Reducible> Reducible for Complex<T> {
    type Leaf = Complex<T>;

    fn supports(op: ReduceOp) -> bool {
        op == ReduceOp::Sum
    }

    fn combine(&mut self, other: &Self, op: ReduceOp) -> Result<()> {
        if op != ReduceOp::Sum {
            return Err(MpiError::UnsupportedOp {
                op,
                ty: "Complex".to_string(),
            });
        }
        self.re.combine(&other.re, op)?;
        self.im.combine(&other.im, op)
    }

    fn combine_with<F>(&mut self, other: &Self, f: &mut F) -> Result<()>
    where
        F: FnMut(&mut Complex<T>, &Complex<T>),
    {
        f(self, other);
        Ok(())
    }
}

fn check_same_shape<T, const N: usize>(lhs: &Array<T, N>, rhs: &Array<T, N>) -> Result<()> {
    if lhs.shape() != rhs.shape() {
        let err = NdaError::ShapeMismatch(lhs.shape().to_vec(), rhs.shape().to_vec());
        return Err(err.into());
    }
    Ok(())
}

impl<T: Reducible, const N: usize> Reducible for Array<T, N> {
    type Leaf = T::Leaf;

    fn supports(op: ReduceOp) -> bool {
        T::supports(op)
    }

    fn combine(&mut self, other: &Self, op: ReduceOp) -> Result<()> {
        check_same_shape(self, other)?;
        let map = *self.indexmap();
        for (index, rhs) in map.indices().zip(other.to_vec()) {
            self.update(index, |lhs| lhs.combine(&rhs, op))?;
        }
        Ok(())
    }

    fn combine_with<F>(&mut self, other: &Self, f: &mut F) -> Result<()>
    where
        F: FnMut(&mut T::Leaf, &T::Leaf),
    {
        check_same_shape(self, other)?;
        let map = *self.indexmap();
        for (index, rhs) in map.indices().zip(other.to_vec()) {
            self.update(index, |lhs| lhs.combine_with(&rhs, &mut *f))?;
        }
        Ok(())
    }
}
