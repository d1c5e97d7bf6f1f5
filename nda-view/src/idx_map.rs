//! Index maps: the shape/strides/offset triple behind every view.
//!
//! An [`IndexMap<N>`] turns a multi-index `[i_0, .., i_{N-1}]` into the linear
//! offset `offset + sum(i_k * strides[k])`. Slicing, permuting and transposing
//! only rewrite this triple; no data is moved.

use crate::{NdaError, Result};
use std::ops::{Range, RangeFrom, RangeFull, RangeInclusive, RangeTo, RangeToInclusive};

/// Compute row-major strides (C default: last index varies fastest).
pub fn row_major_strides<const N: usize>(shape: &[usize; N]) -> [isize; N] {
    let mut strides = [1isize; N];
    for i in (0..N.saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1] as isize;
    }
    strides
}

/// Compute column-major strides (Fortran default: first index varies fastest).
pub fn col_major_strides<const N: usize>(shape: &[usize; N]) -> [isize; N] {
    let mut strides = [1isize; N];
    for i in 1..N {
        strides[i] = strides[i - 1] * shape[i - 1] as isize;
    }
    strides
}

/// Layout of a rank-`N` array inside a linear buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexMap<const N: usize> {
    shape: [usize; N],
    strides: [isize; N],
    offset: usize,
}

impl<const N: usize> Default for IndexMap<N> {
    fn default() -> Self {
        Self::new([0; N])
    }
}

impl<const N: usize> IndexMap<N> {
    /// Contiguous row-major layout starting at offset 0.
    pub fn new(shape: [usize; N]) -> Self {
        Self {
            shape,
            strides: row_major_strides(&shape),
            offset: 0,
        }
    }

    /// Contiguous column-major layout starting at offset 0.
    pub fn col_major(shape: [usize; N]) -> Self {
        Self {
            shape,
            strides: col_major_strides(&shape),
            offset: 0,
        }
    }

    /// Contiguous layout with an explicit dimension ordering.
    ///
    /// `order` lists the dimensions from slowest- to fastest-varying, so
    /// `[0, 1, .., N-1]` is row-major and the reverse is column-major.
    pub fn with_order(shape: [usize; N], order: [usize; N]) -> Result<Self> {
        check_permutation(&order)?;
        let mut strides = [0isize; N];
        let mut step = 1isize;
        for &dim in order.iter().rev() {
            strides[dim] = step;
            step *= shape[dim] as isize;
        }
        Ok(Self {
            shape,
            strides,
            offset: 0,
        })
    }

    /// Build a layout from raw parts. The caller validates it against a buffer.
    pub fn from_parts(shape: [usize; N], strides: [isize; N], offset: usize) -> Self {
        Self {
            shape,
            strides,
            offset,
        }
    }

    #[inline]
    pub fn shape(&self) -> &[usize; N] {
        &self.shape
    }

    #[inline]
    pub fn strides(&self) -> &[isize; N] {
        &self.strides
    }

    /// Linear offset of the index-zero element.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn extent(&self, dim: usize) -> usize {
        self.shape[dim]
    }

    /// Total number of addressable elements.
    #[inline]
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shape.contains(&0)
    }

    /// Check if the layout is contiguous in row-major order.
    pub fn is_contiguous(&self) -> bool {
        let mut expected = 1isize;
        for i in (0..N).rev() {
            if self.shape[i] <= 1 {
                continue;
            }
            if self.strides[i] != expected {
                return false;
            }
            expected *= self.shape[i] as isize;
        }
        true
    }

    /// Smallest and largest offsets this layout can address.
    ///
    /// Returns `None` for an empty layout, which addresses nothing.
    pub fn memory_span(&self) -> Option<(isize, isize)> {
        if self.is_empty() {
            return None;
        }
        let mut min = self.offset as isize;
        let mut max = self.offset as isize;
        for i in 0..N {
            let end = self.strides[i] * (self.shape[i] - 1) as isize;
            if end >= 0 {
                max += end;
            } else {
                min += end;
            }
        }
        Some((min, max))
    }

    /// Verify that every addressable offset lies inside a buffer of `len` elements.
    pub fn validate(&self, len: usize) -> Result<()> {
        match self.memory_span() {
            Some((min, max)) if min < 0 || max >= len as isize => {
                Err(NdaError::BufferOverrun { min, max, len })
            }
            _ => Ok(()),
        }
    }

    /// Linear offset of `index`.
    ///
    /// Indices outside the shape are a logic error: they are only caught by a
    /// debug assertion, or always when the `bounds-check` feature is enabled.
    #[inline]
    pub fn offset_of(&self, index: &[usize; N]) -> usize {
        #[cfg(feature = "bounds-check")]
        if let Err(err) = self.check_index(index) {
            panic!("{err}");
        }
        debug_assert!(self.check_index(index).is_ok(), "index out of range");
        let mut pos = self.offset as isize;
        for i in 0..N {
            pos += index[i] as isize * self.strides[i];
        }
        pos as usize
    }

    /// Linear offset of `index`, failing with [`NdaError::OutOfRange`] instead
    /// of producing a meaningless offset.
    pub fn checked_offset(&self, index: &[usize; N]) -> Result<usize> {
        self.check_index(index)?;
        Ok(self.offset_of(index))
    }

    fn check_index(&self, index: &[usize; N]) -> Result<()> {
        if index.iter().zip(self.shape.iter()).any(|(&i, &n)| i >= n) {
            return Err(NdaError::OutOfRange {
                index: index.to_vec(),
                shape: self.shape.to_vec(),
            });
        }
        Ok(())
    }

    /// Reorder dimensions: dimension `k` of the result is dimension `perm[k]` of `self`.
    pub fn permute(&self, perm: [usize; N]) -> Result<Self> {
        check_permutation(&perm)?;
        let mut shape = [0usize; N];
        let mut strides = [0isize; N];
        for i in 0..N {
            shape[i] = self.shape[perm[i]];
            strides[i] = self.strides[perm[i]];
        }
        Ok(Self {
            shape,
            strides,
            offset: self.offset,
        })
    }

    /// Reverse all dimensions (matrix transpose for `N == 2`).
    pub fn transpose(&self) -> Self {
        let mut shape = self.shape;
        let mut strides = self.strides;
        shape.reverse();
        strides.reverse();
        Self {
            shape,
            strides,
            offset: self.offset,
        }
    }

    /// Restrict the layout with one [`SliceArg`] per dimension.
    ///
    /// A single [`SliceArg::Ellipsis`] stands for as many full ranges as needed;
    /// missing trailing arguments are full ranges too. Each
    /// [`SliceArg::Index`] drops its dimension, so `M` must equal `N` minus the
    /// number of indices.
    pub fn slice<const M: usize>(&self, args: &[SliceArg]) -> Result<IndexMap<M>> {
        let args = expand_ellipsis(args, N)?;

        let mut shape = [0usize; M];
        let mut strides = [0isize; M];
        let mut offset = self.offset as isize;
        let mut out = 0usize;

        for dim in 0..N {
            let arg = args.get(dim).copied().unwrap_or(SliceArg::FULL);
            let extent = self.shape[dim];
            match arg {
                SliceArg::Index(i) => {
                    if i >= extent {
                        return Err(self.out_of_range(dim, i));
                    }
                    offset += i as isize * self.strides[dim];
                }
                SliceArg::Range { start, end, step } => {
                    let end = end.unwrap_or(extent);
                    if step <= 0 {
                        return Err(NdaError::InvalidSlice(format!(
                            "step must be positive, got {step} for dim {dim}"
                        )));
                    }
                    if start > end || end > extent {
                        return Err(self.out_of_range(dim, start.max(end)));
                    }
                    if out < M {
                        shape[out] = (end - start).div_ceil(step as usize);
                        strides[out] = self.strides[dim] * step;
                    }
                    out += 1;
                    offset += start as isize * self.strides[dim];
                }
                SliceArg::Ellipsis => unreachable!("ellipsis expanded above"),
            }
        }

        if out != M {
            return Err(NdaError::RankMismatch(out, M));
        }
        Ok(IndexMap {
            shape,
            strides,
            offset: offset as usize,
        })
    }

    fn out_of_range(&self, dim: usize, i: usize) -> NdaError {
        let mut index = vec![0; N];
        index[dim] = i;
        NdaError::OutOfRange {
            index,
            shape: self.shape.to_vec(),
        }
    }

    /// Iterate over all valid multi-indices in row-major order.
    pub fn indices(&self) -> Indices<N> {
        Indices {
            shape: self.shape,
            next: [0; N],
            exhausted: self.is_empty(),
        }
    }
}

fn check_permutation<const N: usize>(perm: &[usize; N]) -> Result<()> {
    let mut seen = [false; N];
    for &p in perm {
        if p >= N || seen[p] {
            return Err(NdaError::InvalidAxis { axis: p, rank: N });
        }
        seen[p] = true;
    }
    Ok(())
}

fn expand_ellipsis(args: &[SliceArg], rank: usize) -> Result<Vec<SliceArg>> {
    let ellipses = args
        .iter()
        .filter(|a| matches!(a, SliceArg::Ellipsis))
        .count();
    if ellipses > 1 {
        return Err(NdaError::InvalidSlice(format!(
            "at most one ellipsis allowed, found {ellipses}"
        )));
    }
    let explicit = args.len() - ellipses;
    if explicit > rank {
        return Err(NdaError::InvalidSlice(format!(
            "{explicit} slice arguments for rank {rank}"
        )));
    }
    let mut expanded = Vec::with_capacity(rank);
    for &arg in args {
        if matches!(arg, SliceArg::Ellipsis) {
            expanded.extend(std::iter::repeat(SliceArg::FULL).take(rank - explicit));
        } else {
            expanded.push(arg);
        }
    }
    Ok(expanded)
}

// ============================================================================
// Slicing arguments
// ============================================================================

/// One slicing argument per dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceArg {
    /// Select a single position and drop the dimension.
    Index(usize),
    /// Keep positions `start, start + step, ..` below `end` (`None` = extent).
    Range {
        start: usize,
        end: Option<usize>,
        step: isize,
    },
    /// Stands for all remaining dimensions, unaffected.
    Ellipsis,
}

impl SliceArg {
    /// The whole dimension.
    pub const FULL: SliceArg = SliceArg::Range {
        start: 0,
        end: None,
        step: 1,
    };

    /// A strided range `start..end` with `step`.
    pub fn range(start: usize, end: usize, step: isize) -> Self {
        SliceArg::Range {
            start,
            end: Some(end),
            step,
        }
    }
}

/// Marker usable in [`s!`](crate::s) for [`SliceArg::Ellipsis`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ellipsis;

impl From<Ellipsis> for SliceArg {
    fn from(_: Ellipsis) -> Self {
        SliceArg::Ellipsis
    }
}

impl From<usize> for SliceArg {
    fn from(i: usize) -> Self {
        SliceArg::Index(i)
    }
}

impl From<RangeFull> for SliceArg {
    fn from(_: RangeFull) -> Self {
        SliceArg::FULL
    }
}

impl From<Range<usize>> for SliceArg {
    fn from(r: Range<usize>) -> Self {
        SliceArg::range(r.start, r.end, 1)
    }
}

impl From<RangeFrom<usize>> for SliceArg {
    fn from(r: RangeFrom<usize>) -> Self {
        SliceArg::Range {
            start: r.start,
            end: None,
            step: 1,
        }
    }
}

impl From<RangeTo<usize>> for SliceArg {
    fn from(r: RangeTo<usize>) -> Self {
        SliceArg::range(0, r.end, 1)
    }
}

impl From<RangeInclusive<usize>> for SliceArg {
    fn from(r: RangeInclusive<usize>) -> Self {
        SliceArg::range(*r.start(), *r.end() + 1, 1)
    }
}

impl From<RangeToInclusive<usize>> for SliceArg {
    fn from(r: RangeToInclusive<usize>) -> Self {
        SliceArg::range(0, r.end + 1, 1)
    }
}

/// Build a slicing argument list.
///
/// ```rust
/// use nda_view::{s, Ellipsis, SliceArg};
///
/// let args = s![1, 2..5, Ellipsis];
/// assert_eq!(args[0], SliceArg::Index(1));
/// assert_eq!(args[2], SliceArg::Ellipsis);
/// ```
#[macro_export]
macro_rules! s {
    ($($arg:expr),* $(,)?) => {
        [$($crate::SliceArg::from($arg)),*]
    };
}

// ============================================================================
// Multi-index iteration
// ============================================================================

/// Iterator over the multi-indices of a shape, last index fastest.
#[derive(Debug, Clone)]
pub struct Indices<const N: usize> {
    shape: [usize; N],
    next: [usize; N],
    exhausted: bool,
}

impl<const N: usize> Iterator for Indices<N> {
    type Item = [usize; N];

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        let current = self.next;

        let mut carry = true;
        for i in (0..N).rev() {
            self.next[i] += 1;
            if self.next[i] < self.shape[i] {
                carry = false;
                break;
            }
            self.next[i] = 0;
        }
        if carry {
            self.exhausted = true;
        }
        Some(current)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.exhausted {
            return (0, Some(0));
        }
        let total: usize = self.shape.iter().product();
        let mut done = 0usize;
        let mut multiplier = 1usize;
        for i in (0..N).rev() {
            done += self.next[i] * multiplier;
            multiplier *= self.shape[i];
        }
        let remaining = total - done;
        (remaining, Some(remaining))
    }
}

impl<const N: usize> ExactSizeIterator for Indices<N> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s;

    #[test]
    fn test_row_and_col_major_strides() {
        assert_eq!(row_major_strides(&[2, 3, 4]), [12, 4, 1]);
        assert_eq!(col_major_strides(&[2, 3, 4]), [1, 2, 6]);
        assert_eq!(row_major_strides::<0>(&[]), []);
    }

    #[test]
    fn test_with_order() {
        let c = IndexMap::with_order([2, 3, 4], [0, 1, 2]).unwrap();
        assert_eq!(c, IndexMap::new([2, 3, 4]));
        let f = IndexMap::with_order([2, 3, 4], [2, 1, 0]).unwrap();
        assert_eq!(f, IndexMap::col_major([2, 3, 4]));
        let mixed = IndexMap::with_order([2, 3, 4], [1, 0, 2]).unwrap();
        assert_eq!(mixed.strides(), &[4, 8, 1]);
    }

    #[test]
    fn test_with_order_rejects_non_permutation() {
        let err = IndexMap::with_order([2, 3], [0, 0]).unwrap_err();
        assert_eq!(err, NdaError::InvalidAxis { axis: 0, rank: 2 });
    }

    #[test]
    fn test_offset_of() {
        let m = IndexMap::new([2, 3]);
        assert_eq!(m.offset_of(&[0, 0]), 0);
        assert_eq!(m.offset_of(&[1, 2]), 5);
        let f = IndexMap::col_major([2, 3]);
        assert_eq!(f.offset_of(&[1, 2]), 5);
        assert_eq!(f.offset_of(&[1, 0]), 1);
    }

    #[test]
    fn test_checked_offset() {
        let m = IndexMap::new([2, 3]);
        assert_eq!(m.checked_offset(&[1, 1]), Ok(4));
        assert_eq!(
            m.checked_offset(&[2, 0]),
            Err(NdaError::OutOfRange {
                index: vec![2, 0],
                shape: vec![2, 3]
            })
        );
    }

    #[test]
    fn test_validate() {
        assert!(IndexMap::new([2, 3]).validate(6).is_ok());
        assert!(IndexMap::new([2, 3]).validate(5).is_err());
        // Negative stride walking backwards from offset 2.
        assert!(IndexMap::from_parts([3], [-1], 2).validate(3).is_ok());
        assert!(IndexMap::from_parts([3], [-1], 1).validate(3).is_err());
        // Empty layouts address nothing.
        assert!(IndexMap::new([0, 3]).validate(0).is_ok());
    }

    #[test]
    fn test_slice_index_drops_dim() {
        let m = IndexMap::new([3, 4]);
        let row = m.slice::<1>(&s![1, ..]).unwrap();
        assert_eq!(row.shape(), &[4]);
        assert_eq!(row.strides(), &[1]);
        assert_eq!(row.offset(), 4);

        let col = m.slice::<1>(&s![.., 2]).unwrap();
        assert_eq!(col.shape(), &[3]);
        assert_eq!(col.strides(), &[4]);
        assert_eq!(col.offset(), 2);
    }

    #[test]
    fn test_slice_strided_range() {
        let m = IndexMap::new([10]);
        let s = m.slice::<1>(&[SliceArg::range(1, 8, 3)]).unwrap();
        assert_eq!(s.shape(), &[3]);
        assert_eq!(s.strides(), &[3]);
        assert_eq!(s.offset(), 1);
    }

    #[test]
    fn test_slice_preserves_element_identity() {
        let m = IndexMap::new([4, 5, 6]);
        let s = m.slice::<2>(&s![1..4, 2, SliceArg::range(0, 6, 2)]).unwrap();
        for [i, k] in s.indices() {
            assert_eq!(s.offset_of(&[i, k]), m.offset_of(&[i + 1, 2, 2 * k]));
        }
    }

    #[test]
    fn test_slice_ellipsis() {
        let m = IndexMap::new([2, 3, 4, 5]);
        let s = m.slice::<3>(&s![Ellipsis, 1]).unwrap();
        assert_eq!(s.shape(), &[2, 3, 4]);
        let s = m.slice::<2>(&s![0, Ellipsis, 3]).unwrap();
        assert_eq!(s.shape(), &[3, 4]);
        // An ellipsis may also expand to nothing.
        let s = m.slice::<0>(&s![0, 0, Ellipsis, 0, 0]).unwrap();
        assert_eq!(s.offset(), 0);
    }

    #[test]
    fn test_slice_two_ellipses_rejected() {
        let m = IndexMap::new([2, 3]);
        let err = m.slice::<2>(&s![Ellipsis, Ellipsis]).unwrap_err();
        assert!(matches!(err, NdaError::InvalidSlice(_)));
    }

    #[test]
    fn test_slice_errors() {
        let m = IndexMap::new([2, 3]);
        assert!(matches!(
            m.slice::<1>(&s![2, ..]),
            Err(NdaError::OutOfRange { .. })
        ));
        assert!(matches!(
            m.slice::<2>(&s![.., 1..4]),
            Err(NdaError::OutOfRange { .. })
        ));
        assert!(matches!(
            m.slice::<2>(&s![.., .., ..]),
            Err(NdaError::InvalidSlice(_))
        ));
        assert!(matches!(
            m.slice::<2>(&[SliceArg::range(0, 2, 0)]),
            Err(NdaError::InvalidSlice(_))
        ));
        assert_eq!(
            m.slice::<2>(&s![0]).unwrap_err(),
            NdaError::RankMismatch(1, 2)
        );
    }

    #[test]
    fn test_permute_and_transpose() {
        let m = IndexMap::new([2, 3, 4]);
        let p = m.permute([2, 0, 1]).unwrap();
        assert_eq!(p.shape(), &[4, 2, 3]);
        assert_eq!(p.offset_of(&[3, 1, 2]), m.offset_of(&[1, 2, 3]));
        let t = m.transpose();
        assert_eq!(t.shape(), &[4, 3, 2]);
        assert!(!t.is_contiguous());
        assert!(m.permute([0, 1, 1]).is_err());
    }

    #[test]
    fn test_indices_row_major() {
        let all: Vec<_> = IndexMap::new([2, 2]).indices().collect();
        assert_eq!(all, vec![[0, 0], [0, 1], [1, 0], [1, 1]]);
        assert_eq!(IndexMap::<0>::new([]).indices().count(), 1);
        assert_eq!(IndexMap::new([3, 0]).indices().count(), 0);
    }

    #[test]
    fn test_indices_size_hint() {
        let mut it = IndexMap::new([2, 3]).indices();
        assert_eq!(it.len(), 6);
        it.next();
        it.next();
        assert_eq!(it.len(), 4);
    }
}
