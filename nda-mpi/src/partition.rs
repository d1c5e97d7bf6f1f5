//! Contiguous partitioning of an index range across the ranks of a group.

use std::ops::Range;

/// The part of `start..end` owned by `rank` when split into `n_chunks` pieces.
///
/// The first `(end - start) % n_chunks` ranks get one extra element. Taken in
/// rank order, the pieces cover `start..end` exactly once.
///
/// # Panics
/// Panics if `n_chunks == 0`, `rank >= n_chunks` or `start > end`.
///
/// # Example
///
/// ```rust
/// use nda_mpi::chunk_range;
///
/// assert_eq!(chunk_range(0, 7, 3, 0), 0..3);
/// assert_eq!(chunk_range(0, 7, 3, 1), 3..5);
/// assert_eq!(chunk_range(0, 7, 3, 2), 5..7);
/// ```
pub fn chunk_range(start: usize, end: usize, n_chunks: usize, rank: usize) -> Range<usize> {
    assert!(n_chunks > 0, "cannot split a range into zero chunks");
    assert!(rank < n_chunks, "rank {rank} out of range for {n_chunks} chunks");
    assert!(start <= end, "invalid range {start}..{end}");

    let total = end - start;
    let chunk = total / n_chunks;
    let n_large = total - n_chunks * chunk;
    if rank < n_large {
        let lo = start + rank * (chunk + 1);
        lo..lo + chunk + 1
    } else {
        let lo = start + n_large + rank * chunk;
        lo..lo + chunk
    }
}

/// Ranges of all ranks `0..n_chunks`, in rank order.
pub fn partitions(start: usize, end: usize, n_chunks: usize) -> impl Iterator<Item = Range<usize>> {
    (0..n_chunks).map(move |rank| chunk_range(start, end, n_chunks, rank))
}

/// One rank's share of a global index range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Partition {
    pub global_start: usize,
    pub global_end: usize,
    pub participant_count: usize,
    pub participant_rank: usize,
}

impl Partition {
    pub fn new(global: Range<usize>, participant_count: usize, participant_rank: usize) -> Self {
        Self {
            global_start: global.start,
            global_end: global.end,
            participant_count,
            participant_rank,
        }
    }

    /// The local sub-range; see [`chunk_range`].
    pub fn local_range(&self) -> Range<usize> {
        chunk_range(
            self.global_start,
            self.global_end,
            self.participant_count,
            self.participant_rank,
        )
    }

    #[inline]
    pub fn local_start(&self) -> usize {
        self.local_range().start
    }

    #[inline]
    pub fn local_end(&self) -> usize {
        self.local_range().end
    }

    /// Number of indices owned by this rank.
    pub fn len(&self) -> usize {
        self.local_range().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn test_chunk_range_seven_over_three() {
        let parts: Vec<_> = partitions(0, 7, 3).collect();
        assert_eq!(parts, vec![0..3, 3..5, 5..7]);
    }

    #[test]
    fn test_chunk_range_with_offset_start() {
        let parts: Vec<_> = partitions(10, 20, 4).collect();
        assert_eq!(parts, vec![10..13, 13..16, 16..18, 18..20]);
    }

    #[test]
    fn test_more_ranks_than_elements() {
        let parts: Vec<_> = partitions(0, 2, 5).collect();
        assert_eq!(parts, vec![0..1, 1..2, 2..2, 2..2, 2..2]);
    }

    #[test]
    fn test_empty_range() {
        assert!(partitions(4, 4, 3).all(|r| r == (4..4)));
    }

    #[test]
    fn test_partitions_cover_range_exactly() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let start = rng.gen_range(0..50);
            let end = start + rng.gen_range(0..200);
            let n = rng.gen_range(1..17);

            let parts: Vec<_> = partitions(start, end, n).collect();
            let mut next = start;
            for r in &parts {
                assert_eq!(r.start, next);
                next = r.end;
            }
            assert_eq!(next, end);

            let min = parts.iter().map(|r| r.len()).min().unwrap();
            let max = parts.iter().map(|r| r.len()).max().unwrap();
            assert!(max - min <= 1, "{start}..{end} over {n}: {parts:?}");
        }
    }

    #[test]
    fn test_partition_descriptor() {
        let p = Partition::new(0..7, 3, 1);
        assert_eq!(p.local_range(), 3..5);
        assert_eq!((p.local_start(), p.local_end()), (3, 5));
        assert_eq!(p.len(), 2);
        assert!(Partition::new(0..1, 2, 1).is_empty());
    }

    #[test]
    #[should_panic(expected = "zero chunks")]
    fn test_zero_chunks_panics() {
        chunk_range(0, 4, 0, 0);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_rank_out_of_range_panics() {
        chunk_range(0, 4, 2, 2);
    }
}
