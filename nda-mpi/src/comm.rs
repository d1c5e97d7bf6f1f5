//! The transport boundary.
//!
//! A [`Communicator`] only has to move byte buffers between ranks. Typed
//! messaging (values encoded with `bincode`) and the group primitives used by
//! the collectives are provided on top of that as linear, root-centred
//! algorithms, so any transport able to ship bytes between processes can
//! carry the collectives.

use crate::{MpiError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

/// Message tag.
pub type Tag = u16;

/// Largest valid tag: the smallest upper bound every MPI library guarantees.
/// The sixteen largest valid tags are reserved for the group primitives.
pub const MAX_TAG: Tag = 32767;

const TAG_BARRIER: Tag = MAX_TAG;
const TAG_BROADCAST: Tag = MAX_TAG - 1;
const TAG_GATHER: Tag = MAX_TAG - 2;
pub(crate) const TAG_SCATTER: Tag = MAX_TAG - 3;

/// A group of ranks exchanging messages.
///
/// Messages between one pair of ranks with one tag are delivered in the
/// order they were sent. Every group primitive must be entered by all ranks,
/// in the same order and with the same root.
pub trait Communicator {
    /// This rank, in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Send a byte buffer to `dest`.
    fn send_bytes(&self, bytes: Vec<u8>, dest: usize, tag: Tag) -> Result<()>;

    /// Block until a buffer with `tag` arrives from `src`.
    fn recv_bytes(&self, src: usize, tag: Tag) -> Result<Vec<u8>>;

    /// Fail with [`MpiError::InvalidRank`] unless `rank` belongs to the group.
    fn check_rank(&self, rank: usize) -> Result<()> {
        let size = self.size();
        if rank >= size {
            return Err(MpiError::InvalidRank { rank, size });
        }
        Ok(())
    }

    /// Send a value to `dest`.
    ///
    /// # Errors
    /// [`MpiError::InvalidTag`] above [`MAX_TAG`], [`MpiError::Codec`] if
    /// the value cannot be encoded.
    fn send<V: Serialize + ?Sized>(&self, value: &V, dest: usize, tag: Tag) -> Result<()>
    where
        Self: Sized,
    {
        self.check_rank(dest)?;
        check_tag(tag)?;
        let bytes = bincode::serialize(value).map_err(|err| MpiError::Codec(err.to_string()))?;
        trace!(rank = self.rank(), dest, tag, len = bytes.len(), "send");
        self.send_bytes(bytes, dest, tag)
    }

    /// Receive a value of type `V` from `src`.
    ///
    /// # Errors
    /// Returns [`MpiError::Codec`] if the matching message does not decode as a `V`.
    fn recv<V: DeserializeOwned>(&self, src: usize, tag: Tag) -> Result<V>
    where
        Self: Sized,
    {
        self.check_rank(src)?;
        check_tag(tag)?;
        let bytes = self.recv_bytes(src, tag)?;
        trace!(rank = self.rank(), src, tag, len = bytes.len(), "recv");
        bincode::deserialize(&bytes).map_err(|err| MpiError::Codec(err.to_string()))
    }

    /// Block until every rank has entered the barrier.
    fn barrier(&self) -> Result<()>
    where
        Self: Sized,
    {
        if self.rank() == 0 {
            for src in 1..self.size() {
                self.recv::<()>(src, TAG_BARRIER)?;
            }
            for dest in 1..self.size() {
                self.send(&(), dest, TAG_BARRIER)?;
            }
        } else {
            self.send(&(), 0, TAG_BARRIER)?;
            self.recv::<()>(0, TAG_BARRIER)?;
        }
        Ok(())
    }

    /// Replace `value` on every rank by the root's value.
    fn broadcast_value<V>(&self, value: &mut V, root: usize) -> Result<()>
    where
        V: Serialize + DeserializeOwned,
        Self: Sized,
    {
        self.check_rank(root)?;
        if self.rank() == root {
            for dest in (0..self.size()).filter(|&d| d != root) {
                self.send(&*value, dest, TAG_BROADCAST)?;
            }
        } else {
            *value = self.recv(root, TAG_BROADCAST)?;
        }
        Ok(())
    }

    /// Collect one value per rank at `root`, in rank order.
    ///
    /// Ranks other than the root get an empty vector.
    fn gather_values<V>(&self, value: V, root: usize) -> Result<Vec<V>>
    where
        V: Serialize + DeserializeOwned,
        Self: Sized,
    {
        self.check_rank(root)?;
        if self.rank() != root {
            self.send(&value, root, TAG_GATHER)?;
            return Ok(Vec::new());
        }
        let mut values = Vec::with_capacity(self.size());
        for src in 0..root {
            values.push(self.recv(src, TAG_GATHER)?);
        }
        values.push(value);
        for src in root + 1..self.size() {
            values.push(self.recv(src, TAG_GATHER)?);
        }
        Ok(values)
    }

    /// Collect one value per rank on every rank, in rank order.
    fn all_gather_values<V>(&self, value: V) -> Result<Vec<V>>
    where
        V: Serialize + DeserializeOwned,
        Self: Sized,
    {
        let mut values = self.gather_values(value, 0)?;
        self.broadcast_value(&mut values, 0)?;
        Ok(values)
    }

    /// Combine one vector per rank elementwise at `root`.
    ///
    /// The root folds the contributions left to right in ascending rank
    /// order, starting from rank 0: `acc = v_0; acc = combine(acc, v_1); ...`.
    /// It then tells every rank whether the fold succeeded, so all ranks
    /// return the same error. The root gets `Some(result)`, the others `None`.
    ///
    /// # Errors
    /// Returns [`nda_view::NdaError::ShapeMismatch`] if the vector lengths
    /// differ, or the first error raised by `combine`.
    fn reduce_vec<T, F>(&self, data: Vec<T>, root: usize, mut combine: F) -> Result<Option<Vec<T>>>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(&mut T, &T) -> Result<()>,
        Self: Sized,
    {
        let contributions = self.gather_values(data, root)?;
        let mut verdict: Option<MpiError> = None;
        let mut folded = None;

        if self.rank() == root {
            let mut ranks = contributions.into_iter();
            let mut acc = ranks.next().unwrap_or_default();
            let fold = ranks.try_for_each(|rhs| {
                if rhs.len() != acc.len() {
                    return Err(MpiError::from(nda_view::NdaError::ShapeMismatch(
                        vec![acc.len()],
                        vec![rhs.len()],
                    )));
                }
                acc.iter_mut()
                    .zip(rhs.iter())
                    .try_for_each(|(a, b)| combine(a, b))
            });
            match fold {
                Ok(()) => folded = Some(acc),
                Err(err) => verdict = Some(err),
            }
        }

        self.broadcast_value(&mut verdict, root)?;
        match verdict {
            Some(err) => Err(err),
            None => Ok(folded),
        }
    }
}

fn check_tag(tag: Tag) -> Result<()> {
    if tag > MAX_TAG {
        return Err(MpiError::InvalidTag { tag });
    }
    Ok(())
}
