//! A [`Communicator`] over an MPI library, through `rsmpi`.
//!
//! Messages travel as `MPI_BYTE` buffers; the typed layer above encodes them.
//! MPI sends may block until the matching receive is posted. The group
//! primitives are root-centred (every rank talks only to the root), so they
//! cannot deadlock on that.

use crate::comm::{Communicator, Tag};
use crate::Result;
use mpi::topology::SimpleCommunicator;
use mpi::traits::{Communicator as _, Destination, Source};

/// One rank of an MPI communicator.
///
/// ```no_run
/// use nda_mpi::{all_reduce, Communicator, MpiComm, ReduceOp};
/// use nda_view::Array;
///
/// let universe = mpi::initialize().unwrap();
/// let comm = MpiComm::new(universe.world());
/// let a = Array::from_elem([4], comm.rank() as f64);
/// let total = all_reduce(&a, &comm, ReduceOp::Sum).unwrap();
/// ```
pub struct MpiComm {
    world: SimpleCommunicator,
}

impl MpiComm {
    pub fn new(world: SimpleCommunicator) -> Self {
        Self { world }
    }

    /// The wrapped MPI communicator.
    pub fn inner(&self) -> &SimpleCommunicator {
        &self.world
    }
}

impl std::fmt::Debug for MpiComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpiComm")
            .field("rank", &self.rank())
            .field("size", &self.size())
            .finish()
    }
}

impl Communicator for MpiComm {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn send_bytes(&self, bytes: Vec<u8>, dest: usize, tag: Tag) -> Result<()> {
        self.check_rank(dest)?;
        self.world
            .process_at_rank(dest as mpi::Rank)
            .send_with_tag(&bytes[..], mpi::Tag::from(tag));
        Ok(())
    }

    fn recv_bytes(&self, src: usize, tag: Tag) -> Result<Vec<u8>> {
        self.check_rank(src)?;
        let (bytes, _status) = self
            .world
            .process_at_rank(src as mpi::Rank)
            .receive_vec_with_tag::<u8>(mpi::Tag::from(tag));
        Ok(bytes)
    }
}
