//! In-process groups: one thread per rank, connected by channels.
//!
//! Every ordered pair of ranks has its own channel, so a rank that leaves the
//! group (returns or panics) shows up as [`MpiError::Disconnected`] on the
//! ranks still waiting for it instead of a hang.

use crate::comm::{Communicator, Tag};
use crate::{MpiError, Result};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{channel, Receiver, Sender};
use tracing::debug;

/// Environment variable overriding the default world size.
pub const WORLD_SIZE_ENV: &str = "NDA_WORLD_SIZE";

const DEFAULT_WORLD_SIZE: usize = 4;

// ============================================================================
// Configuration
// ============================================================================

/// Settings of an in-process group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldConfig {
    /// Number of ranks.
    pub size: usize,
    /// Rank threads are named `{thread_name}-{rank}`.
    pub thread_name: String,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self::new(DEFAULT_WORLD_SIZE)
    }
}

impl WorldConfig {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            thread_name: "nda-rank".to_string(),
        }
    }

    /// Default settings, with the size taken from `NDA_WORLD_SIZE` when it
    /// holds a positive integer.
    pub fn from_env() -> Self {
        let size = std::env::var(WORLD_SIZE_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_WORLD_SIZE);
        Self::new(size)
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

// ============================================================================
// LocalComm
// ============================================================================

struct Envelope {
    tag: Tag,
    bytes: Vec<u8>,
}

/// One rank of an in-process group.
pub struct LocalComm {
    rank: usize,
    size: usize,
    /// `outboxes[dest]` carries messages from this rank to `dest`.
    outboxes: Vec<Sender<Envelope>>,
    /// `inboxes[src]` carries messages from `src` to this rank.
    inboxes: Vec<Receiver<Envelope>>,
    /// Messages already taken off an inbox while looking for another tag.
    pending: RefCell<HashMap<(usize, Tag), VecDeque<Vec<u8>>>>,
}

impl std::fmt::Debug for LocalComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl Communicator for LocalComm {
    #[inline]
    fn rank(&self) -> usize {
        self.rank
    }

    #[inline]
    fn size(&self) -> usize {
        self.size
    }

    fn send_bytes(&self, bytes: Vec<u8>, dest: usize, tag: Tag) -> Result<()> {
        self.check_rank(dest)?;
        self.outboxes[dest]
            .send(Envelope { tag, bytes })
            .map_err(|_| MpiError::Disconnected { peer: dest })
    }

    fn recv_bytes(&self, src: usize, tag: Tag) -> Result<Vec<u8>> {
        self.check_rank(src)?;
        if let Some(bytes) = self
            .pending
            .borrow_mut()
            .get_mut(&(src, tag))
            .and_then(VecDeque::pop_front)
        {
            return Ok(bytes);
        }
        loop {
            let envelope = self.inboxes[src]
                .recv()
                .map_err(|_| MpiError::Disconnected { peer: src })?;
            if envelope.tag == tag {
                return Ok(envelope.bytes);
            }
            self.pending
                .borrow_mut()
                .entry((src, envelope.tag))
                .or_default()
                .push_back(envelope.bytes);
        }
    }
}

// ============================================================================
// LocalWorld
// ============================================================================

/// Factory for in-process groups.
#[derive(Debug, Clone, Copy)]
pub struct LocalWorld;

impl LocalWorld {
    /// Create the communicators of a group of `size` ranks, in rank order.
    ///
    /// Each communicator is meant to be moved to its own thread.
    pub fn new(size: usize) -> Vec<LocalComm> {
        let mut outboxes: Vec<Vec<Sender<Envelope>>> =
            (0..size).map(|_| Vec::with_capacity(size)).collect();
        let mut inboxes: Vec<Vec<Receiver<Envelope>>> =
            (0..size).map(|_| Vec::with_capacity(size)).collect();
        for src in 0..size {
            for dest in 0..size {
                let (tx, rx) = channel();
                outboxes[src].push(tx);
                inboxes[dest].push(rx);
            }
        }

        outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outboxes, inboxes))| LocalComm {
                rank,
                size,
                outboxes,
                inboxes,
                pending: RefCell::new(HashMap::new()),
            })
            .collect()
    }

    /// Run `f` once per rank, each on its own thread, and return the results
    /// in rank order.
    ///
    /// If a rank panics, the panic is resumed on the caller once every rank
    /// has finished.
    pub fn run<R, F>(size: usize, f: F) -> Result<Vec<R>>
    where
        R: Send,
        F: Fn(&LocalComm) -> R + Sync,
    {
        Self::run_with(&WorldConfig::new(size), f)
    }

    /// [`LocalWorld::run`] with explicit settings.
    pub fn run_with<R, F>(config: &WorldConfig, f: F) -> Result<Vec<R>>
    where
        R: Send,
        F: Fn(&LocalComm) -> R + Sync,
    {
        debug!(size = config.size, "starting local world");
        let f = &f;
        std::thread::scope(|scope| {
            let mut handles = Vec::with_capacity(config.size);
            for comm in Self::new(config.size) {
                let rank = comm.rank;
                let handle = std::thread::Builder::new()
                    .name(format!("{}-{rank}", config.thread_name))
                    .spawn_scoped(scope, move || f(&comm))
                    .map_err(|err| MpiError::Spawn {
                        rank,
                        reason: err.to_string(),
                    })?;
                handles.push(handle);
            }

            let mut results = Vec::with_capacity(handles.len());
            let mut panic = None;
            for handle in handles {
                match handle.join() {
                    Ok(value) => results.push(value),
                    Err(payload) => {
                        panic.get_or_insert(payload);
                    }
                }
            }
            if let Some(payload) = panic {
                std::panic::resume_unwind(payload);
            }
            Ok(results)
        })
    }
}

// ============================================================================
// SelfComm
// ============================================================================

/// The one-rank group.
#[derive(Default)]
pub struct SelfComm {
    queue: RefCell<HashMap<Tag, VecDeque<Vec<u8>>>>,
}

impl SelfComm {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for SelfComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelfComm").finish_non_exhaustive()
    }
}

impl Communicator for SelfComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn send_bytes(&self, bytes: Vec<u8>, dest: usize, tag: Tag) -> Result<()> {
        self.check_rank(dest)?;
        self.queue
            .borrow_mut()
            .entry(tag)
            .or_default()
            .push_back(bytes);
        Ok(())
    }

    /// A receive with nothing queued would wait forever, so it fails instead.
    fn recv_bytes(&self, src: usize, tag: Tag) -> Result<Vec<u8>> {
        self.check_rank(src)?;
        self.queue
            .borrow_mut()
            .get_mut(&tag)
            .and_then(VecDeque::pop_front)
            .ok_or(MpiError::Disconnected { peer: src })
    }
}
