// src/comm.rs

use std::sync::Arc;

/// Blocking collective operations over the process pool running the coupled
/// solve. All ranks call each collective in lockstep; a call returns only
/// once it has completed on the calling rank, so these double as the
/// synchronization barriers between Picard sub-phases.
///
/// The substrate itself (MPI or otherwise) is outside this crate; an
/// MPI-backed implementation plugs in behind this trait. [`SelfComm`] is the
/// single-process implementation used for serial runs and tests.
pub trait Collective: Send + Sync {
    /// Rank of the calling process within this communicator.
    fn rank(&self) -> usize;

    /// Number of processes in this communicator.
    fn size(&self) -> usize;

    /// Concatenates every rank's contribution in rank order. Every rank
    /// observes the identical result vector; the rank-order-then-local-order
    /// layout is the ordering contract the spatial mapping is built on.
    fn allgather_f64(&self, local: &[f64]) -> Vec<f64>;

    /// Rank-order concatenation of integer data (fluid masks).
    fn allgather_i32(&self, local: &[i32]) -> Vec<i32>;

    /// Global sum, identical on every rank.
    fn sum_f64(&self, value: f64) -> f64;

    /// Global sum of counts, identical on every rank.
    fn sum_usize(&self, value: usize) -> usize;

    /// Global maximum, identical on every rank.
    fn max_f64(&self, value: f64) -> f64;

    /// Blocks until every rank has arrived.
    fn barrier(&self);
}

/// Cheap clonable handle to a [`Collective`], passed explicitly to every
/// component that performs communication. Constructed once at startup and
/// dropped at shutdown; never ambient global state.
#[derive(Clone)]
pub struct Comm {
    inner: Arc<dyn Collective>,
}

impl Comm {
    pub fn new(inner: Arc<dyn Collective>) -> Self {
        Comm { inner }
    }

    /// Communicator for a single-process run.
    pub fn self_comm() -> Self {
        Comm { inner: Arc::new(SelfComm) }
    }

    pub fn rank(&self) -> usize {
        self.inner.rank()
    }

    pub fn size(&self) -> usize {
        self.inner.size()
    }

    /// Whether the calling rank participates in this communicator.
    pub fn active(&self) -> bool {
        self.inner.size() > 0
    }

    pub fn allgather_f64(&self, local: &[f64]) -> Vec<f64> {
        self.inner.allgather_f64(local)
    }

    pub fn allgather_i32(&self, local: &[i32]) -> Vec<i32> {
        self.inner.allgather_i32(local)
    }

    pub fn sum_f64(&self, value: f64) -> f64 {
        self.inner.sum_f64(value)
    }

    pub fn sum_usize(&self, value: usize) -> usize {
        self.inner.sum_usize(value)
    }

    pub fn max_f64(&self, value: f64) -> f64 {
        self.inner.max_f64(value)
    }

    pub fn barrier(&self) {
        self.inner.barrier()
    }
}

impl std::fmt::Debug for Comm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Comm")
            .field("rank", &self.rank())
            .field("size", &self.size())
            .finish()
    }
}

/// Trivial single-process communicator: every collective is local.
pub struct SelfComm;

impl Collective for SelfComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn allgather_f64(&self, local: &[f64]) -> Vec<f64> {
        local.to_vec()
    }

    fn allgather_i32(&self, local: &[i32]) -> Vec<i32> {
        local.to_vec()
    }

    fn sum_f64(&self, value: f64) -> f64 {
        value
    }

    fn sum_usize(&self, value: usize) -> usize {
        value
    }

    fn max_f64(&self, value: f64) -> f64 {
        value
    }

    fn barrier(&self) {}
}
