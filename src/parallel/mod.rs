//! Communication capability used at synchronization points.
//!
//! The engine is a single logical thread of control; the only collective
//! operations it needs are sum reductions of dot products and norms, so that
//! every process classifies Ritz pairs from the same globally-reduced
//! quantities. Row partitioning of the problem itself belongs to the
//! caller-supplied operator, not to this crate.

pub trait Comm {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;
    fn barrier(&self);
    /// Global sum of a scalar contribution.
    fn all_reduce(&self, x: f64) -> f64;
    /// In-place global sum of a slice of contributions.
    fn all_reduce_slice(&self, xs: &mut [f64]) {
        for x in xs.iter_mut() {
            *x = self.all_reduce(*x);
        }
    }
    /// Globally-reduced dot product of two local row slices.
    fn dot(&self, a: &[f64], b: &[f64]) -> f64 {
        let local = a.iter().zip(b).map(|(&x, &y)| x * y).sum::<f64>();
        self.all_reduce(local)
    }
}

/// Single-process communicator; reductions are the identity.
pub struct SerialComm;

impl Comm for SerialComm {
    fn rank(&self) -> usize { 0 }
    fn size(&self) -> usize { 1 }
    fn barrier(&self) {}
    fn all_reduce(&self, x: f64) -> f64 { x }
    fn all_reduce_slice(&self, _xs: &mut [f64]) {}
}

#[cfg(feature = "rayon")]
pub mod rayon_comm;
#[cfg(feature = "rayon")]
pub use rayon_comm::RayonComm;

#[cfg(feature = "mpi")]
pub mod mpi_comm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;

pub enum UniverseComm {
    #[cfg(feature = "mpi")]
    Mpi(MpiComm),
    #[cfg(feature = "rayon")]
    Rayon(RayonComm),
    Serial(SerialComm),
}

impl Comm for UniverseComm {
    fn rank(&self) -> usize {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.rank(),
            #[cfg(feature = "rayon")]
            UniverseComm::Rayon(comm) => comm.rank(),
            UniverseComm::Serial(comm) => comm.rank(),
        }
    }
    fn size(&self) -> usize {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.size(),
            #[cfg(feature = "rayon")]
            UniverseComm::Rayon(comm) => comm.size(),
            UniverseComm::Serial(comm) => comm.size(),
        }
    }
    fn barrier(&self) {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.barrier(),
            #[cfg(feature = "rayon")]
            UniverseComm::Rayon(comm) => comm.barrier(),
            UniverseComm::Serial(comm) => comm.barrier(),
        }
    }
    fn all_reduce(&self, x: f64) -> f64 {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.all_reduce(x),
            #[cfg(feature = "rayon")]
            UniverseComm::Rayon(comm) => comm.all_reduce(x),
            UniverseComm::Serial(comm) => comm.all_reduce(x),
        }
    }
    fn all_reduce_slice(&self, xs: &mut [f64]) {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.all_reduce_slice(xs),
            #[cfg(feature = "rayon")]
            UniverseComm::Rayon(comm) => comm.all_reduce_slice(xs),
            UniverseComm::Serial(comm) => comm.all_reduce_slice(xs),
        }
    }
    fn dot(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            #[cfg(feature = "mpi")]
            UniverseComm::Mpi(comm) => comm.dot(a, b),
            #[cfg(feature = "rayon")]
            UniverseComm::Rayon(comm) => comm.dot(a, b),
            UniverseComm::Serial(comm) => comm.dot(a, b),
        }
    }
}
