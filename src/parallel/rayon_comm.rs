//! Shared-memory communicator.
//!
//! All threads see the same address space, so global reductions are the
//! identity; the value of this backend is the thread pool it configures for
//! the rayon-parallel kernels and block applies.

use rayon::prelude::*;

pub struct RayonComm;

impl RayonComm {
    pub fn new() -> Self {
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_cpus::get())
            .build_global()
            .ok();
        RayonComm
    }
}

impl Default for RayonComm {
    fn default() -> Self {
        Self::new()
    }
}

impl super::Comm for RayonComm {
    fn rank(&self) -> usize { 0 }
    fn size(&self) -> usize { num_cpus::get() }
    fn barrier(&self) { rayon::scope(|_| {}); }
    fn all_reduce(&self, x: f64) -> f64 { x }
    fn all_reduce_slice(&self, _xs: &mut [f64]) {}
    fn dot(&self, a: &[f64], b: &[f64]) -> f64 {
        a.par_iter().zip(b.par_iter()).map(|(&x, &y)| x * y).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parallel::Comm;

    #[test]
    fn reductions_are_identity_in_shared_memory() {
        let comm = RayonComm::new();
        assert_eq!(comm.all_reduce(3.5), 3.5);
        assert_eq!(comm.dot(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]), 32.0);
    }
}
