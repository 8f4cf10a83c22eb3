// src/coupling/convergence.rs

use nalgebra::DVector;
use serde::Deserialize;

use crate::comm::Comm;

/// Norm used for the Picard temperature residual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Norm {
    /// Mean absolute difference.
    L1,
    /// Root-mean-square difference.
    L2,
    /// Maximum absolute difference.
    Linf,
}

impl Norm {
    /// Norm of `current - previous` over all local cells, reduced across
    /// every rank holding temperature data. L-inf reduces by max; L1/L2
    /// reduce the sum and the entry count so every rank computes the same
    /// global mean/RMS and the loop decision stays lockstep-consistent.
    pub fn global(&self, current: &DVector<f64>, previous: &DVector<f64>, comm: &Comm) -> f64 {
        assert_eq!(current.len(), previous.len(), "field snapshots must have equal length");
        let n = comm.sum_usize(current.len());
        if n == 0 {
            return 0.0;
        }
        match self {
            Norm::L1 => {
                let local: f64 = current.iter().zip(previous.iter()).map(|(a, b)| (a - b).abs()).sum();
                comm.sum_f64(local) / n as f64
            }
            Norm::L2 => {
                let local: f64 = current
                    .iter()
                    .zip(previous.iter())
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum();
                (comm.sum_f64(local) / n as f64).sqrt()
            }
            Norm::Linf => {
                let local = current
                    .iter()
                    .zip(previous.iter())
                    .map(|(a, b)| (a - b).abs())
                    .fold(0.0_f64, f64::max);
                comm.max_f64(local)
            }
        }
    }
}

/// Convergence test for the Picard loop.
#[derive(Debug, Clone, Copy)]
pub struct ConvergenceChecker {
    pub norm: Norm,
    pub epsilon: f64,
}

impl ConvergenceChecker {
    pub fn new(norm: Norm, epsilon: f64) -> Self {
        ConvergenceChecker { norm, epsilon }
    }

    /// Computes the global temperature residual between successive Picard
    /// iterates.
    pub fn temperature_norm(
        &self,
        current: &DVector<f64>,
        previous: &DVector<f64>,
        comm: &Comm,
    ) -> f64 {
        self.norm.global(current, previous, comm)
    }

    /// Whether the Picard iteration has converged for this timestep.
    pub fn is_converged(&self, current: &DVector<f64>, previous: &DVector<f64>, comm: &Comm) -> bool {
        self.temperature_norm(current, previous, comm) < self.epsilon
    }
}
