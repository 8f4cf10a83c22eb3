// src/error.rs

use thiserror::Error;

/// Result type used throughout the coupled driver.
pub type Result<T> = std::result::Result<T, CouplingError>;

/// Errors raised by the coupled neutronics / heat-fluids solve.
///
/// Everything here is fatal: the run cannot proceed on an inconsistent
/// mapping, a stalled criticality search, or a failed solver step. The one
/// tolerated degraded condition, Picard non-convergence within the iteration
/// budget, is reported by the coupled driver rather than raised as an error.
#[derive(Error, Debug)]
pub enum CouplingError {
    /// A heat/fluids element centroid fell outside every neutronics cell.
    #[error("element {elem} at ({x}, {y}, {z}) is not inside any neutronics cell")]
    UnmappedPosition { elem: usize, x: f64, y: f64, z: f64 },

    /// A mapped neutronics cell ended up with no element volume.
    #[error("neutronics cell {cell} has zero mapped element volume")]
    ZeroMappedVolume { cell: usize },

    /// Mapped element volumes disagree with the cell's transport volume.
    #[error(
        "volume mismatch for neutronics cell {cell}: mapped {mapped} vs transport {transport} \
         (relative error {rel_err}, tolerance {tolerance})"
    )]
    VolumeMismatch {
        cell: usize,
        mapped: f64,
        transport: f64,
        rel_err: f64,
        tolerance: f64,
    },

    /// Secant update in the boron search hit a zero eigenvalue delta.
    #[error(
        "boron search stalled: k-eff unchanged at {k_eff} between ppm {ppm_prev} and ppm {ppm}"
    )]
    SearchStalled { k_eff: f64, ppm: f64, ppm_prev: f64 },

    /// A physics driver failed during a step.
    #[error("{driver} driver failed during {phase} (timestep {timestep}, picard {picard}): {message}")]
    SolverStep {
        driver: &'static str,
        phase: &'static str,
        timestep: usize,
        picard: usize,
        message: String,
    },

    /// The input deck is structurally valid YAML but physically inconsistent.
    #[error("invalid input deck: {0}")]
    InvalidDeck(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("input deck parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
