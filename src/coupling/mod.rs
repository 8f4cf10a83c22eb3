// src/coupling/mod.rs

pub mod boron;
pub mod convergence;
pub mod coupled_driver;
pub mod mapping;
pub mod relaxation;
pub mod transfer;

pub use boron::BoronDriver;
pub use convergence::{ConvergenceChecker, Norm};
pub use coupled_driver::{CoupledDriver, TimestepReport};
pub use mapping::SpatialMapping;
pub use relaxation::Relaxation;
