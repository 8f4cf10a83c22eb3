// src/lib.rs

//! Coupled neutronics / thermal-hydraulics driver.
//!
//! Orchestrates a Picard (fixed-point) iteration between a neutron transport
//! solver and a heat/fluids solver across a sequence of timesteps, moving
//! heat source, temperature, and density fields between the two meshes
//! through a volume-weighted spatial mapping, with per-field
//! under-relaxation and an optional secant criticality search on the
//! soluble boron concentration.

#![allow(non_snake_case)]

pub mod comm;
pub mod coupling;
pub mod drivers;
pub mod error;
pub mod input;
pub mod utils;

pub use comm::Comm;
pub use coupling::{BoronDriver, ConvergenceChecker, CoupledDriver, Norm, Relaxation};
pub use error::{CouplingError, Result};
pub use input::{parse_input_deck, InputDeck};
