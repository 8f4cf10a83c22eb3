// src/drivers/mod.rs

pub mod channel_heat;
pub mod diffusion_neutronics;
#[cfg(test)]
pub mod mock;

pub use channel_heat::ChannelHeatFluids;
pub use diffusion_neutronics::DiffusionNeutronics;

use crate::comm::Comm;
use crate::error::Result;

/// Opaque, globally unique identifier for one neutronics cell instance.
/// Stable for the duration of a run; handles are plain data and cross
/// process boundaries freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellHandle(pub usize);

impl std::fmt::Display for CellHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A point in the problem geometry, used to locate heat/fluids element
/// centroids inside neutronics cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Position { x, y, z }
    }
}

/// Step lifecycle shared by both physics engines.
///
/// A capability interface rather than a base class: the coupled driver's
/// control flow depends only on this surface, so a mock driver substitutes
/// directly in tests. Steps are blocking and are not safely retryable
/// mid-solve; any error propagates as fatal.
pub trait PhysicsDriver {
    /// Communicator of the subset of ranks this solver runs on.
    fn comm(&self) -> &Comm;

    /// Whether the calling rank participates in this solver.
    fn active(&self) -> bool {
        self.comm().active()
    }

    fn init_step(&mut self) -> Result<()>;

    fn solve_step(&mut self) -> Result<()>;

    fn finalize_step(&mut self) -> Result<()>;

    /// Writes a statepoint for `(timestep, iteration)`. Format and content
    /// are the solver's concern; the default is a no-op.
    fn write_step(&mut self, _timestep: usize, _iteration: usize) -> Result<()> {
        Ok(())
    }
}

/// Neutron transport solver surface consumed by the coupled driver.
pub trait NeutronicsDriver: PhysicsDriver {
    /// Number of cells in the neutronics model.
    fn n_cells(&self) -> usize;

    /// Locates the owning cell of each position. A position outside every
    /// cell is a fatal configuration error.
    fn find(&mut self, positions: &[Position]) -> Result<Vec<CellHandle>>;

    fn get_temperature(&self, cell: CellHandle) -> f64;

    fn set_temperature(&mut self, cell: CellHandle, temperature: f64) -> Result<()>;

    fn get_density(&self, cell: CellHandle) -> f64;

    fn set_density(&mut self, cell: CellHandle, density: f64) -> Result<()>;

    /// Transport volume of the cell, used to cross-check the mapped
    /// element volumes.
    fn get_volume(&self, cell: CellHandle) -> f64;

    fn is_fissionable(&self, cell: CellHandle) -> bool;

    /// Latest eigenvalue estimate from `solve_step`.
    fn k_eff(&self) -> f64;

    /// Volumetric heat source per cell in [W/m^3], normalized so the
    /// volume-integrated source equals `power`.
    fn heat_source(&self, power: f64) -> Result<Vec<f64>>;

    /// Applies a soluble boron concentration to the fluid-bearing cells.
    fn set_boron_ppm(&mut self, cells: &[CellHandle], ppm: f64, b10_iso_abund: f64) -> Result<()>;

    /// Human-readable label for diagnostics.
    fn cell_label(&self, cell: CellHandle) -> String {
        format!("cell {}", cell)
    }
}

/// Thermal-hydraulics solver surface consumed by the coupled driver.
///
/// Element enumerations are local to the calling rank's sub-domain; the
/// coupled driver's gather establishes the canonical global ordering.
pub trait HeatFluidsDriver: PhysicsDriver {
    /// Number of elements owned by the calling rank.
    fn n_local_elements(&self) -> usize;

    /// Centroids of the local elements, in local element order.
    fn element_centroids(&self) -> Vec<Position>;

    /// Volumes of the local elements, in local element order.
    fn element_volumes(&self) -> Vec<f64>;

    /// 1 for elements in the fluid region, 0 for solid/structure.
    fn fluid_mask(&self) -> Vec<i32>;

    /// Current per-element temperatures in [K], in local element order.
    fn temperatures(&self) -> Vec<f64>;

    /// Current per-element densities in [kg/m^3], in local element order.
    fn densities(&self) -> Vec<f64>;

    /// Applies a per-element volumetric heat source in [W/m^3], in local
    /// element order.
    fn set_heat_source(&mut self, heat_source: &[f64]) -> Result<()>;
}
