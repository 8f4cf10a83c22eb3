// src/input/input_deck.rs
use serde::Deserialize;

use crate::coupling::convergence::Norm;
use crate::coupling::relaxation::Relaxation;

/// Where a temperature or density initial condition is sourced from before
/// the first neutronics solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialCondition {
    /// Use the values already present in the neutronics model definition.
    Neutronics,
    /// Query the heat/fluids solver's own initial state.
    Heat,
}

fn default_epsilon() -> f64 {
    1e-3
}

fn default_norm() -> Norm {
    Norm::Linf
}

fn default_relaxation() -> Relaxation {
    Relaxation::Constant(1.0)
}

fn default_initial_condition() -> InitialCondition {
    InitialCondition::Neutronics
}

fn default_volume_tolerance() -> f64 {
    1e-6
}

#[derive(Debug, Deserialize)]
pub struct SimulationSettings {
    pub power: f64,                    // [W] Total thermal power
    pub max_timesteps: usize,          // Number of time steps
    pub max_picard_iterations: usize,  // Maximum Picard iterations per time step
    #[serde(default = "default_epsilon")]
    pub picard_tolerance: f64,         // Tolerance for Picard convergence
    #[serde(default = "default_norm")]
    pub norm: Norm,                    // Norm for the temperature residual
    #[serde(default = "default_initial_condition")]
    pub temperature_ic: InitialCondition,
    #[serde(default = "default_initial_condition")]
    pub density_ic: InitialCondition,
    #[serde(default = "default_volume_tolerance")]
    pub volume_tolerance: f64,         // Relative tolerance for mapped volumes
}

/// Per-field under-relaxation factors. Temperature and density default to
/// the heat-source factor when not given.
#[derive(Debug, Deserialize)]
pub struct RelaxationSettings {
    #[serde(default = "default_relaxation")]
    pub heat_source: Relaxation,
    #[serde(default)]
    pub temperature: Option<Relaxation>,
    #[serde(default)]
    pub density: Option<Relaxation>,
}

impl Default for RelaxationSettings {
    fn default() -> Self {
        RelaxationSettings {
            heat_source: default_relaxation(),
            temperature: None,
            density: None,
        }
    }
}

impl RelaxationSettings {
    pub fn temperature(&self) -> Relaxation {
        self.temperature.unwrap_or(self.heat_source)
    }

    pub fn density(&self) -> Relaxation {
        self.density.unwrap_or(self.heat_source)
    }
}

#[derive(Debug, Deserialize)]
pub struct NeutronicsModel {
    pub n_cells: usize,                  // Number of cells along the slab
    pub cell_width: f64,                 // [m]
    pub flow_area: f64,                  // [m^2] Cross-sectional area
    pub diffusion_coefficient: Vec<f64>, // [m] per cell
    pub absorption_xs: Vec<f64>,         // [1/m] per cell
    pub fission_xs: Vec<f64>,            // [1/m] per cell
    pub nu: f64,                         // Average neutrons/fission
    pub boron_xs_per_ppm: f64,           // [1/m/ppm] at natural B10 abundance
    pub doppler_coefficient: f64,        // [1/m/K] absorption increase with T
    pub reference_temperature: f64,      // [K]
    pub reference_density: f64,          // [kg/m^3]
    pub initial_temperature: f64,        // [K] per-cell initial condition
    pub initial_density: f64,            // [kg/m^3] per-cell initial condition
}

#[derive(Debug, Deserialize)]
pub struct HeatFluidsModel {
    pub elements_per_cell: usize,        // Axial refinement of the cell grid
    pub mass_flow_rate: f64,             // [kg/s]
    pub heat_capacity: f64,              // [J/(kg*K)]
    pub inlet_temperature: f64,          // [K]
    pub reference_density: f64,          // [kg/m^3]
    pub expansion_coefficient: f64,      // [1/K]
    pub reference_temperature: f64,      // [K]
    #[serde(default)]
    pub solid_elements: Vec<usize>,      // Element ids outside the fluid region
}

fn default_b10_abundance() -> f64 {
    // Natural abundance, Meija et al., Pure Appl. Chem. 88 (2016).
    0.1982
}

#[derive(Debug, Deserialize)]
pub struct BoronSearchSettings {
    pub target_k_eff: f64,               // Eigenvalue the search drives toward
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,                    // |k_eff - target| tolerance
    pub initial_ppm: f64,                // [ppm] Starting concentration
    pub initial_step_ppm: f64,           // [ppm] First-pass perturbation
    #[serde(default = "default_b10_abundance")]
    pub b10_iso_abund: f64,              // B10 isotopic abundance
}

#[derive(Debug, Deserialize)]
pub struct OutputSettings {
    pub output_folder: String,
    #[serde(default)]
    pub statepoints: bool,               // Write a statepoint per (timestep, iteration)
}

#[derive(Debug, Deserialize)]
pub struct InputDeck {
    pub simulation: SimulationSettings,
    #[serde(default)]
    pub relaxation: RelaxationSettings,
    pub neutronics: NeutronicsModel,
    pub heat_fluids: HeatFluidsModel,
    pub boron_search: Option<BoronSearchSettings>,
    pub output: OutputSettings,
}

impl InputDeck {
    /// Checks cross-section vector lengths and positivity constraints that
    /// serde cannot express.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::CouplingError::InvalidDeck;

        let n = self.neutronics.n_cells;
        if n == 0 {
            return Err(InvalidDeck("neutronics.n_cells must be positive".into()));
        }
        for (name, xs) in [
            ("diffusion_coefficient", &self.neutronics.diffusion_coefficient),
            ("absorption_xs", &self.neutronics.absorption_xs),
            ("fission_xs", &self.neutronics.fission_xs),
        ] {
            if xs.len() != n {
                return Err(InvalidDeck(format!(
                    "neutronics.{} has {} entries, expected n_cells = {}",
                    name,
                    xs.len(),
                    n
                )));
            }
        }
        if self.heat_fluids.elements_per_cell == 0 {
            return Err(InvalidDeck(
                "heat_fluids.elements_per_cell must be positive".into(),
            ));
        }
        if self.heat_fluids.mass_flow_rate <= 0.0 {
            return Err(InvalidDeck("heat_fluids.mass_flow_rate must be positive".into()));
        }
        if self.simulation.max_picard_iterations == 0 {
            return Err(InvalidDeck(
                "simulation.max_picard_iterations must be positive".into(),
            ));
        }
        Ok(())
    }
}
