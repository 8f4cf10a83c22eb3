// src/drivers/diffusion_neutronics.rs

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use nalgebra::DVector;
use tracing::{debug, info};

use crate::comm::Comm;
use crate::drivers::{CellHandle, NeutronicsDriver, PhysicsDriver, Position};
use crate::error::{CouplingError, Result};
use crate::input::input_deck::{NeutronicsModel, OutputSettings};
use crate::utils::{build_diagonal_operator, build_diffusion_operator};

/// Natural B10 abundance the configured boron worth is referenced to.
const B10_NATURAL_ABUNDANCE: f64 = 0.1982;

/// One-group diffusion k-eigenvalue solver on a 1-D slab of equal-width
/// cells along the x axis.
///
/// Temperature (Doppler), coolant density, and soluble boron feed back into
/// the cross sections, which is all the coupling needs from a neutronics
/// engine. `solve_step` runs a power iteration on the discretized diffusion
/// operator; `heat_source` distributes the configured power over the
/// fission rate.
pub struct DiffusionNeutronics {
    comm: Comm,
    cell_width: f64,
    flow_area: f64,
    diffusion: Vec<f64>,
    absorption: Vec<f64>,
    fission: Vec<f64>,
    nu: f64,
    boron_xs_per_ppm: f64,
    doppler_coefficient: f64,
    reference_temperature: f64,
    reference_density: f64,
    output_folder: PathBuf,

    temperatures: Vec<f64>,
    densities: Vec<f64>,
    /// Effective concentration per cell, scaled to natural B10 abundance.
    boron_ppm: Vec<f64>,

    flux: DVector<f64>,
    k_eff: f64,
    n_fissionable_cells: usize,
}

impl DiffusionNeutronics {
    pub fn new(comm: Comm, model: &NeutronicsModel, output: &OutputSettings) -> Result<Self> {
        let n = model.n_cells;

        // Count fissionable cells up front to aid in catching improperly
        // mapped problems.
        let n_fissionable_cells = model.fission_xs.iter().filter(|&&xs| xs > 0.0).count();
        if comm.rank() == 0 {
            info!("neutronics model: {} cells, {} fissionable", n, n_fissionable_cells);
        }

        Ok(DiffusionNeutronics {
            comm,
            cell_width: model.cell_width,
            flow_area: model.flow_area,
            diffusion: model.diffusion_coefficient.clone(),
            absorption: model.absorption_xs.clone(),
            fission: model.fission_xs.clone(),
            nu: model.nu,
            boron_xs_per_ppm: model.boron_xs_per_ppm,
            doppler_coefficient: model.doppler_coefficient,
            reference_temperature: model.reference_temperature,
            reference_density: model.reference_density,
            output_folder: PathBuf::from(&output.output_folder),
            temperatures: vec![model.initial_temperature; n],
            densities: vec![model.initial_density; n],
            boron_ppm: vec![0.0; n],
            flux: DVector::from_element(n, 1.0),
            k_eff: 0.0,
            n_fissionable_cells,
        })
    }

    /// Number of cells with a nonzero fission cross section.
    pub fn n_fissionable_cells(&self) -> usize {
        self.n_fissionable_cells
    }

    /// Per-cell production cross sections with density feedback.
    fn nu_fission(&self) -> Vec<f64> {
        self.fission
            .iter()
            .zip(self.densities.iter())
            .map(|(&xs, &rho)| self.nu * xs * rho / self.reference_density)
            .collect()
    }

    /// Per-cell removal cross sections with Doppler and boron feedback.
    fn removal(&self) -> Vec<f64> {
        (0..self.absorption.len())
            .map(|i| {
                self.absorption[i]
                    + self.doppler_coefficient * (self.temperatures[i] - self.reference_temperature)
                    + self.boron_xs_per_ppm * self.boron_ppm[i]
            })
            .collect()
    }
}

impl PhysicsDriver for DiffusionNeutronics {
    fn comm(&self) -> &Comm {
        &self.comm
    }

    fn init_step(&mut self) -> Result<()> {
        Ok(())
    }

    fn solve_step(&mut self) -> Result<()> {
        let n = self.diffusion.len();
        let delta_x = vec![self.cell_width; n];

        let leakage = build_diffusion_operator(&self.diffusion, &delta_x);
        let removal = build_diagonal_operator(&self.removal());
        let production = build_diagonal_operator(&self.nu_fission());

        // Loss operator A = -L + Sigma_r; eigenproblem A*phi = (1/k) F*phi.
        let loss = removal - leakage;
        let lu = loss.lu();

        let mut phi = DVector::from_element(n, 1.0);
        let mut k = 0.0;
        for iteration in 0..500 {
            let source = &production * &phi;
            let total_source = source.sum();
            if total_source <= 0.0 {
                // No fission production anywhere: subcritical by definition.
                self.k_eff = 0.0;
                self.flux = phi;
                return Ok(());
            }

            let phi_new = lu.solve(&source).ok_or_else(|| CouplingError::InvalidDeck(
                "diffusion loss operator is singular; check cross sections".into(),
            ))?;
            // A^-1 F has dominant eigenvalue k, so the source ratio is the
            // eigenvalue estimate directly.
            let k_new = (&production * &phi_new).sum() / total_source;
            let converged = (k_new - k).abs() < 1e-10 * k_new.abs();

            phi = &phi_new / phi_new.amax();
            k = k_new;
            if converged {
                debug!("power iteration converged in {} iterations", iteration + 1);
                break;
            }
        }

        self.k_eff = k;
        self.flux = phi;
        Ok(())
    }

    fn finalize_step(&mut self) -> Result<()> {
        Ok(())
    }

    /// Writes a flux statepoint named `neutronics_t<timestep>_i<iteration>.csv`
    /// into the output folder.
    fn write_step(&mut self, timestep: usize, iteration: usize) -> Result<()> {
        if self.comm.rank() != 0 {
            return Ok(());
        }
        std::fs::create_dir_all(&self.output_folder)?;
        let path = self
            .output_folder
            .join(format!("neutronics_t{}_i{}.csv", timestep, iteration));
        let mut file = File::create(&path)?;
        writeln!(file, "# k_eff = {:.8}", self.k_eff)?;
        writeln!(file, "cell,flux,temperature,density,boron_ppm")?;
        for i in 0..self.flux.len() {
            writeln!(
                file,
                "{},{},{},{},{}",
                i, self.flux[i], self.temperatures[i], self.densities[i], self.boron_ppm[i]
            )?;
        }
        Ok(())
    }
}

impl NeutronicsDriver for DiffusionNeutronics {
    fn n_cells(&self) -> usize {
        self.diffusion.len()
    }

    fn find(&mut self, positions: &[Position]) -> Result<Vec<CellHandle>> {
        let length = self.cell_width * self.n_cells() as f64;
        positions
            .iter()
            .enumerate()
            .map(|(elem, p)| {
                if p.x < 0.0 || p.x >= length {
                    return Err(CouplingError::UnmappedPosition {
                        elem,
                        x: p.x,
                        y: p.y,
                        z: p.z,
                    });
                }
                Ok(CellHandle((p.x / self.cell_width) as usize))
            })
            .collect()
    }

    fn get_temperature(&self, cell: CellHandle) -> f64 {
        self.temperatures[cell.0]
    }

    fn set_temperature(&mut self, cell: CellHandle, temperature: f64) -> Result<()> {
        self.temperatures[cell.0] = temperature;
        Ok(())
    }

    fn get_density(&self, cell: CellHandle) -> f64 {
        self.densities[cell.0]
    }

    fn set_density(&mut self, cell: CellHandle, density: f64) -> Result<()> {
        self.densities[cell.0] = density;
        Ok(())
    }

    fn get_volume(&self, _cell: CellHandle) -> f64 {
        self.cell_width * self.flow_area
    }

    fn is_fissionable(&self, cell: CellHandle) -> bool {
        self.fission[cell.0] > 0.0
    }

    fn k_eff(&self) -> f64 {
        self.k_eff
    }

    fn heat_source(&self, power: f64) -> Result<Vec<f64>> {
        let nu_fission = self.nu_fission();
        let rates: Vec<f64> = (0..self.n_cells())
            .map(|i| nu_fission[i] * self.flux[i] * self.get_volume(CellHandle(i)))
            .collect();
        let total: f64 = rates.iter().sum();
        if total <= 0.0 {
            return Err(CouplingError::InvalidDeck(
                "heat source requested but the model produces no fission power".into(),
            ));
        }

        // Fraction of fission power per cell, converted to [W/m^3].
        Ok((0..self.n_cells())
            .map(|i| power * rates[i] / (total * self.get_volume(CellHandle(i))))
            .collect())
    }

    fn set_boron_ppm(&mut self, cells: &[CellHandle], ppm: f64, b10_iso_abund: f64) -> Result<()> {
        let effective = ppm * b10_iso_abund / B10_NATURAL_ABUNDANCE;
        for &cell in cells {
            self.boron_ppm[cell.0] = effective;
        }
        Ok(())
    }

    fn cell_label(&self, cell: CellHandle) -> String {
        format!("slab cell {} of {}", cell.0, self.n_cells())
    }
}
