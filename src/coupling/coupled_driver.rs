// src/coupling/coupled_driver.rs

use nalgebra::DVector;
use tracing::{info, warn};

use crate::comm::Comm;
use crate::coupling::boron::BoronDriver;
use crate::coupling::convergence::ConvergenceChecker;
use crate::coupling::mapping::SpatialMapping;
use crate::coupling::relaxation::Relaxation;
use crate::coupling::transfer::{cells_to_elems, elems_to_cells};
use crate::drivers::{HeatFluidsDriver, NeutronicsDriver};
use crate::error::{CouplingError, Result};
use crate::input::input_deck::{InitialCondition, InputDeck};

/// Outcome of one timestep's Picard iteration, surfaced to the caller.
#[derive(Debug, Clone, Copy)]
pub struct TimestepReport {
    pub timestep: usize,
    pub picard_iterations: usize,
    pub converged: bool,
    pub residual: f64,
    pub k_eff: f64,
}

/// Orchestrates the coupled neutronics / heat-fluids solve.
///
/// Owns both physics drivers, the spatial mapping, and every field snapshot.
/// All ranks execute the same control flow in lockstep; the collectives
/// inside the field transfers double as the barriers between Picard
/// sub-phases, so no rank reads a transferred field before it is fully
/// assembled.
pub struct CoupledDriver<N: NeutronicsDriver, H: HeatFluidsDriver> {
    comm: Comm,
    neutronics: N,
    heat: H,
    mapping: SpatialMapping,
    boron: Option<BoronDriver>,

    power: f64,
    max_timesteps: usize,
    max_picard_iter: usize,
    checker: ConvergenceChecker,
    relax_heat_source: Relaxation,
    relax_temperature: Relaxation,
    relax_density: Relaxation,
    statepoints: bool,

    i_timestep: usize,
    i_picard: usize,
    k_eff: f64,
    k_eff_prev: f64,
    boron_first_pass: bool,

    // Per-local-cell field snapshots, indexed by the canonical local-cell
    // ordering of the mapping. The previous-iteration snapshot is
    // overwritten only at the start of a Picard iteration.
    temperatures: DVector<f64>,
    temperatures_prev: DVector<f64>,
    densities: DVector<f64>,
    densities_prev: DVector<f64>,
    heat_source: DVector<f64>,
    heat_source_prev: DVector<f64>,
}

impl<N: NeutronicsDriver, H: HeatFluidsDriver> CoupledDriver<N, H> {
    /// Builds the spatial mapping and the initial field state. Mapping or
    /// volume inconsistencies abort construction.
    pub fn new(comm: Comm, mut neutronics: N, heat: H, deck: &InputDeck) -> Result<Self> {
        let sim = &deck.simulation;
        let mapping = SpatialMapping::build(&mut neutronics, &heat, &comm, sim.volume_tolerance)?;

        let temperatures =
            init_cell_field(&mapping, &neutronics, &heat, &comm, sim.temperature_ic, |h| {
                h.temperatures()
            }, |n, c| n.get_temperature(c));
        let densities =
            init_cell_field(&mapping, &neutronics, &heat, &comm, sim.density_ic, |h| {
                h.densities()
            }, |n, c| n.get_density(c));

        // The neutronics solver runs first, so the heat source needs no
        // initial condition.
        let heat_source = DVector::zeros(mapping.n_local_cells());

        let mut boron = deck
            .boron_search
            .as_ref()
            .map(|settings| BoronDriver::new(comm.clone(), settings));
        if let Some(boron) = &mut boron {
            boron.set_fluid_cells(mapping.fluid_cell_handles());
            neutronics.set_boron_ppm(boron.fluid_cells(), boron.ppm, boron.b10_iso_abund)?;
        }

        let driver = CoupledDriver {
            comm,
            neutronics,
            heat,
            mapping,
            boron,
            power: sim.power,
            max_timesteps: sim.max_timesteps,
            max_picard_iter: sim.max_picard_iterations,
            checker: ConvergenceChecker::new(sim.norm, sim.picard_tolerance),
            relax_heat_source: deck.relaxation.heat_source,
            relax_temperature: deck.relaxation.temperature(),
            relax_density: deck.relaxation.density(),
            statepoints: deck.output.statepoints,
            i_timestep: 0,
            i_picard: 0,
            k_eff: 0.0,
            k_eff_prev: 0.0,
            boron_first_pass: true,
            temperatures_prev: temperatures.clone(),
            temperatures,
            densities_prev: densities.clone(),
            densities,
            heat_source_prev: heat_source.clone(),
            heat_source,
        };
        driver.comm_report();
        Ok(driver)
    }

    pub fn get_timestep_index(&self) -> usize {
        self.i_timestep
    }

    pub fn get_picard_index(&self) -> usize {
        self.i_picard
    }

    /// Whether this is the first Picard iteration of the first timestep.
    pub fn is_first_iteration(&self) -> bool {
        self.i_timestep == 0 && self.i_picard == 0
    }

    pub fn get_neutronics_driver(&self) -> &N {
        &self.neutronics
    }

    pub fn get_heat_driver(&self) -> &H {
        &self.heat
    }

    pub fn mapping(&self) -> &SpatialMapping {
        &self.mapping
    }

    /// Runs the outer timestep loop and the inner Picard loop to completion.
    ///
    /// Picard non-convergence within the iteration budget is a reported
    /// soft failure: the timestep advances with the last available fields.
    /// Mapping defects, solver-step failures, and a stalled boron search
    /// are fatal and propagate immediately.
    pub fn execute(&mut self) -> Result<Vec<TimestepReport>> {
        let mut reports = Vec::with_capacity(self.max_timesteps);

        for i_timestep in 0..self.max_timesteps {
            self.i_timestep = i_timestep;
            self.i_picard = 0;
            let mut converged = false;
            let mut residual = f64::INFINITY;

            while self.i_picard < self.max_picard_iter {
                // Picard iteration begins: snapshot the previous iterates.
                self.temperatures_prev.copy_from(&self.temperatures);
                self.densities_prev.copy_from(&self.densities);
                self.heat_source_prev.copy_from(&self.heat_source);

                self.solve_neutronics()?;
                self.solve_boron()?;
                self.update_heat_source(!self.is_first_iteration())?;
                self.solve_heat()?;
                self.update_temperature()?;
                self.update_density()?;

                residual = self.checker.temperature_norm(
                    &self.temperatures,
                    &self.temperatures_prev,
                    &self.comm,
                );
                if self.comm.rank() == 0 {
                    info!(
                        "timestep {}, picard {}: k-eff = {:.6}, temperature residual = {:.6e}",
                        self.i_timestep, self.i_picard, self.k_eff, residual
                    );
                }

                self.i_picard += 1;
                if residual < self.checker.epsilon {
                    converged = true;
                    break;
                }
            }

            if !converged && self.comm.rank() == 0 {
                warn!(
                    "timestep {} did not converge within {} Picard iterations \
                     (residual {:.6e}, tolerance {:.6e}); advancing with last fields",
                    self.i_timestep, self.max_picard_iter, residual, self.checker.epsilon
                );
            }

            reports.push(TimestepReport {
                timestep: self.i_timestep,
                picard_iterations: self.i_picard,
                converged,
                residual,
                k_eff: self.k_eff,
            });
        }

        Ok(reports)
    }

    fn solve_neutronics(&mut self) -> Result<()> {
        self.step_context("neutronics", "init_step", |s| s.neutronics.init_step())?;
        self.step_context("neutronics", "solve_step", |s| s.neutronics.solve_step())?;
        self.k_eff_prev = self.k_eff;
        self.k_eff = self.neutronics.k_eff();
        if self.statepoints {
            let (t, i) = (self.i_timestep, self.i_picard);
            self.step_context("neutronics", "write_step", |s| s.neutronics.write_step(t, i))?;
        }
        self.step_context("neutronics", "finalize_step", |s| s.neutronics.finalize_step())
    }

    fn solve_heat(&mut self) -> Result<()> {
        self.step_context("heat/fluids", "init_step", |s| s.heat.init_step())?;
        self.step_context("heat/fluids", "solve_step", |s| s.heat.solve_step())?;
        self.step_context("heat/fluids", "finalize_step", |s| s.heat.finalize_step())
    }

    /// Runs one step of the criticality search on the just-computed
    /// eigenvalue and applies the proposed concentration to the neutronics
    /// model, ahead of the next neutronics solve.
    fn solve_boron(&mut self) -> Result<()> {
        let Some(boron) = &mut self.boron else {
            return Ok(());
        };
        boron.print_boron(self.k_eff);
        if !boron.is_converged(self.k_eff) {
            let ppm = boron.solve_ppm(self.boron_first_pass, self.k_eff, self.k_eff_prev)?;
            let cells = boron.fluid_cells().to_vec();
            let b10 = boron.b10_iso_abund;
            self.neutronics.set_boron_ppm(&cells, ppm, b10)?;
        }
        self.boron_first_pass = false;
        Ok(())
    }

    /// Pulls the heat source from the neutronics solver, relaxes it, and
    /// pushes it down to the heat/fluids elements.
    ///
    /// No relaxation is applied on the very first pass of the run: the heat
    /// source has no initial condition, so there is no previous iterate to
    /// blend with.
    pub fn update_heat_source(&mut self, relax: bool) -> Result<()> {
        let q_global = self.neutronics.heat_source(self.power)?;

        let mut q_new = DVector::zeros(self.mapping.n_local_cells());
        for (l_cell, &g_cell) in self.mapping.l_cell_to_g_cell.iter().enumerate() {
            q_new[l_cell] = q_global[g_cell.0];
        }

        self.heat_source = if relax {
            self.relax_heat_source
                .apply(&q_new, &self.heat_source_prev, self.i_picard)
        } else {
            q_new
        };

        let mut elem_q = vec![0.0; self.mapping.n_elements()];
        cells_to_elems(&self.mapping, &self.heat_source, &mut elem_q);
        let lo = self.mapping.local_elem_offset;
        let hi = lo + self.mapping.n_local_elems;
        self.heat.set_heat_source(&elem_q[lo..hi])
    }

    /// Pulls per-element temperatures from the heat/fluids solver, averages
    /// them onto the local cells, relaxes against the previous iterate, and
    /// pushes the result to the neutronics solver. Cells outside the fluid
    /// mask keep their existing temperature.
    pub fn update_temperature(&mut self) -> Result<()> {
        let gathered = self.comm.allgather_f64(&self.heat.temperatures());

        // Non-fluid cells retain their current value through the transfer.
        let mut t_new = self.temperatures.clone();
        elems_to_cells(&self.mapping, &gathered, &mut t_new);

        self.temperatures = self
            .relax_temperature
            .apply(&t_new, &self.temperatures_prev, self.i_picard);

        for (l_cell, &g_cell) in self.mapping.l_cell_to_g_cell.iter().enumerate() {
            if self.mapping.cell_fluid_mask[l_cell] == 1 {
                self.neutronics.set_temperature(g_cell, self.temperatures[l_cell])?;
            }
        }
        Ok(())
    }

    /// Same as [`update_temperature`](Self::update_temperature), for the
    /// coolant density.
    pub fn update_density(&mut self) -> Result<()> {
        let gathered = self.comm.allgather_f64(&self.heat.densities());

        let mut rho_new = self.densities.clone();
        elems_to_cells(&self.mapping, &gathered, &mut rho_new);

        self.densities = self
            .relax_density
            .apply(&rho_new, &self.densities_prev, self.i_picard);

        for (l_cell, &g_cell) in self.mapping.l_cell_to_g_cell.iter().enumerate() {
            if self.mapping.cell_fluid_mask[l_cell] == 1 {
                self.neutronics.set_density(g_cell, self.densities[l_cell])?;
            }
        }
        Ok(())
    }

    /// Current global temperature residual between Picard iterates.
    pub fn temperature_norm(&self) -> f64 {
        self.checker
            .temperature_norm(&self.temperatures, &self.temperatures_prev, &self.comm)
    }

    pub fn is_converged(&self) -> bool {
        self.checker
            .is_converged(&self.temperatures, &self.temperatures_prev, &self.comm)
    }

    fn comm_report(&self) {
        if self.comm.rank() == 0 {
            info!(
                "coupling communicator: {} rank(s); neutronics active = {}, heat/fluids active = {}; \
                 {} local cells, {} elements",
                self.comm.size(),
                self.neutronics.active(),
                self.heat.active(),
                self.mapping.n_local_cells(),
                self.mapping.n_elements()
            );
        }
    }

    fn step_context(
        &mut self,
        driver: &'static str,
        phase: &'static str,
        f: impl FnOnce(&mut Self) -> Result<()>,
    ) -> Result<()> {
        let (timestep, picard) = (self.i_timestep, self.i_picard);
        f(self).map_err(|e| CouplingError::SolverStep {
            driver,
            phase,
            timestep,
            picard,
            message: e.to_string(),
        })
    }
}

/// Initial per-local-cell field, sourced either from the neutronics model
/// definition or from the heat/fluids solver's own initial state.
fn init_cell_field<N, H>(
    mapping: &SpatialMapping,
    neutronics: &N,
    heat: &H,
    comm: &Comm,
    ic: InitialCondition,
    elem_values: impl Fn(&H) -> Vec<f64>,
    cell_value: impl Fn(&N, crate::drivers::CellHandle) -> f64,
) -> DVector<f64>
where
    N: NeutronicsDriver,
    H: HeatFluidsDriver,
{
    // Neutronics-sourced values fill every cell; a heat-sourced initial
    // condition overwrites the fluid cells and leaves solid cells at the
    // neutronics values.
    let mut field = DVector::from_iterator(
        mapping.n_local_cells(),
        mapping.l_cell_to_g_cell.iter().map(|&c| cell_value(neutronics, c)),
    );
    if ic == InitialCondition::Heat {
        let gathered = comm.allgather_f64(&elem_values(heat));
        elems_to_cells(mapping, &gathered, &mut field);
    }
    field
}
