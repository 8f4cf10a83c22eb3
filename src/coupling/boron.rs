// src/coupling/boron.rs

use tracing::info;

use crate::comm::Comm;
use crate::drivers::CellHandle;
use crate::error::{CouplingError, Result};
use crate::input::input_deck::BoronSearchSettings;

/// Secant-style criticality search on the soluble boron concentration.
///
/// Adjusts `ppm` so the neutronics eigenvalue converges to `target_k_eff`.
/// The search only proposes the next concentration; re-solving the
/// neutronics problem with it is the coupled driver's job.
pub struct BoronDriver {
    comm: Comm,

    /// Current and previous concentrations, parts-per-million on a number
    /// density basis.
    pub ppm: f64,
    pub ppm_prev: f64,

    /// B10 isotopic abundance of the injected boron. Physical input, never
    /// mutated at runtime. Defaults to the natural abundance (Meija et al.,
    /// Pure Appl. Chem. 88, 2016), consistent with common nuclear data.
    pub b10_iso_abund: f64,

    target_k_eff: f64,
    epsilon: f64,
    initial_step_ppm: f64,

    /// Handles of the fluid-bearing cells the concentration applies to.
    fluid_cells: Vec<CellHandle>,
}

impl BoronDriver {
    pub fn new(comm: Comm, settings: &BoronSearchSettings) -> Self {
        BoronDriver {
            comm,
            ppm: settings.initial_ppm,
            ppm_prev: settings.initial_ppm,
            b10_iso_abund: settings.b10_iso_abund,
            target_k_eff: settings.target_k_eff,
            epsilon: settings.epsilon,
            initial_step_ppm: settings.initial_step_ppm,
            fluid_cells: Vec::new(),
        }
    }

    /// Records which cells carry borated coolant.
    pub fn set_fluid_cells(&mut self, fluid_cells: Vec<CellHandle>) {
        self.fluid_cells = fluid_cells;
    }

    pub fn fluid_cells(&self) -> &[CellHandle] {
        &self.fluid_cells
    }

    /// Proposes the next boron concentration in [ppm].
    ///
    /// On the first pass no two (ppm, k_eff) pairs exist yet, so the
    /// concentration is perturbed by the configured fixed step (raised when
    /// k_eff is above target, lowered otherwise) to establish a second data
    /// point for the secant formula. Subsequent passes apply the secant
    /// update; a vanishing eigenvalue delta means the search has stalled and
    /// is fatal.
    ///
    /// # Arguments
    ///
    /// * `first_pass` - Whether this is the first invocation of the search.
    /// * `k_eff` - Latest eigenvalue estimate, computed at `self.ppm`.
    /// * `k_eff_prev` - Previous eigenvalue estimate, computed at `self.ppm_prev`.
    pub fn solve_ppm(&mut self, first_pass: bool, k_eff: f64, k_eff_prev: f64) -> Result<f64> {
        if first_pass {
            let step = if k_eff >= self.target_k_eff {
                self.initial_step_ppm
            } else {
                -self.initial_step_ppm
            };
            self.ppm_prev = self.ppm;
            self.ppm = (self.ppm + step).max(0.0);
            return Ok(self.ppm);
        }

        let dk = k_eff - k_eff_prev;
        if dk.abs() <= f64::EPSILON * k_eff.abs().max(1.0) {
            return Err(CouplingError::SearchStalled {
                k_eff,
                ppm: self.ppm,
                ppm_prev: self.ppm_prev,
            });
        }

        let ppm_new = self.ppm - (k_eff - self.target_k_eff) * (self.ppm - self.ppm_prev) / dk;
        self.ppm_prev = self.ppm;
        self.ppm = ppm_new.max(0.0);
        Ok(self.ppm)
    }

    /// Whether the eigenvalue is within tolerance of the target.
    pub fn is_converged(&self, k_eff: f64) -> bool {
        (k_eff - self.target_k_eff).abs() < self.epsilon
    }

    /// Logs the status of the criticality search.
    pub fn print_boron(&self, k_eff: f64) {
        if self.comm.rank() == 0 {
            info!(
                "boron search: ppm = {:.3} (prev {:.3}), k-eff = {:.6}, target = {:.6}, converged = {}",
                self.ppm,
                self.ppm_prev,
                k_eff,
                self.target_k_eff,
                self.is_converged(k_eff)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(initial_ppm: f64) -> BoronSearchSettings {
        BoronSearchSettings {
            target_k_eff: 1.0,
            epsilon: 1e-3,
            initial_ppm,
            initial_step_ppm: 50.0,
            b10_iso_abund: 0.1982,
        }
    }

    fn driver(initial_ppm: f64) -> BoronDriver {
        BoronDriver::new(Comm::self_comm(), &settings(initial_ppm))
    }

    #[test]
    fn test_first_pass_perturbs_by_fixed_step() {
        // Supercritical: add boron.
        let mut boron = driver(500.0);
        let ppm = boron.solve_ppm(true, 1.05, 1.05).unwrap();
        assert_eq!(ppm, 550.0);
        assert_eq!(boron.ppm_prev, 500.0);

        // Subcritical: dilute.
        let mut boron = driver(500.0);
        let ppm = boron.solve_ppm(true, 0.95, 0.95).unwrap();
        assert_eq!(ppm, 450.0);
    }

    #[test]
    fn test_first_pass_clamps_at_zero() {
        let mut boron = driver(20.0);
        let ppm = boron.solve_ppm(true, 0.9, 0.9).unwrap();
        assert_eq!(ppm, 0.0);
    }

    #[test]
    fn test_secant_update_at_target_keeps_ppm() {
        // k_eff = 1.02 at 500 ppm, then k_eff = 1.00 at 600 ppm, target 1.00:
        // the secant numerator vanishes, so the proposal stays at 600 ppm.
        let mut boron = driver(600.0);
        boron.ppm_prev = 500.0;
        let ppm = boron.solve_ppm(false, 1.00, 1.02).unwrap();
        assert_eq!(ppm, 600.0);
        assert_eq!(boron.ppm_prev, 600.0);
        assert!(boron.is_converged(1.00));
    }

    #[test]
    fn test_secant_interpolates_linearly() {
        // k drops 0.02 per 100 ppm; from k = 1.01 at 600 ppm the root sits
        // at 650 ppm.
        let mut boron = driver(600.0);
        boron.ppm_prev = 500.0;
        let ppm = boron.solve_ppm(false, 1.01, 1.03).unwrap();
        assert!((ppm - 650.0).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_delta_is_fatal() {
        let mut boron = driver(600.0);
        boron.ppm_prev = 500.0;
        let err = boron.solve_ppm(false, 1.01, 1.01).unwrap_err();
        assert!(matches!(err, CouplingError::SearchStalled { .. }));
    }

    #[test]
    fn test_convergence_window() {
        let boron = driver(600.0);
        assert!(boron.is_converged(1.0));
        assert!(boron.is_converged(1.0005));
        assert!(!boron.is_converged(1.002));
    }
}
