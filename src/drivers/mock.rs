// src/drivers/mock.rs
//! In-memory stand-ins for both physics drivers, used to exercise the
//! mapping, transfer, and coupled-driver logic without real solvers.

use crate::comm::Comm;
use crate::drivers::{CellHandle, HeatFluidsDriver, NeutronicsDriver, PhysicsDriver, Position};
use crate::error::{CouplingError, Result};

/// Mock neutron transport solver over a 1-D slab of equal-width cells along
/// the x axis. `k_eff` values are replayed from a configured sequence and
/// the heat source is a fixed per-cell array.
pub struct MockNeutronics {
    comm: Comm,
    pub cell_width: f64,
    pub volumes: Vec<f64>,
    pub temperatures: Vec<f64>,
    pub densities: Vec<f64>,
    pub fissionable: Vec<bool>,
    pub heat_source: Vec<f64>,
    pub k_eff_sequence: Vec<f64>,
    pub boron_ppm: f64,
    solves: usize,
    k_eff: f64,
}

impl MockNeutronics {
    pub fn slab(n_cells: usize, cell_width: f64, volume: f64) -> Self {
        MockNeutronics {
            comm: Comm::self_comm(),
            cell_width,
            volumes: vec![volume; n_cells],
            temperatures: vec![600.0; n_cells],
            densities: vec![750.0; n_cells],
            fissionable: vec![true; n_cells],
            heat_source: vec![0.0; n_cells],
            k_eff_sequence: vec![1.0],
            boron_ppm: 0.0,
            solves: 0,
            k_eff: 0.0,
        }
    }
}

impl PhysicsDriver for MockNeutronics {
    fn comm(&self) -> &Comm {
        &self.comm
    }

    fn init_step(&mut self) -> Result<()> {
        Ok(())
    }

    fn solve_step(&mut self) -> Result<()> {
        let i = self.solves.min(self.k_eff_sequence.len() - 1);
        self.k_eff = self.k_eff_sequence[i];
        self.solves += 1;
        Ok(())
    }

    fn finalize_step(&mut self) -> Result<()> {
        Ok(())
    }
}

impl NeutronicsDriver for MockNeutronics {
    fn n_cells(&self) -> usize {
        self.volumes.len()
    }

    fn find(&mut self, positions: &[Position]) -> Result<Vec<CellHandle>> {
        positions
            .iter()
            .enumerate()
            .map(|(elem, p)| {
                let i = (p.x / self.cell_width).floor();
                if p.x < 0.0 || i as usize >= self.n_cells() {
                    Err(CouplingError::UnmappedPosition { elem, x: p.x, y: p.y, z: p.z })
                } else {
                    Ok(CellHandle(i as usize))
                }
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

    fn get_volume(&self, cell: CellHandle) -> f64 {
        self.volumes[cell.0]
    }

    fn is_fissionable(&self, cell: CellHandle) -> bool {
        self.fissionable[cell.0]
    }

    fn k_eff(&self) -> f64 {
        self.k_eff
    }

    fn heat_source(&self, _power: f64) -> Result<Vec<f64>> {
        Ok(self.heat_source.clone())
    }

    fn set_boron_ppm(&mut self, _cells: &[CellHandle], ppm: f64, _b10_iso_abund: f64) -> Result<()> {
        self.boron_ppm = ppm;
        Ok(())
    }
}

/// Mock thermal-hydraulics solver. Each `solve_step` replays the next
/// configured temperature field; densities are held fixed.
pub struct MockHeatFluids {
    comm: Comm,
    pub centroids: Vec<Position>,
    pub volumes: Vec<f64>,
    pub fluid: Vec<i32>,
    pub temperatures: Vec<f64>,
    pub densities: Vec<f64>,
    pub received_heat_source: Vec<f64>,
    pub solve_temperatures: Vec<Vec<f64>>,
    solves: usize,
}

impl MockHeatFluids {
    /// `n_elems` equal-volume elements spread uniformly over `[0, length)`.
    pub fn channel(n_elems: usize, length: f64, total_volume: f64) -> Self {
        let dx = length / n_elems as f64;
        MockHeatFluids {
            comm: Comm::self_comm(),
            centroids: (0..n_elems)
                .map(|i| Position::new((i as f64 + 0.5) * dx, 0.0, 0.0))
                .collect(),
            volumes: vec![total_volume / n_elems as f64; n_elems],
            fluid: vec![1; n_elems],
            temperatures: vec![600.0; n_elems],
            densities: vec![750.0; n_elems],
            received_heat_source: vec![0.0; n_elems],
            solve_temperatures: Vec::new(),
            solves: 0,
        }
    }
}

impl PhysicsDriver for MockHeatFluids {
    fn comm(&self) -> &Comm {
        &self.comm
    }

    fn init_step(&mut self) -> Result<()> {
        Ok(())
    }

    fn solve_step(&mut self) -> Result<()> {
        if !self.solve_temperatures.is_empty() {
            let i = self.solves.min(self.solve_temperatures.len() - 1);
            self.temperatures = self.solve_temperatures[i].clone();
        }
        self.solves += 1;
        Ok(())
    }

    fn finalize_step(&mut self) -> Result<()> {
        Ok(())
    }
}

impl HeatFluidsDriver for MockHeatFluids {
    fn n_local_elements(&self) -> usize {
        self.centroids.len()
    }

    fn element_centroids(&self) -> Vec<Position> {
        self.centroids.clone()
    }

    fn element_volumes(&self) -> Vec<f64> {
        self.volumes.clone()
    }

    fn fluid_mask(&self) -> Vec<i32> {
        self.fluid.clone()
    }

    fn temperatures(&self) -> Vec<f64> {
        self.temperatures.clone()
    }

    fn densities(&self) -> Vec<f64> {
        self.densities.clone()
    }

    fn set_heat_source(&mut self, heat_source: &[f64]) -> Result<()> {
        self.received_heat_source = heat_source.to_vec();
        Ok(())
    }
}
