// src/drivers/channel_heat.rs

use crate::comm::Comm;
use crate::drivers::{HeatFluidsDriver, PhysicsDriver, Position};
use crate::error::{CouplingError, Result};
use crate::input::input_deck::{HeatFluidsModel, NeutronicsModel};

/// Single-channel coolant model on a 1-D refinement of the neutronics grid.
///
/// Each neutronics cell is split into `elements_per_cell` equal elements, so
/// the element volumes mapped into a cell sum to the cell's transport volume
/// exactly. `solve_step` marches a steady energy balance from the inlet;
/// densities follow a linear expansion law. Elements listed as solid are
/// excluded from the fluid region and hold their state.
pub struct ChannelHeatFluids {
    comm: Comm,
    element_width: f64,
    flow_area: f64,
    mass_flow_rate: f64,
    heat_capacity: f64,
    inlet_temperature: f64,
    reference_density: f64,
    expansion_coefficient: f64,
    reference_temperature: f64,

    fluid: Vec<i32>,
    temperatures: Vec<f64>,
    densities: Vec<f64>,
    heat_source: Vec<f64>,
}

impl ChannelHeatFluids {
    pub fn new(
        comm: Comm,
        model: &HeatFluidsModel,
        neutronics: &NeutronicsModel,
    ) -> Result<Self> {
        let n_elems = neutronics.n_cells * model.elements_per_cell;
        let element_width = neutronics.cell_width / model.elements_per_cell as f64;

        let mut fluid = vec![1; n_elems];
        for &e in &model.solid_elements {
            if e >= n_elems {
                return Err(CouplingError::InvalidDeck(format!(
                    "heat_fluids.solid_elements entry {} out of range (model has {} elements)",
                    e, n_elems
                )));
            }
            fluid[e] = 0;
        }

        let temperatures = vec![model.inlet_temperature; n_elems];
        let density = model.reference_density
            * (1.0
                - model.expansion_coefficient
                    * (model.inlet_temperature - model.reference_temperature));

        Ok(ChannelHeatFluids {
            comm,
            element_width,
            flow_area: neutronics.flow_area,
            mass_flow_rate: model.mass_flow_rate,
            heat_capacity: model.heat_capacity,
            inlet_temperature: model.inlet_temperature,
            reference_density: model.reference_density,
            expansion_coefficient: model.expansion_coefficient,
            reference_temperature: model.reference_temperature,
            fluid,
            temperatures,
            densities: vec![density; n_elems],
            heat_source: vec![0.0; n_elems],
        })
    }

    fn element_volume(&self) -> f64 {
        self.element_width * self.flow_area
    }

    fn density_at(&self, temperature: f64) -> f64 {
        self.reference_density
            * (1.0 - self.expansion_coefficient * (temperature - self.reference_temperature))
    }
}

impl PhysicsDriver for ChannelHeatFluids {
    fn comm(&self) -> &Comm {
        &self.comm
    }

    fn init_step(&mut self) -> Result<()> {
        Ok(())
    }

    fn solve_step(&mut self) -> Result<()> {
        // Steady energy balance marched up the channel: each fluid element
        // heats the stream by q*V / (mdot*cp) and is assigned the mid-rise
        // temperature. Solid elements do not touch the stream and keep
        // their state.
        let volume = self.element_volume();
        let mut stream_temperature = self.inlet_temperature;
        for i in 0..self.temperatures.len() {
            if self.fluid[i] != 1 {
                continue;
            }
            let rise = self.heat_source[i] * volume / (self.mass_flow_rate * self.heat_capacity);
            self.temperatures[i] = stream_temperature + 0.5 * rise;
            self.densities[i] = self.density_at(self.temperatures[i]);
            stream_temperature += rise;
        }
        Ok(())
    }

    fn finalize_step(&mut self) -> Result<()> {
        Ok(())
    }
}

impl HeatFluidsDriver for ChannelHeatFluids {
    fn n_local_elements(&self) -> usize {
        self.temperatures.len()
    }

    fn element_centroids(&self) -> Vec<Position> {
        (0..self.n_local_elements())
            .map(|i| Position::new((i as f64 + 0.5) * self.element_width, 0.0, 0.0))
            .collect()
    }

    fn element_volumes(&self) -> Vec<f64> {
        vec![self.element_volume(); self.n_local_elements()]
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
        if heat_source.len() != self.heat_source.len() {
            return Err(CouplingError::InvalidDeck(format!(
                "heat source has {} entries, channel has {} elements",
                heat_source.len(),
                self.heat_source.len()
            )));
        }
        self.heat_source.copy_from_slice(heat_source);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neutronics_model() -> NeutronicsModel {
        NeutronicsModel {
            n_cells: 2,
            cell_width: 1.0,
            flow_area: 0.01,
            diffusion_coefficient: vec![0.9; 2],
            absorption_xs: vec![0.1; 2],
            fission_xs: vec![0.05; 2],
            nu: 2.43,
            boron_xs_per_ppm: 1e-5,
            doppler_coefficient: 0.0,
            reference_temperature: 600.0,
            reference_density: 750.0,
            initial_temperature: 600.0,
            initial_density: 750.0,
        }
    }

    fn heat_model() -> HeatFluidsModel {
        HeatFluidsModel {
            elements_per_cell: 2,
            mass_flow_rate: 10.0,
            heat_capacity: 5000.0,
            inlet_temperature: 560.0,
            reference_density: 750.0,
            expansion_coefficient: 2e-4,
            reference_temperature: 600.0,
            solid_elements: Vec::new(),
        }
    }

    fn channel() -> ChannelHeatFluids {
        ChannelHeatFluids::new(Comm::self_comm(), &heat_model(), &neutronics_model()).unwrap()
    }

    #[test]
    fn test_element_volumes_partition_cell_volumes() {
        let heat = channel();
        assert_eq!(heat.n_local_elements(), 4);
        let cell_volume = 1.0 * 0.01;
        let per_element: f64 = heat.element_volumes().iter().take(2).sum();
        assert!((per_element - cell_volume).abs() < 1e-12);
    }

    #[test]
    fn test_energy_balance_along_channel() {
        let mut heat = channel();
        // 1 MW/m^3 over 4 elements of 0.005 m^3: 5 kW each, total 20 kW.
        heat.set_heat_source(&[1.0e6; 4]).unwrap();
        heat.solve_step().unwrap();

        let per_elem_rise = 1.0e6 * 0.005 / (10.0 * 5000.0); // 0.1 K
        let temps = heat.temperatures();
        for (i, &t) in temps.iter().enumerate() {
            let expected = 560.0 + (i as f64 + 0.5) * per_elem_rise;
            assert!((t - expected).abs() < 1e-9, "element {}: {} vs {}", i, t, expected);
        }
        // Monotone heating up the channel.
        assert!(temps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_density_decreases_with_temperature() {
        let mut heat = channel();
        heat.set_heat_source(&[1.0e7; 4]).unwrap();
        heat.solve_step().unwrap();
        let rho = heat.densities();
        assert!(rho.windows(2).all(|w| w[0] > w[1]));
        let t = heat.temperatures()[0];
        let expected = 750.0 * (1.0 - 2e-4 * (t - 600.0));
        assert!((rho[0] - expected).abs() < 1e-9);
    }

    #[test]
    fn test_solid_elements_hold_their_state() {
        let mut model = heat_model();
        model.solid_elements = vec![3];
        let mut heat =
            ChannelHeatFluids::new(Comm::self_comm(), &model, &neutronics_model()).unwrap();
        heat.set_heat_source(&[1.0e6; 4]).unwrap();
        heat.solve_step().unwrap();

        assert_eq!(heat.fluid_mask(), vec![1, 1, 1, 0]);
        // Solid element keeps its initial temperature.
        assert_eq!(heat.temperatures()[3], 560.0);
    }

    #[test]
    fn test_out_of_range_solid_element_rejected() {
        let mut model = heat_model();
        model.solid_elements = vec![9];
        assert!(ChannelHeatFluids::new(Comm::self_comm(), &model, &neutronics_model()).is_err());
    }

    #[test]
    fn test_mismatched_heat_source_length_rejected() {
        let mut heat = channel();
        assert!(heat.set_heat_source(&[1.0e6; 3]).is_err());
    }
}
