// src/main.rs

#![allow(non_snake_case)]

use std::process::ExitCode;

use tracing::{error, info};

use coupledPWR::coupling::coupled_driver::TimestepReport;
use coupledPWR::drivers::{ChannelHeatFluids, DiffusionNeutronics};
use coupledPWR::{parse_input_deck, Comm, CoupledDriver, Result};

fn run(input_path: &str) -> Result<Vec<TimestepReport>> {
    let deck = parse_input_deck(input_path)?;

    let comm = Comm::self_comm();
    let neutronics = DiffusionNeutronics::new(comm.clone(), &deck.neutronics, &deck.output)?;
    let heat = ChannelHeatFluids::new(comm.clone(), &deck.heat_fluids, &deck.neutronics)?;

    let mut driver = CoupledDriver::new(comm, neutronics, heat, &deck)?;
    driver.execute()
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let Some(input_path) = std::env::args().nth(1) else {
        eprintln!("usage: coupledPWR <input.yaml>");
        return ExitCode::FAILURE;
    };

    match run(&input_path) {
        Ok(reports) => {
            for r in &reports {
                info!(
                    "timestep {}: {} Picard iteration(s), converged = {}, \
                     residual = {:.6e}, k-eff = {:.6}",
                    r.timestep, r.picard_iterations, r.converged, r.residual, r.k_eff
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("run failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
