//! Simulated bench hardware for running without an instrument or board attached.
use std::sync::{Arc, Mutex};

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::config::SimulationConfig;
use crate::drivers::source::{Board, Instrument};
use crate::drivers::LinkError;
use crate::types::VarType;

/// State shared between the simulated instrument and board: the current the
/// instrument is pushing and the fraction of it that leaks to ground.
struct SimPlant {
    setpoint_amps: f64,
    output_on: bool,
    leakage_ratio: f64,
    rng: StdRng,
}

impl SimPlant {
    fn leakage_amps(&self) -> f64 {
        if self.output_on {
            self.setpoint_amps * self.leakage_ratio
        } else {
            0.0
        }
    }

    fn noise(&mut self, amplitude: f64) -> f64 {
        if amplitude > 0.0 {
            self.rng.gen_range(-amplitude..amplitude)
        } else {
            0.0
        }
    }
}

pub struct SimInstrument {
    plant: Arc<Mutex<SimPlant>>,
    noise_amps: f64,
}

pub struct SimBoard {
    plant: Arc<Mutex<SimPlant>>,
    noise_amps: f64,
    offset_amps: f64,
}

/// Builds a connected instrument/board pair driven by the same plant.
pub fn sim_pair(config: &SimulationConfig) -> (SimInstrument, SimBoard) {
    let rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let plant = Arc::new(Mutex::new(SimPlant {
        setpoint_amps: 0.0,
        output_on: false,
        leakage_ratio: config.leakage_ratio,
        rng,
    }));
    let instrument = SimInstrument {
        plant: Arc::clone(&plant),
        noise_amps: config.reference_noise_amps,
    };
    let board = SimBoard {
        plant,
        noise_amps: config.board_noise_amps,
        offset_amps: config.board_offset_amps,
    };
    (instrument, board)
}

fn lock(plant: &Mutex<SimPlant>) -> Result<std::sync::MutexGuard<'_, SimPlant>, LinkError> {
    plant
        .lock()
        .map_err(|_| LinkError::Malformed("simulated plant poisoned".into()))
}

impl Instrument for SimInstrument {
    fn query_dc_current(&mut self, _channel: u8) -> Result<f64, LinkError> {
        let mut plant = lock(&self.plant)?;
        let noise = plant.noise(self.noise_amps);
        Ok(plant.leakage_amps() + noise)
    }

    fn set_current(&mut self, amps: f64) -> Result<(), LinkError> {
        let mut plant = lock(&self.plant)?;
        plant.setpoint_amps = amps;
        plant.output_on = true;
        Ok(())
    }

    fn measure_current(&mut self) -> Result<f64, LinkError> {
        let plant = lock(&self.plant)?;
        Ok(if plant.output_on {
            plant.setpoint_amps
        } else {
            0.0
        })
    }

    fn disable_output(&mut self) -> Result<(), LinkError> {
        lock(&self.plant)?.output_on = false;
        Ok(())
    }
}

impl Board for SimBoard {
    fn read_variable(&mut self, _id: u8, var_type: VarType) -> Result<f64, LinkError> {
        let mut plant = lock(&self.plant)?;
        let noise = plant.noise(self.noise_amps);
        let value = plant.leakage_amps() + self.offset_amps + noise;
        Ok(match var_type {
            VarType::Float => value as f32 as f64,
            _ => value.max(0.0).round(),
        })
    }

    fn reset_interlocks(&mut self) -> Result<(), LinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> SimulationConfig {
        SimulationConfig {
            seed: Some(7),
            leakage_ratio: 0.01,
            reference_noise_amps: 0.0,
            board_noise_amps: 0.0,
            board_offset_amps: 0.0,
        }
    }

    #[test]
    fn leakage_follows_setpoint() {
        let (mut instrument, mut board) = sim_pair(&quiet());
        assert_eq!(instrument.query_dc_current(1).unwrap(), 0.0);
        instrument.set_current(2.0).unwrap();
        assert_eq!(instrument.measure_current().unwrap(), 2.0);
        assert!((instrument.query_dc_current(1).unwrap() - 0.02).abs() < 1e-12);
        assert!((board.read_variable(53, VarType::Float).unwrap() - 0.02).abs() < 1e-6);
        instrument.disable_output().unwrap();
        assert_eq!(board.read_variable(53, VarType::Float).unwrap(), 0.0);
    }

    #[test]
    fn noise_stays_within_amplitude() {
        let mut config = quiet();
        config.board_noise_amps = 1e-4;
        let (mut instrument, mut board) = sim_pair(&config);
        instrument.set_current(1.0).unwrap();
        for _ in 0..100 {
            let value = board.read_variable(53, VarType::Float).unwrap();
            assert!((value - 0.01).abs() <= 1e-4 + 1e-6);
        }
    }
}
