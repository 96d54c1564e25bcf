// src/config.rs
//! Bench configuration: connection details, board variable map and
//! acquisition defaults. Loaded from JSON; every field has a default so a
//! partial file (or no file at all) works.
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::drivers::bsmp::BsmpSettings;
use crate::drivers::session::SessionSettings;
use crate::drivers::BenchError;
use crate::types::VarType;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub instrument: InstrumentConfig,
    pub board: BoardConfig,
    pub acquisition: AcquisitionConfig,
    pub simulation: SimulationConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// `host` or `host:port` of the SCPI socket.
    pub address: String,
    pub channel: u8,
    pub timeout_ms: u64,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:5025".into(),
            channel: 1,
            timeout_ms: 2000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub port: String,
    pub baud_rate: u32,
    pub address: u8,
    pub leakage_variable: u8,
    pub leakage_type: VarType,
    pub reset_interlocks_function: u8,
    pub timeout_ms: u64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".into(),
            baud_rate: 6_000_000,
            address: 1,
            leakage_variable: 53,
            leakage_type: VarType::Float,
            reset_interlocks_function: 5,
            timeout_ms: 500,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    pub sample_rate_hz: f64,
    /// Board reading multiplier into mA.
    pub board_scale: f64,
    /// Instrument reading multiplier into mA.
    pub reference_scale: f64,
    pub settle_ms: u64,
    pub queue_depth: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 10.0,
            board_scale: 1000.0,
            reference_scale: 1000.0,
            settle_ms: 150,
            queue_depth: 64,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub seed: Option<u64>,
    /// Fraction of the applied current that leaks to ground.
    pub leakage_ratio: f64,
    pub reference_noise_amps: f64,
    pub board_noise_amps: f64,
    pub board_offset_amps: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            leakage_ratio: 0.002,
            reference_noise_amps: 2e-6,
            board_noise_amps: 2e-5,
            board_offset_amps: 1e-5,
        }
    }
}

impl BenchConfig {
    pub fn load(path: &Path) -> Result<Self, BenchError> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| BenchError::Config(format!("{}: {err}", path.display())))?;
        let config: BenchConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise falls back to the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, BenchError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, BenchError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), BenchError> {
        let acquisition = &self.acquisition;
        if !(acquisition.sample_rate_hz.is_finite() && acquisition.sample_rate_hz > 0.0) {
            return Err(BenchError::Config(
                "acquisition.sample_rate_hz must be a positive number".into(),
            ));
        }
        if acquisition.queue_depth == 0 {
            return Err(BenchError::Config(
                "acquisition.queue_depth must be at least 1".into(),
            ));
        }
        if self.board.baud_rate == 0 {
            return Err(BenchError::Config("board.baud_rate must be non-zero".into()));
        }
        Ok(())
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            channel: self.instrument.channel,
            leakage_variable: self.board.leakage_variable,
            leakage_type: self.board.leakage_type,
            board_scale: self.acquisition.board_scale,
            reference_scale: self.acquisition.reference_scale,
            settle: Duration::from_millis(self.acquisition.settle_ms),
        }
    }

    pub fn bsmp_settings(&self) -> BsmpSettings {
        BsmpSettings {
            address: self.board.address,
            reset_interlocks_function: self.board.reset_interlocks_function,
        }
    }
}
