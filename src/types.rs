// src/types.rs
use std::fmt;

use serde::{Deserialize, Serialize};

// 连接模式
#[derive(PartialEq, Clone, Copy, Debug)]
pub enum ConnectionMode {
    Simulation,
    Hardware,
}

/// Which external collaborator a reading or failure came from.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum LinkKind {
    Instrument,
    Board,
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKind::Instrument => write!(f, "instrument"),
            LinkKind::Board => write!(f, "board"),
        }
    }
}

/// Storage type of a BSMP variable on the board.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarType {
    Float,
    U8,
    U16,
    U32,
}

impl VarType {
    /// Width of the value on the wire, in bytes.
    pub fn width(self) -> usize {
        match self {
            VarType::U8 => 1,
            VarType::U16 => 2,
            VarType::Float | VarType::U32 => 4,
        }
    }
}

/// One paired reading: offset from acquisition start, board value and reference value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LeakageSample {
    pub time_s: f64,
    pub measured_ma: f64,
    pub reference_ma: f64,
}

impl LeakageSample {
    pub fn new(time_s: f64, measured_ma: f64, reference_ma: f64) -> Self {
        Self {
            time_s,
            measured_ma,
            reference_ma,
        }
    }

    /// Signed difference `reference - measured`, in mA.
    pub fn error_ma(&self) -> f64 {
        self.reference_ma - self.measured_ma
    }
}
