use std::io::{Read, Write};

use crate::drivers::LinkError;
use crate::types::VarType;

/// Byte stream a device protocol runs over.
pub trait Link: Read + Write {
    /// Drops anything already buffered on the receive side.
    fn discard_input(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Link for std::net::TcpStream {}

impl Link for Box<dyn serialport::SerialPort> {
    fn discard_input(&mut self) -> std::io::Result<()> {
        self.clear(serialport::ClearBuffer::Input)
            .map_err(std::io::Error::from)
    }
}

/// Reference power instrument (the SCPI side of the bench).
pub trait Instrument {
    /// DC current on `channel`, in amperes.
    fn query_dc_current(&mut self, channel: u8) -> Result<f64, LinkError>;
    fn set_current(&mut self, amps: f64) -> Result<(), LinkError>;
    /// Output current read back after a set, in amperes.
    fn measure_current(&mut self) -> Result<f64, LinkError>;
    fn disable_output(&mut self) -> Result<(), LinkError>;
}

/// Leakage detection board (the BSMP side of the bench).
pub trait Board {
    fn read_variable(&mut self, id: u8, var_type: VarType) -> Result<f64, LinkError>;
    fn reset_interlocks(&mut self) -> Result<(), LinkError>;
}

impl<T: Instrument + ?Sized> Instrument for Box<T> {
    fn query_dc_current(&mut self, channel: u8) -> Result<f64, LinkError> {
        (**self).query_dc_current(channel)
    }
    fn set_current(&mut self, amps: f64) -> Result<(), LinkError> {
        (**self).set_current(amps)
    }
    fn measure_current(&mut self) -> Result<f64, LinkError> {
        (**self).measure_current()
    }
    fn disable_output(&mut self) -> Result<(), LinkError> {
        (**self).disable_output()
    }
}

impl<T: Board + ?Sized> Board for Box<T> {
    fn read_variable(&mut self, id: u8, var_type: VarType) -> Result<f64, LinkError> {
        (**self).read_variable(id, var_type)
    }
    fn reset_interlocks(&mut self) -> Result<(), LinkError> {
        (**self).reset_interlocks()
    }
}
