//! BSMP client for the leakage detection board.
//!
//! Every message is framed as `[address, command, size_hi, size_lo, payload.., checksum]`
//! where the checksum makes the byte sum of the whole frame zero modulo 256.
use std::time::Duration;

use log::{debug, trace};

use crate::drivers::source::{Board, Link};
use crate::drivers::LinkError;
use crate::types::VarType;

const CMD_READ_VARIABLE: u8 = 0x10;
const CMD_VARIABLE_VALUE: u8 = 0x11;
const CMD_EXECUTE_FUNCTION: u8 = 0x50;
const CMD_FUNCTION_RETURN: u8 = 0x51;
const HEADER_LEN: usize = 4;

/// Board addressing and function table.
#[derive(Clone, Copy, Debug)]
pub struct BsmpSettings {
    pub address: u8,
    pub reset_interlocks_function: u8,
}

pub struct DrsBoard<T> {
    io_handle: T,
    settings: BsmpSettings,
}

impl DrsBoard<Box<dyn serialport::SerialPort>> {
    /// Opens the serial port the board is attached to (8N1, no flow control).
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        timeout: Duration,
        settings: BsmpSettings,
    ) -> Result<Self, LinkError> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|err| LinkError::from_io(err.into()))?;
        debug!("BSMP link open on {port_name} @ {baud_rate} baud");
        Ok(Self::with(port, settings))
    }
}

impl<T: Link> DrsBoard<T> {
    pub fn with(io_handle: T, settings: BsmpSettings) -> Self {
        Self {
            io_handle,
            settings,
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> T {
        self.io_handle
    }

    /// Sends one request and returns the payload of the matching reply.
    fn transact(
        &mut self,
        command: u8,
        payload: &[u8],
        reply_command: u8,
        reply_payload_len: usize,
    ) -> Result<Vec<u8>, LinkError> {
        let request = encode_frame(self.settings.address, command, payload);
        trace!("BSMP -> {request:02x?}");
        self.io_handle.discard_input()?;
        self.io_handle
            .write_all(&request)
            .map_err(LinkError::from_io)?;
        self.io_handle.flush().map_err(LinkError::from_io)?;

        let mut reply = vec![0u8; HEADER_LEN + reply_payload_len + 1];
        self.io_handle
            .read_exact(&mut reply)
            .map_err(LinkError::from_io)?;
        trace!("BSMP <- {reply:02x?}");
        let (actual_command, body) = decode_frame(&reply)?;
        if actual_command != reply_command {
            return Err(LinkError::UnexpectedReply {
                expected: reply_command,
                actual: actual_command,
            });
        }
        Ok(body.to_vec())
    }
}

impl<T: Link> Board for DrsBoard<T> {
    fn read_variable(&mut self, id: u8, var_type: VarType) -> Result<f64, LinkError> {
        let body = self.transact(CMD_READ_VARIABLE, &[id], CMD_VARIABLE_VALUE, var_type.width())?;
        decode_value(&body, var_type)
    }

    fn reset_interlocks(&mut self) -> Result<(), LinkError> {
        let function = self.settings.reset_interlocks_function;
        self.transact(CMD_EXECUTE_FUNCTION, &[function], CMD_FUNCTION_RETURN, 1)?;
        Ok(())
    }
}

pub fn checksum(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    0u8.wrapping_sub(sum)
}

pub fn encode_frame(address: u8, command: u8, payload: &[u8]) -> Vec<u8> {
    let size = payload.len() as u16;
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len() + 1);
    frame.push(address);
    frame.push(command);
    frame.extend_from_slice(&size.to_be_bytes());
    frame.extend_from_slice(payload);
    frame.push(checksum(&frame));
    frame
}

/// Validates a complete reply frame and returns its command and payload.
pub fn decode_frame(frame: &[u8]) -> Result<(u8, &[u8]), LinkError> {
    if frame.len() < HEADER_LEN + 1 {
        return Err(LinkError::Malformed(format!(
            "frame of {} bytes is shorter than a header",
            frame.len()
        )));
    }
    let (body, tail) = frame.split_at(frame.len() - 1);
    let expected = checksum(body);
    if expected != tail[0] {
        return Err(LinkError::Checksum {
            expected,
            actual: tail[0],
        });
    }
    let size = u16::from_be_bytes([body[2], body[3]]) as usize;
    let payload = &body[HEADER_LEN..];
    if payload.len() != size {
        return Err(LinkError::Malformed(format!(
            "size field says {size} bytes, frame carries {}",
            payload.len()
        )));
    }
    Ok((body[1], payload))
}

fn decode_value(body: &[u8], var_type: VarType) -> Result<f64, LinkError> {
    let malformed = || {
        LinkError::Malformed(format!("{var_type:?} value needs {} bytes", var_type.width()))
    };
    let value = match var_type {
        VarType::Float => f32::from_le_bytes(body.try_into().map_err(|_| malformed())?) as f64,
        VarType::U32 => u32::from_le_bytes(body.try_into().map_err(|_| malformed())?) as f64,
        VarType::U16 => u16::from_le_bytes(body.try_into().map_err(|_| malformed())?) as f64,
        VarType::U8 => *body.first().ok_or_else(malformed)? as f64,
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::source::fakes::MemoryLink;

    const SETTINGS: BsmpSettings = BsmpSettings {
        address: 1,
        reset_interlocks_function: 5,
    };

    fn float_reply(value: f32) -> Vec<u8> {
        encode_frame(1, CMD_VARIABLE_VALUE, &value.to_le_bytes())
    }

    #[test]
    fn frames_sum_to_zero() {
        let frame = encode_frame(1, CMD_READ_VARIABLE, &[53]);
        assert_eq!(&frame[..5], &[0x01, 0x10, 0x00, 0x01, 53]);
        let sum = frame.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        assert_eq!(sum, 0);
    }

    #[test]
    fn reads_float_variable() {
        let link = MemoryLink::with_reply(&float_reply(0.0125));
        let mut board = DrsBoard::with(link, SETTINGS);
        let value = board.read_variable(53, VarType::Float).unwrap();
        assert!((value - 0.0125).abs() < 1e-7);
        let link = board.into_inner();
        assert_eq!(link.written, encode_frame(1, CMD_READ_VARIABLE, &[53]));
        assert_eq!(link.discards, 1);
    }

    #[test]
    fn corrupted_reply_fails_checksum() {
        let mut reply = float_reply(1.0);
        reply[5] ^= 0xFF;
        let mut board = DrsBoard::with(MemoryLink::with_reply(&reply), SETTINGS);
        assert!(matches!(
            board.read_variable(53, VarType::Float),
            Err(LinkError::Checksum { .. })
        ));
    }

    #[test]
    fn wrong_reply_command_is_rejected() {
        let reply = encode_frame(1, 0xE3, &[0, 0, 0, 0]);
        let mut board = DrsBoard::with(MemoryLink::with_reply(&reply), SETTINGS);
        assert!(matches!(
            board.read_variable(53, VarType::Float),
            Err(LinkError::UnexpectedReply { expected: 0x11, actual: 0xE3 })
        ));
    }

    #[test]
    fn reset_interlocks_executes_configured_function() {
        let reply = encode_frame(1, CMD_FUNCTION_RETURN, &[0]);
        let mut board = DrsBoard::with(MemoryLink::with_reply(&reply), SETTINGS);
        board.reset_interlocks().unwrap();
        assert_eq!(
            board.into_inner().written,
            encode_frame(1, CMD_EXECUTE_FUNCTION, &[5])
        );
    }

    #[test]
    fn short_reply_is_reported() {
        let mut board = DrsBoard::with(MemoryLink::with_reply(&[0x01, 0x11]), SETTINGS);
        assert!(matches!(
            board.read_variable(53, VarType::U16),
            Err(LinkError::Closed)
        ));
    }
}
