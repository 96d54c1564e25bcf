//! SCPI text protocol for the reference power instrument.
//!
//! Commands are ASCII lines terminated by LF. Queries (anything ending in `?` or
//! carrying a `?` before its channel list) are answered with a single LF-terminated
//! line of comma-separated values.
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::debug;

use crate::drivers::source::{Instrument, Link};
use crate::drivers::LinkError;

/// Raw-socket SCPI port most LAN instruments listen on.
pub const DEFAULT_SCPI_PORT: u16 = 5025;

const LINE_ENDING: &str = "\n";

pub struct ScpiInstrument<T> {
    io_handle: T,
    read_buf: Vec<u8>,
}

impl ScpiInstrument<TcpStream> {
    /// Opens a raw SCPI socket. `address` may omit the port, in which case
    /// [`DEFAULT_SCPI_PORT`] is used.
    pub fn connect(address: &str, timeout: Duration) -> Result<Self, LinkError> {
        let with_port = if address.contains(':') {
            address.to_owned()
        } else {
            format!("{address}:{DEFAULT_SCPI_PORT}")
        };
        let socket_addr = with_port
            .to_socket_addrs()
            .map_err(LinkError::from_io)?
            .next()
            .ok_or_else(|| LinkError::Malformed(format!("cannot resolve {with_port}")))?;
        let stream = TcpStream::connect_timeout(&socket_addr, timeout).map_err(LinkError::from_io)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;
        debug!("SCPI link open to {socket_addr}");
        Ok(Self::with(stream))
    }
}

impl<T: Link> ScpiInstrument<T> {
    pub fn with(io_handle: T) -> Self {
        Self {
            io_handle,
            read_buf: Vec::with_capacity(128),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> T {
        self.io_handle
    }

    /// Sends a command that produces no reply.
    pub fn write_command(&mut self, command: &str) -> Result<(), LinkError> {
        debug!("SCPI -> {command}");
        let serialized = format!("{command}{LINE_ENDING}");
        self.io_handle
            .write_all(serialized.as_bytes())
            .map_err(LinkError::from_io)?;
        self.io_handle.flush().map_err(LinkError::from_io)
    }

    /// Sends a query and returns the reply line without its terminator.
    pub fn query(&mut self, command: &str) -> Result<String, LinkError> {
        self.write_command(command)?;
        let line = self.read_line()?;
        debug!("SCPI <- {line}");
        Ok(line)
    }

    /// Sends a query and parses the reply as comma-separated numbers.
    pub fn query_ascii_values(&mut self, command: &str) -> Result<Vec<f64>, LinkError> {
        let reply = self.query(command)?;
        parse_ascii_values(&reply)
    }

    fn query_first_value(&mut self, command: &str) -> Result<f64, LinkError> {
        self.query_ascii_values(command)?
            .first()
            .copied()
            .ok_or_else(|| LinkError::Malformed(format!("empty reply to {command}")))
    }

    /// Reads bytes until the first LF and returns that line.
    fn read_line(&mut self) -> Result<String, LinkError> {
        // try already-buffered data first
        let mut end_index = self.read_buf.iter().position(|&b| b == b'\n');
        while end_index.is_none() {
            let mut temp_buf = [0u8; 64];
            let bytes_read = self
                .io_handle
                .read(&mut temp_buf)
                .map_err(LinkError::from_io)?;
            if bytes_read == 0 {
                return Err(LinkError::Closed);
            }
            let prior_end = self.read_buf.len();
            self.read_buf.extend_from_slice(&temp_buf[..bytes_read]);
            end_index = self.read_buf[prior_end..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|idx| idx + prior_end);
        }
        let end = end_index.unwrap_or(0);
        let line: Vec<u8> = self.read_buf.drain(..=end).collect();
        let text = String::from_utf8(line)
            .map_err(|err| LinkError::Malformed(format!("non-UTF-8 reply: {err}")))?;
        Ok(text.trim_end_matches(['\r', '\n']).to_owned())
    }
}

impl<T: Link> Instrument for ScpiInstrument<T> {
    fn query_dc_current(&mut self, channel: u8) -> Result<f64, LinkError> {
        self.query_first_value(&format!(":MEASure:CURRent:DC? (@{channel})"))
    }

    fn set_current(&mut self, amps: f64) -> Result<(), LinkError> {
        self.write_command(&format!(":SOURce:CURRent {amps}"))?;
        self.write_command(":OUTPut:STATe ON")
    }

    fn measure_current(&mut self) -> Result<f64, LinkError> {
        self.query_first_value(":MEASure:CURRent?")
    }

    fn disable_output(&mut self) -> Result<(), LinkError> {
        self.write_command(":OUTPut:STATe OFF")
    }
}

/// Parses an ASCII value list such as `+1.234E-03,+5.0E+00`.
pub fn parse_ascii_values(reply: &str) -> Result<Vec<f64>, LinkError> {
    reply
        .split(',')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(|field| {
            field
                .parse::<f64>()
                .map_err(|_| LinkError::Malformed(format!("not a number: {field:?}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::source::fakes::MemoryLink;

    #[test]
    fn dc_current_query_uses_channel_list() {
        let link = MemoryLink::with_reply(b"+1.250000E-03,+0.0\n");
        let mut scpi = ScpiInstrument::with(link);
        let amps = scpi.query_dc_current(1).unwrap();
        assert!((amps - 1.25e-3).abs() < 1e-12);
        let link = scpi.into_inner();
        assert_eq!(link.written, b":MEASure:CURRent:DC? (@1)\n");
    }

    #[test]
    fn set_current_enables_output() {
        let mut scpi = ScpiInstrument::with(MemoryLink::default());
        scpi.set_current(0.5).unwrap();
        scpi.disable_output().unwrap();
        let written = String::from_utf8(scpi.into_inner().written).unwrap();
        assert_eq!(
            written,
            ":SOURce:CURRent 0.5\n:OUTPut:STATe ON\n:OUTPut:STATe OFF\n"
        );
    }

    #[test]
    fn reply_split_across_reads_is_joined() {
        let mut link = MemoryLink::with_reply(b"+1.500000E-03\r\n");
        link.chunk = 3;
        let mut scpi = ScpiInstrument::with(link);
        assert!((scpi.measure_current().unwrap() - 1.5e-3).abs() < 1e-12);
        assert!(scpi.into_inner().incoming.is_empty());
    }

    #[test]
    fn second_line_in_one_read_serves_next_query() {
        let mut scpi = ScpiInstrument::with(MemoryLink::with_reply(b"0.75\r\n2.0\n"));
        assert_eq!(scpi.measure_current().unwrap(), 0.75);
        // second line stays buffered for the next query
        assert_eq!(scpi.measure_current().unwrap(), 2.0);
    }

    #[test]
    fn garbage_reply_is_malformed() {
        let mut scpi = ScpiInstrument::with(MemoryLink::with_reply(b"ERR\n"));
        assert!(matches!(
            scpi.query_dc_current(1),
            Err(LinkError::Malformed(_))
        ));
    }

    #[test]
    fn silent_peer_reports_closed_link() {
        let mut scpi = ScpiInstrument::with(MemoryLink::default());
        assert!(matches!(scpi.measure_current(), Err(LinkError::Closed)));
    }
}
