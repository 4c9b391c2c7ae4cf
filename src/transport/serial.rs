use std::io;
use std::time::Duration;

use log::{debug, info};

use crate::error::{CatError, Result};

use super::{Connector, Transport};

/// FT-991A CAT framing: 8 data bits, no parity, one stop bit.
const DATA_BITS: serialport::DataBits = serialport::DataBits::Eight;
const STOP_BITS: serialport::StopBits = serialport::StopBits::One;
const PARITY: serialport::Parity = serialport::Parity::None;

/// Initial read timeout; the link narrows it per read slice.
const OPEN_TIMEOUT: Duration = Duration::from_millis(500);

/// A CAT transport backed by a native serial port.
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    pub fn new(port: Box<dyn serialport::SerialPort>) -> Self {
        Self { port }
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        io::Write::write_all(&mut self.port, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(&mut self.port)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut self.port, buf)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port.set_timeout(timeout).map_err(io::Error::other)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::other)
    }
}

/// Open a serial port with CAT settings (8N1) at the given baud rate.
pub fn open_port(port_name: &str, baud_rate: u32) -> Result<SerialTransport> {
    let port = serialport::new(port_name, baud_rate)
        .data_bits(DATA_BITS)
        .stop_bits(STOP_BITS)
        .parity(PARITY)
        .timeout(OPEN_TIMEOUT)
        .open()
        .map_err(CatError::Serial)?;

    info!("opened {} at {} baud", port_name, baud_rate);
    Ok(SerialTransport::new(port))
}

/// List the names of the serial ports present on this machine.
pub fn available_port_names() -> Result<Vec<String>> {
    let ports = serialport::available_ports().map_err(CatError::Serial)?;
    for port in &ports {
        debug!("found port: {} ({:?})", port.port_name, port.port_type);
    }
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

/// Opens real serial ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialConnector;

impl Connector for SerialConnector {
    fn open(&self, port: &str, baud: u32) -> Result<Box<dyn Transport>> {
        Ok(Box::new(open_port(port, baud)?))
    }
}
