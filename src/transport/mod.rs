//! The byte pipe under the link, and how to open one.

use std::io;
use std::time::Duration;

use crate::error::Result;

pub mod serial;

/// Blocking, half-duplex byte channel to the radio.
///
/// The link owns exactly one of these and never touches it from two threads
/// at once.
pub trait Transport: Send {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    /// Read whatever is available. With nothing to read, give up after the
    /// read timeout with `Err(TimedOut)` (or `Ok(0)`).
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Throw away unread input, such as a reply that arrived after its
    /// command timed out.
    fn discard_input(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Opens a [`Transport`] for a port name and baud rate.
///
/// [`Link`](crate::link::Link) is generic over this so a simulated radio
/// can stand in for the serial port.
pub trait Connector: Send + Sync {
    fn open(&self, port: &str, baud: u32) -> Result<Box<dyn Transport>>;
}
