use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use crate::command::{Command, TERMINATOR};
use crate::error::{CatError, Result};
use crate::transport::serial::SerialConnector;
use crate::transport::{Connector, Transport};

/// Longest single blocking read. Bounds how long an in-flight command
/// takes to notice a disconnect.
const READ_SLICE: Duration = Duration::from_millis(50);

/// Configuration for the radio link.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Timeout for waiting for a response.
    pub timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
        }
    }
}

/// Whether the link currently has an open channel, and to where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected { port: String, baud: u32 },
}

/// An open channel and its partial-read buffer.
struct Channel {
    transport: Box<dyn Transport>,
    port: String,
    baud: u32,
    buf: Vec<u8>,
}

/// The one and only connection to the radio.
///
/// Every command goes through [`Link::execute`], which holds the channel for
/// exactly one request/response cycle so bytes from different callers never
/// interleave on the wire.
pub struct Link {
    connector: Box<dyn Connector>,
    config: LinkConfig,
    channel: Mutex<Option<Channel>>,
    /// Mirrors `channel.is_some()` without taking the lock, so `disconnect`
    /// can cut short a read that another thread is blocked in.
    online: AtomicBool,
    tx_bytes: AtomicU64,
    rx_bytes: AtomicU64,
}

impl Link {
    pub fn new(connector: impl Connector + 'static, config: LinkConfig) -> Self {
        Self {
            connector: Box::new(connector),
            config,
            channel: Mutex::new(None),
            online: AtomicBool::new(false),
            tx_bytes: AtomicU64::new(0),
            rx_bytes: AtomicU64::new(0),
        }
    }

    /// A link that opens native serial ports.
    pub fn serial(config: LinkConfig) -> Self {
        Self::new(SerialConnector, config)
    }

    /// Open the channel. Succeeds immediately if already connected to the
    /// same port at the same baud rate; a different endpoint replaces the
    /// current one.
    pub fn connect(&self, port: &str, baud: u32) -> Result<()> {
        let mut channel = self.lock_channel();

        if let Some(current) = channel.as_ref() {
            // A disconnect may have cleared `online` and still be waiting
            // for the lock; that channel is on its way out.
            if current.port == port && current.baud == baud && self.is_connected() {
                debug!("already connected to {port} at {baud} baud");
                return Ok(());
            }
            info!("switching link from {} to {port}", current.port);
            self.online.store(false, Ordering::SeqCst);
            *channel = None;
        }

        match self.connector.open(port, baud) {
            Ok(transport) => {
                *channel = Some(Channel {
                    transport,
                    port: port.to_string(),
                    baud,
                    buf: Vec::with_capacity(64),
                });
                self.online.store(true, Ordering::SeqCst);
                info!("link up on {port} at {baud} baud");
                Ok(())
            }
            Err(e) => {
                warn!("failed to open {port}: {e}");
                Err(e)
            }
        }
    }

    /// Close the channel. Safe to call in any state.
    pub fn disconnect(&self) {
        // Flip the flag first so a read in progress on another thread gives
        // up the lock within one slice.
        let was_online = self.online.swap(false, Ordering::SeqCst);
        let mut channel = self.lock_channel();
        if let Some(mut closing) = channel.take() {
            if let Err(e) = closing.transport.flush() {
                debug!("ignoring flush error on close: {e}");
            }
            info!("link down ({})", closing.port);
        } else if was_online {
            debug!("link already closed");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> LinkState {
        if !self.is_connected() {
            return LinkState::Disconnected;
        }
        match self.lock_channel().as_ref() {
            Some(channel) => LinkState::Connected {
                port: channel.port.clone(),
                baud: channel.baud,
            },
            None => LinkState::Disconnected,
        }
    }

    /// Total bytes written since the link was created.
    pub fn tx_bytes(&self) -> u64 {
        self.tx_bytes.load(Ordering::Relaxed)
    }

    /// Total bytes read since the link was created.
    pub fn rx_bytes(&self) -> u64 {
        self.rx_bytes.load(Ordering::Relaxed)
    }

    /// Send a command and, if it expects one, wait for the reply.
    ///
    /// Returns the reply without its terminator. Commands that expect no
    /// reply yield `Some("")` once written. `None` means the link is down,
    /// the radio did not answer in time, or the channel failed; a failed
    /// channel is closed.
    pub fn execute(&self, command: &Command) -> Option<String> {
        if !self.is_connected() {
            trace!("dropping {command}: link down");
            return None;
        }

        let mut channel = self.lock_channel();
        let open = channel.as_mut()?;

        match self.transact(open, command) {
            Ok(reply) => Some(reply),
            Err(CatError::Timeout) => {
                warn!("timeout waiting for reply to {command}");
                None
            }
            Err(CatError::NotConnected) => {
                debug!("{command} abandoned: link closed");
                None
            }
            Err(e) => {
                warn!("link failure on {command}: {e}; closing");
                self.online.store(false, Ordering::SeqCst);
                *channel = None;
                None
            }
        }
    }

    fn transact(&self, channel: &mut Channel, command: &Command) -> Result<String> {
        // Anything still buffered belongs to an earlier, timed-out exchange.
        if !channel.buf.is_empty() {
            debug!("discarding {} stale bytes", channel.buf.len());
            channel.buf.clear();
        }
        if let Err(e) = channel.transport.discard_input() {
            debug!("could not discard input: {e}");
        }

        let bytes = command.to_bytes();
        trace!("TX: {}", String::from_utf8_lossy(&bytes));
        channel.transport.write_all(&bytes)?;
        channel.transport.flush()?;
        self.tx_bytes.fetch_add(bytes.len() as u64, Ordering::Relaxed);

        if !command.expects_response() {
            return Ok(String::new());
        }

        let deadline = Instant::now() + self.config.timeout;
        loop {
            if let Some(end) = channel.buf.iter().position(|&b| b == TERMINATOR) {
                let reply = String::from_utf8_lossy(&channel.buf[..end]).into_owned();
                channel.buf.drain(..=end);
                trace!("RX: {reply};");
                return Ok(reply);
            }
            self.fill_buf(channel, deadline)?;
        }
    }

    /// Read data from the transport into the channel buffer.
    fn fill_buf(&self, channel: &mut Channel, deadline: Instant) -> Result<()> {
        if !self.is_connected() {
            return Err(CatError::NotConnected);
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(CatError::Timeout);
        }

        if let Err(e) = channel
            .transport
            .set_read_timeout(remaining.min(READ_SLICE))
        {
            debug!("could not set read timeout: {e}");
        }

        let mut tmp = [0u8; 64];
        match channel.transport.read(&mut tmp) {
            Ok(n) => {
                channel.buf.extend_from_slice(&tmp[..n]);
                self.rx_bytes.fetch_add(n as u64, Ordering::Relaxed);
                Ok(())
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                Ok(())
            }
            Err(e) => Err(CatError::Io(e)),
        }
    }

    fn lock_channel(&self) -> MutexGuard<'_, Option<Channel>> {
        self.channel.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
