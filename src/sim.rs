//! An in-memory FT-991A that speaks enough CAT to exercise the link, the
//! poller and the scanner without hardware.

use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use log::trace;

use crate::command::{TERMINATOR, op};
use crate::error::{CatError, Result};
use crate::transport::{Connector, Transport};

/// Reply the radio gives to a command it does not understand.
const UNKNOWN_REPLY: &str = "?";

type SignalFn = Box<dyn Fn(u64) -> u16 + Send>;

/// A command as the simulated radio received it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedCommand {
    /// Name of the thread that wrote it.
    pub thread: Option<String>,
    /// Command text without the terminator.
    pub text: String,
}

struct RigModel {
    frequency_hz: u64,
    mode_code: char,
    power: u8,
    swr: u16,
    transmitting: bool,
    signal: SignalFn,
    muted: HashSet<String>,
    unplugged: bool,
    refuse_open: bool,
    fixed_timeout: bool,
    open_count: usize,
    log: Vec<LoggedCommand>,
}

impl RigModel {
    /// Apply one command and return the reply body, if any.
    fn handle(&mut self, text: &str) -> Option<String> {
        self.log.push(LoggedCommand {
            thread: thread::current().name().map(str::to_string),
            text: text.to_string(),
        });

        let reply = match text {
            op::FREQUENCY_A => Some(format!("FA{:09}", self.frequency_hz)),
            op::MODE | op::MODE_SHORT => Some(format!("MD0{}", self.mode_code)),
            op::S_METER | op::READ_METER_1 => {
                let level = (self.signal)(self.frequency_hz).min(255);
                Some(format!("{text}{level:03}"))
            }
            op::READ_METER_6 => Some(format!("{text}{:03}", self.swr)),
            op::POWER => Some(format!("PC{:03}", self.power)),
            _ => self.apply_set(text),
        };

        if self.muted.contains(text) {
            trace!("sim: muted reply to {text}");
            return None;
        }
        reply
    }

    fn apply_set(&mut self, text: &str) -> Option<String> {
        if let Some(digits) = text.strip_prefix(op::FREQUENCY_A) {
            if let Ok(hz) = digits.parse() {
                self.frequency_hz = hz;
                return None;
            }
        } else if let Some(code) = text.strip_prefix(op::MODE) {
            if let Some(c) = code.chars().next() {
                self.mode_code = c;
                return None;
            }
        } else if let Some(digits) = text.strip_prefix(op::POWER) {
            if let Ok(watts) = digits.parse() {
                self.power = watts;
                return None;
            }
        } else if let Some(flag) = text.strip_prefix(op::TRANSMIT) {
            self.transmitting = flag == "1";
            return None;
        }
        Some(UNKNOWN_REPLY.to_string())
    }
}

/// Handle to a simulated radio. Clones share the same radio.
#[derive(Clone)]
pub struct SimulatedRig {
    model: Arc<Mutex<RigModel>>,
}

impl Default for SimulatedRig {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedRig {
    /// A radio on 14.000 MHz USB, 50 W, hearing nothing.
    pub fn new() -> Self {
        Self::with_signal(|_| 0)
    }

    /// A radio whose S-meter reads `signal(frequency_hz)`.
    pub fn with_signal(signal: impl Fn(u64) -> u16 + Send + 'static) -> Self {
        Self {
            model: Arc::new(Mutex::new(RigModel {
                frequency_hz: 14_000_000,
                mode_code: '2',
                power: 50,
                swr: 0,
                transmitting: false,
                signal: Box::new(signal),
                muted: HashSet::new(),
                unplugged: false,
                refuse_open: false,
                fixed_timeout: false,
                open_count: 0,
                log: Vec::new(),
            })),
        }
    }

    pub fn connector(&self) -> SimConnector {
        SimConnector { rig: self.clone() }
    }

    pub fn frequency_hz(&self) -> u64 {
        self.model().frequency_hz
    }

    pub fn set_frequency_hz(&self, hz: u64) {
        self.model().frequency_hz = hz;
    }

    pub fn mode_code(&self) -> char {
        self.model().mode_code
    }

    pub fn set_mode_code(&self, code: char) {
        self.model().mode_code = code;
    }

    pub fn power(&self) -> u8 {
        self.model().power
    }

    pub fn set_power(&self, watts: u8) {
        self.model().power = watts;
    }

    pub fn set_swr(&self, swr: u16) {
        self.model().swr = swr;
    }

    pub fn transmitting(&self) -> bool {
        self.model().transmitting
    }

    /// Stop answering the exact query `text` (e.g. `"MD0"`).
    pub fn mute(&self, text: &str) {
        self.model().muted.insert(text.to_string());
    }

    /// Make every subsequent read and write fail as if the cable was pulled.
    pub fn unplug(&self) {
        self.model().unplugged = true;
    }

    pub fn refuse_open(&self, refuse: bool) {
        self.model().refuse_open = refuse;
    }

    /// Make transports reject read-timeout changes, like a driver that only
    /// supports the timeout it was opened with.
    pub fn fix_read_timeout(&self, fixed: bool) {
        self.model().fixed_timeout = fixed;
    }

    /// How many times a transport was opened on this radio.
    pub fn open_count(&self) -> usize {
        self.model().open_count
    }

    /// Every command received so far, in arrival order.
    pub fn commands(&self) -> Vec<LoggedCommand> {
        self.model().log.clone()
    }

    fn model(&self) -> MutexGuard<'_, RigModel> {
        self.model.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Opens transports onto a [`SimulatedRig`], ignoring port and baud.
pub struct SimConnector {
    rig: SimulatedRig,
}

impl Connector for SimConnector {
    fn open(&self, port: &str, _baud: u32) -> Result<Box<dyn Transport>> {
        let mut model = self.rig.model();
        if model.refuse_open {
            return Err(CatError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such port: {port}"),
            )));
        }
        model.open_count += 1;
        Ok(Box::new(SimTransport {
            rig: self.rig.clone(),
            partial: Vec::new(),
            pending: VecDeque::new(),
            read_timeout: Duration::from_millis(50),
        }))
    }
}

struct SimTransport {
    rig: SimulatedRig,
    /// Bytes of a command whose terminator has not arrived yet.
    partial: Vec<u8>,
    /// Reply bytes waiting to be read.
    pending: VecDeque<u8>,
    read_timeout: Duration,
}

impl SimTransport {
    fn check_plugged(&self) -> io::Result<()> {
        if self.rig.model().unplugged {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "cable unplugged"));
        }
        Ok(())
    }
}

impl Transport for SimTransport {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.check_plugged()?;
        for &byte in buf {
            if byte != TERMINATOR {
                self.partial.push(byte);
                continue;
            }
            let text = String::from_utf8_lossy(&self.partial).into_owned();
            self.partial.clear();
            if let Some(reply) = self.rig.model().handle(&text) {
                self.pending.extend(reply.bytes());
                self.pending.push_back(TERMINATOR);
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check_plugged()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_plugged()?;
        if self.pending.is_empty() {
            thread::sleep(self.read_timeout);
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        if self.rig.model().fixed_timeout {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "read timeout is fixed",
            ));
        }
        self.read_timeout = timeout;
        Ok(())
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.pending.clear();
        Ok(())
    }
}
