//! Worker → consumer event delivery.
//!
//! Producers (poller, scanner) send on a cloneable [`EventSender`] that never
//! blocks. The single consumer drains an [`EventReceiver`] on its own
//! schedule, either synchronously or from async code.

use std::fmt;

use chrono::{DateTime, Local};
use log::trace;
use tokio::sync::mpsc;

use crate::band::BandId;
use crate::frequency::Frequency;
use crate::mode::OperatingMode;

/// Link and scan status as shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Connected { port: String, baud: u32 },
    Disconnected,
    Scanning { band: BandId },
    ScanStopped,
    Error(String),
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected { port, baud } => write!(f, "connected to {port} at {baud} baud"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Scanning { band } => write!(f, "scanning {band}"),
            Self::ScanStopped => write!(f, "scan stopped"),
            Self::Error(message) => write!(f, "error: {message}"),
        }
    }
}

/// Activity found by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub frequency: Frequency,
    pub strength: u8,
    pub note: String,
    pub timestamp: DateTime<Local>,
}

/// State change delivered to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    FrequencyChanged(Frequency),
    SMeterChanged(u8),
    ModeChanged(OperatingMode),
    PowerChanged(u8),
    StatusChanged(Status),
    /// Whether manual transmit is currently allowed.
    TransmitEnabled(bool),
    SignalLogged(Detection),
}

/// Create a connected sender/receiver pair.
pub fn channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventReceiver { rx })
}

/// Producer half. Cloned into each worker.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    /// Queue an event. Never blocks; a vanished consumer is not an error for
    /// the producer.
    pub fn send(&self, event: Event) {
        if let Err(mpsc::error::SendError(event)) = self.tx.send(event) {
            trace!("no consumer for {event:?}");
        }
    }

    pub fn status(&self, status: Status) {
        self.send(Event::StatusChanged(status));
    }
}

/// Consumer half.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<Event>,
}

impl EventReceiver {
    /// Next pending event, without waiting.
    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Everything pending, in arrival order.
    pub fn drain(&mut self) -> Vec<Event> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Wait for the next event. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}
