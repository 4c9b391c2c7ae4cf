use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::arbiter::LinkArbiter;
use crate::error::Result;
use crate::events::{Event, EventSender, Status};
use crate::frequency::Frequency;
use crate::link::LinkState;
use crate::mode::OperatingMode;
use crate::rig::Rig;
use crate::shutdown::Shutdown;

/// Poll cadence.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Period of the frequency / S-meter reads.
    pub fast_interval: Duration,
    /// Period of the mode / power reads.
    pub slow_interval: Duration,
    /// Minimum spacing of the "disconnected" report while the link is down.
    pub offline_report_interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            fast_interval: Duration::from_millis(200),
            slow_interval: Duration::from_millis(1500),
            offline_report_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Disconnected,
    Active,
    /// A scan owns the link.
    Suspended,
}

impl PollState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Active,
            2 => Self::Suspended,
            _ => Self::Disconnected,
        }
    }
}

/// Handle to the background poll thread.
pub struct Poller {
    state: Arc<AtomicU8>,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    /// Start polling on a dedicated thread. It runs until `shutdown` fires.
    pub fn spawn(
        rig: Arc<Rig>,
        arbiter: Arc<LinkArbiter>,
        events: EventSender,
        shutdown: Shutdown,
        config: PollConfig,
    ) -> Result<Self> {
        let state = Arc::new(AtomicU8::new(PollState::Disconnected as u8));
        let worker = PollWorker {
            rig,
            arbiter,
            events,
            shutdown,
            config,
            state: Arc::clone(&state),
            last_mode: None,
            last_power: None,
            last_slow_poll: None,
            last_offline_report: None,
        };
        let handle = thread::Builder::new()
            .name("cat-poller".into())
            .spawn(move || worker.run())?;
        Ok(Self {
            state,
            handle: Some(handle),
        })
    }

    pub fn state(&self) -> PollState {
        PollState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Wait for the thread to exit. Trigger the shutdown first.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("poll thread panicked");
            }
        }
    }
}

struct PollWorker {
    rig: Arc<Rig>,
    arbiter: Arc<LinkArbiter>,
    events: EventSender,
    shutdown: Shutdown,
    config: PollConfig,
    state: Arc<AtomicU8>,
    // Edge-triggered values, as last reported.
    last_mode: Option<OperatingMode>,
    last_power: Option<u8>,
    last_slow_poll: Option<Instant>,
    last_offline_report: Option<Instant>,
}

impl PollWorker {
    fn run(mut self) {
        info!("poller started");
        while !self.shutdown.is_triggered() {
            if self.rig.link().is_connected() {
                self.poll_connected();
            } else {
                self.report_offline();
            }
            self.shutdown.sleep(self.config.fast_interval);
        }
        info!("poller stopped");
    }

    fn state(&self) -> PollState {
        PollState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: PollState) {
        let previous = PollState::from_u8(self.state.swap(state as u8, Ordering::SeqCst));
        if previous != state {
            debug!("poller {previous:?} -> {state:?}");
        }
    }

    fn poll_connected(&mut self) {
        let arbiter = Arc::clone(&self.arbiter);
        let Some(turn) = arbiter.poll_turn() else {
            self.set_state(PollState::Suspended);
            // Re-read everything as soon as the scan hands the link back.
            self.last_slow_poll = None;
            return;
        };

        if self.state() == PollState::Disconnected {
            if let LinkState::Connected { port, baud } = self.rig.link().state() {
                self.events.status(Status::Connected { port, baud });
            }
        }
        self.set_state(PollState::Active);

        self.events
            .send(Event::FrequencyChanged(self.rig.get_frequency()));
        self.events.send(Event::SMeterChanged(self.rig.get_s_meter()));

        let slow_due = self
            .last_slow_poll
            .is_none_or(|t| t.elapsed() >= self.config.slow_interval);
        if slow_due {
            self.last_slow_poll = Some(Instant::now());
            self.poll_slow();
        }

        drop(turn);
    }

    /// Mode and power only change when the operator changes them; report
    /// them only when they differ from what was last reported.
    fn poll_slow(&mut self) {
        if let Some(mode) = self.rig.get_mode() {
            if self.last_mode != Some(mode) {
                self.last_mode = Some(mode);
                self.events.send(Event::ModeChanged(mode));
            }
        }

        let power = self.rig.get_rf_power();
        if power != 0 && self.last_power != Some(power) {
            self.last_power = Some(power);
            self.events.send(Event::PowerChanged(power));
        }
    }

    fn report_offline(&mut self) {
        if self.state() != PollState::Disconnected {
            self.set_state(PollState::Disconnected);
            self.last_mode = None;
            self.last_power = None;
            self.last_slow_poll = None;
        }

        let due = self
            .last_offline_report
            .is_none_or(|t| t.elapsed() >= self.config.offline_report_interval);
        if due {
            self.last_offline_report = Some(Instant::now());
            self.events.status(Status::Disconnected);
            self.events.send(Event::FrequencyChanged(Frequency::ZERO));
            self.events.send(Event::SMeterChanged(0));
        }
    }
}
