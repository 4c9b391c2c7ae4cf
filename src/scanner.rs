use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Local;
use log::{debug, info, warn};

use crate::arbiter::{LinkArbiter, ScanLease};
use crate::band::{self, BandId, BandPlan};
use crate::error::{CatError, Result};
use crate::events::{Detection, Event, EventSender, Status};
use crate::frequency::Frequency;
use crate::rig::Rig;
use crate::shutdown::{Shutdown, sleep_unless};

/// Scan tuning.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Minimum signal strength that counts as activity.
    pub squelch: u8,
    /// Wait after retuning before reading the meter.
    pub settle: Duration,
    /// How long to stay on a frequency where activity was found.
    pub dwell: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            squelch: 40,
            settle: Duration::from_millis(150),
            dwell: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Tuning,
    Dwelling,
}

impl ScanState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Tuning,
            2 => Self::Dwelling,
            _ => Self::Idle,
        }
    }
}

/// The sweep in progress. Owned by the scan thread.
#[derive(Debug, Clone)]
pub struct ScanSession {
    pub band: BandPlan,
    pub squelch: u8,
    /// Always within `band`.
    pub current: Frequency,
    pub phase: ScanState,
}

/// Runs at most one band scan at a time on a background thread.
///
/// While a scan runs it holds the arbiter's [`ScanLease`], which suspends
/// the poller, and manual transmit is reported as disabled.
pub struct Scanner {
    rig: Arc<Rig>,
    arbiter: Arc<LinkArbiter>,
    events: EventSender,
    shutdown: Shutdown,
    config: ScanConfig,
    state: Arc<AtomicU8>,
    worker: Option<WorkerHandle>,
}

struct WorkerHandle {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Scanner {
    pub fn new(
        rig: Arc<Rig>,
        arbiter: Arc<LinkArbiter>,
        events: EventSender,
        shutdown: Shutdown,
        config: ScanConfig,
    ) -> Self {
        Self {
            rig,
            arbiter,
            events,
            shutdown,
            config,
            state: Arc::new(AtomicU8::new(ScanState::Idle as u8)),
            worker: None,
        }
    }

    pub fn state(&self) -> ScanState {
        ScanState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_scanning(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }

    /// Start scanning `band`, or the band containing the radio's current
    /// frequency when `band` is `None`.
    ///
    /// Returns as soon as the scan thread is running; it never waits on the
    /// radio. The thread takes the link from the poller, reads the current
    /// frequency and selects the band's mode. If no band can be resolved
    /// there, the refusal arrives as events and the state stays `Idle`.
    pub fn start(&mut self, band: Option<BandId>) -> Result<()> {
        self.reap();
        if self.worker.is_some() {
            self.events
                .status(Status::Error(CatError::ScanActive.to_string()));
            return Err(CatError::ScanActive);
        }
        if !self.rig.link().is_connected() {
            return self.refuse(CatError::NotConnected);
        }
        if let Some(plan) = band.map(band::by_id) {
            if plan.step_hz == 0 {
                return self.refuse(CatError::InvalidStep(plan.id));
            }
        }

        let stop = Arc::new(AtomicBool::new(false));
        let request = ScanRequest {
            rig: Arc::clone(&self.rig),
            arbiter: Arc::clone(&self.arbiter),
            events: self.events.clone(),
            shutdown: self.shutdown.clone(),
            stop: Arc::clone(&stop),
            state: Arc::clone(&self.state),
            config: self.config.clone(),
            band,
        };
        match thread::Builder::new()
            .name("cat-scanner".into())
            .spawn(move || request.run())
        {
            Ok(handle) => {
                self.worker = Some(WorkerHandle { stop, handle });
                Ok(())
            }
            Err(e) => self.refuse(CatError::Io(e)),
        }
    }

    /// Stop the scan and wait for its thread to finish. No-op when idle.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        worker.stop.store(true, Ordering::SeqCst);
        if worker.handle.join().is_err() {
            warn!("scan thread panicked");
            self.state.store(ScanState::Idle as u8, Ordering::SeqCst);
            self.events.send(Event::TransmitEnabled(true));
        }
    }

    /// Collect a scan thread that already ended on its own.
    fn reap(&mut self) {
        if self.worker.as_ref().is_some_and(|w| w.handle.is_finished()) {
            self.stop();
        }
    }

    fn refuse<T>(&self, error: CatError) -> Result<T> {
        report_refusal(&self.events, &error);
        Err(error)
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        self.stop();
    }
}

fn report_refusal(events: &EventSender, error: &CatError) {
    warn!("scan refused: {error}");
    events.status(Status::Error(error.to_string()));
    events.send(Event::TransmitEnabled(true));
}

/// A scan that has been asked for but does not own the link yet.
struct ScanRequest {
    rig: Arc<Rig>,
    arbiter: Arc<LinkArbiter>,
    events: EventSender,
    shutdown: Shutdown,
    stop: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    config: ScanConfig,
    band: Option<BandId>,
}

impl ScanRequest {
    fn run(self) {
        // Waits out an in-flight poll cycle on this thread.
        let Some(lease) = self.arbiter.lease() else {
            warn!("scan refused: link already leased");
            self.events
                .status(Status::Error(CatError::ScanActive.to_string()));
            return;
        };
        let session = match self.begin() {
            Ok(session) => session,
            Err(e) => {
                report_refusal(&self.events, &e);
                return;
            }
        };

        self.events.send(Event::TransmitEnabled(false));
        self.events.status(Status::Scanning {
            band: session.band.id,
        });
        ScanWorker {
            rig: self.rig,
            events: self.events,
            shutdown: self.shutdown,
            stop: self.stop,
            state: self.state,
            config: self.config,
            session,
            _lease: lease,
        }
        .run();
    }

    fn begin(&self) -> Result<ScanSession> {
        if !self.rig.link().is_connected() {
            return Err(CatError::NotConnected);
        }
        let current = self.rig.get_frequency();
        let plan = match self.band {
            Some(id) => *band::by_id(id),
            None => *band::containing(current).ok_or(CatError::NoBand)?,
        };
        if plan.step_hz == 0 {
            return Err(CatError::InvalidStep(plan.id));
        }

        if let Err(e) = self.rig.set_operating_mode(plan.default_mode) {
            debug!("could not select {} for {}: {e}", plan.default_mode, plan.name);
        }

        let session = ScanSession {
            band: plan,
            squelch: self.config.squelch,
            current: plan.clamp(current),
            phase: ScanState::Tuning,
        };
        info!(
            "scanning {} from {} (squelch {})",
            plan.name, session.current, session.squelch
        );
        Ok(session)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanExit {
    Stopped,
    LinkLost,
}

struct ScanWorker {
    rig: Arc<Rig>,
    events: EventSender,
    shutdown: Shutdown,
    stop: Arc<AtomicBool>,
    state: Arc<AtomicU8>,
    config: ScanConfig,
    session: ScanSession,
    /// Held for the life of the thread; dropping it resumes the poller.
    _lease: ScanLease,
}

impl ScanWorker {
    fn run(mut self) {
        let exit = self.sweep();
        self.enter(ScanState::Idle);

        if exit == ScanExit::LinkLost {
            warn!("link lost, scan of {} aborted", self.session.band.name);
            self.events.status(Status::Disconnected);
        }
        self.events.send(Event::TransmitEnabled(true));
        if exit == ScanExit::Stopped {
            info!("scan of {} stopped", self.session.band.name);
            self.events.status(Status::ScanStopped);
        }
    }

    fn sweep(&mut self) -> ScanExit {
        loop {
            if self.stop_requested() {
                return ScanExit::Stopped;
            }
            if !self.rig.link().is_connected() {
                return ScanExit::LinkLost;
            }

            let freq = self.session.band.clamp(self.session.current);
            self.session.current = freq;
            self.enter(ScanState::Tuning);

            if self.rig.set_frequency(freq).is_err() {
                // Only a dead link refuses a write; the check above ends the loop.
                continue;
            }
            self.events.send(Event::FrequencyChanged(freq));
            if let Some(exit) = self.pause(self.config.settle) {
                return exit;
            }

            let strength = self.rig.get_signal_strength();
            if !self.rig.link().is_connected() {
                return ScanExit::LinkLost;
            }
            self.events.send(Event::SMeterChanged(strength));

            if strength >= self.session.squelch {
                self.log_detection(freq, strength);
                self.enter(ScanState::Dwelling);
                if let Some(exit) = self.pause(self.config.dwell) {
                    return exit;
                }
            }

            self.session.current = self.session.band.step_from(freq);
        }
    }

    fn log_detection(&self, frequency: Frequency, strength: u8) {
        let note = format!("auto-found {}", self.session.band.name);
        info!("signal {strength} on {frequency} ({note})");
        self.events.send(Event::SignalLogged(Detection {
            frequency,
            strength,
            note,
            timestamp: Local::now(),
        }));
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst) || self.shutdown.is_triggered()
    }

    /// Wait, watching for a stop request or a lost link. `None` means the
    /// full duration passed.
    fn pause(&self, duration: Duration) -> Option<ScanExit> {
        let link = self.rig.link();
        if sleep_unless(duration, || self.stop_requested() || !link.is_connected()) {
            return None;
        }
        if self.stop_requested() {
            Some(ScanExit::Stopped)
        } else {
            Some(ScanExit::LinkLost)
        }
    }

    fn enter(&mut self, phase: ScanState) {
        self.session.phase = phase;
        self.state.store(phase as u8, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::events::testing::collect_until;
    use crate::events::{self, EventReceiver};
    use crate::link::{Link, LinkConfig};
    use crate::poller::{PollConfig, PollState, Poller};
    use crate::sim::SimulatedRig;

    struct Harness {
        sim: SimulatedRig,
        rig: Arc<Rig>,
        arbiter: Arc<LinkArbiter>,
        shutdown: Shutdown,
        scanner: Scanner,
        rx: EventReceiver,
    }

    fn harness(sim: SimulatedRig, config: ScanConfig) -> Harness {
        harness_with_timeout(sim, config, Duration::from_millis(100))
    }

    fn harness_with_timeout(sim: SimulatedRig, config: ScanConfig, timeout: Duration) -> Harness {
        let link = Link::new(sim.connector(), LinkConfig { timeout });
        link.connect("sim", 38400).unwrap();
        let rig = Arc::new(Rig::new(Arc::new(link)));
        let arbiter = LinkArbiter::new();
        let shutdown = Shutdown::new();
        let (tx, rx) = events::channel();
        let scanner = Scanner::new(
            Arc::clone(&rig),
            Arc::clone(&arbiter),
            tx,
            shutdown.clone(),
            config,
        );
        Harness {
            sim,
            rig,
            arbiter,
            shutdown,
            scanner,
            rx,
        }
    }

    fn quick(dwell: Duration) -> ScanConfig {
        ScanConfig {
            squelch: 40,
            settle: Duration::ZERO,
            dwell,
        }
    }

    fn wait_for(timeout: Duration, cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    /// Frequencies the scanner commanded, in order.
    fn tuned(sim: &SimulatedRig) -> Vec<Frequency> {
        sim.commands()
            .iter()
            .filter(|c| c.thread.as_deref() == Some("cat-scanner"))
            .filter_map(|c| c.text.strip_prefix("FA"))
            .filter(|digits| !digits.is_empty())
            .map(|digits| Frequency::from_cat_digits(digits).unwrap())
            .collect()
    }

    fn mhz(text: &str) -> Frequency {
        Frequency::from_mhz_str(text).unwrap()
    }

    #[test]
    fn test_two_metre_repeater_is_logged_once() {
        let sim = SimulatedRig::with_signal(|hz| {
            if (146_932_500..=146_947_500).contains(&hz) { 45 } else { 10 }
        });
        let mut h = harness(sim, quick(Duration::from_millis(100)));

        h.scanner.start(Some(BandId::M2)).unwrap();

        let past = mhz("147.1");
        let events = collect_until(&mut h.rx, Duration::from_secs(10), |e| {
            matches!(e, Event::FrequencyChanged(f) if *f >= past)
        });
        h.scanner.stop();
        assert_eq!(h.sim.mode_code(), '4');

        assert_eq!(events[0], Event::TransmitEnabled(false));
        assert_eq!(events[1], Event::StatusChanged(Status::Scanning { band: BandId::M2 }));

        let detections: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                Event::SignalLogged(d) => Some(d),
                _ => None,
            })
            .collect();
        assert_eq!(detections.len(), 1, "{detections:?}");
        assert_eq!(detections[0].frequency, mhz("146.94"));
        assert_eq!(detections[0].strength, 45);
        assert_eq!(detections[0].note, "auto-found 2m");

        // Stepping resumed after the dwell.
        let after: Vec<_> = tuned(&h.sim)
            .into_iter()
            .skip_while(|f| *f <= mhz("146.94"))
            .collect();
        assert_eq!(after.first(), Some(&mhz("146.955")));
    }

    #[test]
    fn test_scanner_never_leaves_the_band() {
        for id in [BandId::M2, BandId::M20, BandId::Cm70] {
            let plan = *band::by_id(id);
            let near_end = plan.end.hz() - plan.step_hz / 2;
            for start_hz in [0, plan.start.hz() - 1, plan.start.hz(), near_end, plan.end.hz()] {
                let sim = SimulatedRig::new();
                sim.set_frequency_hz(start_hz);
                let mut h = harness(sim.clone(), quick(Duration::ZERO));
                h.scanner.start(Some(id)).unwrap();
                assert!(wait_for(Duration::from_secs(5), || tuned(&sim).len() >= 40));
                h.scanner.stop();

                let tuned = tuned(&sim);
                assert!(tuned.iter().all(|f| plan.contains(*f)), "{id} from {start_hz}");
                if start_hz == near_end {
                    assert_eq!(tuned[0].hz(), near_end);
                    assert_eq!(tuned[1], plan.start);
                }
            }
        }
    }

    #[test]
    fn test_stop_during_dwell_is_prompt() {
        let mut h = harness(SimulatedRig::with_signal(|_| 200), quick(Duration::from_secs(30)));
        h.scanner.start(Some(BandId::M2)).unwrap();
        assert!(wait_for(Duration::from_secs(2), || h.scanner.state() == ScanState::Dwelling));

        let started = Instant::now();
        h.scanner.stop();
        assert!(started.elapsed() < Duration::from_millis(300), "{:?}", started.elapsed());
        assert_eq!(h.scanner.state(), ScanState::Idle);
        assert!(!h.arbiter.is_leased());

        let events = h.rx.drain();
        let tail = &events[events.len() - 2..];
        assert_eq!(
            tail,
            [
                Event::TransmitEnabled(true),
                Event::StatusChanged(Status::ScanStopped)
            ]
        );
    }

    #[test]
    fn test_shutdown_ends_scan() {
        let mut h = harness(SimulatedRig::with_signal(|_| 200), quick(Duration::from_secs(30)));
        h.scanner.start(Some(BandId::M2)).unwrap();
        assert!(wait_for(Duration::from_secs(2), || h.scanner.state() == ScanState::Dwelling));

        h.shutdown.trigger();
        assert!(wait_for(Duration::from_millis(300), || !h.scanner.is_scanning()));
        assert!(h.rx.drain().contains(&Event::TransmitEnabled(true)));
    }

    #[test]
    fn test_disconnect_mid_scan() {
        let mut h = harness(
            SimulatedRig::new(),
            ScanConfig {
                settle: Duration::from_millis(5),
                ..quick(Duration::ZERO)
            },
        );
        h.scanner.start(Some(BandId::M2)).unwrap();
        assert!(wait_for(Duration::from_secs(2), || tuned(&h.sim).len() >= 3));

        h.rig.link().disconnect();
        assert!(wait_for(Duration::from_secs(1), || !h.scanner.is_scanning()));
        assert_eq!(h.scanner.state(), ScanState::Idle);
        assert!(!h.arbiter.is_leased());

        let events = h.rx.drain();
        let lost = events
            .iter()
            .position(|e| *e == Event::StatusChanged(Status::Disconnected))
            .unwrap();
        let enabled = events
            .iter()
            .position(|e| *e == Event::TransmitEnabled(true))
            .unwrap();
        assert!(lost < enabled);
        assert_eq!(enabled, events.len() - 1);

        assert!(matches!(h.scanner.start(Some(BandId::M2)), Err(CatError::NotConnected)));
    }

    #[test]
    fn test_infers_band_from_current_frequency() {
        let sim = SimulatedRig::new();
        sim.set_frequency_hz(146_520_000);
        let mut h = harness(sim, quick(Duration::ZERO));

        h.scanner.start(None).unwrap();
        let events = collect_until(&mut h.rx, Duration::from_secs(2), |e| {
            matches!(e, Event::StatusChanged(Status::Scanning { .. }))
        });
        assert_eq!(
            events.last(),
            Some(&Event::StatusChanged(Status::Scanning { band: BandId::M2 }))
        );
        assert!(wait_for(Duration::from_secs(2), || !tuned(&h.sim).is_empty()));
        h.scanner.stop();
        assert_eq!(tuned(&h.sim)[0], mhz("146.52"));
    }

    #[test]
    fn test_refuses_without_band() {
        let sim = SimulatedRig::new();
        sim.set_frequency_hz(10_120_000);
        let mut h = harness(sim, quick(Duration::ZERO));

        // The band is resolved on the scan thread, so the refusal arrives as events.
        h.scanner.start(None).unwrap();
        assert!(wait_for(Duration::from_secs(2), || !h.scanner.is_scanning()));
        assert_eq!(h.scanner.state(), ScanState::Idle);
        assert!(!h.arbiter.is_leased());

        let events = h.rx.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            Event::StatusChanged(Status::Error(CatError::NoBand.to_string()))
        );
        assert_eq!(events[1], Event::TransmitEnabled(true));
        assert!(h.sim.commands().iter().all(|c| c.text == "FA"));
    }

    #[test]
    fn test_start_does_not_wait_for_a_slow_poll_cycle() {
        let sim = SimulatedRig::new();
        for query in ["MD0", "MD", "PC"] {
            sim.mute(query);
        }
        let mut h = harness_with_timeout(
            sim,
            quick(Duration::ZERO),
            Duration::from_secs(1),
        );
        let (poll_tx, _poll_rx) = events::channel();
        let poller = Poller::spawn(
            Arc::clone(&h.rig),
            Arc::clone(&h.arbiter),
            poll_tx,
            h.shutdown.clone(),
            PollConfig::default(),
        )
        .unwrap();
        // The first cycle runs the slow tier, which now costs three timeouts.
        thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        h.scanner.start(Some(BandId::M2)).unwrap();
        assert!(started.elapsed() < Duration::from_millis(200), "{:?}", started.elapsed());
        assert!(h.scanner.is_scanning());

        // The scan itself begins once the poll cycle hands the link over.
        let events = collect_until(&mut h.rx, Duration::from_secs(5), |e| {
            matches!(e, Event::StatusChanged(Status::Scanning { .. }))
        });
        assert_eq!(events[0], Event::TransmitEnabled(false));
        assert_eq!(
            events.last(),
            Some(&Event::StatusChanged(Status::Scanning { band: BandId::M2 }))
        );

        h.scanner.stop();
        h.shutdown.trigger();
        poller.join();
    }

    #[test]
    fn test_refuses_when_disconnected() {
        let mut h = harness(SimulatedRig::new(), quick(Duration::ZERO));
        h.rig.link().disconnect();

        assert!(matches!(h.scanner.start(Some(BandId::M2)), Err(CatError::NotConnected)));
        assert_eq!(h.scanner.state(), ScanState::Idle);
        assert_eq!(h.rx.drain().last(), Some(&Event::TransmitEnabled(true)));
    }

    #[test]
    fn test_second_start_is_refused_without_enabling_transmit() {
        let mut h = harness(SimulatedRig::new(), quick(Duration::ZERO));
        h.scanner.start(Some(BandId::M2)).unwrap();
        h.rx.drain();

        assert!(matches!(h.scanner.start(Some(BandId::M20)), Err(CatError::ScanActive)));
        assert!(h.scanner.is_scanning());
        let events = h.rx.drain();
        assert!(!events.contains(&Event::TransmitEnabled(true)));
        assert!(events.iter().any(|e| matches!(e, Event::StatusChanged(Status::Error(_)))));
        h.scanner.stop();
    }

    #[test]
    fn test_poller_and_scanner_never_share_the_link() {
        let sim = SimulatedRig::new();
        let mut h = harness(
            sim.clone(),
            ScanConfig {
                settle: Duration::from_millis(2),
                ..quick(Duration::ZERO)
            },
        );
        let (poll_tx, _poll_rx) = events::channel();
        let poller = Poller::spawn(
            Arc::clone(&h.rig),
            Arc::clone(&h.arbiter),
            poll_tx,
            h.shutdown.clone(),
            PollConfig {
                fast_interval: Duration::from_millis(5),
                slow_interval: Duration::from_millis(20),
                offline_report_interval: Duration::from_secs(1),
            },
        )
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        h.scanner.start(Some(BandId::M2)).unwrap();
        assert!(wait_for(Duration::from_secs(1), || poller.state() == PollState::Suspended));
        thread::sleep(Duration::from_millis(200));
        h.scanner.stop();
        assert!(wait_for(Duration::from_secs(1), || poller.state() == PollState::Active));
        thread::sleep(Duration::from_millis(50));
        h.shutdown.trigger();
        poller.join();

        let commands = sim.commands();
        let threads: Vec<_> = commands.iter().map(|c| c.thread.as_deref()).collect();
        let polls = |range: &[Option<&str>]| {
            range.iter().filter(|t| **t == Some("cat-poller")).count()
        };
        let scan_first = threads.iter().position(|t| *t == Some("cat-scanner")).unwrap();
        let scan_last = threads.iter().rposition(|t| *t == Some("cat-scanner")).unwrap();

        assert_eq!(polls(&threads[scan_first..=scan_last]), 0);
        assert!(polls(&threads[..scan_first]) > 0);
        assert!(polls(&threads[scan_last + 1..]) > 0);
    }
}
