use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Granularity at which sleeping workers re-check their stop conditions.
pub const CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Process-wide cooperative shutdown flag shared by every worker.
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early on shutdown.
    ///
    /// Returns `false` if shutdown was requested before the time elapsed.
    pub fn sleep(&self, duration: Duration) -> bool {
        sleep_unless(duration, || self.is_triggered())
    }
}

/// Sleep for `duration` in [`CHECK_INTERVAL`] slices, returning `false` as
/// soon as `interrupted` reports true.
pub fn sleep_unless(duration: Duration, interrupted: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if interrupted() {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return true;
        }
        thread::sleep(remaining.min(CHECK_INTERVAL));
    }
}
