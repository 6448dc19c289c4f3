use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source for the sequencer.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;

    /// Blocks the caller. The manual clock advances instead.
    fn sleep(&self, dur: Duration);
}

#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn sleep(&self, dur: Duration) {
        std::thread::sleep(dur);
    }
}

/// Simulated time for tests and dry runs. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, dur: Duration) {
        self.now_ms.fetch_add(dur.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn sleep(&self, dur: Duration) {
        self.advance(dur);
    }
}

/// Single-shot countdown that faults the waiting state when it runs out.
///
/// Polled, never interrupt driven: the owner asks `expired(now)` each tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline {
    armed: Option<(u64, u64)>,
}

impl Deadline {
    /// Arms (or re-arms) the deadline `budget_ms` from `now_ms`.
    pub fn arm(&mut self, now_ms: u64, budget_ms: u64) {
        self.armed = Some((now_ms, budget_ms));
    }

    pub fn cancel(&mut self) {
        self.armed = None;
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    pub fn is_active(&self, now_ms: u64) -> bool {
        match self.armed {
            Some((start, budget)) => now_ms.saturating_sub(start) < budget,
            None => false,
        }
    }

    /// True once an armed deadline has run out.
    pub fn expired(&self, now_ms: u64) -> bool {
        self.is_armed() && !self.is_active(now_ms)
    }

    pub fn budget_ms(&self) -> Option<u64> {
        self.armed.map(|(_, budget)| budget)
    }
}

/// Display-only countdown for the wind stage travel time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Countdown {
    running: Option<(u64, f64)>,
}

impl Countdown {
    pub fn start(&mut self, now_ms: u64, seconds: f64) {
        self.running = Some((now_ms, seconds.max(0.0)));
    }

    pub fn stop(&mut self) {
        self.running = None;
    }

    pub fn remaining_s(&self, now_ms: u64) -> f64 {
        match self.running {
            Some((start, seconds)) => {
                let elapsed = now_ms.saturating_sub(start) as f64 / 1000.0;
                (seconds - elapsed).max(0.0)
            }
            None => 0.0,
        }
    }
}
