use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// "Was pressed" flag. Setting is idempotent; only the sequencer clears it.
#[derive(Debug, Default)]
pub struct Latch(AtomicBool);

impl Latch {
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Consume the latch: returns whether it was set and clears it.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Setup,
    Close,
    Start,
    Stop,
    Acknowledge,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Intent::Setup => "setup",
            Intent::Close => "close",
            Intent::Start => "start",
            Intent::Stop => "stop",
            Intent::Acknowledge => "ack",
        };
        f.write_str(s)
    }
}

/// Operator button latches, shared between the console and the sequencer.
#[derive(Debug, Default)]
pub struct IntentLatches {
    pub setup: Latch,
    pub close: Latch,
    pub start: Latch,
    pub stop: Latch,
    pub acknowledge: Latch,
}

impl IntentLatches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Button press entry point. Safe from any thread.
    pub fn press(&self, intent: Intent) {
        self.get(intent).set();
    }

    pub fn get(&self, intent: Intent) -> &Latch {
        match intent {
            Intent::Setup => &self.setup,
            Intent::Close => &self.close,
            Intent::Start => &self.start,
            Intent::Stop => &self.stop,
            Intent::Acknowledge => &self.acknowledge,
        }
    }

    pub fn clear_all(&self) {
        for l in [&self.setup, &self.close, &self.start, &self.stop, &self.acknowledge] {
            l.clear();
        }
    }
}
