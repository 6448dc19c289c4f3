pub mod memory;
pub mod sim;

use std::fmt;

pub use memory::{BusChannel, JournalEntry, MemoryBus};
pub use sim::{AxisModel, SimRig};

/// Value carried by a process-control channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelValue {
    Float(f64),
    Text(String),
}

impl ChannelValue {
    /// Numeric view of the value. Enumerations come back from the hardware
    /// as strings ("0", "3"), so text that parses as a float is accepted.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ChannelValue::Float(v) => Some(*v),
            ChannelValue::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            ChannelValue::Float(v) => v.to_string(),
            ChannelValue::Text(s) => s.clone(),
        }
    }
}

impl From<f64> for ChannelValue {
    fn from(v: f64) -> Self {
        ChannelValue::Float(v)
    }
}

impl From<&str> for ChannelValue {
    fn from(s: &str) -> Self {
        ChannelValue::Text(s.to_string())
    }
}

impl fmt::Display for ChannelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelValue::Float(v) => write!(f, "{}", v),
            ChannelValue::Text(s) => write!(f, "\"{}\"", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ChannelError {
    #[error("channel {name} disconnected")]
    Disconnected { name: String },
    #[error("channel {name} timed out")]
    Timeout { name: String },
    #[error("channel {name}: expected {expected} value")]
    Type { name: String, expected: &'static str },
}

pub type SubscriptionId = u64;

/// Callback invoked with the new value whenever a channel changes.
pub type Callback = Box<dyn Fn(&ChannelValue) + Send + Sync>;

/// A named remote control or readback point.
///
/// `read` and `write` are synchronous and may block the caller. `subscribe`
/// is for display refresh only; control decisions must use `read`.
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    fn read(&self) -> Result<ChannelValue, ChannelError>;

    /// `wait = false` returns as soon as the value is handed to the
    /// transport; `wait = true` waits for the remote side to accept it.
    fn write(&self, value: ChannelValue, wait: bool) -> Result<(), ChannelError>;

    fn subscribe(&self, callback: Callback) -> Result<SubscriptionId, ChannelError>;

    fn read_f64(&self) -> Result<f64, ChannelError> {
        self.read()?.as_f64().ok_or_else(|| ChannelError::Type {
            name: self.name().to_string(),
            expected: "numeric",
        })
    }

    fn read_text(&self) -> Result<String, ChannelError> {
        Ok(self.read()?.as_text())
    }
}

/// Motor record stop/move mode (the `SPMG` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    Stop,
    Move,
}

impl StopMode {
    /// Wire encoding expected by the motor record.
    pub fn as_wire(self) -> &'static str {
        match self {
            StopMode::Stop => "0",
            StopMode::Move => "3",
        }
    }

    pub fn from_value(v: &ChannelValue) -> Option<Self> {
        match v.as_f64()? as i64 {
            0 => Some(StopMode::Stop),
            3 => Some(StopMode::Move),
            _ => None,
        }
    }
}

impl From<StopMode> for ChannelValue {
    fn from(mode: StopMode) -> Self {
        ChannelValue::Text(mode.as_wire().to_string())
    }
}

/// Absolute-tolerance closeness test.
pub fn is_close(a: f64, b: f64, abs_tol: f64) -> bool {
    (a - b).abs() <= abs_tol
}
