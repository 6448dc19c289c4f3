use std::fmt;

use telsim_channel::ChannelError;

/// Why the sequencer stopped in FAULT.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FaultCause {
    #[error("{phase} timed out after {after_ms} ms")]
    Timeout { phase: &'static str, after_ms: u64 },
    #[error("{phase}: {error}")]
    Channel { phase: &'static str, error: ChannelError },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum SequencerState {
    #[default]
    Init,
    Off,
    Idle,
    MoveAlt,
    AwaitAlt,
    MoveWind,
    AwaitWind,
    Stopped,
    Cleanup,
    AwaitCleanup,
    Fault(FaultCause),
}

impl SequencerState {
    pub fn name(&self) -> &'static str {
        match self {
            SequencerState::Init => "INIT",
            SequencerState::Off => "OFF",
            SequencerState::Idle => "IDLE",
            SequencerState::MoveAlt => "MOVE_ALT",
            SequencerState::AwaitAlt => "AWAIT_ALT",
            SequencerState::MoveWind => "MOVE_WIND",
            SequencerState::AwaitWind => "AWAIT_WIND",
            SequencerState::Stopped => "STOPPED",
            SequencerState::Cleanup => "CLEANUP",
            SequencerState::AwaitCleanup => "AWAIT_CLEANUP",
            SequencerState::Fault(_) => "FAULT",
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, SequencerState::Fault(_))
    }
}

impl fmt::Display for SequencerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequencerState::Fault(cause) => write!(f, "FAULT ({})", cause),
            s => f.write_str(s.name()),
        }
    }
}
