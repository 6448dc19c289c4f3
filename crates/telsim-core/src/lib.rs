//! Control core for the telescope simulator: the move sequencer and the
//! operator-facing pieces around it.

pub mod aoloop;
pub mod clock;
pub mod config;
pub mod confirm;
pub mod doctor;
pub mod latch;
pub mod limits;
pub mod panel;
pub mod rig;
pub mod sequencer;
pub mod state;

pub use aoloop::{AoError, LoopControl, LoopState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::TelsimConfig;
pub use confirm::{Confirm, ConfirmOutcome, FixedConfirm};
pub use latch::{Intent, IntentLatches};
pub use limits::{MoveForm, MoveRequest};
pub use rig::{Axis, RigChannels};
pub use sequencer::{Sequencer, SequencerStatus};
pub use state::{FaultCause, SequencerState};
