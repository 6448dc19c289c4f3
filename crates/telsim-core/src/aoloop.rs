//! Adaptive-optics loop controls: the DT/DM loop pair, gain and frame rate.
//!
//! These sit beside the sequencer rather than in it; nothing here touches
//! the motor axes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use telsim_channel::{Channel, ChannelError, ChannelValue};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::limits::{frame_rate_limits, BoundsError, GAIN};
use crate::rig::RigChannels;

pub const LOOP_OPEN: &str = "OPEN";
pub const LOOP_CLOSED: &str = "CLOSE";

/// Pause between the two halves of an open or close.
pub const LOOP_PAUSE: Duration = Duration::from_millis(500);

/// Value the frame-rate field falls back to after a rejected entry.
pub const FRAME_RATE_RESET: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Open,
    Closed,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoopState::Open => "open",
            LoopState::Closed => "closed",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AoError {
    #[error(transparent)]
    Bounds(#[from] BoundsError),
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

pub struct LoopControl {
    dt: Arc<dyn Channel>,
    dm: Arc<dyn Channel>,
    gain: Arc<dyn Channel>,
    frame_rate: Arc<dyn Channel>,
    clock: Arc<dyn Clock>,
    binned: bool,
}

impl LoopControl {
    pub fn new(rig: &RigChannels, clock: Arc<dyn Clock>) -> Self {
        Self {
            dt: rig.dt_loop.clone(),
            dm: rig.dm_loop.clone(),
            gain: rig.gain.clone(),
            frame_rate: rig.frame_rate.clone(),
            clock,
            binned: false,
        }
    }

    /// Closed only when both halves report CLOSE.
    pub fn state(&self) -> Result<LoopState, ChannelError> {
        let dt = self.dt.read_text()?;
        let dm = self.dm.read_text()?;
        if dt == LOOP_CLOSED && dm == LOOP_CLOSED {
            Ok(LoopState::Closed)
        } else {
            Ok(LoopState::Open)
        }
    }

    /// DM opens first. Returns false when there was nothing to open.
    pub fn open(&self) -> Result<bool, ChannelError> {
        if self.dt.read_text()? != LOOP_CLOSED && self.dm.read_text()? != LOOP_CLOSED {
            return Ok(false);
        }
        info!("ao: opening loop");
        self.dm.write(ChannelValue::from(LOOP_OPEN), true)?;
        self.clock.sleep(LOOP_PAUSE);
        self.dt.write(ChannelValue::from(LOOP_OPEN), true)?;
        Ok(true)
    }

    /// DT closes first. Returns false when there was nothing to close.
    pub fn close(&self) -> Result<bool, ChannelError> {
        if self.dt.read_text()? != LOOP_OPEN && self.dm.read_text()? != LOOP_OPEN {
            return Ok(false);
        }
        info!("ao: closing loop");
        self.dt.write(ChannelValue::from(LOOP_CLOSED), true)?;
        self.clock.sleep(LOOP_PAUSE);
        self.dm.write(ChannelValue::from(LOOP_CLOSED), true)?;
        Ok(true)
    }

    pub fn set_gain(&self, text: &str) -> Result<f64, AoError> {
        let v = GAIN.validate(text)?;
        info!("ao: gain -> {:.2}", v);
        self.gain.write(ChannelValue::Float(v), true)?;
        Ok(v)
    }

    /// Gain as the hardware last confirmed it, for restoring a rejected edit.
    pub fn gain(&self) -> Result<f64, ChannelError> {
        self.gain.read_f64()
    }

    pub fn is_binned(&self) -> bool {
        self.binned
    }

    /// Changing the binning mode re-checks the frame rate currently shown.
    pub fn set_binned(&mut self, binned: bool, shown: &str) -> Result<u32, AoError> {
        self.binned = binned;
        self.set_frame_rate(shown)
    }

    /// Integer frame rate within the limits of the current binning mode.
    /// On rejection nothing is written and the caller shows
    /// [`FRAME_RATE_RESET`].
    pub fn set_frame_rate(&self, text: &str) -> Result<u32, AoError> {
        let v = match frame_rate_limits(self.binned).validate(text) {
            Ok(v) => v as u32,
            Err(e) => {
                warn!("ao: {}; frame rate reset to {}", e, FRAME_RATE_RESET);
                return Err(e.into());
            }
        };
        info!("ao: frame rate -> {} ({})", v, if self.binned { "binned" } else { "unbinned" });
        self.frame_rate.write(ChannelValue::Text(v.to_string()), true)?;
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::ChannelNames;
    use telsim_channel::MemoryBus;

    fn control(dt: &str, dm: &str) -> (MemoryBus, ManualClock, LoopControl) {
        let bus = MemoryBus::new();
        let names = ChannelNames::default();
        bus.post(&names.dt_loop, dt);
        bus.post(&names.dm_loop, dm);
        bus.post(&names.gain, 0.3);
        bus.post(&names.frame_rate, "1000");
        let rig = RigChannels::connect(&names, |n| Arc::new(bus.channel(n)) as Arc<dyn Channel>);
        let clock = ManualClock::new();
        let ctl = LoopControl::new(&rig, Arc::new(clock.clone()));
        (bus, clock, ctl)
    }

    #[test]
    fn closed_needs_both_halves() {
        let (_, _, ctl) = control("CLOSE", "OPEN");
        assert_eq!(ctl.state().unwrap(), LoopState::Open);
        let (_, _, ctl) = control("CLOSE", "CLOSE");
        assert_eq!(ctl.state().unwrap(), LoopState::Closed);
    }

    #[test]
    fn close_writes_dt_then_dm_with_pause() {
        let (bus, clock, ctl) = control("OPEN", "OPEN");
        assert!(ctl.close().unwrap());
        let j = bus.journal();
        assert_eq!(j.len(), 2);
        assert_eq!(j[0].name, "dtlp");
        assert_eq!(j[1].name, "dmlp");
        assert_eq!(j[1].value, ChannelValue::Text("CLOSE".into()));
        assert_eq!(clock.now_ms(), 500);
        assert_eq!(ctl.state().unwrap(), LoopState::Closed);
    }

    #[test]
    fn open_writes_dm_first_and_skips_when_open() {
        let (bus, _, ctl) = control("CLOSE", "OPEN");
        assert!(ctl.open().unwrap());
        let names: Vec<String> = bus.journal().into_iter().map(|e| e.name).collect();
        assert_eq!(names, ["dmlp", "dtlp"]);

        bus.clear_journal();
        assert!(!ctl.open().unwrap());
        assert!(bus.journal().is_empty());
    }

    #[test]
    fn gain_out_of_range_is_not_written() {
        let (bus, _, ctl) = control("OPEN", "OPEN");
        let err = ctl.set_gain("1.5").unwrap_err();
        assert_eq!(err.to_string(), "Gain must be between 0.00 and 1.00");
        assert!(bus.journal().is_empty());
        assert_eq!(ctl.set_gain("0.45").unwrap(), 0.45);
        assert_eq!(bus.peek_f64("k1:ao:wc:dt:sv:gain"), Some(0.45));
    }

    #[test]
    fn frame_rate_limit_follows_binning() {
        let (bus, _, mut ctl) = control("OPEN", "OPEN");
        assert!(ctl.set_frame_rate("3000").is_err());
        assert!(ctl.set_frame_rate("12.5").is_err());
        assert!(bus.journal().is_empty());

        assert_eq!(ctl.set_binned(true, "3000").unwrap(), 3000);
        assert_eq!(bus.peek("wsfrrt"), Some(ChannelValue::Text("3000".into())));
        assert!(ctl.set_binned(false, "3000").is_err());
        assert!(!ctl.is_binned());
    }
}
