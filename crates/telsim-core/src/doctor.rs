use anyhow::Result;
use std::collections::HashSet;

use crate::config::{ChannelNames, HomeConfig, SequencerConfig, TelsimConfig};
use crate::limits::{ACCELERATION, ALTITUDE, VELOCITY, WIND_POS};

/// Largest poll period that keeps stop presses responsive.
pub const MAX_POLL_MS: u64 = 200;

pub fn check_config(cfg: &TelsimConfig) -> Result<()> {
    check_sequencer(&cfg.sequencer)?;
    check_home(&cfg.home)?;
    check_channels(&cfg.channels)?;
    anyhow::ensure!(cfg.sim.alt_speed > 0.0, "sim.alt_speed must be positive");
    Ok(())
}

pub fn check_sequencer(s: &SequencerConfig) -> Result<()> {
    anyhow::ensure!(s.poll_ms >= 1 && s.poll_ms <= MAX_POLL_MS, "sequencer.poll_ms should be 1..{}", MAX_POLL_MS);
    anyhow::ensure!(s.timeout_ms > s.poll_ms, "sequencer.timeout_ms must exceed poll_ms");
    anyhow::ensure!(s.settle_ms < s.timeout_ms, "sequencer.settle_ms must be shorter than timeout_ms");
    for (name, tol) in [
        ("alt_tolerance", s.alt_tolerance),
        ("wind_tolerance", s.wind_tolerance),
        ("cleanup_accel_tolerance", s.cleanup_accel_tolerance),
        ("cleanup_vel_tolerance", s.cleanup_vel_tolerance),
    ] {
        anyhow::ensure!(tol.is_finite() && tol > 0.0, "sequencer.{} must be positive", name);
    }
    Ok(())
}

pub fn check_home(h: &HomeConfig) -> Result<()> {
    WIND_POS.check(h.wind_pos).map_err(|e| anyhow::anyhow!("home.wind_pos: {}", e))?;
    VELOCITY.check(h.velocity).map_err(|e| anyhow::anyhow!("home.velocity: {}", e))?;
    ACCELERATION.check(h.acceleration).map_err(|e| anyhow::anyhow!("home.acceleration: {}", e))?;
    ALTITUDE.check(h.altitude).map_err(|e| anyhow::anyhow!("home.altitude: {}", e))?;
    Ok(())
}

pub fn check_channels(c: &ChannelNames) -> Result<()> {
    let mut seen = HashSet::new();
    for name in c.all() {
        anyhow::ensure!(!name.trim().is_empty(), "channel name empty");
        anyhow::ensure!(seen.insert(name), "channel {} configured twice", name);
    }
    Ok(())
}
