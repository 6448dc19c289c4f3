use std::fmt;
use std::sync::Arc;

use telsim_channel::{AxisModel, Channel, ChannelError, ChannelValue, StopMode};
use tracing::debug;

use crate::config::{ChannelNames, SimConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Altitude,
    Wind,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Axis::Altitude => "altitude",
            Axis::Wind => "wind",
        })
    }
}

/// Every channel the telescope simulator talks to.
#[derive(Clone)]
pub struct RigChannels {
    pub alt_pos: Arc<dyn Channel>,
    pub alt_cmd: Arc<dyn Channel>,
    pub alt_moving: Arc<dyn Channel>,
    pub alt_mode: Arc<dyn Channel>,

    pub wind_pos: Arc<dyn Channel>,
    pub wind_cmd: Arc<dyn Channel>,
    pub wind_moving: Arc<dyn Channel>,
    pub wind_mode: Arc<dyn Channel>,
    pub wind_vel: Arc<dyn Channel>,
    pub wind_accel: Arc<dyn Channel>,

    pub dt_loop: Arc<dyn Channel>,
    pub dm_loop: Arc<dyn Channel>,
    pub gain: Arc<dyn Channel>,
    pub frame_rate: Arc<dyn Channel>,
}

impl RigChannels {
    /// Build the channel set through a transport-specific factory.
    pub fn connect<F>(names: &ChannelNames, mut factory: F) -> Self
    where
        F: FnMut(&str) -> Arc<dyn Channel>,
    {
        Self {
            alt_pos: factory(&names.alt_pos),
            alt_cmd: factory(&names.alt_cmd),
            alt_moving: factory(&names.alt_moving),
            alt_mode: factory(&names.alt_mode),
            wind_pos: factory(&names.wind_pos),
            wind_cmd: factory(&names.wind_cmd),
            wind_moving: factory(&names.wind_moving),
            wind_mode: factory(&names.wind_mode),
            wind_vel: factory(&names.wind_vel),
            wind_accel: factory(&names.wind_accel),
            dt_loop: factory(&names.dt_loop),
            dm_loop: factory(&names.dm_loop),
            gain: factory(&names.gain),
            frame_rate: factory(&names.frame_rate),
        }
    }

    pub fn position(&self, axis: Axis) -> Result<f64, ChannelError> {
        match axis {
            Axis::Altitude => self.alt_pos.read_f64(),
            Axis::Wind => self.wind_pos.read_f64(),
        }
    }

    /// Hardware moving flag; any non-zero value counts as moving.
    pub fn is_moving(&self, axis: Axis) -> Result<bool, ChannelError> {
        let v = match axis {
            Axis::Altitude => self.alt_moving.read_f64()?,
            Axis::Wind => self.wind_moving.read_f64()?,
        };
        Ok(v as i64 != 0)
    }

    pub fn set_mode(&self, axis: Axis, mode: StopMode) -> Result<(), ChannelError> {
        debug!("rig: {} mode -> {:?}", axis, mode);
        let ch = match axis {
            Axis::Altitude => &self.alt_mode,
            Axis::Wind => &self.wind_mode,
        };
        ch.write(mode.into(), true)
    }

    /// Fire-and-forget position command; convergence is polled separately.
    pub fn command_position(&self, axis: Axis, pos: f64) -> Result<(), ChannelError> {
        debug!("rig: {} position -> {:.3}", axis, pos);
        let ch = match axis {
            Axis::Altitude => &self.alt_cmd,
            Axis::Wind => &self.wind_cmd,
        };
        ch.write(ChannelValue::Float(pos), false)
    }

    pub fn write_velocity(&self, v: f64) -> Result<(), ChannelError> {
        debug!("rig: wind velocity -> {:.3}", v);
        self.wind_vel.write(ChannelValue::Float(v), true)
    }

    pub fn write_acceleration(&self, a: f64) -> Result<(), ChannelError> {
        debug!("rig: wind acceleration -> {:.3}", a);
        self.wind_accel.write(ChannelValue::Float(a), true)
    }
}

/// Motor models for the dry-run simulator, one per axis.
pub fn sim_axes(names: &ChannelNames, sim: &SimConfig) -> (AxisModel, AxisModel) {
    let alt = AxisModel {
        rbv: names.alt_pos.clone(),
        val: names.alt_cmd.clone(),
        movn: names.alt_moving.clone(),
        spmg: names.alt_mode.clone(),
        velo: None,
        fixed_speed: sim.alt_speed,
    };
    let wind = AxisModel {
        rbv: names.wind_pos.clone(),
        val: names.wind_cmd.clone(),
        movn: names.wind_moving.clone(),
        spmg: names.wind_mode.clone(),
        velo: Some(names.wind_vel.clone()),
        fixed_speed: 0.0,
    };
    (alt, wind)
}
