//! Minimal motor-record simulator on top of a [`MemoryBus`].
//!
//! Each axis follows its commanded position at a constant speed while its
//! stop/move field is `Move`, and raises its moving flag while travelling.

use tracing::debug;

use crate::{ChannelValue, MemoryBus, StopMode};

const AT_TARGET_EPS: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct AxisModel {
    /// Readback position (`.RBV`).
    pub rbv: String,
    /// Commanded position (`.VAL`).
    pub val: String,
    /// Moving flag (`.MOVN`).
    pub movn: String,
    /// Stop/move mode (`.SPMG`).
    pub spmg: String,
    /// Velocity field (`.VELO`); when absent the axis uses `fixed_speed`.
    pub velo: Option<String>,
    pub fixed_speed: f64,
}

pub struct SimRig {
    bus: MemoryBus,
    axes: Vec<AxisModel>,
}

impl SimRig {
    pub fn new(bus: MemoryBus, axes: Vec<AxisModel>) -> Self {
        Self { bus, axes }
    }

    /// Seed an axis at rest at `position`, in `Move` mode.
    pub fn park(&self, axis: &AxisModel, position: f64) {
        self.bus.post(&axis.rbv, position);
        self.bus.post(&axis.val, position);
        self.bus.post(&axis.movn, 0.0);
        self.bus.post(&axis.spmg, ChannelValue::from(StopMode::Move));
    }

    /// Advance every axis by `dt_s` seconds.
    pub fn step(&self, dt_s: f64) {
        for axis in &self.axes {
            self.step_axis(axis, dt_s);
        }
    }

    fn step_axis(&self, axis: &AxisModel, dt_s: f64) {
        let Some(rbv) = self.bus.peek_f64(&axis.rbv) else { return; };
        let target = self.bus.peek_f64(&axis.val).unwrap_or(rbv);
        let mode = self
            .bus
            .peek(&axis.spmg)
            .and_then(|v| StopMode::from_value(&v))
            .unwrap_or(StopMode::Stop);

        let remaining = target - rbv;
        if mode == StopMode::Stop || remaining.abs() <= AT_TARGET_EPS {
            self.bus.post(&axis.movn, 0.0);
            return;
        }

        let speed = axis
            .velo
            .as_ref()
            .and_then(|v| self.bus.peek_f64(v))
            .unwrap_or(axis.fixed_speed)
            .abs();
        let travel = (speed * dt_s).min(remaining.abs());
        let next = rbv + travel.copysign(remaining);
        debug!("sim {} {:.3} -> {:.3} (target {:.3})", axis.rbv, rbv, next, target);

        self.bus.post(&axis.rbv, next);
        let arrived = (target - next).abs() <= AT_TARGET_EPS;
        self.bus.post(&axis.movn, if arrived { 0.0 } else { 1.0 });
    }
}
