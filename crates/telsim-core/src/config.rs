use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TelsimConfig {
    pub sequencer: SequencerConfig,
    pub home: HomeConfig,
    pub channels: ChannelNames,
    pub sim: SimConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Poll period of the state machine.
    pub poll_ms: u64,
    /// Budget for every hardware-wait state.
    pub timeout_ms: u64,
    /// Fixed pause after the homing writes, before the cleanup deadline.
    pub settle_ms: u64,

    pub alt_tolerance: f64,
    pub wind_tolerance: f64,

    /// Readbacks that mark a completed homing.
    pub cleanup_accel_target: f64,
    pub cleanup_accel_tolerance: f64,
    pub cleanup_vel_target: f64,
    pub cleanup_vel_tolerance: f64,

    /// Drop every pending button press when the rig returns to OFF.
    /// Off by default: a stop pressed while idle stays armed.
    pub clear_latches_on_off: bool,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            poll_ms: 75,
            timeout_ms: 45_000,
            settle_ms: 2_000,
            alt_tolerance: 0.05,
            wind_tolerance: 0.05,
            cleanup_accel_target: 0.2,
            cleanup_accel_tolerance: 0.2,
            cleanup_vel_target: 2.1,
            cleanup_vel_tolerance: 0.2,
            clear_latches_on_off: false,
        }
    }
}

/// Values written by CLEANUP to park the rig.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HomeConfig {
    pub wind_pos: f64,
    pub velocity: f64,
    pub acceleration: f64,
    pub altitude: f64,
}

impl Default for HomeConfig {
    fn default() -> Self {
        Self { wind_pos: 0.0, velocity: 2.0, acceleration: 0.1, altitude: 5.0 }
    }
}

/// Process-variable names of the rig.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelNames {
    pub alt_pos: String,
    pub alt_cmd: String,
    pub alt_moving: String,
    pub alt_mode: String,

    pub wind_pos: String,
    pub wind_cmd: String,
    pub wind_moving: String,
    pub wind_mode: String,
    pub wind_vel: String,
    pub wind_accel: String,

    /// AO loop keywords (string valued, "OPEN" / "CLOSE")
    pub dt_loop: String,
    pub dm_loop: String,
    pub gain: String,
    pub frame_rate: String,
}

impl Default for ChannelNames {
    fn default() -> Self {
        Self {
            alt_pos: "altsim:ln:m1.RBV".into(),
            alt_cmd: "altsim:ln:m1.VAL".into(),
            alt_moving: "altsim:ln:m1.MOVN".into(),
            alt_mode: "altsim:ln:m1.SPMG".into(),
            wind_pos: "wndsim:ln:m1.RBV".into(),
            wind_cmd: "wndsim:ln:m1.VAL".into(),
            wind_moving: "wndsim:ln:m1.MOVN".into(),
            wind_mode: "wndsim:ln:m1.SPMG".into(),
            wind_vel: "wndsim:ln:m1.VELO".into(),
            wind_accel: "wndsim:ln:m1.ACCL".into(),
            dt_loop: "dtlp".into(),
            dm_loop: "dmlp".into(),
            gain: "k1:ao:wc:dt:sv:gain".into(),
            frame_rate: "wsfrrt".into(),
        }
    }
}

impl ChannelNames {
    pub fn all(&self) -> Vec<&str> {
        [
            &self.alt_pos, &self.alt_cmd, &self.alt_moving, &self.alt_mode,
            &self.wind_pos, &self.wind_cmd, &self.wind_moving, &self.wind_mode,
            &self.wind_vel, &self.wind_accel,
            &self.dt_loop, &self.dm_loop, &self.gain, &self.frame_rate,
        ]
        .into_iter()
        .map(String::as_str)
        .collect()
    }
}

/// Dry-run simulator settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Altitude stage speed (units/s); the wind stage follows its VELO field.
    pub alt_speed: f64,
    pub initial_alt: f64,
    pub initial_wind: f64,
    pub initial_gain: f64,
    pub initial_frame_rate: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            alt_speed: 1.0,
            initial_alt: 5.0,
            initial_wind: 0.0,
            initial_gain: 0.3,
            initial_frame_rate: 1000,
        }
    }
}
