//! Operator field limits and the move form.
//!
//! Values are range-checked here, before they can reach the sequencer, so a
//! captured [`MoveRequest`] is always inside the rig's limits.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldLimits {
    pub name: &'static str,
    pub min: f64,
    pub max: f64,
    pub decimals: usize,
}

pub const WIND_POS: FieldLimits = FieldLimits { name: "Position", min: -40.0, max: 40.0, decimals: 2 };
pub const VELOCITY: FieldLimits = FieldLimits { name: "Velocity", min: 2.0, max: 80.0, decimals: 2 };
pub const ACCELERATION: FieldLimits = FieldLimits { name: "Acceleration", min: 0.0, max: 10.0, decimals: 2 };
pub const ALTITUDE: FieldLimits = FieldLimits { name: "Altitude", min: 5.0, max: 12.0, decimals: 1 };
pub const GAIN: FieldLimits = FieldLimits { name: "Gain", min: 0.0, max: 1.0, decimals: 2 };

pub const FRAME_RATE_MIN: u32 = 1;
pub const FRAME_RATE_MAX_UNBINNED: u32 = 2000;
pub const FRAME_RATE_MAX_BINNED: u32 = 3600;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BoundsError {
    #[error("{field}: {text:?} is not a number")]
    NotANumber { field: &'static str, text: String },
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: &'static str, min: String, max: String },
    #[error("{field} allows at most {decimals} decimal places")]
    TooPrecise { field: &'static str, decimals: usize },
}

impl FieldLimits {
    /// Accepts plain decimal notation inside the closed range.
    pub fn validate(&self, text: &str) -> Result<f64, BoundsError> {
        let t = text.trim();
        let digits = t.strip_prefix(|c| c == '-' || c == '+').unwrap_or(t);
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
        let well_formed = !(int_part.is_empty() && frac_part.is_empty())
            && int_part.chars().all(|c| c.is_ascii_digit())
            && frac_part.chars().all(|c| c.is_ascii_digit());
        if !well_formed {
            return Err(BoundsError::NotANumber { field: self.name, text: text.to_string() });
        }
        if frac_part.len() > self.decimals {
            return Err(BoundsError::TooPrecise { field: self.name, decimals: self.decimals });
        }
        let v: f64 = t
            .parse()
            .map_err(|_| BoundsError::NotANumber { field: self.name, text: text.to_string() })?;
        self.check(v)
    }

    pub fn check(&self, v: f64) -> Result<f64, BoundsError> {
        if v.is_finite() && v >= self.min && v <= self.max {
            Ok(v)
        } else {
            Err(BoundsError::OutOfRange {
                field: self.name,
                min: format!("{:.*}", self.decimals, self.min),
                max: format!("{:.*}", self.decimals, self.max),
            })
        }
    }
}

/// Frame-rate limits depend on the detector binning mode.
pub fn frame_rate_limits(binned: bool) -> FieldLimits {
    let max = if binned { FRAME_RATE_MAX_BINNED } else { FRAME_RATE_MAX_UNBINNED };
    FieldLimits { name: "Frame rate", min: FRAME_RATE_MIN as f64, max: max as f64, decimals: 0 }
}

/// An editable numeric field mirrored from a readback channel.
#[derive(Debug, Clone, PartialEq)]
pub struct EditField {
    pub limits: FieldLimits,
    value: f64,
    edited: bool,
}

impl EditField {
    pub fn new(limits: FieldLimits, value: f64) -> Self {
        Self { limits, value, edited: false }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn is_edited(&self) -> bool {
        self.edited
    }

    /// Operator finished editing. On rejection the field reverts to the
    /// hardware-confirmed `fallback`.
    pub fn edit(&mut self, text: &str, fallback: f64) -> Result<f64, BoundsError> {
        match self.limits.validate(text) {
            Ok(v) => {
                self.value = v;
                self.edited = true;
                Ok(v)
            }
            Err(e) => {
                self.value = fallback;
                self.edited = false;
                Err(e)
            }
        }
    }

    /// Subscription refresh; ignored while the operator has an edit pending.
    pub fn refresh(&mut self, readback: f64) {
        if !self.edited {
            self.value = readback;
        }
    }

    pub fn clear_edited(&mut self) {
        self.edited = false;
    }

    pub fn display(&self) -> String {
        format!("{:.*}", self.limits.decimals, self.value)
    }
}

/// Operator-supplied move target, captured when a move begins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveRequest {
    pub wind_pos: f64,
    pub alt_pos: f64,
    pub velocity: f64,
    pub acceleration: f64,
}

impl MoveRequest {
    /// Travel time of the wind stage from `initial_wind_pos`.
    /// `velocity` is bounded below by [`VELOCITY`], so this is finite.
    pub fn seconds_to_move(&self, initial_wind_pos: f64) -> f64 {
        (initial_wind_pos - self.wind_pos).abs() / self.velocity
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoveForm {
    pub wind_pos: EditField,
    pub velocity: EditField,
    pub acceleration: EditField,
    pub altitude: EditField,
}

impl MoveForm {
    pub fn new(wind_pos: f64, velocity: f64, acceleration: f64, altitude: f64) -> Self {
        Self {
            wind_pos: EditField::new(WIND_POS, wind_pos),
            velocity: EditField::new(VELOCITY, velocity),
            acceleration: EditField::new(ACCELERATION, acceleration),
            altitude: EditField::new(ALTITUDE, altitude),
        }
    }

    /// Capture the current values as a move target. Refreshed readbacks are
    /// not validated on arrival, so every field is range-checked here.
    pub fn request(&self) -> Result<MoveRequest, BoundsError> {
        let checked = |f: &EditField| f.limits.check(f.value());
        Ok(MoveRequest {
            wind_pos: checked(&self.wind_pos)?,
            alt_pos: checked(&self.altitude)?,
            velocity: checked(&self.velocity)?,
            acceleration: checked(&self.acceleration)?,
        })
    }
}
