//! What the operator panel should show. The sequencer updates this on state
//! entry; the presentation side only renders it.

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ButtonView {
    pub visible: bool,
    pub enabled: bool,
}

impl ButtonView {
    fn shown(enabled: bool) -> Self {
        Self { visible: true, enabled }
    }

    fn hidden() -> Self {
        Self { visible: false, enabled: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PanelView {
    /// Move fields, loop controls, gain and frame rate.
    pub controls_enabled: bool,
    pub start: ButtonView,
    pub stop: ButtonView,
    pub setup: ButtonView,
    pub close: ButtonView,
    pub acknowledge: ButtonView,
    pub countdown: String,
    pub status: String,
    pub faulted: bool,
}

impl Default for PanelView {
    fn default() -> Self {
        Self {
            controls_enabled: false,
            start: ButtonView::hidden(),
            stop: ButtonView::hidden(),
            setup: ButtonView::hidden(),
            close: ButtonView::hidden(),
            acknowledge: ButtonView::hidden(),
            countdown: "0.00".into(),
            status: String::new(),
            faulted: false,
        }
    }
}

impl PanelView {
    pub fn show_off(&mut self) {
        self.controls_enabled = false;
        self.start = ButtonView::shown(false);
        self.stop = ButtonView::hidden();
        self.setup = ButtonView::shown(true);
        self.close = ButtonView::hidden();
        self.acknowledge = ButtonView::hidden();
        self.faulted = false;
    }

    pub fn show_idle(&mut self) {
        self.controls_enabled = true;
        self.start = ButtonView::shown(true);
        self.stop = ButtonView::hidden();
        self.setup = ButtonView::hidden();
        self.close = ButtonView::shown(true);
        self.countdown = "0.00".into();
    }

    pub fn show_moving(&mut self) {
        self.controls_enabled = false;
        self.start = ButtonView::hidden();
        self.stop = ButtonView::shown(true);
    }

    pub fn show_cleanup(&mut self) {
        self.controls_enabled = false;
        self.start = ButtonView::shown(false);
        self.stop = ButtonView::hidden();
        self.close = ButtonView::hidden();
        self.setup = ButtonView::shown(false);
    }

    pub fn show_fault(&mut self) {
        self.controls_enabled = false;
        self.start = ButtonView::shown(false);
        self.stop = ButtonView::hidden();
        self.setup = ButtonView::shown(false);
        self.close = ButtonView::hidden();
        self.acknowledge = ButtonView::shown(true);
        self.countdown = "0.00".into();
        self.faulted = true;
    }
}

/// Latest subscription-delivered values, for display only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Readouts {
    pub alt_pos: Option<f64>,
    pub wind_pos: Option<f64>,
    pub wind_vel: Option<f64>,
    pub wind_accel: Option<f64>,
    pub dt_loop: Option<String>,
    pub dm_loop: Option<String>,
    pub gain: Option<f64>,
    pub frame_rate: Option<String>,
}

impl Readouts {
    /// The loop shows closed only when both halves report CLOSE.
    pub fn loop_closed(&self) -> bool {
        self.dt_loop.as_deref() == Some("CLOSE") && self.dm_loop.as_deref() == Some("CLOSE")
    }
}
