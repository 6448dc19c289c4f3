//! Move sequencer for the telescope simulator rig.
//!
//! A polled state machine: each `tick` runs exactly one state handler, which
//! may write to the rig, arm or cancel the deadline, and pick the next state.
//! The altitude stage always completes before the wind stage starts.
//!
//! Control decisions re-read channels inside the tick. Subscriptions only
//! feed the operator form and the display readouts.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use telsim_channel::{is_close, Channel, ChannelError, ChannelValue, StopMode};
use telsim_proto::status::{EventKind, StatusEvent};
use tracing::{error, info, warn};

use crate::clock::{Clock, Countdown, Deadline};
use crate::config::{HomeConfig, SequencerConfig};
use crate::confirm::{Confirm, ConfirmOutcome};
use crate::latch::IntentLatches;
use crate::limits::{MoveForm, MoveRequest};
use crate::panel::{PanelView, Readouts};
use crate::rig::{Axis, RigChannels};
use crate::state::{FaultCause, SequencerState};

pub const START_PROMPT: &str = "Are you sure you want to START?";

/// Outcome of one state handler: stay (`None`) or go to the given state.
/// A channel error faults the sequencer.
type Step = Result<Option<SequencerState>, ChannelError>;

pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct Sequencer {
    cfg: SequencerConfig,
    home: HomeConfig,
    rig: RigChannels,
    form: Arc<Mutex<MoveForm>>,
    readouts: Arc<Mutex<Readouts>>,
    latches: Arc<IntentLatches>,
    clock: Arc<dyn Clock>,
    confirm: Box<dyn Confirm>,

    state: SequencerState,
    request: Option<MoveRequest>,
    seconds_to_move: f64,
    deadline: Deadline,
    countdown: Countdown,
    panel: PanelView,
}

#[derive(Debug, Clone, Serialize)]
pub struct SequencerStatus {
    pub state: &'static str,
    pub fault: Option<String>,
    pub seconds_to_move: f64,
    pub panel: PanelView,
    pub readouts: Readouts,
}

impl SequencerStatus {
    pub fn event(&self, kind: EventKind) -> StatusEvent {
        StatusEvent {
            ts_unix_ms: (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64,
            kind,
            state: self.state.to_string(),
            msg: self.panel.status.clone(),
            countdown: self.panel.countdown.clone(),
            alt_pos: self.readouts.alt_pos,
            wind_pos: self.readouts.wind_pos,
            fault: self.fault.clone(),
        }
    }
}

impl Sequencer {
    pub fn new(
        cfg: SequencerConfig,
        home: HomeConfig,
        rig: RigChannels,
        form: Arc<Mutex<MoveForm>>,
        latches: Arc<IntentLatches>,
        clock: Arc<dyn Clock>,
        confirm: Box<dyn Confirm>,
    ) -> Self {
        Self {
            cfg,
            home,
            rig,
            form,
            readouts: Arc::new(Mutex::new(Readouts::default())),
            latches,
            clock,
            confirm,
            state: SequencerState::Init,
            request: None,
            seconds_to_move: 0.0,
            deadline: Deadline::default(),
            countdown: Countdown::default(),
            panel: PanelView::default(),
        }
    }

    pub fn state(&self) -> &SequencerState {
        &self.state
    }

    pub fn request(&self) -> Option<MoveRequest> {
        self.request
    }

    pub fn seconds_to_move(&self) -> f64 {
        self.seconds_to_move
    }

    pub fn deadline(&self) -> &Deadline {
        &self.deadline
    }

    pub fn panel(&self) -> &PanelView {
        &self.panel
    }

    pub fn readouts(&self) -> Readouts {
        lock(&self.readouts).clone()
    }

    pub fn status(&self) -> SequencerStatus {
        SequencerStatus {
            state: self.state.name(),
            fault: match &self.state {
                SequencerState::Fault(cause) => Some(cause.to_string()),
                _ => None,
            },
            seconds_to_move: self.seconds_to_move,
            panel: self.panel.clone(),
            readouts: self.readouts(),
        }
    }

    /// Run one poll period.
    pub fn tick(&mut self) -> &SequencerState {
        self.panel.status = format!("STATE: {}", self.state.name());
        let phase = self.state.name();

        let step = match self.state.clone() {
            SequencerState::Init => self.on_init(),
            SequencerState::Off => self.on_off(),
            SequencerState::Idle => self.on_idle(),
            SequencerState::MoveAlt => self.on_move_alt(),
            SequencerState::AwaitAlt => self.on_await_alt(),
            SequencerState::MoveWind => self.on_move_wind(),
            SequencerState::AwaitWind => self.on_await_wind(),
            SequencerState::Stopped => self.on_stopped(),
            SequencerState::Cleanup => self.on_cleanup(),
            SequencerState::AwaitCleanup => self.on_await_cleanup(),
            SequencerState::Fault(_) => self.on_fault(),
        };

        match step {
            Ok(Some(next)) => self.enter(next),
            Ok(None) => {}
            Err(error) => self.enter(SequencerState::Fault(FaultCause::Channel { phase, error })),
        }
        &self.state
    }

    fn enter(&mut self, next: SequencerState) {
        match &next {
            SequencerState::Fault(cause) => error!("sequencer: {} -> FAULT: {}", self.state.name(), cause),
            _ => info!("sequencer: {} -> {}", self.state.name(), next.name()),
        }

        match &next {
            SequencerState::Off => {
                self.panel.show_off();
                if self.cfg.clear_latches_on_off {
                    self.latches.clear_all();
                }
            }
            SequencerState::Idle => {
                self.request = None;
                self.countdown.stop();
                self.panel.show_idle();
            }
            SequencerState::Cleanup => self.panel.show_cleanup(),
            SequencerState::Fault(_) => {
                self.deadline.cancel();
                self.countdown.stop();
                // an ack pressed before the fault must not clear it
                self.latches.acknowledge.clear();
                self.panel.show_fault();
            }
            _ => {}
        }

        self.state = next;
        self.panel.status = format!("STATE: {}", self.state.name());
    }

    fn timeout(&self, phase: &'static str) -> SequencerState {
        SequencerState::Fault(FaultCause::Timeout {
            phase,
            after_ms: self.deadline.budget_ms().unwrap_or(self.cfg.timeout_ms),
        })
    }

    fn on_init(&mut self) -> Step {
        self.watch_float(&self.rig.wind_pos, |form, r, v| {
            form.wind_pos.refresh(v);
            r.wind_pos = Some(v);
        })?;
        self.watch_float(&self.rig.wind_vel, |form, r, v| {
            form.velocity.refresh(v);
            r.wind_vel = Some(v);
        })?;
        self.watch_float(&self.rig.wind_accel, |form, r, v| {
            form.acceleration.refresh(v);
            r.wind_accel = Some(v);
        })?;
        self.watch_float(&self.rig.alt_pos, |form, r, v| {
            form.altitude.refresh(v);
            r.alt_pos = Some(v);
        })?;
        self.watch_float(&self.rig.gain, |_, r, v| r.gain = Some(v))?;
        self.watch_text(&self.rig.dt_loop, |r, s| r.dt_loop = Some(s))?;
        self.watch_text(&self.rig.dm_loop, |r, s| r.dm_loop = Some(s))?;
        self.watch_text(&self.rig.frame_rate, |r, s| r.frame_rate = Some(s))?;
        Ok(Some(SequencerState::Off))
    }

    fn on_off(&mut self) -> Step {
        if self.latches.setup.take() {
            return Ok(Some(SequencerState::Idle));
        }
        Ok(None)
    }

    fn on_idle(&mut self) -> Step {
        if self.latches.start.take() {
            return self.begin_move();
        }
        if self.latches.close.take() {
            return Ok(Some(SequencerState::Cleanup));
        }
        Ok(None)
    }

    fn begin_move(&mut self) -> Step {
        let captured = lock(&self.form).request();
        let request = match captured {
            Ok(request) => request,
            Err(e) => {
                warn!("sequencer: start refused: {}", e);
                self.panel.countdown = format!("{:.2}", 0.0);
                return Ok(None);
            }
        };
        let initial_wind = self.rig.position(Axis::Wind)?;
        let initial_alt = self.rig.position(Axis::Altitude)?;

        self.seconds_to_move = request.seconds_to_move(initial_wind);
        self.panel.countdown = format!("{:.2}", self.seconds_to_move);
        info!(
            "sequencer: move requested alt {:.1} -> {:.1}, wind {:.2} -> {:.2} at {:.2} (~{:.2}s)",
            initial_alt, request.alt_pos, initial_wind, request.wind_pos, request.velocity, self.seconds_to_move
        );

        let prompt = format!("{} Wind move takes {:.2} s.", START_PROMPT, self.seconds_to_move);
        match self.confirm.confirm(&prompt) {
            ConfirmOutcome::Proceed => {
                self.request = Some(request);
                Ok(Some(SequencerState::MoveAlt))
            }
            outcome => {
                info!("sequencer: move not confirmed ({:?})", outcome);
                Ok(Some(SequencerState::Idle))
            }
        }
    }

    fn on_move_alt(&mut self) -> Step {
        let Some(req) = self.request else {
            warn!("sequencer: MOVE_ALT without a captured request");
            return Ok(Some(SequencerState::Idle));
        };

        self.panel.show_moving();
        self.rig.set_mode(Axis::Altitude, StopMode::Move)?;
        self.rig.command_position(Axis::Altitude, req.alt_pos)?;
        lock(&self.form).altitude.clear_edited();
        self.deadline.arm(self.clock.now_ms(), self.cfg.timeout_ms);
        Ok(Some(SequencerState::AwaitAlt))
    }

    fn on_await_alt(&mut self) -> Step {
        let Some(req) = self.request else {
            warn!("sequencer: AWAIT_ALT without a captured request");
            return Ok(Some(SequencerState::Stopped));
        };
        let now = self.clock.now_ms();

        // convergence wins over a stop pressed in the same tick
        let alt = self.rig.position(Axis::Altitude)?;
        if is_close(alt, req.alt_pos, self.cfg.alt_tolerance) {
            self.deadline.cancel();
            self.deadline.arm(now, self.cfg.timeout_ms);
            return Ok(Some(SequencerState::MoveWind));
        }
        if self.latches.stop.take() {
            self.deadline.cancel();
            return Ok(Some(SequencerState::Stopped));
        }
        if self.deadline.expired(now) {
            return Ok(Some(self.timeout("AWAIT_ALT")));
        }
        Ok(None)
    }

    fn on_move_wind(&mut self) -> Step {
        let Some(req) = self.request else {
            warn!("sequencer: MOVE_WIND without a captured request");
            return Ok(Some(SequencerState::Stopped));
        };

        {
            let mut form = lock(&self.form);
            form.wind_pos.clear_edited();
            form.velocity.clear_edited();
            form.acceleration.clear_edited();
        }
        self.rig.set_mode(Axis::Wind, StopMode::Move)?;
        // acceleration and velocity must be in effect before the position write
        self.rig.write_acceleration(req.acceleration)?;
        self.rig.write_velocity(req.velocity)?;
        self.rig.command_position(Axis::Wind, req.wind_pos)?;

        let now = self.clock.now_ms();
        self.countdown.start(now, self.seconds_to_move);
        self.deadline.arm(now, self.cfg.timeout_ms);
        Ok(Some(SequencerState::AwaitWind))
    }

    fn on_await_wind(&mut self) -> Step {
        let Some(req) = self.request else {
            warn!("sequencer: AWAIT_WIND without a captured request");
            return Ok(Some(SequencerState::Stopped));
        };
        let now = self.clock.now_ms();
        self.panel.countdown = format!("{:.2}", self.countdown.remaining_s(now));

        let wind = self.rig.position(Axis::Wind)?;
        if is_close(wind, req.wind_pos, self.cfg.wind_tolerance) {
            self.deadline.cancel();
            return Ok(Some(SequencerState::Idle));
        }
        if self.latches.stop.take() {
            self.deadline.cancel();
            return Ok(Some(SequencerState::Stopped));
        }
        if self.deadline.expired(now) {
            return Ok(Some(self.timeout("AWAIT_WIND")));
        }
        Ok(None)
    }

    fn on_stopped(&mut self) -> Step {
        self.rig.set_mode(Axis::Wind, StopMode::Stop)?;
        self.rig.set_mode(Axis::Altitude, StopMode::Stop)?;
        self.countdown.stop();
        Ok(Some(SequencerState::Idle))
    }

    fn on_cleanup(&mut self) -> Step {
        self.rig.set_mode(Axis::Wind, StopMode::Move)?;
        self.rig.set_mode(Axis::Altitude, StopMode::Move)?;
        self.rig.command_position(Axis::Wind, self.home.wind_pos)?;
        self.rig.write_velocity(self.home.velocity)?;
        self.rig.write_acceleration(self.home.acceleration)?;
        self.rig.command_position(Axis::Altitude, self.home.altitude)?;

        // Blocks the whole controller; homing is not a motion the operator can stop.
        self.clock.sleep(Duration::from_millis(self.cfg.settle_ms));
        self.deadline.arm(self.clock.now_ms(), self.cfg.timeout_ms);
        Ok(Some(SequencerState::AwaitCleanup))
    }

    fn on_await_cleanup(&mut self) -> Step {
        let now = self.clock.now_ms();
        if self.cleanup_settled()? {
            self.deadline.cancel();
            return Ok(Some(SequencerState::Off));
        }
        if self.deadline.expired(now) {
            return Ok(Some(self.timeout("AWAIT_CLEANUP")));
        }
        Ok(None)
    }

    /// All four homing readbacks must hold in the same tick.
    fn cleanup_settled(&self) -> Result<bool, ChannelError> {
        let c = &self.cfg;
        Ok(!self.rig.is_moving(Axis::Altitude)?
            && !self.rig.is_moving(Axis::Wind)?
            && is_close(self.rig.wind_accel.read_f64()?, c.cleanup_accel_target, c.cleanup_accel_tolerance)
            && is_close(self.rig.wind_vel.read_f64()?, c.cleanup_vel_target, c.cleanup_vel_tolerance))
    }

    fn on_fault(&mut self) -> Step {
        if self.latches.acknowledge.take() {
            info!("sequencer: fault acknowledged");
            self.latches.clear_all();
            return Ok(Some(SequencerState::Off));
        }
        Ok(None)
    }

    /// Route a numeric channel to the form and readouts, primed with its
    /// current value.
    fn watch_float<F>(&self, ch: &Arc<dyn Channel>, apply: F) -> Result<(), ChannelError>
    where
        F: Fn(&mut MoveForm, &mut Readouts, f64) + Send + Sync + 'static,
    {
        let form = self.form.clone();
        let readouts = self.readouts.clone();
        let apply = Arc::new(apply);
        let deliver = move |v: &ChannelValue| {
            if let Some(x) = v.as_f64() {
                apply(&mut lock(&form), &mut lock(&readouts), x);
            }
        };
        let current = ch.read()?;
        ch.subscribe(Box::new(deliver.clone()))?;
        deliver(&current);
        Ok(())
    }

    fn watch_text<F>(&self, ch: &Arc<dyn Channel>, apply: F) -> Result<(), ChannelError>
    where
        F: Fn(&mut Readouts, String) + Send + Sync + 'static,
    {
        let readouts = self.readouts.clone();
        let apply = Arc::new(apply);
        let deliver = move |v: &ChannelValue| apply(&mut lock(&readouts), v.as_text());
        let current = ch.read()?;
        ch.subscribe(Box::new(deliver.clone()))?;
        deliver(&current);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::ChannelNames;
    use crate::confirm::FixedConfirm;
    use crate::latch::Intent;
    use telsim_channel::MemoryBus;

    const ALT_RBV: &str = "altsim:ln:m1.RBV";
    const ALT_MOVN: &str = "altsim:ln:m1.MOVN";
    const WIND_RBV: &str = "wndsim:ln:m1.RBV";
    const WIND_MOVN: &str = "wndsim:ln:m1.MOVN";
    const WIND_VELO: &str = "wndsim:ln:m1.VELO";
    const WIND_ACCL: &str = "wndsim:ln:m1.ACCL";

    struct Bench {
        bus: MemoryBus,
        clock: ManualClock,
        latches: Arc<IntentLatches>,
        form: Arc<Mutex<MoveForm>>,
        seq: Sequencer,
    }

    fn bench_with(cfg: SequencerConfig, answer: ConfirmOutcome) -> Bench {
        bench_confirm(cfg, Box::new(FixedConfirm(answer)))
    }

    fn bench_confirm(cfg: SequencerConfig, confirm: Box<dyn Confirm>) -> Bench {
        let bus = MemoryBus::new();
        let names = ChannelNames::default();
        bus.post(&names.alt_pos, 5.0);
        bus.post(&names.alt_cmd, 5.0);
        bus.post(&names.alt_moving, 0.0);
        bus.post(&names.alt_mode, "3");
        bus.post(&names.wind_pos, 0.0);
        bus.post(&names.wind_cmd, 0.0);
        bus.post(&names.wind_moving, 0.0);
        bus.post(&names.wind_mode, "3");
        bus.post(&names.wind_vel, 2.0);
        bus.post(&names.wind_accel, 0.1);
        bus.post(&names.dt_loop, "OPEN");
        bus.post(&names.dm_loop, "OPEN");
        bus.post(&names.gain, 0.3);
        bus.post(&names.frame_rate, "1000");

        let rig = RigChannels::connect(&names, |n| Arc::new(bus.channel(n)) as Arc<dyn Channel>);
        let clock = ManualClock::new();
        let latches = Arc::new(IntentLatches::new());
        let form = Arc::new(Mutex::new(MoveForm::new(0.0, 2.0, 0.1, 5.0)));
        let seq = Sequencer::new(
            cfg,
            HomeConfig::default(),
            rig,
            form.clone(),
            latches.clone(),
            Arc::new(clock.clone()),
            confirm,
        );
        Bench { bus, clock, latches, form, seq }
    }

    /// Proceeds, keeping every prompt it was shown.
    #[derive(Clone, Default)]
    struct Prompts(Arc<Mutex<Vec<String>>>);

    impl Confirm for Prompts {
        fn confirm(&mut self, prompt: &str) -> ConfirmOutcome {
            lock(&self.0).push(prompt.to_string());
            ConfirmOutcome::Proceed
        }
    }

    fn bench() -> Bench {
        bench_with(SequencerConfig::default(), ConfirmOutcome::Proceed)
    }

    impl Bench {
        fn press(&self, intent: Intent) {
            self.latches.press(intent);
        }

        fn tick(&mut self) -> &'static str {
            self.seq.tick().name()
        }

        fn to_idle(&mut self) {
            assert_eq!(self.tick(), "OFF");
            self.press(Intent::Setup);
            assert_eq!(self.tick(), "IDLE");
        }

        fn set_target(&self, wind: &str, alt: &str, vel: &str, accel: &str) {
            let mut f = lock(&self.form);
            f.wind_pos.edit(wind, 0.0).unwrap();
            f.altitude.edit(alt, 5.0).unwrap();
            f.velocity.edit(vel, 2.0).unwrap();
            f.acceleration.edit(accel, 0.1).unwrap();
        }

        fn to_await_alt(&mut self) {
            self.to_idle();
            self.set_target("10.0", "8.0", "5.0", "1.0");
            self.press(Intent::Start);
            assert_eq!(self.tick(), "MOVE_ALT");
            assert_eq!(self.tick(), "AWAIT_ALT");
        }

        fn to_await_wind(&mut self) {
            self.to_await_alt();
            self.bus.post(ALT_RBV, 8.0);
            assert_eq!(self.tick(), "MOVE_WIND");
            assert_eq!(self.tick(), "AWAIT_WIND");
        }
    }

    #[test]
    fn init_subscribes_and_primes_displays() {
        let mut b = bench();
        assert_eq!(b.tick(), "OFF");
        let r = b.seq.readouts();
        assert_eq!(r.alt_pos, Some(5.0));
        assert_eq!(r.dt_loop.as_deref(), Some("OPEN"));
        assert_eq!(r.frame_rate.as_deref(), Some("1000"));

        b.bus.post(WIND_RBV, 1.5);
        assert_eq!(b.seq.readouts().wind_pos, Some(1.5));
        assert_eq!(lock(&b.form).wind_pos.value(), 1.5);
        assert!(b.bus.journal().is_empty());
    }

    #[test]
    fn off_waits_for_setup() {
        let mut b = bench();
        b.tick();
        for _ in 0..5 {
            assert_eq!(b.tick(), "OFF");
        }
        assert!(!b.seq.panel().controls_enabled);
        assert!(b.seq.panel().setup.enabled);
        b.press(Intent::Setup);
        b.press(Intent::Setup);
        assert_eq!(b.tick(), "IDLE");
        assert!(!b.latches.setup.is_set());
    }

    #[test]
    fn start_computes_seconds_to_move() {
        let mut b = bench();
        b.to_await_alt();
        assert_eq!(b.seq.seconds_to_move(), 2.0);
        let req = b.seq.request().unwrap();
        assert_eq!(req.wind_pos, 10.0);
        assert_eq!(req.alt_pos, 8.0);
        assert!(b.seq.panel().stop.enabled);
        assert!(!b.seq.panel().controls_enabled);
    }

    #[test]
    fn start_prompt_shows_seconds_to_move() {
        let prompts = Prompts::default();
        let mut b = bench_confirm(SequencerConfig::default(), Box::new(prompts.clone()));
        b.to_idle();
        b.set_target("10.0", "8.0", "5.0", "1.0");
        b.press(Intent::Start);
        assert_eq!(b.tick(), "MOVE_ALT");
        let shown = lock(&prompts.0).clone();
        assert_eq!(shown.len(), 1);
        assert!(shown[0].starts_with(START_PROMPT));
        assert!(shown[0].contains("2.00 s"), "{}", shown[0]);
    }

    #[test]
    fn out_of_range_readback_refuses_start() {
        let prompts = Prompts::default();
        let mut b = bench_confirm(SequencerConfig::default(), Box::new(prompts.clone()));
        b.to_idle();
        lock(&b.form).wind_pos.edit("10.0", 0.0).unwrap();
        // unedited velocity follows the readback below its limit
        b.bus.post(WIND_VELO, 0.0);
        assert_eq!(lock(&b.form).velocity.value(), 0.0);

        b.press(Intent::Start);
        assert_eq!(b.tick(), "IDLE");
        assert!(lock(&prompts.0).is_empty());
        assert!(b.seq.request().is_none());
        assert!(b.bus.journal().is_empty());
        assert_eq!(b.seq.panel().countdown, "0.00");
        assert!(!b.latches.start.is_set());

        // an in-range edit lets the next press through
        lock(&b.form).velocity.edit("5.00", 0.0).unwrap();
        b.press(Intent::Start);
        assert_eq!(b.tick(), "MOVE_ALT");
        assert_eq!(b.seq.request().unwrap().velocity, 5.0);
    }

    #[test]
    fn declined_start_returns_to_idle_without_writes() {
        for answer in [ConfirmOutcome::Decline, ConfirmOutcome::Cancel] {
            let mut b = bench_with(SequencerConfig::default(), answer);
            b.to_idle();
            b.set_target("10.0", "8.0", "5.0", "1.0");
            b.press(Intent::Start);
            assert_eq!(b.tick(), "IDLE");
            assert!(b.bus.journal().is_empty());
            assert_eq!(b.seq.panel().countdown, "0.00");
        }
    }

    #[test]
    fn close_from_idle_starts_cleanup() {
        let mut b = bench();
        b.to_idle();
        b.press(Intent::Close);
        assert_eq!(b.tick(), "CLEANUP");
        assert!(!b.seq.panel().close.visible);
        assert!(b.seq.panel().setup.visible && !b.seq.panel().setup.enabled);
    }

    #[test]
    fn convergence_beats_stop_in_same_tick() {
        let mut b = bench();
        b.to_await_alt();
        b.bus.post(ALT_RBV, 7.96);
        b.press(Intent::Stop);
        assert_eq!(b.tick(), "MOVE_WIND");
        // the press was not consumed and is still armed
        assert!(b.latches.stop.is_set());
        assert_eq!(b.tick(), "AWAIT_WIND");
        assert_eq!(b.tick(), "STOPPED");
    }

    #[test]
    fn alt_just_outside_tolerance_keeps_waiting() {
        let mut b = bench();
        b.to_await_alt();
        b.bus.post(ALT_RBV, 7.94);
        assert_eq!(b.tick(), "AWAIT_ALT");
        b.bus.post(ALT_RBV, 8.06);
        assert_eq!(b.tick(), "AWAIT_ALT");
        assert!(b.seq.deadline().is_armed());
    }

    #[test]
    fn wind_just_outside_tolerance_keeps_waiting() {
        let mut b = bench();
        b.to_await_wind();
        b.bus.post(WIND_RBV, 9.94);
        assert_eq!(b.tick(), "AWAIT_WIND");
        b.bus.post(WIND_RBV, 10.06);
        assert_eq!(b.tick(), "AWAIT_WIND");
        assert!(b.seq.deadline().is_armed());
    }

    #[test]
    fn stop_during_alt_move() {
        let mut b = bench();
        b.to_await_alt();
        b.bus.post(ALT_RBV, 6.0);
        b.press(Intent::Stop);
        assert_eq!(b.tick(), "STOPPED");
        assert!(!b.seq.deadline().is_armed());
        b.bus.clear_journal();
        assert_eq!(b.tick(), "IDLE");
        let j = b.bus.journal();
        assert_eq!(j.len(), 2);
        assert_eq!(j[0].name, "wndsim:ln:m1.SPMG");
        assert_eq!(j[0].value, ChannelValue::Text("0".into()));
        assert_eq!(j[1].name, "altsim:ln:m1.SPMG");
        assert_eq!(j[1].value, ChannelValue::Text("0".into()));
    }

    #[test]
    fn stale_stop_from_idle_fires_on_next_move() {
        let mut b = bench();
        b.to_idle();
        b.press(Intent::Stop);
        for _ in 0..3 {
            assert_eq!(b.tick(), "IDLE");
        }
        b.set_target("10.0", "8.0", "5.0", "1.0");
        b.press(Intent::Start);
        assert_eq!(b.tick(), "MOVE_ALT");
        assert_eq!(b.tick(), "AWAIT_ALT");
        assert_eq!(b.tick(), "STOPPED");
    }

    #[test]
    fn clear_latches_on_off_drops_stale_presses() {
        let cfg = SequencerConfig { clear_latches_on_off: true, ..SequencerConfig::default() };
        let mut b = bench_with(cfg, ConfirmOutcome::Proceed);
        b.press(Intent::Stop);
        b.press(Intent::Start);
        assert_eq!(b.tick(), "OFF");
        assert!(!b.latches.stop.is_set());
        assert!(!b.latches.start.is_set());
    }

    #[test]
    fn alt_rearms_deadline_for_wind() {
        let mut b = bench();
        b.to_await_alt();
        b.clock.advance(Duration::from_millis(40_000));
        b.bus.post(ALT_RBV, 8.0);
        assert_eq!(b.tick(), "MOVE_WIND");
        assert_eq!(b.tick(), "AWAIT_WIND");
        b.clock.advance(Duration::from_millis(40_000));
        assert_eq!(b.tick(), "AWAIT_WIND");
    }

    #[test]
    fn wind_writes_accel_then_velocity_then_position() {
        let mut b = bench();
        b.to_await_alt();
        b.bus.post(ALT_RBV, 8.0);
        b.tick();
        b.bus.clear_journal();
        assert_eq!(b.tick(), "AWAIT_WIND");
        let names: Vec<String> = b.bus.journal().into_iter().map(|e| e.name).collect();
        assert_eq!(
            names,
            ["wndsim:ln:m1.SPMG", "wndsim:ln:m1.ACCL", "wndsim:ln:m1.VELO", "wndsim:ln:m1.VAL"]
        );
        let form = lock(&b.form);
        assert!(!form.wind_pos.is_edited() && !form.velocity.is_edited() && !form.acceleration.is_edited());
    }

    #[test]
    fn await_wind_shows_countdown() {
        let mut b = bench();
        b.to_await_wind();
        b.clock.advance(Duration::from_millis(500));
        b.tick();
        assert_eq!(b.seq.panel().countdown, "1.50");
        b.bus.post(WIND_RBV, 10.04);
        assert_eq!(b.tick(), "IDLE");
        assert_eq!(b.seq.panel().countdown, "0.00");
        assert!(!b.seq.deadline().is_armed());
    }

    #[test]
    fn wind_timeout_faults() {
        let mut b = bench();
        b.to_await_wind();
        b.clock.advance(Duration::from_millis(44_999));
        assert_eq!(b.tick(), "AWAIT_WIND");
        b.clock.advance(Duration::from_millis(1));
        assert_eq!(b.tick(), "FAULT");
        assert_eq!(
            b.seq.state(),
            &SequencerState::Fault(FaultCause::Timeout { phase: "AWAIT_WIND", after_ms: 45_000 })
        );
    }

    #[test]
    fn channel_failure_faults_instead_of_panicking() {
        let mut b = bench();
        b.to_await_alt();
        b.bus.set_failed(ALT_RBV, true);
        assert_eq!(b.tick(), "FAULT");
        match b.seq.state() {
            SequencerState::Fault(FaultCause::Channel { phase, error }) => {
                assert_eq!(*phase, "AWAIT_ALT");
                assert!(matches!(error, ChannelError::Disconnected { .. }));
            }
            other => panic!("unexpected state {other}"),
        }
        assert!(b.seq.panel().faulted);
        assert!(b.seq.status().fault.unwrap().contains("AWAIT_ALT"));
    }

    #[test]
    fn fault_needs_fresh_ack() {
        let mut b = bench();
        b.to_await_alt();
        b.press(Intent::Acknowledge);
        b.clock.advance(Duration::from_millis(45_000));
        assert_eq!(b.tick(), "FAULT");
        // the earlier ack was dropped on entry
        assert_eq!(b.tick(), "FAULT");
        b.press(Intent::Acknowledge);
        assert_eq!(b.tick(), "OFF");
        assert!(!b.seq.panel().faulted);
    }

    #[test]
    fn cleanup_writes_home_then_settles() {
        let mut b = bench();
        b.to_idle();
        b.press(Intent::Close);
        b.tick();
        let before = b.clock.now_ms();
        assert_eq!(b.tick(), "AWAIT_CLEANUP");
        assert_eq!(b.clock.now_ms() - before, 2_000);

        let j = b.bus.journal();
        let names: Vec<&str> = j.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "wndsim:ln:m1.SPMG",
                "altsim:ln:m1.SPMG",
                "wndsim:ln:m1.VAL",
                "wndsim:ln:m1.VELO",
                "wndsim:ln:m1.ACCL",
                "altsim:ln:m1.VAL",
            ]
        );
        assert_eq!(j[3].value, ChannelValue::Float(2.0));
        assert_eq!(j[4].value, ChannelValue::Float(0.1));
        assert_eq!(j[5].value, ChannelValue::Float(5.0));
        assert!(b.seq.deadline().is_active(b.clock.now_ms()));
    }

    #[test]
    fn cleanup_needs_every_condition() {
        let mut b = bench();
        b.to_idle();
        b.press(Intent::Close);
        b.tick();
        b.tick();

        let fixtures: [(&str, f64); 4] = [(ALT_MOVN, 1.0), (WIND_MOVN, 1.0), (WIND_ACCL, 0.5), (WIND_VELO, 2.4)];
        for (name, bad) in fixtures {
            let good = b.bus.peek(name).unwrap();
            b.bus.post(name, bad);
            assert_eq!(b.tick(), "AWAIT_CLEANUP", "{name} alone should hold cleanup");
            b.bus.post(name, good);
        }
        assert_eq!(b.tick(), "OFF");
    }

    #[test]
    fn cleanup_timeout_faults() {
        let mut b = bench();
        b.to_idle();
        b.press(Intent::Close);
        b.tick();
        b.tick();
        b.bus.post(WIND_MOVN, 1.0);
        b.clock.advance(Duration::from_millis(45_000));
        assert_eq!(b.tick(), "FAULT");
    }
}
