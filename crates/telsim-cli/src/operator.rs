//! Console operator: parses typed commands and applies the ones that are not
//! plain button presses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use tokio::sync::mpsc;
use tracing::warn;

use telsim_channel::Channel;
use telsim_core::aoloop::{AoError, FRAME_RATE_RESET};
use telsim_core::limits::{EditField, MoveForm};
use telsim_core::{Confirm, ConfirmOutcome, Intent, LoopControl, LoopState, RigChannels, Sequencer};
use telsim_proto::status::EventKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    WindPos,
    Velocity,
    Acceleration,
    Altitude,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCmd {
    Press(Intent),
    Edit { field: FormField, text: String },
    Gain(String),
    FrameRate(String),
    Binning(bool),
    Loop(LoopState),
    Status,
    Answer(ConfirmOutcome),
    Quit,
}

pub const HELP: &str = "commands: setup start stop close ack | pos|vel|accel|alt <v> | gain <v> | framerate <n> | bin unbin | loop open|close | status | yes no cancel | quit";

/// `Ok(None)` for a blank line.
pub fn parse_line(line: &str) -> Result<Option<OperatorCmd>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else { return Ok(None) };
    let arg = words.next();
    if words.next().is_some() {
        bail!("too many arguments; {}", HELP);
    }

    let needs_arg = |what: &str| -> Result<String> {
        match arg {
            Some(a) => Ok(a.to_string()),
            None => bail!("{} needs a value", what),
        }
    };

    let cmd = match verb.to_ascii_lowercase().as_str() {
        "setup" => OperatorCmd::Press(Intent::Setup),
        "start" => OperatorCmd::Press(Intent::Start),
        "stop" => OperatorCmd::Press(Intent::Stop),
        "close" => OperatorCmd::Press(Intent::Close),
        "ack" => OperatorCmd::Press(Intent::Acknowledge),
        "pos" => OperatorCmd::Edit { field: FormField::WindPos, text: needs_arg("pos")? },
        "vel" => OperatorCmd::Edit { field: FormField::Velocity, text: needs_arg("vel")? },
        "accel" => OperatorCmd::Edit { field: FormField::Acceleration, text: needs_arg("accel")? },
        "alt" => OperatorCmd::Edit { field: FormField::Altitude, text: needs_arg("alt")? },
        "gain" => OperatorCmd::Gain(needs_arg("gain")?),
        "framerate" => OperatorCmd::FrameRate(needs_arg("framerate")?),
        "bin" => OperatorCmd::Binning(true),
        "unbin" => OperatorCmd::Binning(false),
        "loop" => match arg {
            Some("open") => OperatorCmd::Loop(LoopState::Open),
            Some("close") => OperatorCmd::Loop(LoopState::Closed),
            _ => bail!("loop needs open or close"),
        },
        "status" => OperatorCmd::Status,
        "yes" | "y" => OperatorCmd::Answer(ConfirmOutcome::Proceed),
        "no" | "n" => OperatorCmd::Answer(ConfirmOutcome::Decline),
        "cancel" => OperatorCmd::Answer(ConfirmOutcome::Cancel),
        "quit" | "exit" => OperatorCmd::Quit,
        "help" => bail!("{}", HELP),
        other => bail!("unknown command {:?}; {}", other, HELP),
    };
    Ok(Some(cmd))
}

/// Confirmation answered from the console. Answers typed before the prompt
/// appeared are discarded.
pub struct ConsoleConfirm {
    pub answers: mpsc::UnboundedReceiver<ConfirmOutcome>,
    pub shutdown: Arc<AtomicBool>,
}

impl Confirm for ConsoleConfirm {
    fn confirm(&mut self, prompt: &str) -> ConfirmOutcome {
        while self.answers.try_recv().is_ok() {}
        // checked after the drain: an interrupt's Cancel may have been dropped
        if self.shutdown.load(Ordering::SeqCst) {
            return ConfirmOutcome::Cancel;
        }
        println!("{} [yes/no/cancel]", prompt);
        // console gone: treat as a dismissed dialog
        self.answers.blocking_recv().unwrap_or(ConfirmOutcome::Cancel)
    }
}

/// Ctrl-C: request shutdown and dismiss any pending confirmation. The sender
/// is weak so a closed console still ends the answer channel.
pub fn interrupt(shutdown: &AtomicBool, answers: &mpsc::WeakUnboundedSender<ConfirmOutcome>) {
    shutdown.store(true, Ordering::SeqCst);
    if let Some(tx) = answers.upgrade() {
        let _ = tx.send(ConfirmOutcome::Cancel);
    }
}

/// Applies form edits and AO commands on the control thread.
pub struct Console {
    rig: RigChannels,
    form: Arc<Mutex<MoveForm>>,
    ao: LoopControl,
    frame_rate_shown: String,
}

impl Console {
    pub fn new(rig: RigChannels, form: Arc<Mutex<MoveForm>>, ao: LoopControl, frame_rate: u32) -> Self {
        Self { rig, form, ao, frame_rate_shown: frame_rate.to_string() }
    }

    pub fn apply(&mut self, cmd: OperatorCmd, seq: &Sequencer) -> Result<()> {
        let status = seq.status();
        let needs_controls = matches!(
            cmd,
            OperatorCmd::Edit { .. } | OperatorCmd::Gain(_) | OperatorCmd::FrameRate(_) | OperatorCmd::Binning(_) | OperatorCmd::Loop(_)
        );
        if needs_controls && !status.panel.controls_enabled {
            println!("controls are disabled in {}", status.state);
            return Ok(());
        }

        match cmd {
            OperatorCmd::Edit { field, text } => self.edit(field, &text),
            OperatorCmd::Gain(text) => match self.ao.set_gain(&text) {
                Ok(v) => println!("gain {:.2}", v),
                Err(AoError::Bounds(e)) => {
                    let shown = self.ao.gain().map(|g| format!("{:.2}", g)).unwrap_or_default();
                    println!("{}; gain {}", e, shown);
                }
                Err(e) => warn!("gain write failed: {}", e),
            },
            OperatorCmd::FrameRate(text) => {
                let result = self.ao.set_frame_rate(&text);
                self.frame_rate_result(&text, result);
            }
            OperatorCmd::Binning(binned) => {
                let shown = self.frame_rate_shown.clone();
                let result = self.ao.set_binned(binned, &shown);
                println!("{}", if binned { "binned" } else { "unbinned" });
                self.frame_rate_result(&shown, result);
            }
            OperatorCmd::Loop(want) => {
                let changed = match want {
                    LoopState::Open => self.ao.open(),
                    LoopState::Closed => self.ao.close(),
                };
                match changed {
                    Ok(true) => println!("loop {}", want),
                    Ok(false) => println!("loop already {}", want),
                    Err(e) => warn!("loop {} failed: {}", want, e),
                }
            }
            OperatorCmd::Status => {
                println!("{}", serde_json::to_string(&status.event(EventKind::Status))?);
                let f = lock(&self.form);
                println!(
                    "form pos={} vel={} accel={} alt={} framerate={} loop={}",
                    f.wind_pos.display(),
                    f.velocity.display(),
                    f.acceleration.display(),
                    f.altitude.display(),
                    self.frame_rate_shown,
                    if status.readouts.loop_closed() { LoopState::Closed } else { LoopState::Open }
                );
            }
            // handled by the reader thread
            OperatorCmd::Press(_) | OperatorCmd::Answer(_) | OperatorCmd::Quit => {}
        }
        Ok(())
    }

    fn edit(&mut self, field: FormField, text: &str) {
        let readback = match field {
            FormField::WindPos => &self.rig.wind_pos,
            FormField::Velocity => &self.rig.wind_vel,
            FormField::Acceleration => &self.rig.wind_accel,
            FormField::Altitude => &self.rig.alt_pos,
        };
        // read before taking the form lock; subscriptions also need it
        let fallback = match readback.read_f64() {
            Ok(v) => v,
            Err(e) => {
                warn!("edit ignored: {}", e);
                return;
            }
        };
        let mut form = lock(&self.form);
        let f: &mut EditField = match field {
            FormField::WindPos => &mut form.wind_pos,
            FormField::Velocity => &mut form.velocity,
            FormField::Acceleration => &mut form.acceleration,
            FormField::Altitude => &mut form.altitude,
        };
        match f.edit(text, fallback) {
            Ok(_) => println!("{} {}", f.limits.name, f.display()),
            Err(e) => println!("{}; reverted to {}", e, f.display()),
        }
    }

    fn frame_rate_result(&mut self, text: &str, result: Result<u32, AoError>) {
        match result {
            Ok(v) => {
                self.frame_rate_shown = v.to_string();
                println!("frame rate {}", v);
            }
            Err(AoError::Bounds(e)) => {
                self.frame_rate_shown = FRAME_RATE_RESET.to_string();
                println!("{} ({:?}); frame rate reset to {}", e, text, FRAME_RATE_RESET);
            }
            Err(e) => warn!("frame rate write failed: {}", e),
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_buttons_and_edits() {
        assert_eq!(parse_line("  start ").unwrap(), Some(OperatorCmd::Press(Intent::Start)));
        assert_eq!(parse_line("ACK").unwrap(), Some(OperatorCmd::Press(Intent::Acknowledge)));
        assert_eq!(
            parse_line("alt 7.5").unwrap(),
            Some(OperatorCmd::Edit { field: FormField::Altitude, text: "7.5".into() })
        );
        assert_eq!(parse_line("loop close").unwrap(), Some(OperatorCmd::Loop(LoopState::Closed)));
        assert_eq!(parse_line("").unwrap(), None);
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(parse_line("pos").is_err());
        assert!(parse_line("loop sideways").is_err());
        assert!(parse_line("vel 1 2").is_err());
        assert!(parse_line("warp 9").is_err());
    }

    #[test]
    fn console_confirm_ignores_early_answers() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut c = ConsoleConfirm { answers: rx, shutdown: Arc::new(AtomicBool::new(false)) };
        tx.send(ConfirmOutcome::Proceed).unwrap();
        drop(tx);
        assert_eq!(c.confirm("go?"), ConfirmOutcome::Cancel);
    }

    #[test]
    fn interrupt_cancels_pending_confirm() {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut c = ConsoleConfirm { answers: rx, shutdown: shutdown.clone() };

        // tx stays alive, as the blocked stdin reader holds it
        let weak = tx.downgrade();
        let ctrl_c = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            interrupt(&shutdown, &weak);
        });
        assert_eq!(c.confirm("go?"), ConfirmOutcome::Cancel);
        ctrl_c.join().unwrap();
        drop(tx);
    }

    #[test]
    fn confirm_after_interrupt_does_not_block() {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut c = ConsoleConfirm { answers: rx, shutdown: shutdown.clone() };
        // the Cancel is sent before the prompt and drained with the stale answers
        interrupt(&shutdown, &tx.downgrade());
        assert_eq!(c.confirm("go?"), ConfirmOutcome::Cancel);
        drop(tx);
    }
}
