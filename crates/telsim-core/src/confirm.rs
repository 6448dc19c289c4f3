#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    Proceed,
    Decline,
    Cancel,
}

/// Blocking operator confirmation, asked before a move is committed.
///
/// The sequencer waits for the answer inside its tick.
pub trait Confirm: Send {
    fn confirm(&mut self, prompt: &str) -> ConfirmOutcome;
}

/// Answers every prompt the same way (`--assume-yes`, tests).
#[derive(Debug, Clone, Copy)]
pub struct FixedConfirm(pub ConfirmOutcome);

impl Confirm for FixedConfirm {
    fn confirm(&mut self, _prompt: &str) -> ConfirmOutcome {
        self.0
    }
}
