//! Timer-driven termination state machine.
//!
//! The supervisor asks the machine what to do next given the time elapsed
//! since spawn, and the machine answers with one [`EscalationStep`]. Keeping
//! the sequence here makes it testable without a real process.

use super::Termination;
use std::time::Duration;

/// Phase of the termination sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationPhase {
    /// The command is inside its time budget.
    Running,
    /// The graceful signal has been sent; waiting out the grace window.
    GracePeriod,
    /// The force kill has been issued.
    ForceKilled,
}

/// Action requested by [`Escalation::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationStep {
    /// Wait up to this long for the process to exit on its own.
    Wait(Duration),
    /// Send the graceful termination signal now.
    Terminate,
    /// Force-kill the process now.
    Kill,
    /// Nothing left to escalate; reap the process.
    Reap,
}

/// Running → grace period → force-killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Escalation {
    timeout: Duration,
    grace: Duration,
    phase: EscalationPhase,
}

impl Escalation {
    /// Creates a machine for a command with the given timeout and grace
    /// window.
    #[must_use]
    pub const fn new(timeout: Duration, grace: Duration) -> Self {
        Self {
            timeout,
            grace,
            phase: EscalationPhase::Running,
        }
    }

    /// Returns the current phase.
    #[must_use]
    pub const fn phase(&self) -> EscalationPhase {
        self.phase
    }

    /// Advances the machine to `elapsed` and returns the next action.
    ///
    /// Each phase boundary is crossed at most once, so `Terminate` and
    /// `Kill` are each returned at most once.
    pub fn step(&mut self, elapsed: Duration) -> EscalationStep {
        match self.phase {
            EscalationPhase::Running => {
                if let Some(remaining) = self.timeout.checked_sub(elapsed).filter(|d| !d.is_zero())
                {
                    return EscalationStep::Wait(remaining);
                }
                self.phase = EscalationPhase::GracePeriod;
                EscalationStep::Terminate
            }
            EscalationPhase::GracePeriod => {
                let deadline = self.timeout.saturating_add(self.grace);
                if let Some(remaining) = deadline.checked_sub(elapsed).filter(|d| !d.is_zero()) {
                    return EscalationStep::Wait(remaining);
                }
                self.phase = EscalationPhase::ForceKilled;
                EscalationStep::Kill
            }
            EscalationPhase::ForceKilled => EscalationStep::Reap,
        }
    }

    /// Maps the phase reached to the termination reported to callers.
    #[must_use]
    pub const fn termination(&self) -> Termination {
        match self.phase {
            EscalationPhase::Running => Termination::Exited,
            EscalationPhase::GracePeriod => Termination::Terminated,
            EscalationPhase::ForceKilled => Termination::ForceKilled,
        }
    }
}
