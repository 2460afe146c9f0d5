//! Tests for the termination state machine.

use crate::sandbox::domain::{Escalation, EscalationPhase, EscalationStep, Termination};
use rstest::{fixture, rstest};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(10);
const GRACE: Duration = Duration::from_secs(5);

#[fixture]
fn escalation() -> Escalation {
    Escalation::new(TIMEOUT, GRACE)
}

#[rstest]
fn waits_for_remaining_budget_while_running(mut escalation: Escalation) {
    assert_eq!(
        escalation.step(Duration::from_secs(4)),
        EscalationStep::Wait(Duration::from_secs(6))
    );
    assert_eq!(escalation.phase(), EscalationPhase::Running);
    assert_eq!(escalation.termination(), Termination::Exited);
}

#[rstest]
fn full_sequence_terminates_then_kills(mut escalation: Escalation) {
    assert_eq!(escalation.step(TIMEOUT), EscalationStep::Terminate);
    assert_eq!(escalation.phase(), EscalationPhase::GracePeriod);

    assert_eq!(
        escalation.step(Duration::from_secs(12)),
        EscalationStep::Wait(Duration::from_secs(3))
    );
    assert_eq!(escalation.termination(), Termination::Terminated);

    assert_eq!(escalation.step(Duration::from_secs(15)), EscalationStep::Kill);
    assert_eq!(escalation.phase(), EscalationPhase::ForceKilled);
    assert_eq!(escalation.step(Duration::from_secs(16)), EscalationStep::Reap);
    assert_eq!(escalation.termination(), Termination::ForceKilled);
}

#[rstest]
fn terminate_is_issued_once(mut escalation: Escalation) {
    let late = Duration::from_secs(11);
    assert_eq!(escalation.step(late), EscalationStep::Terminate);
    assert_eq!(
        escalation.step(late),
        EscalationStep::Wait(Duration::from_secs(4))
    );
}

#[rstest]
fn overdue_grace_kills_immediately(mut escalation: Escalation) {
    assert_eq!(escalation.step(Duration::from_secs(60)), EscalationStep::Terminate);
    assert_eq!(escalation.step(Duration::from_secs(60)), EscalationStep::Kill);
}
