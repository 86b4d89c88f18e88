//! FSM unit tests

use pan_os_upgrade::upgrade::fsm::{UpgradeEvent, UpgradeFsm, UpgradeState, UpgradeStep};

fn advance_to(fsm: &mut UpgradeFsm, state: UpgradeState) {
    while fsm.state() != state {
        let step = fsm.state().next_step().unwrap();
        fsm.process(UpgradeEvent::StepSucceeded(step)).unwrap();
    }
}

#[test]
fn test_fsm_initial_state() {
    let fsm = UpgradeFsm::new();
    assert_eq!(fsm.state(), UpgradeState::Pending);
    assert!(fsm.error().is_none());
    assert_eq!(fsm.attempts(), 0);
    assert!(fsm.failed_step().is_none());
}

#[test]
fn test_fsm_upgrade_success_flow() {
    let mut fsm = UpgradeFsm::new();

    // Pending -> Connected
    fsm.process(UpgradeEvent::StepSucceeded(UpgradeStep::Connect)).unwrap();
    assert_eq!(fsm.state(), UpgradeState::Connected);

    // Connected -> ... -> PostReady
    advance_to(&mut fsm, UpgradeState::PostReady);

    // PostReady -> Diffed -> Completed
    fsm.process(UpgradeEvent::StepSucceeded(UpgradeStep::Diff)).unwrap();
    assert_eq!(fsm.state(), UpgradeState::Diffed);
    fsm.process(UpgradeEvent::Finish).unwrap();
    assert_eq!(fsm.state(), UpgradeState::Completed);
}

#[test]
fn test_fsm_skipped_steps_advance() {
    let mut fsm = UpgradeFsm::new();
    fsm.process(UpgradeEvent::StepSucceeded(UpgradeStep::Connect)).unwrap();
    fsm.process(UpgradeEvent::StepSkipped(UpgradeStep::Backup)).unwrap();
    assert_eq!(fsm.state(), UpgradeState::BackedUp);
}

#[test]
fn test_fsm_failed_attempt_stays_in_state() {
    let mut fsm = UpgradeFsm::new();
    advance_to(&mut fsm, UpgradeState::ReadinessChecked);

    fsm.process(UpgradeEvent::AttemptFailed(UpgradeStep::Download, "error 1".to_string()))
        .unwrap();
    assert_eq!(fsm.state(), UpgradeState::ReadinessChecked);
    assert_eq!(fsm.attempts(), 1);
    assert_eq!(fsm.error(), Some("error 1"));

    fsm.process(UpgradeEvent::AttemptFailed(UpgradeStep::Download, "error 2".to_string()))
        .unwrap();
    assert_eq!(fsm.attempts(), 2);

    // Check can_retry
    assert!(fsm.can_retry(3));
    assert!(!fsm.can_retry(2));

    // success clears the attempt count
    fsm.process(UpgradeEvent::StepSucceeded(UpgradeStep::Download)).unwrap();
    assert_eq!(fsm.state(), UpgradeState::Downloaded);
    assert_eq!(fsm.attempts(), 0);
    assert!(fsm.error().is_none());
}

#[test]
fn test_fsm_fail_from_any_active_state() {
    for target in [UpgradeState::Pending, UpgradeState::Installed, UpgradeState::Diffed] {
        let mut fsm = UpgradeFsm::new();
        advance_to(&mut fsm, target);
        fsm.process(UpgradeEvent::Fail(UpgradeStep::Reboot, "boom".to_string()))
            .unwrap();
        assert_eq!(fsm.state(), UpgradeState::Failed);
        assert_eq!(fsm.failed_step(), Some(UpgradeStep::Reboot));
        assert!(!fsm.can_retry(10));
    }
}

#[test]
fn test_fsm_invalid_transition() {
    let mut fsm = UpgradeFsm::new();

    // Can't download before connecting
    let result = fsm.process(UpgradeEvent::StepSucceeded(UpgradeStep::Download));
    assert!(result.is_err());
    assert_eq!(fsm.state(), UpgradeState::Pending);

    // Can't finish early
    assert!(fsm.process(UpgradeEvent::Finish).is_err());
}

#[test]
fn test_fsm_terminal_states_are_final() {
    let mut fsm = UpgradeFsm::new();
    fsm.process(UpgradeEvent::Fail(UpgradeStep::Connect, "unreachable".to_string()))
        .unwrap();

    assert!(fsm
        .process(UpgradeEvent::StepSucceeded(UpgradeStep::Connect))
        .is_err());
    assert!(fsm
        .process(UpgradeEvent::Fail(UpgradeStep::Connect, "again".to_string()))
        .is_err());
    assert_eq!(fsm.error(), Some("unreachable"));
}

#[test]
fn test_safe_abort_points() {
    let safe: Vec<_> = UpgradeStep::ALL
        .iter()
        .filter(|s| s.is_safe_abort_point())
        .copied()
        .collect();
    assert_eq!(safe.last(), Some(&UpgradeStep::Install));
    assert!(!UpgradeStep::Reboot.is_safe_abort_point());
}
