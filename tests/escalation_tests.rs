mod common;

use adcs::escalation::ResetAction;
use adcs::fault::{FaultAction, FaultType};
use adcs::persistence::{InMemoryNvm, PersistentRecord};
use adcs::state::AdcsMode;
use common::{calm_model, sealed_block, Harness};

fn stuck_sensor_harness() -> Harness {
    let mut model = calm_model();
    model.sensor_anomalous = true;
    model.anomaly_persistent = true;
    Harness::new(model)
}

#[test]
fn test_fourth_consecutive_trigger_requests_power_cycle() {
    let mut harness = stuck_sensor_harness();

    for expected_count in 1..=3u8 {
        let report = harness.cycle();
        assert_eq!(report.fault, FaultType::SensorAnomaly);
        assert_eq!(report.reset_action, Some(ResetAction::SoftwareReset));
        assert!(!report.halted);
        assert_eq!(harness.machine.escalation().count(), expected_count);
        assert_eq!(harness.stored().consecutive_software_reset_count, expected_count);
        assert_eq!(harness.platform.model().commands.power_cycle_requests, 0);
    }
    assert_eq!(harness.platform.model().commands.sensor_reinits, 3);

    let report = harness.cycle();

    assert!(report.escalation_armed);
    assert_eq!(report.reset_action, Some(ResetAction::HardwareReset));
    assert!(report.halted);
    assert!(!report.watchdog_refreshed);
    assert_eq!(harness.platform.model().commands.power_cycle_requests, 1);
    assert_eq!(harness.platform.model().commands.sensor_reinits, 3);
    assert_eq!(harness.stored().consecutive_software_reset_count, 0);
    assert_eq!(harness.machine.fault_log().counters().escalations, 1);
    assert_eq!(
        harness.machine.fault_log().latest().map(|r| r.action),
        Some(FaultAction::HardwareReset)
    );
}

#[test]
fn test_halted_machine_does_nothing_further() {
    let mut harness = stuck_sensor_harness();
    for _ in 0..4 {
        harness.cycle();
    }
    assert!(harness.machine.is_halted());
    let writes = harness.nvm.write_count();

    let report = harness.cycle();

    assert!(report.halted);
    assert!(!report.watchdog_refreshed);
    assert_eq!(harness.nvm.write_count(), writes);
    assert_eq!(harness.platform.model().commands.power_cycle_requests, 1);
}

#[test]
fn test_fault_free_cycle_breaks_the_run() {
    let mut harness = stuck_sensor_harness();
    for _ in 0..3 {
        harness.cycle();
    }
    assert_eq!(harness.machine.escalation().count(), 3);

    harness.platform.model_mut().sensor_anomalous = false;
    let report = harness.cycle();
    assert_eq!(report.fault, FaultType::None);
    assert!(report.persisted);
    assert_eq!(harness.stored().consecutive_software_reset_count, 0);

    harness.platform.model_mut().sensor_anomalous = true;
    for _ in 0..3 {
        let report = harness.cycle();
        assert_eq!(report.reset_action, Some(ResetAction::SoftwareReset));
    }
    assert_eq!(harness.platform.model().commands.power_cycle_requests, 0);
}

#[test]
fn test_transient_anomaly_is_cleared_by_reinitialization() {
    let mut model = calm_model();
    model.sensor_anomalous = true;
    let mut harness = Harness::new(model);

    let first = harness.cycle();
    assert_eq!(first.reset_action, Some(ResetAction::SoftwareReset));
    assert_eq!(harness.machine.escalation().count(), 1);

    let second = harness.cycle();
    assert_eq!(second.fault, FaultType::None);
    assert_eq!(harness.machine.escalation().count(), 0);
}

#[test]
fn test_driver_faults_escalate_through_driver_resets() {
    let mut model = calm_model();
    model.driver_reset_required = true;
    model.driver_fault_persistent = true;
    let mut harness = Harness::new(model);

    for _ in 0..3 {
        assert_eq!(harness.cycle().fault, FaultType::SoftwareResetRequired);
    }
    assert_eq!(harness.platform.model().commands.driver_resets, 3);

    let report = harness.cycle();
    assert_eq!(report.reset_action, Some(ResetAction::HardwareReset));
    assert_eq!(harness.platform.model().commands.power_cycle_requests, 1);
}

#[test]
fn test_reset_count_survives_reboot() {
    let mut harness = stuck_sensor_harness();
    harness.cycle();
    harness.cycle();
    assert_eq!(harness.stored().consecutive_software_reset_count, 2);

    harness.reboot();
    assert_eq!(harness.machine.escalation().count(), 2);

    assert_eq!(harness.cycle().reset_action, Some(ResetAction::SoftwareReset));
    assert_eq!(harness.cycle().reset_action, Some(ResetAction::HardwareReset));
}

#[test]
fn test_persisted_count_at_threshold_escalates_on_first_trigger() {
    let record = PersistentRecord::new(AdcsMode::NominalPointing, 0, [0.0; 3], 5.0, 0.0, 3);
    let mut model = calm_model();
    model.sensor_anomalous = true;
    model.anomaly_persistent = true;
    let mut harness = Harness::with_nvm(model, InMemoryNvm::with_block(sealed_block(record)));

    let report = harness.cycle();

    assert!(report.escalation_armed);
    assert_eq!(report.reset_action, Some(ResetAction::HardwareReset));
}

#[test]
fn test_critical_fault_power_cycles_immediately() {
    let mut model = calm_model();
    model.critical = true;
    let mut harness = Harness::new(model);

    let report = harness.cycle();

    assert_eq!(report.fault, FaultType::Critical);
    assert_eq!(report.reset_action, Some(ResetAction::HardwareReset));
    assert!(report.halted);
    assert!(report.persisted);
    assert_eq!(harness.platform.model().commands.power_cycle_requests, 1);
    assert_eq!(harness.machine.fault_log().counters().escalations, 0);
}

#[test]
fn test_reboot_after_power_cycle_starts_fresh() {
    let mut harness = stuck_sensor_harness();
    for _ in 0..4 {
        harness.cycle();
    }
    harness.platform.model_mut().sensor_anomalous = false;

    harness.reboot();

    assert!(!harness.machine.is_halted());
    assert_eq!(harness.machine.mode(), AdcsMode::Detumbling);
    assert_eq!(harness.machine.escalation().count(), 0);
    assert!(harness.cycle().watchdog_refreshed);
}
