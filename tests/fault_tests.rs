mod common;

use adcs::fault::{FaultAction, FaultLog, FaultManager, FaultType};
use adcs::state::{AdcsMode, HealthInputs, SensorSnapshot};
use adcs::AdcsConfig;
use common::{calm_model, Harness};

fn nominal_inputs() -> SensorSnapshot {
    SensorSnapshot {
        angular_velocity: [0.0; 3],
        power_level: 5.0,
        sun_alignment_error_deg: 0.0,
        health: HealthInputs::default(),
        now: 0,
    }
}

#[test]
fn test_high_rate_outranks_low_power() {
    let manager = FaultManager::new(&AdcsConfig::default());
    let mut inputs = nominal_inputs();
    inputs.angular_velocity = [0.2, 0.0, 0.0];
    inputs.power_level = 3.5;

    assert_eq!(manager.classify(&inputs), FaultType::HighAngularRate);
}

#[test]
fn test_classification_follows_severity_order() {
    let manager = FaultManager::new(&AdcsConfig::default());
    let mut inputs = nominal_inputs();
    assert_eq!(manager.classify(&inputs), FaultType::None);

    inputs.health.critical = true;
    assert_eq!(manager.classify(&inputs), FaultType::Critical);

    inputs.health.driver_reset_required = true;
    assert_eq!(manager.classify(&inputs), FaultType::SoftwareResetRequired);

    inputs.health.sensor_anomalous = true;
    assert_eq!(manager.classify(&inputs), FaultType::SensorAnomaly);

    inputs.power_level = 3.0;
    assert_eq!(manager.classify(&inputs), FaultType::LowPower);

    inputs.angular_velocity = [0.0, 0.0, -0.11];
    assert_eq!(manager.classify(&inputs), FaultType::HighAngularRate);
}

#[test]
fn test_thresholds_are_exclusive() {
    let manager = FaultManager::new(&AdcsConfig::default());
    let mut inputs = nominal_inputs();
    inputs.angular_velocity = [0.1, -0.1, 0.1];
    inputs.power_level = 4.0;

    assert_eq!(manager.classify(&inputs), FaultType::None);
}

#[test]
fn test_thresholds_come_from_config() {
    let config = AdcsConfig {
        max_angular_rate_rad_s: 0.3,
        angular_rate_stable_rad_s: 0.05,
        low_power_w: 2.0,
        power_restored_w: 2.5,
        ..AdcsConfig::default()
    };
    let manager = FaultManager::new(&config);
    let mut inputs = nominal_inputs();
    inputs.angular_velocity = [0.25, 0.0, 0.0];
    inputs.power_level = 3.0;

    assert_eq!(manager.classify(&inputs), FaultType::None);
}

#[test]
fn test_fault_log_keeps_most_recent_history() {
    let mut log = FaultLog::new();
    for i in 0..40u32 {
        log.record(
            FaultType::LowPower,
            FaultAction::ShedLoads,
            AdcsMode::NominalPointing,
            AdcsMode::SafeMode,
            i * 1000,
        );
    }

    let history = log.history();
    assert_eq!(history.len(), 32);
    assert_eq!(history[0].id, 9);
    assert_eq!(log.latest().map(|r| r.id), Some(40));
    assert_eq!(log.latest().map(|r| r.timestamp), Some(39_000));
    assert_eq!(log.counters().low_power, 40);
}

#[test]
fn test_fault_log_counts_escalations_separately_from_critical() {
    let mut log = FaultLog::new();
    log.record(
        FaultType::SensorAnomaly,
        FaultAction::HardwareReset,
        AdcsMode::SunAcquisition,
        AdcsMode::SunAcquisition,
        0,
    );
    log.record(
        FaultType::Critical,
        FaultAction::HardwareReset,
        AdcsMode::SunAcquisition,
        AdcsMode::SunAcquisition,
        0,
    );

    assert_eq!(log.counters().escalations, 1);
    assert_eq!(log.counters().critical, 1);
    assert_eq!(log.counters().sensor_anomaly, 1);
}

#[test]
fn test_non_finite_readings_classify_as_faults() {
    let manager = FaultManager::new(&AdcsConfig::default());
    let mut inputs = nominal_inputs();

    inputs.angular_velocity = [0.0, f32::NAN, 0.0];
    assert_eq!(manager.classify(&inputs), FaultType::HighAngularRate);

    inputs.angular_velocity = [0.0; 3];
    inputs.power_level = f32::NAN;
    assert_eq!(manager.classify(&inputs), FaultType::LowPower);

    inputs.power_level = f32::INFINITY;
    assert_eq!(manager.classify(&inputs), FaultType::LowPower);
}

#[test]
fn test_failed_gyro_never_reads_as_calm() {
    let mut harness = Harness::new(calm_model());
    harness.platform.model_mut().angular_velocity = [f32::NAN; 3];

    let report = harness.cycle();

    assert_eq!(report.fault, FaultType::HighAngularRate);
    assert_eq!(report.mode, AdcsMode::Detumbling);
}

#[test]
fn test_failed_power_monitor_forces_safe_mode() {
    let mut harness = Harness::new(calm_model());
    harness.to_nominal();
    harness.platform.model_mut().supply_w = f32::NAN;

    let report = harness.cycle();
    assert_eq!(report.fault, FaultType::LowPower);
    assert_eq!(report.mode, AdcsMode::SafeMode);

    let report = harness.cycle();
    assert_eq!(report.mode, AdcsMode::SafeMode);
}

#[test]
fn test_fault_log_clear_keeps_lifetime_counters() {
    let mut log = FaultLog::new();
    let first = log.record(
        FaultType::LowPower,
        FaultAction::ShedLoads,
        AdcsMode::NominalPointing,
        AdcsMode::SafeMode,
        0,
    );
    log.clear();
    let second = log.record(
        FaultType::LowPower,
        FaultAction::ShedLoads,
        AdcsMode::NominalPointing,
        AdcsMode::SafeMode,
        100,
    );

    assert_eq!(log.history().len(), 1);
    assert_eq!(log.counters().low_power, 2);
    assert_eq!(second, first + 1);
}
