//! The control-cycle orchestrator.
//!
//! [`StateMachine`] owns the live [`AdcsState`] and is the only place it is
//! mutated. Transition evaluation and fault classification are pure functions
//! over a [`SensorSnapshot`]; their results are applied here, in a fixed order,
//! once per cycle.

use crate::config::{AdcsConfig, ConfigError};
use crate::escalation::{ResetAction, ResetEscalation};
use crate::fault::{FaultAction, FaultLog, FaultManager, FaultType};
use crate::hal::Collaborators;
use crate::persistence::{
    Corruption, NvmDevice, PersistentRecord, PersistentStateStore, StoreError, StoredRecord,
};
use crate::state::{
    AdcsMode, AdcsState, HealthInputs, Millis, ModeTransition, SensorSnapshot,
    TransitionCause,
};
use crate::telemetry::TelemetrySnapshot;
use arrayvec::ArrayString;
use core::fmt::Write;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

const MAX_TRANSITIONS_PER_CYCLE: usize = 4;

type ErrorMessage = ArrayString<96>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnsafeReason {
    HighAngularRate,
    LowPower,
    ExceptionalMode(AdcsMode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootReason {
    /// Nothing persisted yet.
    FirstBoot,
    /// Record intact and within limits. Its mode is reported, not resumed.
    ValidAndSafe { persisted_mode: AdcsMode },
    Corrupt(Corruption),
    Unsafe(UnsafeReason),
    StorageUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootReport {
    pub mode: AdcsMode,
    pub reason: BootReason,
    pub restored_reset_count: u8,
}

/// Why a persisted record does not permit a normal boot, if it doesn't.
pub fn unsafe_reason(record: &PersistentRecord, config: &AdcsConfig) -> Option<UnsafeReason> {
    if record.mode.is_exceptional() {
        Some(UnsafeReason::ExceptionalMode(record.mode))
    } else if record
        .angular_velocity
        .iter()
        .any(|w| !w.is_finite() || w.abs() > config.max_angular_rate_rad_s)
    {
        Some(UnsafeReason::HighAngularRate)
    } else if !record.power_level.is_finite() || record.power_level < config.low_power_w {
        Some(UnsafeReason::LowPower)
    } else {
        None
    }
}

pub fn is_state_safe(record: &PersistentRecord, config: &AdcsConfig) -> bool {
    unsafe_reason(record, config).is_none()
}

/// Choose the boot mode from the outcome of reading the persisted record.
///
/// A valid, safe record boots into detumbling whatever mode it holds: the
/// reset may have interrupted a maneuver, and angular state has to be
/// re-established before pointing resumes.
pub fn decide_boot(outcome: &Result<StoredRecord, StoreError>, config: &AdcsConfig) -> BootReport {
    let (mode, reason, restored_reset_count) = match outcome {
        Ok(StoredRecord::Absent) => (AdcsMode::Detumbling, BootReason::FirstBoot, 0),
        Ok(StoredRecord::Valid(record)) => {
            let count = record.consecutive_software_reset_count;
            match unsafe_reason(record, config) {
                Some(reason) => (AdcsMode::SafeMode, BootReason::Unsafe(reason), count),
                None => (
                    AdcsMode::Detumbling,
                    BootReason::ValidAndSafe {
                        persisted_mode: record.mode,
                    },
                    count,
                ),
            }
        }
        Ok(StoredRecord::Invalid(corrupt)) => (AdcsMode::SafeMode, BootReason::Corrupt(corrupt.reason), 0),
        Err(_) => (AdcsMode::SafeMode, BootReason::StorageUnavailable, 0),
    };
    BootReport {
        mode,
        reason,
        restored_reset_count,
    }
}

/// Next mode for `state` given this cycle's inputs. Pure.
pub fn evaluate_transition(state: &AdcsState, snapshot: &SensorSnapshot, config: &AdcsConfig) -> AdcsMode {
    let rate = snapshot.max_axis_rate();
    match state.mode {
        AdcsMode::Detumbling => {
            if rate < config.angular_rate_stable_rad_s {
                AdcsMode::SunAcquisition
            } else {
                AdcsMode::Detumbling
            }
        }
        AdcsMode::SunAcquisition => {
            if snapshot.sun_alignment_error_deg.abs() <= config.sun_alignment_tolerance_deg {
                AdcsMode::NominalPointing
            } else {
                AdcsMode::SunAcquisition
            }
        }
        AdcsMode::NominalPointing => AdcsMode::NominalPointing,
        AdcsMode::SafeMode => {
            let power_restored = snapshot.power_level >= config.power_restored_w;
            if power_restored && rate <= config.max_angular_rate_rad_s {
                state.previous_operational_mode
            } else {
                AdcsMode::SafeMode
            }
        }
        AdcsMode::FaultRecovery => {
            if fault_recovery_complete(state, snapshot, config) {
                state.previous_operational_mode
            } else {
                AdcsMode::FaultRecovery
            }
        }
    }
}

fn fault_recovery_complete(state: &AdcsState, snapshot: &SensorSnapshot, config: &AdcsConfig) -> bool {
    let dwell = snapshot.now.saturating_sub(state.mode_entry_time);
    !snapshot.health.any()
        && snapshot.max_axis_rate() <= config.max_angular_rate_rad_s
        && snapshot.power_level >= config.low_power_w
        && dwell >= config.fault_recovery_dwell_ms
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle: u32,
    pub mode: AdcsMode,
    pub transitions: heapless::Vec<ModeTransition, MAX_TRANSITIONS_PER_CYCLE>,
    pub fault: FaultType,
    /// Set when the next software-reset trigger will power-cycle instead.
    pub escalation_armed: bool,
    pub reset_action: Option<ResetAction>,
    pub persisted: bool,
    pub persist_failed: bool,
    pub watchdog_refreshed: bool,
    pub halted: bool,
}

impl CycleReport {
    fn new(cycle: u32, mode: AdcsMode) -> Self {
        Self {
            cycle,
            mode,
            transitions: heapless::Vec::new(),
            fault: FaultType::None,
            escalation_armed: false,
            reset_action: None,
            persisted: false,
            persist_failed: false,
            watchdog_refreshed: false,
            halted: false,
        }
    }
}

pub struct StateMachine<D: NvmDevice> {
    config: AdcsConfig,
    state: AdcsState,
    store: PersistentStateStore<D>,
    fault_manager: FaultManager,
    fault_log: FaultLog,
    escalation: ResetEscalation,
    io: Collaborators,
    boot: BootReport,
    cycle_count: u32,
    last_time: Millis,
    halted: bool,
    last_error: Option<ErrorMessage>,
}

impl<D: NvmDevice> StateMachine<D> {
    pub fn new(
        config: AdcsConfig,
        mut store: PersistentStateStore<D>,
        mut io: Collaborators,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let outcome = store.read();
        if let Err(e) = &outcome {
            error!("failed to read persisted state: {}", e);
        }
        let boot = decide_boot(&outcome, &config);
        let now = io.clock.now_ms();

        match boot.reason {
            BootReason::FirstBoot | BootReason::ValidAndSafe { .. } => {
                info!(mode = %boot.mode, reason = ?boot.reason, "booting");
            }
            _ => warn!(mode = %boot.mode, reason = ?boot.reason, "booting into safe mode"),
        }

        io.watchdog.initialize(config.watchdog_timeout_ms);

        Ok(Self {
            fault_manager: FaultManager::new(&config),
            escalation: ResetEscalation::restore(boot.restored_reset_count, config.escalation_threshold),
            state: AdcsState::new(boot.mode, now),
            fault_log: FaultLog::new(),
            store,
            io,
            boot,
            config,
            cycle_count: 0,
            last_time: now,
            halted: false,
            last_error: None,
        })
    }

    /// Run one control cycle. Always returns; failures are reported, not raised.
    pub fn run_cycle(&mut self) -> CycleReport {
        if self.halted {
            debug!("cycle skipped, awaiting power cycle");
            let mut report = CycleReport::new(self.cycle_count, self.state.mode);
            report.halted = true;
            return report;
        }

        self.cycle_count = self.cycle_count.wrapping_add(1);
        let mut report = CycleReport::new(self.cycle_count, self.state.mode);

        let snapshot = self.update_sensor_data();

        let candidate = evaluate_transition(&self.state, &snapshot, &self.config);
        if candidate != self.state.mode {
            self.transition_to(candidate, TransitionCause::Autonomous, &mut report);
        }

        self.execute_mode_behavior(self.state.mode);

        report.escalation_armed = self.escalation.next_action() == ResetAction::HardwareReset;

        let fault = self.fault_manager.classify(&snapshot);
        report.fault = fault;
        if fault.is_none() {
            if self.escalation.clear() {
                debug!("fault-free cycle, software reset count cleared");
                self.persist(&mut report);
            }
        } else {
            self.handle_fault(fault, &mut report);
        }

        report.mode = self.state.mode;
        report.halted = self.halted;
        self.publish_telemetry(&snapshot, &report);

        if !self.halted {
            self.io.watchdog.refresh();
            report.watchdog_refreshed = true;
        }
        report
    }

    /// Move to fault recovery at the request of supervisory logic.
    pub fn enter_fault_recovery(&mut self) -> Option<ModeTransition> {
        if self.halted || self.state.mode == AdcsMode::FaultRecovery {
            return None;
        }
        let mut report = CycleReport::new(self.cycle_count, self.state.mode);
        self.transition_to(AdcsMode::FaultRecovery, TransitionCause::Commanded, &mut report);
        report.transitions.first().copied()
    }

    fn update_sensor_data(&mut self) -> SensorSnapshot {
        let angular_velocity = self.io.imu.read_angular_velocity();
        let power_level = self.io.power.read_power_w();
        let sun_alignment_error_deg = self.io.sun_sensor.alignment_error_deg();
        let health = HealthInputs {
            sensor_anomalous: self.io.health.is_anomalous(),
            driver_reset_required: self.io.health.driver_reset_required(),
            critical: self.io.health.critical_fault(),
        };

        self.state.angular_velocity = angular_velocity;
        self.state.power_level = power_level;

        SensorSnapshot {
            angular_velocity,
            power_level,
            sun_alignment_error_deg,
            health,
            now: self.now(),
        }
    }

    fn transition_to(&mut self, target: AdcsMode, cause: TransitionCause, report: &mut CycleReport) {
        let from = self.state.mode;
        self.execute_mode_exit(from);

        if target.is_exceptional() && !from.is_exceptional() {
            self.state.previous_operational_mode = from;
        }
        self.state.mode = target;
        self.state.mode_entry_time = self.now();
        self.execute_mode_entry(target);

        info!(from = %from, to = %target, cause = ?cause, "mode transition");
        let _ = report.transitions.push(ModeTransition {
            from,
            to: target,
            at: self.state.mode_entry_time,
            cause,
        });

        self.persist(report);
    }

    fn execute_mode_entry(&mut self, mode: AdcsMode) {
        self.execute_mode_behavior(mode);
    }

    fn execute_mode_exit(&mut self, mode: AdcsMode) {
        match mode {
            AdcsMode::Detumbling => self.io.actuators.release_detumble_actuators(),
            AdcsMode::SafeMode => self.io.actuators.restore_loads(),
            AdcsMode::SunAcquisition | AdcsMode::NominalPointing | AdcsMode::FaultRecovery => {}
        }
    }

    fn execute_mode_behavior(&mut self, mode: AdcsMode) {
        match mode {
            AdcsMode::Detumbling => self.io.actuators.engage_detumble_actuators(),
            AdcsMode::SunAcquisition => self.io.actuators.point_at_sun(),
            AdcsMode::NominalPointing => self.io.actuators.hold_attitude(),
            AdcsMode::SafeMode => self.io.actuators.shed_non_essential_loads(),
            // Actuators stay idle until recovery completes.
            AdcsMode::FaultRecovery => {}
        }
    }

    fn handle_fault(&mut self, fault: FaultType, report: &mut CycleReport) {
        let mode_before = self.state.mode;

        let action = match fault {
            FaultType::HighAngularRate => {
                self.io.actuators.engage_detumble_actuators();
                self.force_mode(AdcsMode::Detumbling, fault, report);
                FaultAction::EngageDetumble
            }
            FaultType::LowPower => {
                self.io.actuators.shed_non_essential_loads();
                self.force_mode(AdcsMode::SafeMode, fault, report);
                FaultAction::ShedLoads
            }
            FaultType::SensorAnomaly | FaultType::SoftwareResetRequired => {
                match self.escalation.register_trigger() {
                    ResetAction::SoftwareReset => {
                        report.reset_action = Some(ResetAction::SoftwareReset);
                        self.persist(report);
                        if fault == FaultType::SensorAnomaly {
                            self.io.health.reinitialize_sensors();
                            FaultAction::ReinitializeSensors
                        } else {
                            self.io.health.reset_drivers();
                            FaultAction::ResetDrivers
                        }
                    }
                    ResetAction::HardwareReset => {
                        warn!(
                            threshold = self.escalation.threshold(),
                            "software resets exhausted, escalating to hardware reset"
                        );
                        self.execute_hardware_reset(report);
                        FaultAction::HardwareReset
                    }
                }
            }
            FaultType::Critical => {
                self.execute_hardware_reset(report);
                FaultAction::HardwareReset
            }
            FaultType::None => return,
        };

        let now = self.now();
        self.fault_log
            .record(fault, action, mode_before, self.state.mode, now);
        warn!(
            fault = ?fault,
            action = ?action,
            mode = %self.state.mode,
            reset_count = self.escalation.count(),
            "fault handled"
        );
    }

    fn force_mode(&mut self, target: AdcsMode, fault: FaultType, report: &mut CycleReport) {
        if self.state.mode != target {
            self.transition_to(target, TransitionCause::Fault(fault), report);
        }
    }

    fn execute_hardware_reset(&mut self, report: &mut CycleReport) {
        self.escalation.clear();
        self.persist(report);
        error!("requesting hardware power cycle");
        self.io.power_cycle.request_power_cycle();
        report.reset_action = Some(ResetAction::HardwareReset);
        self.halted = true;
    }

    fn persist(&mut self, report: &mut CycleReport) {
        let now = self.now();
        let record = PersistentRecord::new(
            self.state.mode,
            self.state.mode_entry_time,
            self.state.angular_velocity,
            self.state.power_level,
            now as f32 / 1000.0,
            self.escalation.count(),
        );
        match self.store.write(&record) {
            Ok(_) => report.persisted = true,
            Err(e) => {
                error!("failed to persist state: {}", e);
                report.persist_failed = true;
                self.set_last_error(&e);
            }
        }
    }

    fn publish_telemetry(&mut self, snapshot: &SensorSnapshot, report: &CycleReport) {
        let telemetry = TelemetrySnapshot {
            cycle: report.cycle,
            timestamp: snapshot.now,
            mode: self.state.mode,
            mode_entry_time: self.state.mode_entry_time,
            previous_operational_mode: self.state.previous_operational_mode,
            angular_velocity: self.state.angular_velocity,
            power_level: self.state.power_level,
            sun_alignment_error_deg: snapshot.sun_alignment_error_deg,
            transitions: report.transitions.iter().copied().collect(),
            fault: report.fault,
            reset_action: report.reset_action,
            software_reset_count: self.escalation.count(),
            fault_counters: *self.fault_log.counters(),
            halted: self.halted,
            last_error: self.last_error.as_ref().map(|msg| msg.to_string()),
        };
        self.io.telemetry.publish(&telemetry);
    }

    /// Clock reading that never goes backwards within this boot.
    fn now(&mut self) -> Millis {
        let raw = self.io.clock.now_ms();
        if raw < self.last_time {
            warn!(raw, last = self.last_time, "time source regressed, holding last value");
        } else {
            self.last_time = raw;
        }
        self.last_time
    }

    fn set_last_error(&mut self, err: &dyn core::fmt::Display) {
        let mut msg = ErrorMessage::new();
        let _ = write!(msg, "{}", err);
        self.last_error = Some(msg);
    }

    pub fn state(&self) -> &AdcsState {
        &self.state
    }

    pub fn mode(&self) -> AdcsMode {
        self.state.mode
    }

    pub fn config(&self) -> &AdcsConfig {
        &self.config
    }

    pub fn boot_report(&self) -> &BootReport {
        &self.boot
    }

    pub fn fault_log(&self) -> &FaultLog {
        &self.fault_log
    }

    pub fn escalation(&self) -> &ResetEscalation {
        &self.escalation
    }

    pub fn store(&self) -> &PersistentStateStore<D> {
        &self.store
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn cycle_count(&self) -> u32 {
        self.cycle_count
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_ref().map(ArrayString::as_str)
    }

    /// Current live state projected the way it would be persisted.
    pub fn current_record(&self) -> PersistentRecord {
        PersistentRecord::new(
            self.state.mode,
            self.state.mode_entry_time,
            self.state.angular_velocity,
            self.state.power_level,
            self.last_time as f32 / 1000.0,
            self.escalation.count(),
        )
        .sealed()
    }
}

impl<D: NvmDevice> core::fmt::Debug for StateMachine<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StateMachine")
            .field("state", &self.state)
            .field("boot", &self.boot)
            .field("cycle_count", &self.cycle_count)
            .field("halted", &self.halted)
            .finish_non_exhaustive()
    }
}
