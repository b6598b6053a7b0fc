use crate::config::AdcsConfig;
use crate::state::{AdcsMode, Millis, SensorSnapshot};
use heapless::Vec;
use serde::{Deserialize, Serialize};

const MAX_FAULT_HISTORY: usize = 32;

/// Variants are listed in evaluation priority, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultType {
    HighAngularRate,
    LowPower,
    SensorAnomaly,
    SoftwareResetRequired,
    Critical,
    None,
}

impl FaultType {
    /// Faults recovered by a driver-level reset, subject to escalation.
    pub fn triggers_software_reset(self) -> bool {
        matches!(self, FaultType::SensorAnomaly | FaultType::SoftwareResetRequired)
    }

    pub fn is_none(self) -> bool {
        self == FaultType::None
    }
}

/// Classifies the most severe active fault from one cycle's inputs.
///
/// Classification is advisory; the state machine decides the response.
#[derive(Debug, Clone)]
pub struct FaultManager {
    max_angular_rate_rad_s: f32,
    low_power_w: f32,
}

impl FaultManager {
    pub fn new(config: &AdcsConfig) -> Self {
        Self {
            max_angular_rate_rad_s: config.max_angular_rate_rad_s,
            low_power_w: config.low_power_w,
        }
    }

    pub fn classify(&self, snapshot: &SensorSnapshot) -> FaultType {
        if self.angular_rate_exceeded(&snapshot.angular_velocity) {
            FaultType::HighAngularRate
        } else if self.power_low(snapshot.power_level) {
            FaultType::LowPower
        } else if snapshot.health.sensor_anomalous {
            FaultType::SensorAnomaly
        } else if snapshot.health.driver_reset_required {
            FaultType::SoftwareResetRequired
        } else if snapshot.health.critical {
            FaultType::Critical
        } else {
            FaultType::None
        }
    }

    /// Non-finite readings count as exceeded.
    pub fn angular_rate_exceeded(&self, angular_velocity: &[f32; 3]) -> bool {
        angular_velocity
            .iter()
            .any(|w| !w.is_finite() || w.abs() > self.max_angular_rate_rad_s)
    }

    pub fn power_low(&self, power_level: f32) -> bool {
        !power_level.is_finite() || power_level < self.low_power_w
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultAction {
    EngageDetumble,
    ShedLoads,
    ReinitializeSensors,
    ResetDrivers,
    HardwareReset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultRecord {
    pub id: u32,
    pub fault: FaultType,
    pub action: FaultAction,
    pub mode_before: AdcsMode,
    pub mode_after: AdcsMode,
    pub timestamp: Millis,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FaultCounters {
    pub high_angular_rate: u32,
    pub low_power: u32,
    pub sensor_anomaly: u32,
    pub software_reset_required: u32,
    pub critical: u32,
    pub escalations: u32,
}

/// Bounded history of handled faults for the telemetry side channel.
#[derive(Debug)]
pub struct FaultLog {
    history: Vec<FaultRecord, MAX_FAULT_HISTORY>,
    counters: FaultCounters,
    next_fault_id: u32,
}

impl FaultLog {
    pub fn new() -> Self {
        Self {
            history: Vec::new(),
            counters: FaultCounters::default(),
            next_fault_id: 1,
        }
    }

    pub fn record(
        &mut self,
        fault: FaultType,
        action: FaultAction,
        mode_before: AdcsMode,
        mode_after: AdcsMode,
        timestamp: Millis,
    ) -> u32 {
        let fault_id = self.next_fault_id;
        self.next_fault_id = self.next_fault_id.wrapping_add(1);

        let counter = match fault {
            FaultType::HighAngularRate => &mut self.counters.high_angular_rate,
            FaultType::LowPower => &mut self.counters.low_power,
            FaultType::SensorAnomaly => &mut self.counters.sensor_anomaly,
            FaultType::SoftwareResetRequired => &mut self.counters.software_reset_required,
            FaultType::Critical => &mut self.counters.critical,
            FaultType::None => return fault_id,
        };
        *counter = counter.saturating_add(1);

        if action == FaultAction::HardwareReset && fault != FaultType::Critical {
            self.counters.escalations = self.counters.escalations.saturating_add(1);
        }

        if self.history.is_full() {
            self.history.remove(0);
        }

        let _ = self.history.push(FaultRecord {
            id: fault_id,
            fault,
            action,
            mode_before,
            mode_after,
            timestamp,
        });
        fault_id
    }

    pub fn history(&self) -> &[FaultRecord] {
        &self.history
    }

    pub fn latest(&self) -> Option<&FaultRecord> {
        self.history.last()
    }

    pub fn counters(&self) -> &FaultCounters {
        &self.counters
    }

    /// Empties the history. Counters and fault ids are lifetime totals and
    /// keep counting.
    pub fn clear(&mut self) {
        self.history.clear();
    }
}

impl Default for FaultLog {
    fn default() -> Self {
        Self::new()
    }
}
