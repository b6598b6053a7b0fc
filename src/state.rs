use serde::{Deserialize, Serialize};

/// Monotonic milliseconds since boot.
pub type Millis = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdcsMode {
    Detumbling,
    SunAcquisition,
    NominalPointing,
    SafeMode,
    FaultRecovery,
}

impl AdcsMode {
    pub const ALL: [AdcsMode; 5] = [
        AdcsMode::Detumbling,
        AdcsMode::SunAcquisition,
        AdcsMode::NominalPointing,
        AdcsMode::SafeMode,
        AdcsMode::FaultRecovery,
    ];

    /// Safe mode and fault recovery are entered on faults and never treated
    /// as a resumable operating point.
    pub fn is_exceptional(self) -> bool {
        matches!(self, AdcsMode::SafeMode | AdcsMode::FaultRecovery)
    }

    pub fn code(self) -> u8 {
        match self {
            AdcsMode::Detumbling => 0,
            AdcsMode::SunAcquisition => 1,
            AdcsMode::NominalPointing => 2,
            AdcsMode::SafeMode => 3,
            AdcsMode::FaultRecovery => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(AdcsMode::Detumbling),
            1 => Some(AdcsMode::SunAcquisition),
            2 => Some(AdcsMode::NominalPointing),
            3 => Some(AdcsMode::SafeMode),
            4 => Some(AdcsMode::FaultRecovery),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AdcsMode::Detumbling => "DETUMBLING",
            AdcsMode::SunAcquisition => "SUN_ACQUISITION",
            AdcsMode::NominalPointing => "NOMINAL_POINTING",
            AdcsMode::SafeMode => "SAFE_MODE",
            AdcsMode::FaultRecovery => "FAULT_RECOVERY",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL.into_iter().find(|mode| mode.name() == normalized)
    }
}

impl core::fmt::Display for AdcsMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Live control state, owned and mutated only by the state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdcsState {
    pub mode: AdcsMode,
    pub mode_entry_time: Millis,
    pub angular_velocity: [f32; 3],
    pub power_level: f32,
    pub previous_operational_mode: AdcsMode,
}

impl AdcsState {
    pub fn new(mode: AdcsMode, now: Millis) -> Self {
        Self {
            mode,
            mode_entry_time: now,
            angular_velocity: [0.0; 3],
            power_level: 0.0,
            previous_operational_mode: AdcsMode::Detumbling,
        }
    }
}

/// Health signals sampled from the sensor and driver layer each cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthInputs {
    pub sensor_anomalous: bool,
    pub driver_reset_required: bool,
    pub critical: bool,
}

impl HealthInputs {
    pub fn any(&self) -> bool {
        self.sensor_anomalous || self.driver_reset_required || self.critical
    }
}

/// Immutable view of one cycle's inputs handed to the pure evaluators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub angular_velocity: [f32; 3],
    pub power_level: f32,
    pub sun_alignment_error_deg: f32,
    pub health: HealthInputs,
    pub now: Millis,
}

impl SensorSnapshot {
    pub fn max_axis_rate(&self) -> f32 {
        max_axis_rate(&self.angular_velocity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionCause {
    /// Exit criterion of the current mode was met.
    Autonomous,
    /// Forced by fault handling.
    Fault(crate::fault::FaultType),
    /// Requested by supervisory logic.
    Commanded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeTransition {
    pub from: AdcsMode,
    pub to: AdcsMode,
    pub at: Millis,
    pub cause: TransitionCause,
}

/// Largest body-rate magnitude. A non-finite axis reads as infinite so a
/// failed gyro never looks calm.
pub fn max_axis_rate(angular_velocity: &[f32; 3]) -> f32 {
    if angular_velocity.iter().any(|w| !w.is_finite()) {
        return f32::INFINITY;
    }
    angular_velocity.iter().fold(0.0_f32, |acc, w| acc.max(w.abs()))
}
