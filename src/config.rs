//! Supervisor thresholds and timing.
//!
//! Every numeric limit the state machine and fault classifier compare against
//! lives here. Angular rates are carried in rad/s throughout the crate; use
//! [`deg_per_s_to_rad_per_s`] when a limit is specified in degrees per second.

use serde::{Deserialize, Serialize};
use static_assertions::const_assert;
use thiserror::Error;

/// Any axis above this rate is a `HighAngularRate` fault (rad/s).
pub const DEFAULT_MAX_ANGULAR_RATE_RAD_S: f32 = 0.1;
/// All axes strictly below this rate end detumbling (rad/s).
pub const DEFAULT_ANGULAR_RATE_STABLE_RAD_S: f32 = 0.1;
/// Power below this level is a `LowPower` fault (W).
pub const DEFAULT_LOW_POWER_W: f32 = 4.0;
/// Power at or above this level lets safe mode resume (W).
pub const DEFAULT_POWER_RESTORED_W: f32 = 4.5;
/// Sun acquisition completes once the alignment error is within this (deg).
pub const DEFAULT_SUN_ALIGNMENT_TOLERANCE_DEG: f32 = 2.0;
pub const DEFAULT_ESCALATION_THRESHOLD: u8 = 3;
pub const DEFAULT_CYCLE_PERIOD_MS: u32 = 1000;
pub const DEFAULT_WATCHDOG_TIMEOUT_MS: u32 = 2500;
pub const DEFAULT_FAULT_RECOVERY_DWELL_MS: u32 = 5000;

/// Minimum slack between one cycle period and the watchdog timeout.
pub const WATCHDOG_MIN_MARGIN_MS: u32 = 100;

const_assert!(DEFAULT_WATCHDOG_TIMEOUT_MS > DEFAULT_CYCLE_PERIOD_MS + WATCHDOG_MIN_MARGIN_MS);
const_assert!(DEFAULT_ESCALATION_THRESHOLD > 0);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdcsConfig {
    pub max_angular_rate_rad_s: f32,
    pub angular_rate_stable_rad_s: f32,
    pub low_power_w: f32,
    pub power_restored_w: f32,
    pub sun_alignment_tolerance_deg: f32,
    pub escalation_threshold: u8,
    pub cycle_period_ms: u32,
    pub watchdog_timeout_ms: u32,
    pub fault_recovery_dwell_ms: u32,
}

impl Default for AdcsConfig {
    fn default() -> Self {
        Self {
            max_angular_rate_rad_s: DEFAULT_MAX_ANGULAR_RATE_RAD_S,
            angular_rate_stable_rad_s: DEFAULT_ANGULAR_RATE_STABLE_RAD_S,
            low_power_w: DEFAULT_LOW_POWER_W,
            power_restored_w: DEFAULT_POWER_RESTORED_W,
            sun_alignment_tolerance_deg: DEFAULT_SUN_ALIGNMENT_TOLERANCE_DEG,
            escalation_threshold: DEFAULT_ESCALATION_THRESHOLD,
            cycle_period_ms: DEFAULT_CYCLE_PERIOD_MS,
            watchdog_timeout_ms: DEFAULT_WATCHDOG_TIMEOUT_MS,
            fault_recovery_dwell_ms: DEFAULT_FAULT_RECOVERY_DWELL_MS,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),
}

impl AdcsConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let rates = [self.max_angular_rate_rad_s, self.angular_rate_stable_rad_s];
        if rates.iter().any(|r| !r.is_finite() || *r <= 0.0) {
            return Err(ConfigError::Invalid("angular rate thresholds must be positive"));
        }
        if self.angular_rate_stable_rad_s > self.max_angular_rate_rad_s {
            return Err(ConfigError::Invalid(
                "angular_rate_stable_rad_s must not exceed max_angular_rate_rad_s",
            ));
        }
        if !self.low_power_w.is_finite() || self.low_power_w < 0.0 {
            return Err(ConfigError::Invalid("low_power_w must be non-negative"));
        }
        if !self.power_restored_w.is_finite() || self.power_restored_w < self.low_power_w {
            return Err(ConfigError::Invalid("power_restored_w must be >= low_power_w"));
        }
        if !self.sun_alignment_tolerance_deg.is_finite() || self.sun_alignment_tolerance_deg <= 0.0 {
            return Err(ConfigError::Invalid("sun_alignment_tolerance_deg must be positive"));
        }
        if self.escalation_threshold == 0 {
            return Err(ConfigError::Invalid("escalation_threshold must be at least 1"));
        }
        if self.cycle_period_ms == 0 {
            return Err(ConfigError::Invalid("cycle_period_ms must be non-zero"));
        }
        if self.watchdog_timeout_ms <= self.cycle_period_ms.saturating_add(WATCHDOG_MIN_MARGIN_MS) {
            return Err(ConfigError::Invalid(
                "watchdog_timeout_ms must exceed cycle_period_ms plus margin",
            ));
        }
        Ok(())
    }
}

pub fn deg_per_s_to_rad_per_s(deg_per_s: f32) -> f32 {
    deg_per_s.to_radians()
}
