use super::model::SpacecraftModel;
use heapless::Vec;
use serde::{Deserialize, Serialize};
use tracing::warn;

const MAX_ACTIVE_FAULTS: usize = 8;
const MAX_EVENTS_PER_CYCLE: usize = 8;

// Per-cycle injection rates for random campaigns
const TUMBLE_RATE_PERCENT: f32 = 1.0;
const POWER_DIP_RATE_PERCENT: f32 = 0.5;
const SENSOR_ANOMALY_RATE_PERCENT: f32 = 0.5;
const DRIVER_FAULT_RATE_PERCENT: f32 = 0.3;

const MIN_FAULT_DURATION_CYCLES: u32 = 5;
const MAX_FAULT_DURATION_CYCLES: u32 = 30;
const PERSISTENT_FAULT_PROBABILITY: f32 = 0.1;

const DEFAULT_TUMBLE_KICK_RAD_S: f32 = 0.3;
const DEFAULT_DIP_SUPPLY_W: f32 = 3.0;
const DEFAULT_SEED: u64 = 0x1234_5678_9ABC_DEF0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InjectionKind {
    TumbleKick,
    PowerDip,
    SensorAnomaly,
    DriverHang,
    Critical,
}

/// A disturbance applied to the spacecraft model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InjectedFault {
    /// Adds to the body rates. Instantaneous.
    TumbleKick { delta_rad_s: [f32; 3] },
    /// Drops the supply to `supply_w` until the fault clears.
    PowerDip { supply_w: f32 },
    /// A persistent anomaly is not cleared by sensor reinitialization.
    SensorAnomaly { persistent: bool },
    DriverHang { persistent: bool },
    Critical,
}

impl InjectedFault {
    pub fn kind(&self) -> InjectionKind {
        match self {
            InjectedFault::TumbleKick { .. } => InjectionKind::TumbleKick,
            InjectedFault::PowerDip { .. } => InjectionKind::PowerDip,
            InjectedFault::SensorAnomaly { .. } => InjectionKind::SensorAnomaly,
            InjectedFault::DriverHang { .. } => InjectionKind::DriverHang,
            InjectedFault::Critical => InjectionKind::Critical,
        }
    }

    fn apply(&self, model: &mut SpacecraftModel) {
        match *self {
            InjectedFault::TumbleKick { delta_rad_s } => {
                for (w, dw) in model.angular_velocity.iter_mut().zip(delta_rad_s) {
                    *w += dw;
                }
            }
            InjectedFault::PowerDip { supply_w } => model.supply_w = supply_w,
            InjectedFault::SensorAnomaly { persistent } => {
                model.sensor_anomalous = true;
                model.anomaly_persistent = persistent;
            }
            InjectedFault::DriverHang { persistent } => {
                model.driver_reset_required = true;
                model.driver_fault_persistent = persistent;
            }
            InjectedFault::Critical => model.critical = true,
        }
    }

    fn clear(&self, model: &mut SpacecraftModel, saved_supply_w: f32) {
        match self {
            InjectedFault::TumbleKick { .. } => {}
            InjectedFault::PowerDip { .. } => model.supply_w = saved_supply_w,
            InjectedFault::SensorAnomaly { .. } => {
                model.sensor_anomalous = false;
                model.anomaly_persistent = false;
            }
            InjectedFault::DriverHang { .. } => {
                model.driver_reset_required = false;
                model.driver_fault_persistent = false;
            }
            InjectedFault::Critical => model.critical = false,
        }
    }
}

/// A fault injected at a fixed cycle. A zero duration leaves the fault active
/// until [`FaultInjector::clear_faults`] is called.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduledFault {
    pub at_cycle: u32,
    pub fault: InjectedFault,
    pub duration_cycles: u32,
}

impl ScheduledFault {
    pub fn new(at_cycle: u32, fault: InjectedFault, duration_cycles: u32) -> Self {
        Self {
            at_cycle,
            fault,
            duration_cycles,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActiveFault {
    pub fault: InjectedFault,
    pub cycles_remaining: u32,
    pub auto_recoverable: bool,
    pub injected_at_cycle: u32,
    saved_supply_w: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InjectionEvent {
    Injected(InjectedFault),
    Recovered(InjectedFault),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultInjectionStats {
    pub total_faults_injected: u32,
    pub tumble_kicks: u32,
    pub power_dips: u32,
    pub sensor_anomalies: u32,
    pub driver_hangs: u32,
    pub critical_faults: u32,
    pub auto_recovered_faults: u32,
    pub manual_cleared_faults: u32,
    pub current_active_faults: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultInjectionConfig {
    pub enabled: bool,
    /// Random injection on top of the script.
    pub random: bool,
    pub tumble_rate_percent: f32,
    pub power_dip_rate_percent: f32,
    pub sensor_anomaly_rate_percent: f32,
    pub driver_fault_rate_percent: f32,
    pub min_duration_cycles: u32,
    pub max_duration_cycles: u32,
    pub persistent_probability: f32,
    pub tumble_kick_rad_s: f32,
    pub dip_supply_w: f32,
    pub seed: u64,
}

impl Default for FaultInjectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            random: false,
            tumble_rate_percent: TUMBLE_RATE_PERCENT,
            power_dip_rate_percent: POWER_DIP_RATE_PERCENT,
            sensor_anomaly_rate_percent: SENSOR_ANOMALY_RATE_PERCENT,
            driver_fault_rate_percent: DRIVER_FAULT_RATE_PERCENT,
            min_duration_cycles: MIN_FAULT_DURATION_CYCLES,
            max_duration_cycles: MAX_FAULT_DURATION_CYCLES,
            persistent_probability: PERSISTENT_FAULT_PROBABILITY,
            tumble_kick_rad_s: DEFAULT_TUMBLE_KICK_RAD_S,
            dip_supply_w: DEFAULT_DIP_SUPPLY_W,
            seed: DEFAULT_SEED,
        }
    }
}

/// Scripted and probabilistic disturbance engine for the spacecraft model.
#[derive(Debug)]
pub struct FaultInjector {
    config: FaultInjectionConfig,
    script: std::vec::Vec<ScheduledFault>,
    active_faults: Vec<ActiveFault, MAX_ACTIVE_FAULTS>,
    stats: FaultInjectionStats,
    cycle_count: u32,

    // Linear congruential generator so campaigns replay exactly
    rng_state: u64,
}

impl FaultInjector {
    pub fn new(config: FaultInjectionConfig) -> Self {
        Self {
            rng_state: config.seed,
            config,
            script: std::vec::Vec::new(),
            active_faults: Vec::new(),
            stats: FaultInjectionStats::default(),
            cycle_count: 0,
        }
    }

    /// Injector that only plays back `script`.
    pub fn scripted(script: std::vec::Vec<ScheduledFault>) -> Self {
        let mut injector = Self::new(FaultInjectionConfig::default());
        injector.script = script;
        injector
    }

    /// Injector with random campaigns enabled and no script.
    pub fn random(seed: u64) -> Self {
        Self::new(FaultInjectionConfig {
            random: true,
            seed,
            ..FaultInjectionConfig::default()
        })
    }

    pub fn schedule(&mut self, fault: ScheduledFault) {
        self.script.push(fault);
    }

    /// Advance one cycle. Call before the supervisor samples its sensors.
    pub fn update(&mut self, model: &mut SpacecraftModel) -> Vec<InjectionEvent, MAX_EVENTS_PER_CYCLE> {
        let mut events = Vec::new();
        if !self.config.enabled {
            return events;
        }

        self.cycle_count = self.cycle_count.wrapping_add(1);
        self.update_active_faults(model, &mut events);
        self.play_script(model, &mut events);
        if self.config.random {
            self.attempt_random_injection(model, &mut events);
        }

        self.stats.current_active_faults = self.active_faults.len() as u8;
        events
    }

    fn update_active_faults(&mut self, model: &mut SpacecraftModel, events: &mut Vec<InjectionEvent, MAX_EVENTS_PER_CYCLE>) {
        let mut index = 0;
        while index < self.active_faults.len() {
            let active = &mut self.active_faults[index];
            if !active.auto_recoverable {
                index += 1;
                continue;
            }
            active.cycles_remaining = active.cycles_remaining.saturating_sub(1);
            if active.cycles_remaining > 0 {
                index += 1;
                continue;
            }
            let expired = self.active_faults.swap_remove(index);
            expired.fault.clear(model, expired.saved_supply_w);
            self.stats.auto_recovered_faults += 1;
            let _ = events.push(InjectionEvent::Recovered(expired.fault));
        }
    }

    fn play_script(&mut self, model: &mut SpacecraftModel, events: &mut Vec<InjectionEvent, MAX_EVENTS_PER_CYCLE>) {
        let cycle = self.cycle_count;
        let due: std::vec::Vec<ScheduledFault> = self
            .script
            .iter()
            .filter(|scheduled| scheduled.at_cycle == cycle)
            .copied()
            .collect();
        for scheduled in due {
            self.inject(model, scheduled.fault, scheduled.duration_cycles, events);
        }
    }

    fn attempt_random_injection(&mut self, model: &mut SpacecraftModel, events: &mut Vec<InjectionEvent, MAX_EVENTS_PER_CYCLE>) {
        let kinds = [
            (InjectionKind::TumbleKick, self.config.tumble_rate_percent),
            (InjectionKind::PowerDip, self.config.power_dip_rate_percent),
            (InjectionKind::SensorAnomaly, self.config.sensor_anomaly_rate_percent),
            (InjectionKind::DriverHang, self.config.driver_fault_rate_percent),
        ];

        for (kind, rate_percent) in kinds {
            if self.is_active(kind) || !self.should_inject_fault(rate_percent) {
                continue;
            }
            let persistent = self.random_float() < self.config.persistent_probability;
            let fault = match kind {
                InjectionKind::TumbleKick => {
                    let axis = (self.random_u32() % 3) as usize;
                    let mut delta_rad_s = [0.0; 3];
                    delta_rad_s[axis] = self.config.tumble_kick_rad_s;
                    InjectedFault::TumbleKick { delta_rad_s }
                }
                InjectionKind::PowerDip => InjectedFault::PowerDip {
                    supply_w: self.config.dip_supply_w,
                },
                InjectionKind::SensorAnomaly => InjectedFault::SensorAnomaly { persistent },
                InjectionKind::DriverHang => InjectedFault::DriverHang { persistent },
                InjectionKind::Critical => continue,
            };
            let duration = self.random_duration();
            self.inject(model, fault, duration, events);
        }
    }

    fn inject(
        &mut self,
        model: &mut SpacecraftModel,
        fault: InjectedFault,
        duration_cycles: u32,
        events: &mut Vec<InjectionEvent, MAX_EVENTS_PER_CYCLE>,
    ) {
        let saved_supply_w = self
            .active_faults
            .iter()
            .find(|active| active.fault.kind() == InjectionKind::PowerDip)
            .map_or(model.supply_w, |active| active.saved_supply_w);

        fault.apply(model);
        self.update_injection_stats(fault.kind());
        let _ = events.push(InjectionEvent::Injected(fault));

        if fault.kind() == InjectionKind::TumbleKick {
            return;
        }
        let active = ActiveFault {
            fault,
            cycles_remaining: duration_cycles,
            auto_recoverable: duration_cycles > 0,
            injected_at_cycle: self.cycle_count,
            saved_supply_w,
        };
        if self.active_faults.push(active).is_err() {
            // Table full; the fault stays applied but will need a manual clear.
            warn!(kind = ?fault.kind(), "active fault table full");
        }
    }

    fn is_active(&self, kind: InjectionKind) -> bool {
        self.active_faults.iter().any(|active| active.fault.kind() == kind)
    }

    fn should_inject_fault(&mut self, rate_percent: f32) -> bool {
        self.random_float() < (rate_percent / 100.0)
    }

    fn random_duration(&mut self) -> u32 {
        let range = self
            .config
            .max_duration_cycles
            .saturating_sub(self.config.min_duration_cycles);
        if range == 0 {
            return self.config.min_duration_cycles.max(1);
        }
        self.config.min_duration_cycles.max(1) + self.random_u32() % range
    }

    fn update_injection_stats(&mut self, kind: InjectionKind) {
        self.stats.total_faults_injected += 1;
        match kind {
            InjectionKind::TumbleKick => self.stats.tumble_kicks += 1,
            InjectionKind::PowerDip => self.stats.power_dips += 1,
            InjectionKind::SensorAnomaly => self.stats.sensor_anomalies += 1,
            InjectionKind::DriverHang => self.stats.driver_hangs += 1,
            InjectionKind::Critical => self.stats.critical_faults += 1,
        }
    }

    /// Clear every active fault, or only those of `kind`.
    pub fn clear_faults(&mut self, model: &mut SpacecraftModel, kind: Option<InjectionKind>) {
        let initial_count = self.active_faults.len();
        let mut index = 0;
        while index < self.active_faults.len() {
            if kind.map_or(true, |k| self.active_faults[index].fault.kind() == k) {
                let removed = self.active_faults.swap_remove(index);
                removed.fault.clear(model, removed.saved_supply_w);
            } else {
                index += 1;
            }
        }
        let cleared_count = initial_count - self.active_faults.len();
        self.stats.manual_cleared_faults += cleared_count as u32;
        self.stats.current_active_faults = self.active_faults.len() as u8;
    }

    pub fn stats(&self) -> &FaultInjectionStats {
        &self.stats
    }

    pub fn config(&self) -> &FaultInjectionConfig {
        &self.config
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
    }

    pub fn active_faults(&self) -> &[ActiveFault] {
        &self.active_faults
    }

    pub fn cycle(&self) -> u32 {
        self.cycle_count
    }

    fn next_random(&mut self) -> u64 {
        // Numerical Recipes LCG constants
        self.rng_state = self.rng_state.wrapping_mul(1664525).wrapping_add(1013904223);
        self.rng_state
    }

    fn random_u32(&mut self) -> u32 {
        (self.next_random() >> 16) as u32
    }

    fn random_float(&mut self) -> f32 {
        (self.next_random() as f32) / (u64::MAX as f32)
    }
}

impl Default for FaultInjector {
    fn default() -> Self {
        Self::new(FaultInjectionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_injector_does_nothing() {
        let mut injector = FaultInjector::scripted(vec![ScheduledFault::new(
            1,
            InjectedFault::Critical,
            1,
        )]);
        injector.set_enabled(false);
        let mut model = SpacecraftModel::new();

        assert!(injector.update(&mut model).is_empty());
        assert!(!model.critical);
    }

    #[test]
    fn test_scripted_power_dip_restores_supply() {
        let mut injector = FaultInjector::scripted(vec![ScheduledFault::new(
            2,
            InjectedFault::PowerDip { supply_w: 3.0 },
            3,
        )]);
        let mut model = SpacecraftModel::new().with_supply(6.0);

        injector.update(&mut model);
        assert_eq!(model.supply_w, 6.0);

        let events = injector.update(&mut model);
        assert_eq!(events.len(), 1);
        assert_eq!(model.supply_w, 3.0);

        injector.update(&mut model);
        injector.update(&mut model);
        assert_eq!(model.supply_w, 3.0);

        let events = injector.update(&mut model);
        assert!(matches!(events[0], InjectionEvent::Recovered(InjectedFault::PowerDip { .. })));
        assert_eq!(model.supply_w, 6.0);
        assert_eq!(injector.stats().auto_recovered_faults, 1);
    }

    #[test]
    fn test_tumble_kick_is_instantaneous() {
        let mut injector = FaultInjector::scripted(vec![ScheduledFault::new(
            1,
            InjectedFault::TumbleKick {
                delta_rad_s: [0.0, 0.25, 0.0],
            },
            0,
        )]);
        let mut model = SpacecraftModel::new();

        injector.update(&mut model);
        assert_eq!(model.angular_velocity, [0.0, 0.25, 0.0]);
        assert!(injector.active_faults().is_empty());
    }

    #[test]
    fn test_manual_clear_removes_permanent_faults() {
        let mut injector = FaultInjector::scripted(vec![ScheduledFault::new(
            1,
            InjectedFault::SensorAnomaly { persistent: true },
            0,
        )]);
        let mut model = SpacecraftModel::new();

        injector.update(&mut model);
        for _ in 0..50 {
            injector.update(&mut model);
        }
        assert!(model.sensor_anomalous);

        injector.clear_faults(&mut model, Some(InjectionKind::SensorAnomaly));
        assert!(!model.sensor_anomalous);
        assert_eq!(injector.stats().manual_cleared_faults, 1);
        assert_eq!(injector.stats().current_active_faults, 0);
    }

    #[test]
    fn test_random_campaign_is_deterministic() {
        let run = |seed| {
            let mut injector = FaultInjector::random(seed);
            let mut model = SpacecraftModel::new();
            for _ in 0..500 {
                injector.update(&mut model);
            }
            injector.stats().clone()
        };
        assert_eq!(run(7), run(7));
        assert!(run(7).total_faults_injected > 0);
    }
}
