#![allow(dead_code)]

use adcs::persistence::{InMemoryNvm, PersistentRecord, PersistentStateStore};
use adcs::sim::{ManualClock, SimPlatform, SpacecraftModel};
use adcs::state::AdcsMode;
use adcs::state_machine::{CycleReport, StateMachine};
use adcs::AdcsConfig;

/// A supervisor on a simulated platform with RAM-backed storage and a hand
/// driven clock. Model dynamics only advance when a test asks for it.
pub struct Harness {
    pub config: AdcsConfig,
    pub clock: ManualClock,
    pub platform: SimPlatform<ManualClock>,
    pub nvm: InMemoryNvm,
    pub machine: StateMachine<InMemoryNvm>,
}

impl Harness {
    pub fn new(model: SpacecraftModel) -> Self {
        Self::with_nvm(model, InMemoryNvm::new())
    }

    pub fn with_nvm(model: SpacecraftModel, nvm: InMemoryNvm) -> Self {
        Self::with_config(AdcsConfig::default(), model, nvm)
    }

    pub fn with_config(config: AdcsConfig, model: SpacecraftModel, nvm: InMemoryNvm) -> Self {
        let clock = ManualClock::starting_at(10_000);
        let mut platform = SimPlatform::new(model, clock.clone());
        let machine = StateMachine::new(
            config.clone(),
            PersistentStateStore::new(nvm.clone()),
            platform.collaborators(),
        )
        .expect("valid config");
        Self {
            config,
            clock,
            platform,
            nvm,
            machine,
        }
    }

    /// Run one cycle, then let one period of time pass.
    pub fn cycle(&mut self) -> CycleReport {
        let report = self.machine.run_cycle();
        self.clock.advance(self.config.cycle_period_ms);
        report
    }

    /// Like [`Harness::cycle`] but also integrates the spacecraft dynamics.
    pub fn cycle_with_dynamics(&mut self) -> CycleReport {
        let report = self.machine.run_cycle();
        self.clock.advance(self.config.cycle_period_ms);
        self.platform.step(self.config.cycle_period_ms);
        report
    }

    /// Power cycle: a new supervisor boots against the same storage.
    pub fn reboot(&mut self) {
        self.machine = StateMachine::new(
            self.config.clone(),
            PersistentStateStore::new(self.nvm.clone()),
            self.platform.collaborators(),
        )
        .expect("valid config");
    }

    /// Drive a calm spacecraft from boot to nominal pointing.
    pub fn to_nominal(&mut self) {
        {
            let mut model = self.platform.model_mut();
            model.angular_velocity = [0.0; 3];
            model.sun_error_deg = 0.5;
        }
        for _ in 0..4 {
            if self.machine.mode() == AdcsMode::NominalPointing {
                return;
            }
            self.cycle();
        }
        assert_eq!(self.machine.mode(), AdcsMode::NominalPointing);
    }

    pub fn stored(&self) -> PersistentRecord {
        let block = self.nvm.contents().expect("record stored");
        PersistentRecord::decode(&block).expect("known mode")
    }
}

pub fn calm_model() -> SpacecraftModel {
    SpacecraftModel::new()
}

pub fn sealed_block(record: PersistentRecord) -> [u8; 30] {
    record.sealed().encode()
}

pub fn record(mode: AdcsMode, angular_velocity: [f32; 3], power_level: f32) -> PersistentRecord {
    PersistentRecord::new(mode, 1_000, angular_velocity, power_level, 1.0, 0)
}
