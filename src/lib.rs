//! # ADCS Supervisor
//!
//! Mode management for a small spacecraft's attitude determination and control
//! system, built to survive resets.
//!
//! ## Features
//!
//! - **Five-mode state machine**: detumbling, sun acquisition, nominal pointing,
//!   safe mode and fault recovery, with one evaluation per control cycle
//! - **Crash-safe persistence**: a 30-byte CRC-32 sealed record, verified on
//!   every write and validated before it is trusted at boot
//! - **Fault escalation**: bounded software resets, then a hardware power cycle
//! - **Watchdog liveness**: one refresh per completed cycle, nothing else
//! - **Hosted simulation**: a spacecraft model behind every hardware interface
//!
//! ## Quick Start
//!
//! ```rust
//! use adcs::persistence::{InMemoryNvm, PersistentStateStore};
//! use adcs::sim::{ManualClock, SimPlatform, SpacecraftModel};
//! use adcs::{AdcsConfig, AdcsMode, StateMachine};
//!
//! let mut platform = SimPlatform::new(SpacecraftModel::new(), ManualClock::new());
//! let store = PersistentStateStore::new(InMemoryNvm::new());
//! let mut machine = StateMachine::new(AdcsConfig::default(), store, platform.collaborators())
//!     .expect("default config is valid");
//!
//! assert_eq!(machine.mode(), AdcsMode::Detumbling);
//! let report = machine.run_cycle();
//! assert_eq!(report.mode, AdcsMode::SunAcquisition);
//! ```
//!
//! ## Architecture
//!
//! - [`state_machine`] - Cycle orchestration, boot policy and transitions
//! - [`persistence`] - Record codec, NVM devices and the verified store
//! - [`fault`] - Fault classification and the fault log
//! - [`escalation`] - Software-to-hardware reset escalation
//! - [`hal`] - Collaborator traits for sensors, actuators and platform services
//! - [`scheduler`] - Fixed-period cycle driving
//! - [`telemetry`] - Per-cycle snapshots and a bounded sink
//! - [`sim`] - Spacecraft model and fault injection for hosted runs

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod config;
pub mod escalation;
pub mod fault;
pub mod hal;
pub mod persistence;
pub mod scheduler;
pub mod sim;
pub mod state;
pub mod state_machine;
pub mod telemetry;
pub mod watchdog;

pub use config::{AdcsConfig, ConfigError};
pub use escalation::{ResetAction, ResetEscalation};
pub use fault::{FaultLog, FaultManager, FaultType};
pub use hal::Collaborators;
pub use persistence::{PersistentRecord, PersistentStateStore, StoredRecord};
pub use state::{AdcsMode, AdcsState, SensorSnapshot};
pub use state_machine::{BootReason, BootReport, CycleReport, StateMachine};
pub use telemetry::{TelemetryBuffer, TelemetrySnapshot};
