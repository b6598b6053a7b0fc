use crate::escalation::ResetAction;
use crate::fault::{FaultCounters, FaultType};
use crate::hal::TelemetrySink;
use crate::state::{AdcsMode, Millis, ModeTransition};
use heapless::Deque;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;

const TELEMETRY_BUFFER_SIZE: usize = 64;

/// State published after every control cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub cycle: u32,
    pub timestamp: Millis,
    pub mode: AdcsMode,
    pub mode_entry_time: Millis,
    pub previous_operational_mode: AdcsMode,
    pub angular_velocity: [f32; 3],
    pub power_level: f32,
    pub sun_alignment_error_deg: f32,
    pub transitions: Vec<ModeTransition>,
    pub fault: FaultType,
    pub reset_action: Option<ResetAction>,
    pub software_reset_count: u8,
    pub fault_counters: FaultCounters,
    pub halted: bool,
    pub last_error: Option<String>,
}

impl TelemetrySnapshot {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Default)]
struct BufferState {
    snapshots: Deque<TelemetrySnapshot, TELEMETRY_BUFFER_SIZE>,
    total_published: u32,
    dropped: u32,
}

/// Bounded in-memory sink keeping the most recent snapshots.
///
/// Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct TelemetryBuffer {
    state: Rc<RefCell<BufferState>>,
}

impl TelemetryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<TelemetrySnapshot> {
        self.state.borrow().snapshots.back().cloned()
    }

    pub fn snapshots(&self) -> Vec<TelemetrySnapshot> {
        self.state.borrow().snapshots.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_published(&self) -> u32 {
        self.state.borrow().total_published
    }

    /// Snapshots evicted before anyone drained them.
    pub fn dropped(&self) -> u32 {
        self.state.borrow().dropped
    }

    pub fn drain(&self) -> Vec<TelemetrySnapshot> {
        let mut state = self.state.borrow_mut();
        let mut drained = Vec::with_capacity(state.snapshots.len());
        while let Some(snapshot) = state.snapshots.pop_front() {
            drained.push(snapshot);
        }
        drained
    }

    /// One JSON document per line, oldest first.
    pub fn to_json_lines(&self) -> Result<String, serde_json::Error> {
        let mut out = String::new();
        for snapshot in self.state.borrow().snapshots.iter() {
            out.push_str(&snapshot.to_json()?);
            out.push('\n');
        }
        Ok(out)
    }
}

impl TelemetrySink for TelemetryBuffer {
    fn publish(&mut self, snapshot: &TelemetrySnapshot) {
        let mut state = self.state.borrow_mut();
        if state.snapshots.is_full() {
            state.snapshots.pop_front();
            state.dropped = state.dropped.saturating_add(1);
        }
        let _ = state.snapshots.push_back(snapshot.clone());
        state.total_published = state.total_published.saturating_add(1);
    }
}
