//! Watchdog double for hosted builds.
//!
//! [`SimulatedWatchdog`] implements [`Watchdog`] against a [`Clock`] and keeps
//! the refresh history in a cell shared with a [`WatchdogProbe`]. A harness
//! polls the probe and reboots the supervisor when it reports expiry, which
//! is what the hardware peripheral does unconditionally.

use crate::hal::{Clock, Watchdog};
use crate::state::Millis;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchdogStatus {
    Disarmed,
    Running { remaining_ms: Millis },
    Expired { overdue_ms: Millis },
}

#[derive(Debug, Default)]
struct WatchdogState {
    timeout_ms: Option<Millis>,
    last_refresh: Millis,
    refresh_count: u32,
    init_count: u32,
    max_gap_ms: Millis,
}

pub struct SimulatedWatchdog {
    clock: Box<dyn Clock>,
    state: Rc<RefCell<WatchdogState>>,
}

impl SimulatedWatchdog {
    pub fn new(clock: Box<dyn Clock>) -> (Self, WatchdogProbe) {
        let state = Rc::new(RefCell::new(WatchdogState::default()));
        let probe = WatchdogProbe {
            state: Rc::clone(&state),
        };
        (Self { clock, state }, probe)
    }
}

impl Watchdog for SimulatedWatchdog {
    fn initialize(&mut self, timeout_ms: Millis) {
        let now = self.clock.now_ms();
        let mut state = self.state.borrow_mut();
        state.timeout_ms = Some(timeout_ms);
        state.last_refresh = now;
        state.init_count = state.init_count.saturating_add(1);
        debug!(timeout_ms, "watchdog armed");
    }

    fn refresh(&mut self) {
        let now = self.clock.now_ms();
        let mut state = self.state.borrow_mut();
        let gap = now.saturating_sub(state.last_refresh);
        state.max_gap_ms = state.max_gap_ms.max(gap);
        state.last_refresh = now;
        state.refresh_count = state.refresh_count.saturating_add(1);
    }
}

/// Read side of a [`SimulatedWatchdog`].
#[derive(Debug, Clone)]
pub struct WatchdogProbe {
    state: Rc<RefCell<WatchdogState>>,
}

impl WatchdogProbe {
    pub fn status_at(&self, now: Millis) -> WatchdogStatus {
        let state = self.state.borrow();
        let Some(timeout) = state.timeout_ms else {
            return WatchdogStatus::Disarmed;
        };
        let elapsed = now.saturating_sub(state.last_refresh);
        if elapsed > timeout {
            WatchdogStatus::Expired {
                overdue_ms: elapsed - timeout,
            }
        } else {
            WatchdogStatus::Running {
                remaining_ms: timeout - elapsed,
            }
        }
    }

    pub fn expired_at(&self, now: Millis) -> bool {
        matches!(self.status_at(now), WatchdogStatus::Expired { .. })
    }

    pub fn refresh_count(&self) -> u32 {
        self.state.borrow().refresh_count
    }

    pub fn init_count(&self) -> u32 {
        self.state.borrow().init_count
    }

    pub fn timeout_ms(&self) -> Option<Millis> {
        self.state.borrow().timeout_ms
    }

    /// Longest interval observed between consecutive refreshes.
    pub fn max_gap_ms(&self) -> Millis {
        self.state.borrow().max_gap_ms
    }
}
