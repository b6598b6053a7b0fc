//! Fixed-period cycle scheduling.
//!
//! The supervisor itself never sleeps. A [`CycleTicker`] separates cycles and
//! [`run_cycles`] drives a [`StateMachine`] against it until a cycle budget is
//! spent or the machine halts for a power cycle.

use crate::persistence::NvmDevice;
use crate::state_machine::{CycleReport, StateMachine};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::warn;

pub trait CycleTicker {
    /// Block until the next cycle is due.
    fn wait_for_next_tick(&mut self);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub ticks: u32,
    /// Cycles that ran past their deadline.
    pub overruns: u32,
    pub max_cycle_time_us: u32,
}

/// Deadline-based ticker for hosted builds. Deadlines advance by whole
/// periods so a slow cycle does not shift the schedule, and a cycle that ran
/// past its deadline resynchronises instead of bursting to catch up.
#[derive(Debug)]
pub struct FixedPeriodTicker {
    period: Duration,
    cycle_start: Instant,
    next_deadline: Instant,
    stats: SchedulerStats,
}

impl FixedPeriodTicker {
    pub fn new(period: Duration) -> Self {
        let now = Instant::now();
        Self {
            period,
            cycle_start: now,
            next_deadline: now + period,
            stats: SchedulerStats::default(),
        }
    }

    pub fn from_millis(period_ms: u32) -> Self {
        Self::new(Duration::from_millis(u64::from(period_ms)))
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }
}

impl CycleTicker for FixedPeriodTicker {
    fn wait_for_next_tick(&mut self) {
        let now = Instant::now();
        let cycle_time_us = u32::try_from(now.duration_since(self.cycle_start).as_micros()).unwrap_or(u32::MAX);
        self.stats.max_cycle_time_us = self.stats.max_cycle_time_us.max(cycle_time_us);

        if now < self.next_deadline {
            std::thread::sleep(self.next_deadline - now);
            self.next_deadline += self.period;
        } else {
            self.stats.overruns = self.stats.overruns.saturating_add(1);
            warn!(cycle_time_us, period_ms = self.period.as_millis() as u64, "cycle overran its period");
            self.next_deadline = now + self.period;
        }

        self.stats.ticks = self.stats.ticks.saturating_add(1);
        self.cycle_start = Instant::now();
    }
}

/// Run up to `max_cycles` cycles, or until halted when `None`.
///
/// Returns the number of cycles executed.
pub fn run_cycles<D, T, F>(
    machine: &mut StateMachine<D>,
    ticker: &mut T,
    max_cycles: Option<u32>,
    mut on_report: F,
) -> u32
where
    D: NvmDevice,
    T: CycleTicker,
    F: FnMut(&CycleReport),
{
    let mut executed = 0;
    while max_cycles.map_or(true, |max| executed < max) {
        let report = machine.run_cycle();
        executed += 1;
        on_report(&report);
        if report.halted {
            break;
        }
        ticker.wait_for_next_tick();
    }
    executed
}
