//! Software-to-hardware reset escalation.
//!
//! Repeated driver resets that fail to clear a fault point at something
//! software cannot reach, such as a wedged peripheral. After `threshold`
//! consecutive software resets the next trigger power-cycles the hardware.
//! The counter is carried in the persisted record so it survives the resets
//! it is counting.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetAction {
    SoftwareReset,
    HardwareReset,
}

#[derive(Debug, Clone)]
pub struct ResetEscalation {
    count: u8,
    threshold: u8,
}

impl ResetEscalation {
    pub fn new(threshold: u8) -> Self {
        Self::restore(0, threshold)
    }

    /// Resume from a persisted counter.
    pub fn restore(count: u8, threshold: u8) -> Self {
        Self {
            count,
            threshold: threshold.max(1),
        }
    }

    /// Action the next trigger will receive, without consuming it.
    pub fn next_action(&self) -> ResetAction {
        if self.count >= self.threshold {
            ResetAction::HardwareReset
        } else {
            ResetAction::SoftwareReset
        }
    }

    /// Account for one software-reset trigger and return the action to take.
    ///
    /// A hardware reset zeroes the counter so the hierarchy starts over after
    /// the power cycle.
    pub fn register_trigger(&mut self) -> ResetAction {
        let action = self.next_action();
        match action {
            ResetAction::SoftwareReset => self.count = self.count.saturating_add(1),
            ResetAction::HardwareReset => self.count = 0,
        }
        action
    }

    /// A fault-free cycle ends the consecutive run. Returns true if the
    /// counter changed.
    pub fn clear(&mut self) -> bool {
        let changed = self.count != 0;
        self.count = 0;
        changed
    }

    pub fn count(&self) -> u8 {
        self.count
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourth_trigger_escalates() {
        let mut escalation = ResetEscalation::new(3);
        assert_eq!(escalation.register_trigger(), ResetAction::SoftwareReset);
        assert_eq!(escalation.register_trigger(), ResetAction::SoftwareReset);
        assert_eq!(escalation.register_trigger(), ResetAction::SoftwareReset);
        assert_eq!(escalation.count(), 3);
        assert_eq!(escalation.next_action(), ResetAction::HardwareReset);
        assert_eq!(escalation.register_trigger(), ResetAction::HardwareReset);
        assert_eq!(escalation.count(), 0);
    }

    #[test]
    fn test_clear_breaks_the_run() {
        let mut escalation = ResetEscalation::new(3);
        escalation.register_trigger();
        escalation.register_trigger();
        assert!(escalation.clear());
        assert!(!escalation.clear());
        for _ in 0..3 {
            assert_eq!(escalation.register_trigger(), ResetAction::SoftwareReset);
        }
    }

    #[test]
    fn test_restored_counter_at_threshold_escalates_immediately() {
        let mut escalation = ResetEscalation::restore(3, 3);
        assert_eq!(escalation.register_trigger(), ResetAction::HardwareReset);
    }
}
