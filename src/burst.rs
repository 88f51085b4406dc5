use std::time::Duration;
use tracing::debug;

use crate::config::{BurstPolicy, CaptureConfig};

/// Burst-mode state machine. Decides how long the loop sleeps after each tick.
#[derive(Debug, Clone)]
pub struct BurstController {
    burst_length: u32,
    policy: BurstPolicy,
    normal_interval: Duration,
    burst_interval: Duration,
    remaining_ticks: u32,
}

impl BurstController {
    pub fn new(
        burst_length: u32,
        policy: BurstPolicy,
        normal_interval: Duration,
        burst_interval: Duration,
    ) -> Self {
        Self {
            burst_length,
            policy,
            normal_interval,
            burst_interval,
            remaining_ticks: 0,
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(
            config.burst_length,
            config.burst_policy,
            config.interval(),
            config.burst_interval(),
        )
    }

    pub fn is_active(&self) -> bool {
        self.remaining_ticks > 0
    }

    pub fn remaining_ticks(&self) -> u32 {
        self.remaining_ticks
    }

    /// Feed one tick's outcome and get the sleep before the next tick.
    ///
    /// The tick that runs the counter down to zero still sleeps the burst
    /// interval; the next negative tick is back at the normal interval.
    pub fn observe(&mut self, event_detected: bool) -> Duration {
        if self.burst_length == 0 {
            return self.normal_interval;
        }

        if event_detected {
            self.remaining_ticks = match self.policy {
                BurstPolicy::Reset => self.burst_length,
                BurstPolicy::Accumulate => self.remaining_ticks.saturating_add(self.burst_length),
            };
            debug!("Burst mode armed: {} ticks remaining", self.remaining_ticks);
            return self.burst_interval;
        }

        if self.remaining_ticks > 0 {
            self.remaining_ticks -= 1;
            if self.remaining_ticks == 0 {
                debug!("Burst mode ending");
            }
            return self.burst_interval;
        }

        self.normal_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NORMAL: Duration = Duration::from_millis(1000);
    const BURST: Duration = Duration::ZERO;

    fn run(controller: &mut BurstController, ticks: &[bool]) -> Vec<Duration> {
        ticks.iter().map(|&t| controller.observe(t)).collect()
    }

    #[test]
    fn test_burst_runs_out_after_length_ticks() {
        let mut c = BurstController::new(3, BurstPolicy::Reset, NORMAL, BURST);
        let out = run(&mut c, &[true, false, false, false, false, false]);
        assert_eq!(out, vec![BURST, BURST, BURST, BURST, NORMAL, NORMAL]);
        assert!(!c.is_active());
    }

    #[test]
    fn test_reset_policy_restarts_count() {
        let mut c = BurstController::new(3, BurstPolicy::Reset, NORMAL, BURST);
        let out = run(&mut c, &[true, false, true, false, false, false, false]);
        assert_eq!(out, vec![BURST, BURST, BURST, BURST, BURST, BURST, NORMAL]);
    }

    #[test]
    fn test_accumulate_policy_extends_count() {
        let mut c = BurstController::new(3, BurstPolicy::Accumulate, NORMAL, BURST);
        run(&mut c, &[true, false, true]);
        // 3 - 1 + 3
        assert_eq!(c.remaining_ticks(), 5);
    }

    #[test]
    fn test_zero_length_disables_burst() {
        let mut c = BurstController::new(0, BurstPolicy::Reset, NORMAL, BURST);
        let out = run(&mut c, &[true, true, false]);
        assert_eq!(out, vec![NORMAL, NORMAL, NORMAL]);
        assert!(!c.is_active());
    }

    #[test]
    fn test_active_flag_tracks_remaining() {
        let mut c = BurstController::new(1, BurstPolicy::Reset, NORMAL, BURST);
        c.observe(true);
        assert!(c.is_active());
        assert_eq!(c.observe(false), BURST);
        assert!(!c.is_active());
        assert_eq!(c.observe(false), NORMAL);
    }
}
