// ==============================================================================
// stuck.rs — STUCK DETECTION BY PERIODIC DISPLACEMENT SAMPLING
// ------------------------------------------------------------------------------
// Runs inside the simulation step loop on simulated time. Every sample
// interval it compares the body's position against the previous sample; a
// displacement under the threshold while the agent thinks it is making
// progress means the vehicle is wedged against something.
//
// The monitor only reports; the pursuit agent owns the recovery. While the
// agent is already recovering, low displacement is expected (braking and
// reversing barely move the body), so those windows never trigger a report.
// ==============================================================================

use rapier3d::prelude::*;

#[derive(Clone, Copy, Debug)]
pub struct StuckMonitorConfig {
    pub sample_interval: f32,   // s, simulated time between checks
    pub min_displacement: f32,  // m, below this over one interval = stuck
}

impl Default for StuckMonitorConfig {
    fn default() -> Self {
        Self {
            sample_interval: 2.0,
            min_displacement: 0.5,
        }
    }
}

pub struct StuckRecoveryMonitor {
    config: StuckMonitorConfig,
    accumulated: f32,
    last_sample: Option<Point<Real>>,
}

impl StuckRecoveryMonitor {
    pub fn new(config: StuckMonitorConfig) -> Self {
        Self {
            config,
            accumulated: 0.0,
            last_sample: None,
        }
    }

    /// Advance by one sim step. Returns true when this step completed a
    /// sample interval with sub-threshold displacement. `recovering`
    /// suppresses detection and resets the baseline so a recovery's own
    /// standstill never counts against the next interval.
    pub fn observe(&mut self, dt: f32, position: Point<Real>, recovering: bool) -> bool {
        if recovering {
            self.accumulated = 0.0;
            self.last_sample = Some(position);
            return false;
        }

        self.accumulated += dt;
        if self.accumulated < self.config.sample_interval {
            return false;
        }
        self.accumulated = 0.0;

        let stuck = match self.last_sample {
            Some(last) => (position - last).magnitude() < self.config.min_displacement,
            None => false,
        };
        self.last_sample = Some(position);
        stuck
    }

    pub fn reset(&mut self) {
        self.accumulated = 0.0;
        self.last_sample = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn run_interval(
        monitor: &mut StuckRecoveryMonitor,
        position: Point<Real>,
        recovering: bool,
    ) -> bool {
        let steps = (2.0_f32 / DT).ceil() as usize + 2;
        let mut fired = false;
        for _ in 0..steps {
            fired |= monitor.observe(DT, position, recovering);
        }
        fired
    }

    #[test]
    fn moving_vehicle_never_reports_stuck() {
        let mut monitor = StuckRecoveryMonitor::new(StuckMonitorConfig::default());
        let mut pos = point![0.0, 0.0, 0.0];
        for i in 0..(10.0 / DT) as usize {
            pos.z += 10.0 * DT; // 10 m/s, far over threshold
            assert!(!monitor.observe(DT, pos, false), "fired at step {i}");
        }
    }

    #[test]
    fn stationary_vehicle_reports_after_one_full_interval() {
        let mut monitor = StuckRecoveryMonitor::new(StuckMonitorConfig::default());
        let pos = point![3.0, 0.0, -4.0];
        // First interval establishes the baseline, second detects.
        assert!(!run_interval(&mut monitor, pos, false));
        assert!(run_interval(&mut monitor, pos, false));
    }

    #[test]
    fn slow_creep_below_threshold_still_counts_as_stuck() {
        let mut monitor = StuckRecoveryMonitor::new(StuckMonitorConfig::default());
        let mut pos = point![0.0, 0.0, 0.0];
        let mut fired = false;
        // 0.1 m/s: 0.2 m per interval, under the 0.5 m threshold.
        for _ in 0..(8.0 / DT) as usize {
            pos.z += 0.1 * DT;
            fired |= monitor.observe(DT, pos, false);
        }
        assert!(fired);
    }

    #[test]
    fn recovery_windows_are_exempt() {
        let mut monitor = StuckRecoveryMonitor::new(StuckMonitorConfig::default());
        let pos = point![0.0, 0.0, 0.0];
        assert!(!run_interval(&mut monitor, pos, false));
        // Standing still while recovering must not fire.
        assert!(!run_interval(&mut monitor, pos, true));
        // Still wedged after the recovery ends: the next interval fires.
        assert!(run_interval(&mut monitor, pos, false));
    }

    #[test]
    fn reset_clears_the_baseline() {
        let mut monitor = StuckRecoveryMonitor::new(StuckMonitorConfig::default());
        let pos = point![0.0, 0.0, 0.0];
        assert!(!run_interval(&mut monitor, pos, false));
        monitor.reset();
        assert!(!run_interval(&mut monitor, pos, false));
        assert!(run_interval(&mut monitor, pos, false));
    }
}
