// prog_core/src/utils/time_grid.rs

/// Slack when comparing computed times against a horizon or a save point.
pub const TIME_TOLERANCE: f64 = 1e-9;

/// Fixed-step times `t0 + k * dt`, ending at the last step that does not pass
/// `t0 + horizon`.
///
/// Each time is computed from its step index rather than by summing `dt`, so
/// round-off never adds a step past the horizon.
#[derive(Debug, Clone)]
pub struct TimeGrid {
    t0: f64,
    dt: f64,
    end: f64,
    step: u64,
}

impl TimeGrid {
    pub fn new(t0: f64, dt: f64, horizon: f64) -> Self {
        Self {
            t0,
            dt,
            end: t0 + horizon,
            step: 0,
        }
    }

    fn time_at(&self, step: u64) -> f64 {
        self.t0 + step as f64 * self.dt
    }

    /// Advances one step. `None` once the horizon has been reached.
    pub fn advance(&mut self) -> Option<f64> {
        if self.is_last() {
            return None;
        }
        self.step += 1;
        Some(self.time_at(self.step))
    }

    /// True when the current step is the final one before the horizon.
    pub fn is_last(&self) -> bool {
        self.time_at(self.step + 1) > self.end + TIME_TOLERANCE
    }
}

/// Periodic save times `t0 + k * save_freq` plus explicit save points.
#[derive(Debug, Clone)]
pub struct SaveSchedule {
    t0: f64,
    save_freq: f64,
    next_k: u64,
    save_pts: Vec<f64>,
    save_idx: usize,
}

impl SaveSchedule {
    /// Explicit points at or before `t0` are ignored.
    pub fn new(t0: f64, save_freq: f64, save_pts: &[f64]) -> Self {
        let mut save_pts: Vec<f64> = save_pts.iter().copied().filter(|p| *p > t0).collect();
        save_pts.sort_by(f64::total_cmp);
        Self {
            t0,
            save_freq,
            next_k: 1,
            save_pts,
            save_idx: 0,
        }
    }

    /// Whether `t` reached a save time, consuming every save time it passed.
    pub fn due(&mut self, t: f64) -> bool {
        let mut due = false;
        while t + TIME_TOLERANCE >= self.t0 + self.next_k as f64 * self.save_freq {
            self.next_k += 1;
            due = true;
        }
        while self.save_idx < self.save_pts.len() && t + TIME_TOLERANCE >= self.save_pts[self.save_idx] {
            self.save_idx += 1;
            due = true;
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fractional_step_stops_at_horizon() {
        let mut grid = TimeGrid::new(0.0, 0.1, 1.0);
        let mut times = Vec::new();
        while let Some(t) = grid.advance() {
            times.push(t);
        }
        assert_eq!(times.len(), 10);
        assert!(grid.is_last());
        assert!(*times.last().unwrap() <= 1.0 + TIME_TOLERANCE);
    }

    #[test]
    fn test_horizon_between_steps() {
        let mut grid = TimeGrid::new(2.0, 0.5, 1.2);
        let times: Vec<f64> = std::iter::from_fn(|| grid.advance()).collect();
        assert_eq!(times, vec![2.5, 3.0]);

        let mut empty = TimeGrid::new(0.0, 1.0, 0.0);
        assert!(empty.is_last());
        assert_eq!(empty.advance(), None);
    }

    #[test]
    fn test_save_schedule() {
        let mut saves = SaveSchedule::new(1.0, 0.1, &[1.25, 0.5]);
        let due: Vec<bool> = (1..=4)
            .map(|k| saves.due(1.0 + f64::from(k) * 0.05))
            .collect();
        // 1.05 no, 1.10 periodic, 1.15 no, 1.20 periodic.
        assert_eq!(due, vec![false, true, false, true]);
        assert!(saves.due(1.25));
        assert!(!saves.due(1.26));
        // Skipping ahead consumes every passed point at once.
        assert!(saves.due(2.0));
        assert!(!saves.due(2.05));
    }
}
