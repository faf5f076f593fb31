//! Simulation clock: owns step state, cadences, and pause.
//!
//! Time is always `start + step · dt_physics`, recomputed from the step
//! index so long runs do not accumulate rounding drift. A cadence is due
//! on the step whose end crosses one of its boundaries (counted from
//! the start date), so cadences need not divide the physics step.

use crate::{
    error::{SimError, SimResult},
    types::Step,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Slack for deciding that a boundary has been reached (s).
const BOUNDARY_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimClock {
    pub start:        DateTime<Utc>,
    pub end:          DateTime<Utc>,
    pub current_step: Step,
    pub dt_physics:   f64,
    pub dt_storage:   f64,
    pub dt_report:    f64,
    pub dt_output:    f64,
    pub paused:       bool,
}

/// Which periodic actions fall on the step just completed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DueActions {
    pub archive: bool,
    pub output:  bool,
    pub report:  bool,
}

impl SimClock {
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        dt_physics: f64,
        dt_storage: f64,
        dt_report: f64,
        dt_output: f64,
    ) -> SimResult<Self> {
        if end <= start {
            return Err(SimError::config("timing.end_date", "end date must be after start date"));
        }
        for (field, dt) in [
            ("timesteps.simulation", dt_physics),
            ("timesteps.storage", dt_storage),
            ("timesteps.reporting", dt_report),
            ("timesteps.output", dt_output),
        ] {
            if !(dt > 0.0) {
                return Err(SimError::config(field, format!("must be positive, got {dt}")));
            }
        }
        Ok(Self {
            start,
            end,
            current_step: 0,
            dt_physics,
            dt_storage,
            dt_report,
            dt_output,
            paused: true,
        })
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.current_step as f64 * self.dt_physics
    }

    pub fn total_seconds(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 1000.0
    }

    pub fn current_time(&self) -> DateTime<Utc> {
        self.time_at(self.elapsed_seconds())
    }

    /// Absolute time `elapsed` seconds after the start date (ms resolution).
    pub fn time_at(&self, elapsed: f64) -> DateTime<Utc> {
        self.start + Duration::milliseconds((elapsed * 1000.0).round() as i64)
    }

    pub fn is_finished(&self) -> bool {
        self.elapsed_seconds() >= self.total_seconds() - BOUNDARY_EPSILON
    }

    /// Number of steps a full run takes.
    pub fn total_steps(&self) -> Step {
        (self.total_seconds() / self.dt_physics - BOUNDARY_EPSILON).ceil().max(0.0) as Step
    }

    /// Advance one step. Returns the new step number.
    /// Panics if called while paused; callers must check.
    pub fn advance(&mut self) -> Step {
        assert!(!self.paused, "advance() called on paused clock");
        self.current_step += 1;
        self.current_step
    }

    pub fn pause(&mut self)  { self.paused = true;  }
    pub fn resume(&mut self) { self.paused = false; }

    /// True when the last step crossed a multiple of `cadence`.
    pub fn crossed(&self, cadence: f64) -> bool {
        if self.current_step == 0 {
            return false;
        }
        let now = self.elapsed_seconds();
        let before = (self.current_step - 1) as f64 * self.dt_physics;
        boundary_index(now, cadence) > boundary_index(before, cadence)
    }

    pub fn due(&self) -> DueActions {
        DueActions {
            archive: self.crossed(self.dt_storage),
            output:  self.crossed(self.dt_output),
            report:  self.crossed(self.dt_report),
        }
    }
}

fn boundary_index(elapsed: f64, cadence: f64) -> u64 {
    ((elapsed + BOUNDARY_EPSILON) / cadence).floor() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(dt: f64, storage: f64) -> SimClock {
        let start = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let mut c = SimClock::new(start, start + Duration::hours(2), dt, storage, 600.0, 3600.0).unwrap();
        c.resume();
        c
    }

    #[test]
    fn storage_due_on_every_crossing() {
        let mut c = clock(60.0, 60.0);
        let mut count = 0;
        while !c.is_finished() {
            c.advance();
            if c.due().archive {
                count += 1;
            }
        }
        assert_eq!(count, 120);
        assert_eq!(c.total_steps(), 120);
    }

    #[test]
    fn uneven_cadence_uses_boundary_crossing() {
        // 45 s steps against a 60 s cadence: due at 60, 120, 180 → steps 2, 3, 4
        let mut c = clock(45.0, 60.0);
        let due: Vec<bool> = (0..4).map(|_| { c.advance(); c.due().archive }).collect();
        assert_eq!(due, vec![false, true, true, true]);
        c.advance(); // 225 s
        assert!(!c.due().archive);
    }

    #[test]
    fn time_is_derived_from_step_index() {
        let mut c = clock(0.1, 60.0);
        for _ in 0..36_000 {
            c.advance();
        }
        assert_eq!(c.current_time(), c.start + Duration::hours(1));
    }
}
