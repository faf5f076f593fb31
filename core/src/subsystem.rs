//! Subsystem trait and the per-step context handed to it.
//!
//! RULE: Every point pass implements SimSubsystem.
//! The engine calls update() on each registered subsystem
//! in registration order, every step.
//! Execution order is fixed and documented in engine.rs.

use crate::{
    domain::DomainManager,
    error::SimResult,
    event::SimEvent,
    met_field::MetFieldStore,
    point::PointStore,
    rng::SubsystemRng,
    types::Step,
};
use chrono::{DateTime, Utc};
use std::any::Any;

/// Read-only view of the world for one step. The met window has
/// already been advanced to cover `time`.
pub struct StepContext<'a> {
    pub step:   Step,
    /// Start of the step.
    pub time:   DateTime<Utc>,
    /// Physics step length (s).
    pub dt:     f64,
    pub met:    &'a MetFieldStore,
    pub domain: &'a DomainManager,
}

/// The contract every subsystem must fulfill.
pub trait SimSubsystem: Send {
    /// Unique stable name for this subsystem.
    fn name(&self) -> &'static str;

    /// Called once per step by the engine.
    ///
    /// - `ctx`:    step number, time, met fields and domain
    /// - `points`: the population; may be appended to or updated in place
    /// - `rng`:    this subsystem's deterministic RNG for this step
    ///
    /// Returns a vec of new events to add to the step's event log.
    fn update(
        &mut self,
        ctx: &StepContext<'_>,
        points: &mut PointStore,
        rng: &mut SubsystemRng,
    ) -> SimResult<Vec<SimEvent>>;

    /// For downcasting in tests and tooling only.
    /// Production sim code never uses this.
    fn as_any(&self) -> &dyn Any;
}
