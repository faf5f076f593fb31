//! Point culling: mark points that left the domain or outlived their
//! maximum age. Marking only; the engine compacts at the next step.

use crate::{
    error::SimResult,
    event::SimEvent,
    point::PointStore,
    rng::SubsystemRng,
    subsystem::{SimSubsystem, StepContext},
};

pub struct CullingSubsystem {
    max_age_seconds: Option<f64>,
}

impl CullingSubsystem {
    pub fn new(max_age_seconds: Option<f64>) -> Self {
        Self { max_age_seconds }
    }
}

impl SimSubsystem for CullingSubsystem {
    fn name(&self) -> &'static str { "culling" }

    fn update(
        &mut self,
        ctx: &StepContext<'_>,
        points: &mut PointStore,
        _rng: &mut SubsystemRng,
    ) -> SimResult<Vec<SimEvent>> {
        let max_age = self.max_age_seconds.unwrap_or(f64::INFINITY);
        let (mut out_of_domain, mut expired) = (0, 0);

        for p in points.as_mut_slice().iter_mut().filter(|p| p.alive) {
            if !ctx.domain.contains(p.lon, p.lat, p.pressure) {
                p.alive = false;
                out_of_domain += 1;
            } else if p.age_seconds > max_age {
                p.alive = false;
                expired += 1;
            }
        }

        if out_of_domain + expired == 0 {
            return Ok(vec![]);
        }
        log::debug!(
            "step={} culling: {out_of_domain} left the domain, {expired} expired",
            ctx.step
        );
        Ok(vec![SimEvent::PointsCulled { step: ctx.step, out_of_domain, expired }])
    }

    fn as_any(&self) -> &dyn std::any::Any { self }
}
