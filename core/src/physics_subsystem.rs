//! Point physics: advect every alive point through the wind field.
//!
//! Positions move with `lon += u·dt / (R·cos φ)`, `lat += v·dt / R`,
//! `p += ω·dt`. Points are independent: each worker reads the shared
//! met view and writes only its own point, and every point's arithmetic
//! runs in the same order whatever thread picks it up, so parallel
//! results match a sequential pass bit for bit.

use crate::{
    error::SimResult,
    event::SimEvent,
    met_field::{MetFields, MetSample},
    point::{PointStore, Point},
    rng::SubsystemRng,
    subsystem::{SimSubsystem, StepContext},
    types::{displace, WindVector},
};
use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationScheme {
    /// Explicit forward Euler.
    #[default]
    Euler,
    /// Explicit midpoint (second-order Runge–Kutta).
    Rk2,
}

pub struct PhysicsSubsystem {
    scheme: IntegrationScheme,
}

impl PhysicsSubsystem {
    pub fn new(scheme: IntegrationScheme) -> Self {
        Self { scheme }
    }

    pub fn scheme(&self) -> IntegrationScheme {
        self.scheme
    }
}

fn displaced(lon: f64, lat: f64, pressure: f64, wind: WindVector, dt: f64) -> (f64, f64, f64) {
    let (lon, lat) = displace(lon, lat, wind.u * dt, wind.v * dt);
    (lon, lat, pressure + wind.omega * dt)
}

/// Integrate one point over `dt`. Returns the sample taken at the
/// point's starting position and time.
fn advect(
    point: &mut Point,
    fields: &MetFields<'_>,
    scheme: IntegrationScheme,
    time: DateTime<Utc>,
    mid_time: DateTime<Utc>,
    dt: f64,
) -> MetSample {
    let start = fields.sample(point.lon, point.lat, point.pressure, time);
    let wind = match scheme {
        IntegrationScheme::Euler => start.wind,
        IntegrationScheme::Rk2 => {
            let (lon, lat, p) = displaced(point.lon, point.lat, point.pressure, start.wind, 0.5 * dt);
            fields.interpolate(lon, lat, p, mid_time)
        }
    };
    let (lon, lat, pressure) = displaced(point.lon, point.lat, point.pressure, wind, dt);
    point.lon = lon;
    point.lat = lat;
    point.pressure = pressure;
    point.age_seconds += dt;
    start
}

impl SimSubsystem for PhysicsSubsystem {
    fn name(&self) -> &'static str { "physics" }

    fn update(
        &mut self,
        ctx: &StepContext<'_>,
        points: &mut PointStore,
        _rng: &mut SubsystemRng,
    ) -> SimResult<Vec<SimEvent>> {
        // Barrier: the met window is fixed for the rest of the step.
        let fields = ctx.met.fields()?;
        let (time, dt, scheme) = (ctx.time, ctx.dt, self.scheme);
        let mid_time = time + Duration::milliseconds((dt * 500.0).round() as i64);
        let alive = points.alive_count();

        // The domain owns the box-height switch; it is read once per step,
        // never per point.
        if ctx.domain.box_heights_enabled() {
            let domain = ctx.domain;
            points
                .as_mut_slice()
                .par_iter_mut()
                .filter(|p| p.alive)
                .for_each(|p| {
                    let pressure = p.pressure;
                    let sample = advect(p, &fields, scheme, time, mid_time, dt);
                    p.aux.box_height_m = Some(domain.box_height(pressure, sample.level_thickness));
                });
        } else {
            points
                .as_mut_slice()
                .par_iter_mut()
                .filter(|p| p.alive)
                .for_each(|p| {
                    advect(p, &fields, scheme, time, mid_time, dt);
                });
        }

        log::trace!("step={} physics: advected {alive} points", ctx.step);
        Ok(vec![SimEvent::PointsAdvected { step: ctx.step, count: alive }])
    }

    fn as_any(&self) -> &dyn std::any::Any { self }
}
