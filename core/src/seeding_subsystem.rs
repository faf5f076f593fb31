//! Point seeding: releases and flight-track emitters.
//!
//! Each step covers the window [time, time + dt). Emitters run in
//! configuration order (releases first, then flights), so identical
//! configurations always produce identical id sequences.

use crate::{
    config::{FlightTrackConfig, ReleaseConfig, SimConfig},
    error::SimResult,
    event::SimEvent,
    point::PointStore,
    rng::SubsystemRng,
    subsystem::{SimSubsystem, StepContext},
    types::{displace, great_circle_distance, normalize_lon},
};
use chrono::{DateTime, Duration, Utc};

/// A one-shot release of `count` points.
#[derive(Debug, Clone)]
pub struct Release {
    pub name:     String,
    pub time:     DateTime<Utc>,
    pub lon:      f64,
    pub lat:      f64,
    /// Pa
    pub pressure: f64,
    pub count:    u32,
    pub spread_m: f64,
    fired:        bool,
}

impl Release {
    pub fn from_config(cfg: &ReleaseConfig, index: usize) -> Self {
        Self {
            name:     if cfg.name.is_empty() { format!("release-{index}") } else { cfg.name.clone() },
            time:     cfg.time,
            lon:      cfg.lon,
            lat:      cfg.lat,
            pressure: cfg.pressure_hpa * 100.0,
            count:    cfg.count,
            spread_m: cfg.spread_m,
            fired:    false,
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}

/// An aircraft flying a waypoint polyline at constant speed and pressure.
#[derive(Debug, Clone)]
pub struct FlightTrack {
    pub flight_id:       String,
    pub departure:       DateTime<Utc>,
    pub waypoints:       Vec<[f64; 2]>,
    /// Pa
    pub pressure:        f64,
    pub speed_ms:        f64,
    pub points_per_step: u32,
    pub dispersion_m:    f64,
    leg_lengths:         Vec<f64>,
}

impl FlightTrack {
    pub fn from_config(cfg: &FlightTrackConfig) -> Self {
        let leg_lengths = cfg
            .waypoints
            .windows(2)
            .map(|w| great_circle_distance(w[0], w[1]))
            .collect();
        Self {
            flight_id:       cfg.flight_id.clone(),
            departure:       cfg.departure,
            waypoints:       cfg.waypoints.clone(),
            pressure:        cfg.cruise_pressure_hpa * 100.0,
            speed_ms:        cfg.speed_ms,
            points_per_step: cfg.points_per_step,
            dispersion_m:    cfg.dispersion_m,
            leg_lengths,
        }
    }

    pub fn total_length(&self) -> f64 {
        self.leg_lengths.iter().sum()
    }

    pub fn arrival(&self) -> DateTime<Utc> {
        self.departure + Duration::milliseconds((self.total_length() / self.speed_ms * 1000.0).round() as i64)
    }

    /// Aircraft position at `time`, or `None` when not airborne.
    /// Within a leg, lon/lat are interpolated linearly by distance flown.
    pub fn position_at(&self, time: DateTime<Utc>) -> Option<(f64, f64)> {
        if time < self.departure || time > self.arrival() {
            return None;
        }
        let mut remaining = (time - self.departure).num_milliseconds() as f64 / 1000.0 * self.speed_ms;
        for (leg, &length) in self.leg_lengths.iter().enumerate() {
            let (a, b) = (self.waypoints[leg], self.waypoints[leg + 1]);
            if remaining <= length || leg + 1 == self.leg_lengths.len() {
                let f = if length > 0.0 { (remaining / length).clamp(0.0, 1.0) } else { 1.0 };
                let dlon = normalize_lon(b[0] - a[0]);
                return Some((normalize_lon(a[0] + f * dlon), a[1] + f * (b[1] - a[1])));
            }
            remaining -= length;
        }
        None
    }

    /// Where the aircraft emits during the window `[start, end)`: its
    /// position at the later of `start` and departure, capped at arrival.
    /// `None` when the flight is not airborne at any time in the window.
    pub fn emission_position(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Option<(f64, f64)> {
        let arrival = self.arrival();
        if self.departure >= end || arrival < start {
            return None;
        }
        self.position_at(start.max(self.departure).min(arrival))
    }
}

pub struct SeedingSubsystem {
    releases: Vec<Release>,
    flights:  Vec<FlightTrack>,
}

impl SeedingSubsystem {
    pub fn new(releases: Vec<Release>, flights: Vec<FlightTrack>) -> Self {
        Self { releases, flights }
    }

    /// Flights are only loaded when `points_flights.active` is set.
    pub fn from_config(config: &SimConfig) -> Self {
        let releases = config
            .points_release
            .iter()
            .enumerate()
            .map(|(n, r)| Release::from_config(r, n))
            .collect();
        let flights = if config.points_flights.active {
            config.points_flights.tracks.iter().map(FlightTrack::from_config).collect()
        } else {
            Vec::new()
        };
        Self::new(releases, flights)
    }

    pub fn releases(&self) -> &[Release] {
        &self.releases
    }

    pub fn flights(&self) -> &[FlightTrack] {
        &self.flights
    }
}

fn emit(
    points: &mut PointStore,
    rng: &mut SubsystemRng,
    source: u32,
    (lon, lat, pressure): (f64, f64, f64),
    count: u32,
    spread_m: f64,
) -> u64 {
    let first_id = points.spawned_total();
    for _ in 0..count {
        let (lon, lat) = if spread_m > 0.0 {
            let (east, north) = rng.unit_disc();
            displace(lon, lat, east * spread_m, north * spread_m)
        } else {
            (normalize_lon(lon), lat)
        };
        points.spawn(source, lon, lat, pressure);
    }
    first_id
}

impl SimSubsystem for SeedingSubsystem {
    fn name(&self) -> &'static str { "seeding" }

    fn update(
        &mut self,
        ctx: &StepContext<'_>,
        points: &mut PointStore,
        rng: &mut SubsystemRng,
    ) -> SimResult<Vec<SimEvent>> {
        let window_end = ctx.time + Duration::milliseconds((ctx.dt * 1000.0).round() as i64);
        let mut events = Vec::new();

        for (n, release) in self.releases.iter_mut().enumerate() {
            if release.fired || release.time >= window_end {
                continue;
            }
            release.fired = true;
            let first_id = emit(
                points,
                rng,
                n as u32,
                (release.lon, release.lat, release.pressure),
                release.count,
                release.spread_m,
            );
            events.push(SimEvent::PointsSeeded {
                step:   ctx.step,
                source: release.name.clone(),
                count:  release.count as usize,
                first_id,
            });
        }

        let offset = self.releases.len();
        for (n, flight) in self.flights.iter().enumerate() {
            let Some((lon, lat)) = flight.emission_position(ctx.time, window_end) else {
                continue;
            };
            let first_id = emit(
                points,
                rng,
                (offset + n) as u32,
                (lon, lat, flight.pressure),
                flight.points_per_step,
                flight.dispersion_m,
            );
            events.push(SimEvent::PointsSeeded {
                step:   ctx.step,
                source: flight.flight_id.clone(),
                count:  flight.points_per_step as usize,
                first_id,
            });
        }

        let seeded: usize = events
            .iter()
            .map(|e| match e {
                SimEvent::PointsSeeded { count, .. } => *count,
                _ => 0,
            })
            .sum();
        if seeded > 0 {
            log::debug!("step={} seeding: {seeded} new points", ctx.step);
        }
        Ok(events)
    }

    fn as_any(&self) -> &dyn std::any::Any { self }
}
