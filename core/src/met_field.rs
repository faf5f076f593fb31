//! Meteorology field store: the rolling `current`/`next` snapshot window.
//!
//! RULES:
//!   - `advance_to()` is the only place that talks to the met source.
//!     Every load failure is reported with the simulation time that
//!     triggered it.
//!   - Interpolation never fails once the store is ready: longitude
//!     wraps, latitude and pressure clamp to the grid edges.
//!   - Physics workers read through `MetFields`, an immutable view taken
//!     after the step's advance has completed.

use crate::{
    error::{SimError, SimResult},
    types::{lerp, WindVector},
    vertical::VerticalCoordinate,
};
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Regular lon/lat grid. Longitudes and latitudes increase with index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HorizontalGrid {
    pub lon0: f64,
    pub dlon: f64,
    pub nlon: usize,
    pub lat0: f64,
    pub dlat: f64,
    pub nlat: usize,
}

/// One axis of a horizontal lookup: interpolate `i0 → i1` by `frac`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisCell {
    pub i0:   usize,
    pub i1:   usize,
    pub frac: f64,
}

impl HorizontalGrid {
    /// Global grid with the given spacing, starting at (-180, -90).
    pub fn global(dlon: f64, dlat: f64) -> Self {
        Self {
            lon0: -180.0,
            dlon,
            nlon: (360.0 / dlon).round() as usize,
            lat0: -90.0,
            dlat,
            nlat: (180.0 / dlat).round() as usize + 1,
        }
    }

    pub fn lon_span(&self) -> f64 {
        self.dlon * (self.nlon - 1) as f64
    }

    /// True when the last column sits one spacing short of wrapping onto the first.
    pub fn wraps_longitude(&self) -> bool {
        (self.dlon * self.nlon as f64 - 360.0).abs() < 1e-6
    }

    pub fn lon_at(&self, i: usize) -> f64 {
        self.lon0 + self.dlon * i as f64
    }

    pub fn lat_at(&self, j: usize) -> f64 {
        self.lat0 + self.dlat * j as f64
    }

    pub fn validate(&self) -> SimResult<()> {
        if self.nlon < 2 || self.nlat < 2 {
            return Err(SimError::config(
                "meteorology.grid",
                format!("need at least 2x2 columns, got {}x{}", self.nlon, self.nlat),
            ));
        }
        if !(self.dlon > 0.0 && self.dlat > 0.0) {
            return Err(SimError::config(
                "meteorology.grid",
                format!("spacing must be positive, got dlon={} dlat={}", self.dlon, self.dlat),
            ));
        }
        if self.dlon * self.nlon as f64 > 360.0 + 1e-6 {
            return Err(SimError::config(
                "meteorology.grid",
                format!("{} columns of {} degrees overlap in longitude", self.nlon, self.dlon),
            ));
        }
        Ok(())
    }

    pub fn locate_lon(&self, lon: f64) -> AxisCell {
        if self.wraps_longitude() {
            let x = (lon - self.lon0).rem_euclid(360.0) / self.dlon;
            let i0 = (x.floor() as usize).min(self.nlon - 1);
            return AxisCell { i0, i1: (i0 + 1) % self.nlon, frac: x - i0 as f64 };
        }
        // Regional grid: take the 360° image nearest the grid centre, then clamp.
        let half = 0.5 * self.lon_span();
        let centre = self.lon0 + half;
        let offset = (lon - centre + 180.0).rem_euclid(360.0) - 180.0;
        clamp_axis((offset + half) / self.dlon, self.nlon)
    }

    pub fn locate_lat(&self, lat: f64) -> AxisCell {
        clamp_axis((lat - self.lat0) / self.dlat, self.nlat)
    }
}

fn clamp_axis(x: f64, n: usize) -> AxisCell {
    let x = x.clamp(0.0, (n - 1) as f64);
    let i0 = (x.floor() as usize).min(n - 2);
    AxisCell { i0, i1: i0 + 1, frac: x - i0 as f64 }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetGrid {
    pub horizontal: HorizontalGrid,
    pub vertical:   VerticalCoordinate,
}

impl MetGrid {
    /// Flat index of a 3-D value, layout `[level][lat][lon]`.
    #[inline]
    pub fn index(&self, level: usize, j: usize, i: usize) -> usize {
        (level * self.horizontal.nlat + j) * self.horizontal.nlon + i
    }

    /// Flat index of a surface value, layout `[lat][lon]`.
    #[inline]
    pub fn column_index(&self, j: usize, i: usize) -> usize {
        j * self.horizontal.nlon + i
    }

    pub fn n_columns(&self) -> usize {
        self.horizontal.nlon * self.horizontal.nlat
    }

    pub fn n_values(&self) -> usize {
        self.n_columns() * self.vertical.n_levels()
    }
}

/// One complete gridded field valid at a single instant.
#[derive(Debug, Clone, PartialEq)]
pub struct MetSnapshot {
    pub time:             DateTime<Utc>,
    pub u:                Vec<f64>,
    pub v:                Vec<f64>,
    /// Vertical velocity in pressure coordinates (Pa/s).
    pub omega:            Vec<f64>,
    pub surface_pressure: Vec<f64>,
}

impl MetSnapshot {
    /// Fill a snapshot from per-node closures.
    pub fn from_fn(
        grid: &MetGrid,
        time: DateTime<Utc>,
        wind: impl Fn(usize, usize, usize) -> WindVector,
        surface_pressure: impl Fn(usize, usize) -> f64,
    ) -> Self {
        let h = grid.horizontal;
        let n = grid.n_values();
        let (mut u, mut v, mut omega) = (Vec::with_capacity(n), Vec::with_capacity(n), Vec::with_capacity(n));
        for k in 0..grid.vertical.n_levels() {
            for j in 0..h.nlat {
                for i in 0..h.nlon {
                    let w = wind(k, j, i);
                    u.push(w.u);
                    v.push(w.v);
                    omega.push(w.omega);
                }
            }
        }
        let mut ps = Vec::with_capacity(grid.n_columns());
        for j in 0..h.nlat {
            for i in 0..h.nlon {
                ps.push(surface_pressure(j, i));
            }
        }
        Self { time, u, v, omega, surface_pressure: ps }
    }

    fn check_shape(&self, grid: &MetGrid) -> Result<(), String> {
        let n = grid.n_values();
        for (name, len) in [("u", self.u.len()), ("v", self.v.len()), ("omega", self.omega.len())] {
            if len != n {
                return Err(format!("field '{name}' has {len} values, grid needs {n}"));
            }
        }
        if self.surface_pressure.len() != grid.n_columns() {
            return Err(format!(
                "surface pressure has {} values, grid needs {}",
                self.surface_pressure.len(),
                grid.n_columns()
            ));
        }
        Ok(())
    }
}

#[derive(Error, Debug)]
pub enum MetSourceError {
    #[error("no snapshot valid at {0}")]
    Unavailable(DateTime<Utc>),

    #[error("{0}")]
    Malformed(String),
}

/// Anything that can hand over the field valid at a requested time.
pub trait MetSource: Send + Sync {
    fn name(&self) -> &str;

    /// Spacing between consecutive snapshot valid times.
    fn interval(&self) -> Duration;

    fn horizontal_grid(&self) -> HorizontalGrid;

    fn load(&mut self, time: DateTime<Utc>, grid: &MetGrid) -> Result<MetSnapshot, MetSourceError>;
}

/// Interpolated wind plus the pressure spacing of the bracketing levels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetSample {
    pub wind:            WindVector,
    pub level_thickness: f64,
}

/// A completed met advance: the window now spans `current..next`.
/// `next` is `None` in static mode, where only `current` is loaded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetAdvance {
    pub current: DateTime<Utc>,
    pub next:    Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub enum MetState {
    Uninitialized,
    Ready {
        current: MetSnapshot,
        /// `None` when time-dependent meteorology is off.
        next:    Option<MetSnapshot>,
    },
}

pub struct MetFieldStore {
    source:         Box<dyn MetSource>,
    grid:           MetGrid,
    time_dependent: bool,
    state:          MetState,
}

impl MetFieldStore {
    pub fn new(
        source: Box<dyn MetSource>,
        vertical: VerticalCoordinate,
        time_dependent: bool,
    ) -> SimResult<Self> {
        let horizontal = source.horizontal_grid();
        horizontal.validate()?;
        if source.interval() <= Duration::zero() {
            return Err(SimError::config(
                "meteorology.interval",
                format!("source '{}' reports a non-positive snapshot interval", source.name()),
            ));
        }
        Ok(Self {
            source,
            grid: MetGrid { horizontal, vertical },
            time_dependent,
            state: MetState::Uninitialized,
        })
    }

    pub fn grid(&self) -> &MetGrid {
        &self.grid
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, MetState::Ready { .. })
    }

    pub fn current_time(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            MetState::Ready { current, .. } => Some(current.time),
            MetState::Uninitialized => None,
        }
    }

    pub fn next_time(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            MetState::Ready { next, .. } => next.as_ref().map(|n| n.time),
            MetState::Uninitialized => None,
        }
    }

    /// Load the window bracketing `start`.
    pub fn initialize(&mut self, start: DateTime<Utc>) -> SimResult<MetAdvance> {
        let interval = self.source.interval();
        let t0 = floor_to_interval(start, interval)?;
        let current = self.load_checked(t0, start)?;
        let next = if self.time_dependent {
            Some(self.load_checked(t0 + interval, start)?)
        } else {
            None
        };
        let advance = MetAdvance { current: t0, next: next.as_ref().map(|n| n.time) };
        log::debug!(
            "met: initialized from '{}' at {t0} (time dependent: {})",
            self.source.name(),
            self.time_dependent
        );
        self.state = MetState::Ready { current, next };
        Ok(advance)
    }

    /// Shift the window until `time` lies inside it. Returns every shift
    /// performed; empty when no advance was due.
    pub fn advance_to(&mut self, time: DateTime<Utc>) -> SimResult<Vec<MetAdvance>> {
        if !self.is_ready() {
            return Ok(vec![self.initialize(time)?]);
        }
        let interval = self.source.interval();
        let mut advances = Vec::new();
        loop {
            let next_time = match &self.state {
                MetState::Ready { next: Some(next), .. } if time >= next.time => next.time,
                _ => break,
            };
            // Load before shifting so a failure leaves the window intact.
            let incoming = self.load_checked(next_time + interval, time)?;
            if let MetState::Ready { current, next } = &mut self.state {
                if let Some(old_next) = next.replace(incoming) {
                    *current = old_next;
                }
            }
            log::debug!("met: advanced window to {next_time} .. {}", next_time + interval);
            advances.push(MetAdvance { current: next_time, next: Some(next_time + interval) });
        }
        Ok(advances)
    }

    /// Read-only view of the loaded window.
    pub fn fields(&self) -> SimResult<MetFields<'_>> {
        match &self.state {
            MetState::Ready { current, next } => Ok(MetFields {
                grid: &self.grid,
                current,
                next: next.as_ref(),
            }),
            MetState::Uninitialized => Err(SimError::MetNotInitialized),
        }
    }

    pub fn interpolate(
        &self,
        lon: f64,
        lat: f64,
        pressure: f64,
        time: DateTime<Utc>,
    ) -> SimResult<WindVector> {
        Ok(self.fields()?.interpolate(lon, lat, pressure, time))
    }

    fn load_checked(&mut self, valid: DateTime<Utc>, sim_time: DateTime<Utc>) -> SimResult<MetSnapshot> {
        let snapshot = self.source.load(valid, &self.grid).map_err(|e| match e {
            MetSourceError::Unavailable(_) => SimError::MetUnavailable {
                time:   sim_time,
                reason: format!("{}: {e}", self.source.name()),
            },
            MetSourceError::Malformed(reason) => SimError::MetMalformed {
                time:   sim_time,
                reason: format!("{}: {reason}", self.source.name()),
            },
        })?;
        snapshot
            .check_shape(&self.grid)
            .map_err(|reason| SimError::MetMalformed { time: sim_time, reason })?;
        if snapshot.time != valid {
            return Err(SimError::MetMalformed {
                time:   sim_time,
                reason: format!("requested snapshot for {valid}, got {}", snapshot.time),
            });
        }
        Ok(snapshot)
    }
}

/// Immutable view of the snapshot window, shared by physics workers.
#[derive(Debug, Clone, Copy)]
pub struct MetFields<'a> {
    grid:    &'a MetGrid,
    current: &'a MetSnapshot,
    next:    Option<&'a MetSnapshot>,
}

impl<'a> MetFields<'a> {
    pub fn grid(&self) -> &'a MetGrid {
        self.grid
    }

    pub fn interpolate(&self, lon: f64, lat: f64, pressure: f64, time: DateTime<Utc>) -> WindVector {
        self.sample(lon, lat, pressure, time).wind
    }

    /// Trilinear in (lon, lat, level) on each snapshot, then linear in time.
    pub fn sample(&self, lon: f64, lat: f64, pressure: f64, time: DateTime<Utc>) -> MetSample {
        let cx = self.grid.horizontal.locate_lon(lon);
        let cy = self.grid.horizontal.locate_lat(lat);
        let a = sample_snapshot(self.grid, self.current, cx, cy, pressure);
        let Some(next) = self.next else {
            return a;
        };
        let f = time_fraction(self.current.time, next.time, time);
        if f == 0.0 {
            return a;
        }
        let b = sample_snapshot(self.grid, next, cx, cy, pressure);
        MetSample {
            wind:            WindVector::lerp(a.wind, b.wind, f),
            level_thickness: lerp(a.level_thickness, b.level_thickness, f),
        }
    }
}

fn sample_snapshot(
    grid: &MetGrid,
    snap: &MetSnapshot,
    cx: AxisCell,
    cy: AxisCell,
    pressure: f64,
) -> MetSample {
    let corners = [
        (cy.i0, cx.i0, (1.0 - cy.frac) * (1.0 - cx.frac)),
        (cy.i0, cx.i1, (1.0 - cy.frac) * cx.frac),
        (cy.i1, cx.i0, cy.frac * (1.0 - cx.frac)),
        (cy.i1, cx.i1, cy.frac * cx.frac),
    ];
    let mut wind = WindVector::CALM;
    let mut thickness = 0.0;
    for (j, i, weight) in corners {
        if weight == 0.0 {
            continue;
        }
        // Hybrid levels move with each column's own surface pressure.
        let ps = snap.surface_pressure[grid.column_index(j, i)];
        let br = grid.vertical.bracket(pressure, ps);
        let (lo, hi) = (grid.index(br.lower, j, i), grid.index(br.upper, j, i));
        wind.u += weight * lerp(snap.u[lo], snap.u[hi], br.fraction);
        wind.v += weight * lerp(snap.v[lo], snap.v[hi], br.fraction);
        wind.omega += weight * lerp(snap.omega[lo], snap.omega[hi], br.fraction);
        thickness += weight * grid.vertical.level_thickness(br, ps);
    }
    MetSample { wind, level_thickness: thickness }
}

fn time_fraction(t0: DateTime<Utc>, t1: DateTime<Utc>, t: DateTime<Utc>) -> f64 {
    let span = (t1 - t0).num_milliseconds() as f64;
    if span <= 0.0 {
        return 0.0;
    }
    ((t - t0).num_milliseconds() as f64 / span).clamp(0.0, 1.0)
}

/// Latest multiple of `interval` (counted from the Unix epoch) at or before `time`.
pub fn floor_to_interval(time: DateTime<Utc>, interval: Duration) -> SimResult<DateTime<Utc>> {
    let step = interval.num_seconds().max(1);
    let secs = time.timestamp();
    DateTime::<Utc>::from_timestamp(secs - secs.rem_euclid(step), 0)
        .ok_or_else(|| SimError::config("timing.start_date", format!("{time} is out of range")))
}
