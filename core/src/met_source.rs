//! Meteorology sources bundled with the core.
//!
//! On-disk MERRA-2 / ERA5 readers live outside this crate and plug in
//! through `MetSource`. The sources here cover analytic fields for the
//! runner and explicit snapshot tables for tests.

use crate::{
    error::{SimError, SimResult},
    met_field::{HorizontalGrid, MetGrid, MetSnapshot, MetSource, MetSourceError},
    types::WindVector,
    vertical::VerticalCoordinate,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which reanalysis the meteorology comes from. Decides the vertical coordinate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MetSourceKind {
    #[serde(rename = "MERRA-2")]
    Merra2,
    #[serde(rename = "ERA5")]
    Era5,
}

impl MetSourceKind {
    pub fn parse(name: &str) -> SimResult<Self> {
        match name {
            "MERRA-2" => Ok(Self::Merra2),
            "ERA5" => Ok(Self::Era5),
            other => Err(SimError::config(
                "input_output.met_source",
                format!("meteorology data source '{other}' not recognized (expected MERRA-2 or ERA5)"),
            )),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Merra2 => "MERRA-2",
            Self::Era5 => "ERA5",
        }
    }

    pub fn vertical(&self) -> VerticalCoordinate {
        match self {
            Self::Merra2 => VerticalCoordinate::merra2(),
            Self::Era5 => VerticalCoordinate::era5(),
        }
    }

    /// Native snapshot spacing of the reanalysis product.
    pub fn native_interval(&self) -> Duration {
        match self {
            Self::Merra2 => Duration::hours(3),
            Self::Era5 => Duration::hours(1),
        }
    }
}

/// Spatially uniform wind, identical at every valid time.
#[derive(Debug, Clone)]
pub struct UniformWindSource {
    pub grid:             HorizontalGrid,
    pub wind:             WindVector,
    pub surface_pressure: f64,
    pub interval:         Duration,
}

impl UniformWindSource {
    pub fn new(grid: HorizontalGrid, wind: WindVector) -> Self {
        Self {
            grid,
            wind,
            surface_pressure: 101_325.0,
            interval: Duration::hours(1),
        }
    }

    pub fn calm(grid: HorizontalGrid) -> Self {
        Self::new(grid, WindVector::CALM)
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

impl MetSource for UniformWindSource {
    fn name(&self) -> &str {
        "uniform"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn horizontal_grid(&self) -> HorizontalGrid {
        self.grid
    }

    fn load(&mut self, time: DateTime<Utc>, grid: &MetGrid) -> Result<MetSnapshot, MetSourceError> {
        let wind = self.wind;
        let ps = self.surface_pressure;
        Ok(MetSnapshot::from_fn(grid, time, |_, _, _| wind, |_, _| ps))
    }
}

/// Explicit table of snapshots keyed by valid time.
#[derive(Debug, Clone)]
pub struct InMemoryMetSource {
    grid:      HorizontalGrid,
    interval:  Duration,
    snapshots: BTreeMap<DateTime<Utc>, MetSnapshot>,
}

impl InMemoryMetSource {
    pub fn new(grid: HorizontalGrid, interval: Duration) -> Self {
        Self { grid, interval, snapshots: BTreeMap::new() }
    }

    pub fn insert(&mut self, snapshot: MetSnapshot) {
        self.snapshots.insert(snapshot.time, snapshot);
    }

    pub fn with_snapshot(mut self, snapshot: MetSnapshot) -> Self {
        self.insert(snapshot);
        self
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

impl MetSource for InMemoryMetSource {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn horizontal_grid(&self) -> HorizontalGrid {
        self.grid
    }

    fn load(&mut self, time: DateTime<Utc>, _grid: &MetGrid) -> Result<MetSnapshot, MetSourceError> {
        self.snapshots
            .get(&time)
            .cloned()
            .ok_or(MetSourceError::Unavailable(time))
    }
}
