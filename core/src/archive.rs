//! In-memory point archive: one entry per storage crossing, drained
//! by the output writer.

use crate::{
    point::PointStore,
    types::{PointId, Step},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One point as recorded in the archive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PointState {
    pub id:           PointId,
    pub lon:          f64,
    pub lat:          f64,
    pub pressure:     f64,
    pub age_seconds:  f64,
    pub box_height_m: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchiveEntry {
    pub time:   DateTime<Utc>,
    pub step:   Step,
    pub points: Vec<PointState>,
}

impl ArchiveEntry {
    /// Snapshot every alive point, in store order.
    pub fn capture(step: Step, time: DateTime<Utc>, points: &PointStore) -> Self {
        let points = points
            .alive()
            .map(|p| PointState {
                id:           p.id,
                lon:          p.lon,
                lat:          p.lat,
                pressure:     p.pressure,
                age_seconds:  p.age_seconds,
                box_height_m: p.aux.box_height_m,
            })
            .collect();
        Self { time, step, points }
    }
}

#[derive(Debug, Default)]
pub struct Archive {
    entries: Vec<ArchiveEntry>,
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: ArchiveEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Remove and return everything archived since the last flush.
    pub fn take(&mut self) -> Vec<ArchiveEntry> {
        std::mem::take(&mut self.entries)
    }
}
