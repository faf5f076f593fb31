//! The point population.
//!
//! RULE: nothing removes a point while a pass is iterating the store.
//! Culling flips `alive`; `compact()` sweeps dead points at the start of
//! the following step.

use crate::types::PointId;
use serde::{Deserialize, Serialize};

/// Derived per-point quantities, present only when enabled for the run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct AuxState {
    pub box_height_m: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub id:          PointId,
    /// Index of the emitter that created the point.
    pub source:      u32,
    pub lon:         f64,
    pub lat:         f64,
    /// Pa
    pub pressure:    f64,
    pub age_seconds: f64,
    pub alive:       bool,
    pub aux:         AuxState,
}

#[derive(Debug, Default)]
pub struct PointStore {
    points:  Vec<Point>,
    next_id: PointId,
}

impl PointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fresh point and return its id. Ids are never reused.
    pub fn spawn(&mut self, source: u32, lon: f64, lat: f64, pressure: f64) -> PointId {
        let id = self.next_id;
        self.next_id += 1;
        self.points.push(Point {
            id,
            source,
            lon,
            lat,
            pressure,
            age_seconds: 0.0,
            alive: true,
            aux: AuxState::default(),
        });
        id
    }

    /// Drop every point marked dead. Returns how many were removed.
    pub fn compact(&mut self) -> usize {
        let before = self.points.len();
        self.points.retain(|p| p.alive);
        before - self.points.len()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn alive_count(&self) -> usize {
        self.points.iter().filter(|p| p.alive).count()
    }

    /// Total points ever spawned.
    pub fn spawned_total(&self) -> u64 {
        self.next_id
    }

    pub fn iter(&self) -> impl Iterator<Item = &Point> {
        self.points.iter()
    }

    pub fn alive(&self) -> impl Iterator<Item = &Point> {
        self.points.iter().filter(|p| p.alive)
    }

    pub fn get(&self, id: PointId) -> Option<&Point> {
        self.points.iter().find(|p| p.id == id)
    }

    pub fn as_slice(&self) -> &[Point] {
        &self.points
    }

    /// Mutable access for passes that update points in place. The length
    /// of the store cannot change through a slice.
    pub fn as_mut_slice(&mut self) -> &mut [Point] {
        &mut self.points
    }
}
