//! The event log: everything the step loop did, in order.
//!
//! RULE: Subsystems report what they changed ONLY through events.
//! The engine persists every event to the store's event_log table.
//! Variants are added as features land, never removed or reordered.

use crate::types::{PointId, RunId, Step};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    // ── Engine events ──────────────────────────────
    StepStarted {
        step: Step,
        time: DateTime<Utc>,
    },
    StepCompleted {
        step:  Step,
        time:  DateTime<Utc>,
        alive: usize,
    },
    RunInitialized {
        run_id: RunId,
        seed:   u64,
    },

    // ── Meteorology ────────────────────────────────
    MetAdvanced {
        step:    Step,
        current: DateTime<Utc>,
        /// Absent when meteorology is static.
        next:    Option<DateTime<Utc>>,
    },

    // ── Point lifecycle ────────────────────────────
    PointsSeeded {
        step:     Step,
        source:   String,
        count:    usize,
        first_id: PointId,
    },
    PointsAdvected {
        step:  Step,
        count: usize,
    },
    PointsCulled {
        step:          Step,
        out_of_domain: usize,
        expired:       usize,
    },
    PointsCompacted {
        step:    Step,
        removed: usize,
    },

    // ── Archive and output ─────────────────────────
    ArchiveAppended {
        step:   Step,
        time:   DateTime<Utc>,
        points: usize,
    },
    ArchiveFlushed {
        step:        Step,
        flush_index: u64,
        entries:     usize,
    },
}

/// Extract a stable string name from a SimEvent variant.
/// Used for the event_type column in event_log.
pub fn event_type_name(event: &SimEvent) -> &'static str {
    match event {
        SimEvent::StepStarted { .. }     => "step_started",
        SimEvent::StepCompleted { .. }   => "step_completed",
        SimEvent::RunInitialized { .. }  => "run_initialized",
        SimEvent::MetAdvanced { .. }     => "met_advanced",
        SimEvent::PointsSeeded { .. }    => "points_seeded",
        SimEvent::PointsAdvected { .. }  => "points_advected",
        SimEvent::PointsCulled { .. }    => "points_culled",
        SimEvent::PointsCompacted { .. } => "points_compacted",
        SimEvent::ArchiveAppended { .. } => "archive_appended",
        SimEvent::ArchiveFlushed { .. }  => "archive_flushed",
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:         Option<i64>,
    pub run_id:     RunId,
    pub step:       Step,
    pub subsystem:  String,
    pub event_type: String,
    pub payload:    String, // JSON-serialized SimEvent
}
