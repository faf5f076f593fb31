//! The simulation engine: drives the step loop.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   0. Compact points culled on the previous step
//!   1. Advance meteorology so the window covers the step's start time
//!   2. Seeding subsystem
//!   3. Physics subsystem
//!   4. Culling subsystem
//!   5. Clock advance, then the periodic actions due at the new time:
//!      archive append, output flush, progress report
//!
//! RULES:
//!   - Subsystems execute in registration order, every step.
//!   - Meteorology is never touched while a subsystem is running.
//!   - All randomness flows through the RngBank.
//!   - Everything a step changed is recorded in the event log.
//!   - A run that fails still flushes what it archived.

use crate::{
    archive::{Archive, ArchiveEntry},
    clock::SimClock,
    config::{format_hms, SimConfig},
    culling_subsystem::CullingSubsystem,
    domain::DomainManager,
    error::SimResult,
    event::{event_type_name, EventLogEntry, SimEvent},
    met_field::{HorizontalGrid, MetFieldStore, MetSource},
    met_source::UniformWindSource,
    physics_subsystem::PhysicsSubsystem,
    point::PointStore,
    rng::{RngBank, SubsystemSlot},
    seeding_subsystem::SeedingSubsystem,
    store::SimStore,
    subsystem::{SimSubsystem, StepContext},
    types::{RunId, Step},
};
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

const ENGINE: &str = "engine";

// ── Phase timers ────────────────────────────────────────────────

pub const PHASE_SEEDING: &str = "Point seeding";
pub const PHASE_PHYSICS: &str = "Point physics";
pub const PHASE_CULLING: &str = "Point culling";
pub const PHASE_MET: &str = "Met advance";
pub const PHASE_ARCHIVE: &str = "Archiving";
pub const PHASE_OUTPUT: &str = "File writing";

/// Wall-clock time spent in each named phase, in first-use order.
#[derive(Debug, Clone, Default)]
pub struct PhaseTimers {
    phases: Vec<(&'static str, Duration)>,
}

impl PhaseTimers {
    pub fn add(&mut self, phase: &'static str, elapsed: Duration) {
        match self.phases.iter_mut().find(|(name, _)| *name == phase) {
            Some((_, total)) => *total += elapsed,
            None => self.phases.push((phase, elapsed)),
        }
    }

    pub fn total(&self, phase: &str) -> Duration {
        self.phases
            .iter()
            .find(|(name, _)| *name == phase)
            .map(|(_, d)| *d)
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Duration)> + '_ {
        self.phases.iter().copied()
    }
}

fn phase_for(slot: SubsystemSlot) -> &'static str {
    match slot {
        SubsystemSlot::Seeding => PHASE_SEEDING,
        SubsystemSlot::Physics => PHASE_PHYSICS,
        SubsystemSlot::Culling => PHASE_CULLING,
    }
}

/// End-of-run figures for the runner.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id:   RunId,
    pub steps:    Step,
    pub end_time: DateTime<Utc>,
    pub spawned:  u64,
    pub alive:    usize,
    pub flushes:  u64,
    pub phases:   Vec<(&'static str, Duration)>,
}

// ── Engine ──────────────────────────────────────────────────────

pub struct SimEngine {
    pub run_id:   RunId,
    pub clock:    SimClock,
    pub rng_bank: RngBank,
    seed:         u64,
    subsystems:   Vec<(SubsystemSlot, Box<dyn SimSubsystem>)>,
    store:        SimStore,
    met:          MetFieldStore,
    domain:       DomainManager,
    points:       PointStore,
    archive:      Archive,
    flush_count:  u64,
    timers:       PhaseTimers,
}

impl SimEngine {
    pub fn new(
        run_id: RunId,
        seed: u64,
        store: SimStore,
        clock: SimClock,
        met: MetFieldStore,
        domain: DomainManager,
    ) -> Self {
        Self {
            run_id,
            clock,
            rng_bank: RngBank::new(seed),
            seed,
            subsystems: Vec::new(),
            store,
            met,
            domain,
            points: PointStore::new(),
            archive: Archive::new(),
            flush_count: 0,
            timers: PhaseTimers::default(),
        }
    }

    /// Build a fully wired engine with all subsystems registered.
    /// Every configuration error surfaces here, before step 0.
    pub fn build(
        run_id: RunId,
        config: &SimConfig,
        store: SimStore,
        source: Box<dyn MetSource>,
    ) -> SimResult<Self> {
        config.validate()?;
        let kind = config.met_source_kind()?;
        let met = MetFieldStore::new(source, kind.vertical(), config.time_dependent_meteorology)?;
        let domain = DomainManager::new(config.domain()?, config.box_heights_needed());
        let clock = SimClock::new(
            config.timing.start_date,
            config.timing.end_date,
            config.timesteps.simulation,
            config.timesteps.storage,
            config.timesteps.reporting,
            config.dt_output_seconds()?,
        )?;
        log::info!(
            "run {run_id}: {} meteorology from '{}', {} steps of {} s, output every {}",
            kind.label(),
            met.source_name(),
            clock.total_steps(),
            clock.dt_physics,
            format_hms(clock.dt_output),
        );

        let mut engine = SimEngine::new(run_id, config.seed, store, clock, met, domain);
        // EXECUTION ORDER: fixed, documented, never reordered.
        engine.register(SubsystemSlot::Seeding, Box::new(SeedingSubsystem::from_config(config)));
        engine.register(
            SubsystemSlot::Physics,
            Box::new(PhysicsSubsystem::new(config.physics.scheme)),
        );
        engine.register(
            SubsystemSlot::Culling,
            Box::new(CullingSubsystem::new(config.max_age_seconds())),
        );
        Ok(engine)
    }

    /// Test engine on the default test configuration with calm global winds.
    pub fn build_test(run_id: RunId, seed: u64) -> SimResult<Self> {
        let mut config = SimConfig::default_test();
        config.seed = seed;
        let source = UniformWindSource::calm(HorizontalGrid::global(1.0, 1.0));
        Self::build_test_with(run_id, &config, Box::new(source))
    }

    /// Test engine backed by a fresh in-memory store.
    pub fn build_test_with(
        run_id: RunId,
        config: &SimConfig,
        source: Box<dyn MetSource>,
    ) -> SimResult<Self> {
        let store = SimStore::in_memory()?;
        store.migrate()?;
        store.insert_run(&run_id, config.seed, "0.1.0-test")?;
        Self::build(run_id, config, store, source)
    }

    /// Register a subsystem. Call in the documented execution order.
    pub fn register(&mut self, slot: SubsystemSlot, subsystem: Box<dyn SimSubsystem>) {
        self.subsystems.push((slot, subsystem));
    }

    /// Advance one physics step. This is the core simulation step.
    pub fn step(&mut self) -> SimResult<Vec<SimEvent>> {
        assert!(!self.clock.paused, "step() called on paused engine");

        let step = self.clock.current_step;
        let time = self.clock.current_time();
        let mut step_events = vec![SimEvent::StepStarted { step, time }];
        let mut engine_events = Vec::new();

        let removed = self.points.compact();
        if removed > 0 {
            engine_events.push(SimEvent::PointsCompacted { step, removed });
        }

        let started = Instant::now();
        let advances = self.met.advance_to(time)?;
        self.timers.add(PHASE_MET, started.elapsed());
        engine_events.extend(advances.into_iter().map(|a| SimEvent::MetAdvanced {
            step,
            current: a.current,
            next:    a.next,
        }));
        persist(&self.store, &self.run_id, step, ENGINE, &engine_events)?;
        step_events.append(&mut engine_events);

        let ctx = StepContext {
            step,
            time,
            dt: self.clock.dt_physics,
            met: &self.met,
            domain: &self.domain,
        };
        for (slot, subsystem) in &mut self.subsystems {
            let mut rng = self.rng_bank.for_subsystem(*slot, step);
            let started = Instant::now();
            let new_events = subsystem.update(&ctx, &mut self.points, &mut rng)?;
            self.timers.add(phase_for(*slot), started.elapsed());

            persist(&self.store, &self.run_id, step, subsystem.name(), &new_events)?;
            step_events.extend(new_events);
        }

        self.clock.advance();
        let now = self.clock.current_time();
        let due = self.clock.due();
        // Archive entries and their events are keyed by the step the state belongs to.
        let archived_step = self.clock.current_step;

        if due.archive {
            let started = Instant::now();
            let entry = ArchiveEntry::capture(archived_step, now, &self.points);
            engine_events.push(SimEvent::ArchiveAppended {
                step:   archived_step,
                time:   now,
                points: entry.points.len(),
            });
            self.archive.push(entry);
            self.timers.add(PHASE_ARCHIVE, started.elapsed());
        }
        if due.output {
            if let Some(event) = self.flush_archive(archived_step)? {
                engine_events.push(event);
            }
        }
        if due.report {
            log::info!(
                "{now}: {} points alive, {} spawned, step {} of {}",
                self.points.alive_count(),
                self.points.spawned_total(),
                self.clock.current_step,
                self.clock.total_steps(),
            );
        }
        persist(&self.store, &self.run_id, step, ENGINE, &engine_events)?;
        step_events.append(&mut engine_events);

        step_events.push(SimEvent::StepCompleted {
            step,
            time: now,
            alive: self.points.alive_count(),
        });
        Ok(step_events)
    }

    /// Run from the current step to the end date.
    ///
    /// On failure the archive is flushed before the error is returned, so
    /// output up to the failing step is never lost.
    pub fn run(&mut self) -> SimResult<RunSummary> {
        self.record_initialized()?;
        self.clock.resume();
        let result = self.run_to_end();
        self.clock.pause();

        if let Err(e) = result {
            let step = self.clock.current_step;
            log::error!("run {} stopped at step {step}: {e}", self.run_id);
            let flushed = self
                .flush_archive(step)
                .and_then(|event| persist(&self.store, &self.run_id, step, ENGINE, event.as_slice()));
            if let Err(flush_err) = flushed {
                log::error!("run {}: flushing archive after failure also failed: {flush_err}", self.run_id);
            }
            return Err(e);
        }

        // Anything archived since the last output crossing.
        if let Some(event) = self.flush_archive(self.clock.current_step)? {
            persist(&self.store, &self.run_id, self.clock.current_step, ENGINE, &[event])?;
        }
        log::info!("run {} complete after {} steps", self.run_id, self.clock.current_step);
        Ok(self.summary())
    }

    /// Run at most `n` steps, stopping early at the end date. No final flush.
    pub fn run_steps(&mut self, n: u64) -> SimResult<()> {
        self.record_initialized()?;
        self.clock.resume();
        let mut result = Ok(());
        for _ in 0..n {
            if self.clock.is_finished() {
                break;
            }
            if let Err(e) = self.step() {
                result = Err(e);
                break;
            }
        }
        self.clock.pause();
        result
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id:   self.run_id.clone(),
            steps:    self.clock.current_step,
            end_time: self.clock.current_time(),
            spawned:  self.points.spawned_total(),
            alive:    self.points.alive_count(),
            flushes:  self.flush_count,
            phases:   self.timers.iter().collect(),
        }
    }

    // ── Accessors ──────────────────────────────────────────────

    pub fn points(&self) -> &PointStore {
        &self.points
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    pub fn met(&self) -> &MetFieldStore {
        &self.met
    }

    pub fn domain(&self) -> &DomainManager {
        &self.domain
    }

    pub fn store(&self) -> &SimStore {
        &self.store
    }

    pub fn flush_count(&self) -> u64 {
        self.flush_count
    }

    pub fn timers(&self) -> &PhaseTimers {
        &self.timers
    }

    /// Query events for a specific step from the store.
    /// Used by the determinism test and replay tooling.
    pub fn store_events_for_step(&self, run_id: &str, step: Step) -> SimResult<Vec<EventLogEntry>> {
        self.store.events_for_step(run_id, step)
    }

    /// The registered SeedingSubsystem, for inspecting emitter state.
    pub fn seeding(&self) -> Option<&SeedingSubsystem> {
        self.subsystems
            .iter()
            .find_map(|(_, sub)| sub.as_any().downcast_ref::<SeedingSubsystem>())
    }

    // ── Internals ──────────────────────────────────────────────

    fn run_to_end(&mut self) -> SimResult<()> {
        while !self.clock.is_finished() {
            self.step()?;
        }
        Ok(())
    }

    /// Emit RunInitialized once, at step 0, so seed differences are observable.
    fn record_initialized(&self) -> SimResult<()> {
        if self.clock.current_step != 0 {
            return Ok(());
        }
        let event = SimEvent::RunInitialized { run_id: self.run_id.clone(), seed: self.seed };
        persist(&self.store, &self.run_id, 0, ENGINE, &[event])
    }

    /// Write and clear the archive. Returns `None` when there was nothing to write.
    fn flush_archive(&mut self, step: Step) -> SimResult<Option<SimEvent>> {
        if self.archive.is_empty() {
            return Ok(None);
        }
        let started = Instant::now();
        let entries = self.archive.take();
        self.store.write_flush(&self.run_id, self.flush_count, step, &entries)?;
        let event = SimEvent::ArchiveFlushed {
            step,
            flush_index: self.flush_count,
            entries:     entries.len(),
        };
        log::debug!("run {}: flush {} wrote {} entries", self.run_id, self.flush_count, entries.len());
        self.flush_count += 1;
        self.timers.add(PHASE_OUTPUT, started.elapsed());
        Ok(Some(event))
    }
}

fn persist(
    store: &SimStore,
    run_id: &str,
    step: Step,
    subsystem: &str,
    events: &[SimEvent],
) -> SimResult<()> {
    for event in events {
        let entry = EventLogEntry {
            id:         None,
            run_id:     run_id.to_string(),
            step,
            subsystem:  subsystem.to_string(),
            event_type: event_type_name(event).to_string(),
            payload:    serde_json::to_string(event)?,
        };
        store.append_event(&entry)?;
    }
    Ok(())
}
