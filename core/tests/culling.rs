use chrono::Duration;
use tracer_core::{
    config::SimConfig,
    engine::SimEngine,
    event::SimEvent,
    met_field::HorizontalGrid,
    met_source::UniformWindSource,
    types::WindVector,
};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn engine_with(run_id: &str, config: &SimConfig, wind: WindVector) -> SimEngine {
    let source = UniformWindSource::new(HorizontalGrid::global(1.0, 1.0), wind);
    SimEngine::build_test_with(run_id.into(), config, Box::new(source)).unwrap()
}

fn culled_counts(engine: &SimEngine, run_id: &str, step: u64) -> Option<(usize, usize)> {
    engine
        .store_events_for_step(run_id, step)
        .unwrap()
        .into_iter()
        .filter_map(|e| serde_json::from_str::<SimEvent>(&e.payload).ok())
        .find_map(|e| match e {
            SimEvent::PointsCulled { out_of_domain, expired, .. } => Some((out_of_domain, expired)),
            _ => None,
        })
}

// ── Tests ────────────────────────────────────────────────────────────────────

/// A point leaving the domain is marked dead on the step it crosses the
/// boundary and is gone from the store on the step after.
#[test]
fn culled_point_is_dead_then_removed() {
    let mut config = SimConfig::default_test();
    config.points_release[0].lon = 9.99;
    // 50 m/s carries the point ~3 km (~0.027°) east per 60 s step.
    let mut engine = engine_with("cull-boundary", &config, WindVector::new(50.0, 0.0, 0.0));

    engine.run_steps(1).unwrap();
    let p = engine.points().get(0).expect("still stored on the crossing step");
    assert!(!p.alive);
    assert!(p.lon > 10.0);
    assert_eq!(engine.points().alive_count(), 0);
    assert_eq!(culled_counts(&engine, "cull-boundary", 0), Some((1, 0)));

    // The crossing step's archive entry already excludes it.
    assert_eq!(engine.archive().entries()[0].points.len(), 0);

    engine.run_steps(1).unwrap();
    assert!(engine.points().get(0).is_none());
    assert!(engine.points().is_empty());
}

#[test]
fn points_expire_after_max_age() {
    let mut config = SimConfig::default_test();
    config.culling.max_age_hours = Some(0.5);
    let mut engine = engine_with("cull-age", &config, WindVector::CALM);

    engine.run_steps(30).unwrap();
    assert!(engine.points().get(0).unwrap().alive, "age exactly 1800 s is not expired");

    engine.run_steps(1).unwrap();
    assert!(!engine.points().get(0).unwrap().alive);
    assert_eq!(culled_counts(&engine, "cull-age", 30), Some((0, 1)));
}

#[test]
fn vertical_exit_is_culled() {
    let mut config = SimConfig::default_test();
    config.points_release[0].pressure_hpa = 201.0;
    config.timing.end_date = config.timing.start_date + Duration::minutes(10);
    // -5 Pa/s lifts the point 300 Pa per step, past the 200 hPa ceiling.
    let mut engine = engine_with("cull-ceiling", &config, WindVector::new(0.0, 0.0, -5.0));

    engine.run_steps(1).unwrap();
    assert!(!engine.points().get(0).unwrap().alive);
    assert_eq!(culled_counts(&engine, "cull-ceiling", 0), Some((1, 0)));
}

#[test]
fn latitude_exit_is_culled() {
    let mut config = SimConfig::default_test();
    config.points_release[0].lat = -9.99;
    // 50 m/s southward moves ~0.027° per step, across the -10° bound.
    let mut engine = engine_with("cull-south", &config, WindVector::new(0.0, -50.0, 0.0));

    engine.run_steps(1).unwrap();
    let p = engine.points().get(0).unwrap();
    assert!(!p.alive);
    assert!(p.lat < -10.0);
    assert_eq!(culled_counts(&engine, "cull-south", 0), Some((1, 0)));
}

#[test]
fn sinking_below_the_base_is_culled() {
    let mut config = SimConfig::default_test();
    config.points_release[0].pressure_hpa = 999.0;
    // +5 Pa/s adds 300 Pa per step: 99 900 Pa ends at 100 200 Pa, below the 1000 hPa base.
    let mut engine = engine_with("cull-floor", &config, WindVector::new(0.0, 0.0, 5.0));

    engine.run_steps(1).unwrap();
    let p = engine.points().get(0).unwrap();
    assert!(!p.alive);
    assert!(p.pressure > 100_000.0);
    assert_eq!(culled_counts(&engine, "cull-floor", 0), Some((1, 0)));
}
