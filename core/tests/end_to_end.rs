use chrono::Duration;
use tracer_core::{
    config::SimConfig,
    engine::SimEngine,
    met_field::{HorizontalGrid, MetGrid, MetSnapshot},
    met_source::{InMemoryMetSource, MetSourceKind, UniformWindSource},
    physics_subsystem::IntegrationScheme,
    types::{WindVector, EARTH_RADIUS_M},
};

fn eastward_run(run_id: &str, scheme: IntegrationScheme) -> SimEngine {
    let mut config = SimConfig::default_test();
    config.timing.end_date = config.timing.start_date + Duration::hours(1);
    config.physics.scheme = scheme;
    let source = UniformWindSource::new(HorizontalGrid::global(1.0, 1.0), WindVector::new(10.0, 0.0, 0.0));
    let mut engine = SimEngine::build_test_with(run_id.into(), &config, Box::new(source)).unwrap();
    engine.run().unwrap();
    engine
}

/// 10 m/s eastward for an hour from (0°, 0°, 500 hPa) covers 36 km.
#[test]
fn steady_eastward_wind_moves_point_36_km() {
    let expected_dlon = (36_000.0 / EARTH_RADIUS_M).to_degrees();

    for scheme in [IntegrationScheme::Euler, IntegrationScheme::Rk2] {
        let run_id = format!("east-{scheme:?}");
        let engine = eastward_run(&run_id, scheme);
        assert_eq!(engine.clock.current_step, 60);

        let p = engine.points().get(0).unwrap();
        assert!(p.alive, "{scheme:?}: point should still be in the domain");
        assert!((p.lon - expected_dlon).abs() < 1e-9, "{scheme:?}: lon {} vs {expected_dlon}", p.lon);
        assert_eq!(p.lat, 0.0);
        assert_eq!(p.pressure, 50_000.0);

        let archived = engine.store().archived_points_at(&run_id, 60).unwrap();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].lon, p.lon);
    }
}

#[test]
fn archive_positions_grow_monotonically() {
    let engine = eastward_run("east-track", IntegrationScheme::Euler);
    let step_dlon = (600.0 / EARTH_RADIUS_M).to_degrees();
    let mut last = 0.0;
    for step in 1..=60 {
        let p = engine.store().archived_points_at("east-track", step).unwrap()[0];
        assert!((p.lon - last - step_dlon).abs() < 1e-12, "step {step}");
        assert_eq!(p.age_seconds, 60.0 * step as f64);
        last = p.lon;
    }
}

#[test]
fn summary_reports_the_run() {
    let mut config = SimConfig::default_test();
    config.timing.end_date = config.timing.start_date + Duration::minutes(90);
    let source = UniformWindSource::calm(HorizontalGrid::global(1.0, 1.0));
    let mut engine = SimEngine::build_test_with("summary".into(), &config, Box::new(source)).unwrap();
    let summary = engine.run().unwrap();

    assert_eq!(summary.steps, 90);
    assert_eq!(summary.spawned, 1);
    assert_eq!(summary.alive, 1);
    // One flush at the hour, one final flush for the remaining 30 entries.
    assert_eq!(summary.flushes, 2);
    assert_eq!(engine.store().flush_entry_counts("summary").unwrap(), vec![60, 30]);
    assert!(summary.phases.iter().any(|(name, _)| *name == "Point physics"));
    assert_eq!(summary.end_time, config.timing.end_date);
}

#[test]
fn single_hour_long_step_matches_36_km() {
    let mut config = SimConfig::default_test();
    config.timing.end_date = config.timing.start_date + Duration::hours(1);
    config.timesteps.simulation = 3600.0;
    config.timesteps.storage = 3600.0;
    config.timesteps.reporting = 3600.0;
    let source = UniformWindSource::new(HorizontalGrid::global(1.0, 1.0), WindVector::new(10.0, 0.0, 0.0));
    let mut engine = SimEngine::build_test_with("east-one-step".into(), &config, Box::new(source)).unwrap();
    engine.run().unwrap();

    assert_eq!(engine.clock.current_step, 1);
    let p = engine.points().get(0).unwrap();
    assert!(p.alive);
    assert!((p.lon - (36_000.0 / EARTH_RADIUS_M).to_degrees()).abs() < 1e-12);
    assert_eq!(engine.store().flush_entry_counts("east-one-step").unwrap(), vec![1]);
}

/// One hour-long step through `u = 20 + 0.5·lat`, `v = 5`. Euler uses the
/// wind at the start; the midpoint scheme uses the wind half a step north.
#[test]
fn midpoint_scheme_follows_latitudinal_shear() {
    let run = |run_id: &str, scheme: IntegrationScheme| {
        let mut config = SimConfig::default_test();
        config.time_dependent_meteorology = false;
        config.timing.end_date = config.timing.start_date + Duration::hours(1);
        config.timesteps.simulation = 3600.0;
        config.timesteps.storage = 3600.0;
        config.timesteps.reporting = 3600.0;
        config.physics.scheme = scheme;

        let horizontal = HorizontalGrid::global(1.0, 1.0);
        let grid = MetGrid { horizontal, vertical: MetSourceKind::Era5.vertical() };
        let mut source = InMemoryMetSource::new(horizontal, Duration::hours(1));
        source.insert(MetSnapshot::from_fn(
            &grid,
            config.timing.start_date,
            |_, j, _| WindVector::new(20.0 + 0.5 * horizontal.lat_at(j), 5.0, 0.0),
            |_, _| 101_325.0,
        ));
        let mut engine = SimEngine::build_test_with(run_id.into(), &config, Box::new(source)).unwrap();
        engine.run().unwrap();
        let p = engine.points().get(0).unwrap();
        (p.lon, p.lat, p.pressure)
    };

    let dt = 3600.0;
    let lat_end = (5.0 * dt / EARTH_RADIUS_M).to_degrees();
    let euler_lon = (20.0 * dt / EARTH_RADIUS_M).to_degrees();
    let lat_mid = (5.0 * 0.5 * dt / EARTH_RADIUS_M).to_degrees();
    let rk2_lon = ((20.0 + 0.5 * lat_mid) * dt / EARTH_RADIUS_M).to_degrees();

    let (lon, lat, pressure) = run("shear-euler", IntegrationScheme::Euler);
    assert!((lon - euler_lon).abs() < 1e-9, "euler lon {lon} vs {euler_lon}");
    assert!((lat - lat_end).abs() < 1e-12);
    assert_eq!(pressure, 50_000.0);

    let (lon, lat, _) = run("shear-rk2", IntegrationScheme::Rk2);
    assert!((lon - rk2_lon).abs() < 1e-9, "rk2 lon {lon} vs {rk2_lon}");
    assert!((lat - lat_end).abs() < 1e-12);
    assert!((rk2_lon - euler_lon).abs() > 1e-4, "shear must separate the schemes");
}
