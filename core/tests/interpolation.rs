use chrono::{DateTime, Duration, Utc};
use tracer_core::{
    error::SimError,
    met_field::{HorizontalGrid, MetFieldStore, MetGrid, MetSnapshot},
    met_source::{InMemoryMetSource, MetSourceKind},
    types::WindVector,
    vertical::VerticalCoordinate,
};

// ── Helpers ──────────────────────────────────────────────────────────────────

fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2023-06-01T00:00:00Z").unwrap().with_timezone(&Utc)
}

/// Every node carries a distinct value so a lookup that lands on the
/// wrong node is caught.
fn node_value(k: usize, j: usize, i: usize) -> f64 {
    1000.0 * k as f64 + 10.0 * j as f64 + i as f64
}

fn regional() -> HorizontalGrid {
    HorizontalGrid { lon0: -5.0, dlon: 2.5, nlon: 5, lat0: 40.0, dlat: 2.0, nlat: 4 }
}

fn store_with(
    horizontal: HorizontalGrid,
    vertical: VerticalCoordinate,
    offsets: &[f64],
    time_dependent: bool,
) -> MetFieldStore {
    let grid = MetGrid { horizontal, vertical: vertical.clone() };
    let mut source = InMemoryMetSource::new(horizontal, Duration::hours(1));
    for (hour, offset) in offsets.iter().enumerate() {
        let offset = *offset;
        source.insert(MetSnapshot::from_fn(
            &grid,
            t0() + Duration::hours(hour as i64),
            |k, j, i| WindVector::new(node_value(k, j, i) + offset, -node_value(k, j, i), 0.5 * k as f64),
            |j, i| 100_000.0 + 100.0 * j as f64 + 10.0 * i as f64,
        ));
    }
    let mut store = MetFieldStore::new(Box::new(source), vertical, time_dependent).unwrap();
    store.initialize(t0()).unwrap();
    store
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn exact_nodes_return_stored_values() {
    let store = store_with(regional(), VerticalCoordinate::era5(), &[0.0, 0.0], true);
    let grid = store.grid().clone();
    for (k, j, i) in [(0, 0, 0), (5, 2, 3), (27, 3, 4), (12, 1, 0)] {
        let p = grid.vertical.pressure_at(k, 0.0);
        let lon = grid.horizontal.lon_at(i);
        let lat = grid.horizontal.lat_at(j);
        let w = store.interpolate(lon, lat, p, t0()).unwrap();
        assert_eq!(w.u, node_value(k, j, i), "u at node ({k},{j},{i})");
        assert_eq!(w.v, -node_value(k, j, i));
    }
}

#[test]
fn hybrid_nodes_use_column_surface_pressure() {
    let store = store_with(regional(), VerticalCoordinate::merra2(), &[0.0, 0.0], true);
    let grid = store.grid().clone();
    let (j, i) = (2, 1);
    let ps = 100_000.0 + 100.0 * j as f64 + 10.0 * i as f64;
    for k in [0, 40, 71] {
        let p = grid.vertical.pressure_at(k, ps);
        let w = store
            .interpolate(grid.horizontal.lon_at(i), grid.horizontal.lat_at(j), p, t0())
            .unwrap();
        assert!((w.u - node_value(k, j, i)).abs() < 1e-6, "level {k}: {} vs {}", w.u, node_value(k, j, i));
    }
}

#[test]
fn midpoint_between_nodes_is_linear() {
    let store = store_with(regional(), VerticalCoordinate::era5(), &[0.0, 0.0], true);
    let grid = store.grid().clone();
    let p = grid.vertical.pressure_at(10, 0.0);
    let lon = 0.5 * (grid.horizontal.lon_at(1) + grid.horizontal.lon_at(2));
    let w = store.interpolate(lon, grid.horizontal.lat_at(1), p, t0()).unwrap();
    assert!((w.u - 0.5 * (node_value(10, 1, 1) + node_value(10, 1, 2))).abs() < 1e-9);
}

#[test]
fn time_interpolation_is_linear_between_snapshots() {
    let store = store_with(regional(), VerticalCoordinate::era5(), &[0.0, 10.0], true);
    let grid = store.grid().clone();
    let p = grid.vertical.pressure_at(3, 0.0);
    let (lon, lat) = (grid.horizontal.lon_at(2), grid.horizontal.lat_at(2));
    let base = node_value(3, 2, 2);

    let at = |minutes| store.interpolate(lon, lat, p, t0() + Duration::minutes(minutes)).unwrap().u;
    assert_eq!(at(0), base);
    assert!((at(30) - (base + 5.0)).abs() < 1e-9);
    assert!((at(45) - (base + 7.5)).abs() < 1e-9);
    assert_eq!(at(60), base + 10.0);
}

#[test]
fn static_meteorology_ignores_time() {
    let store = store_with(regional(), VerticalCoordinate::era5(), &[0.0], false);
    assert_eq!(store.next_time(), None);
    let grid = store.grid().clone();
    let p = grid.vertical.pressure_at(3, 0.0);
    let (lon, lat) = (grid.horizontal.lon_at(2), grid.horizontal.lat_at(2));
    let early = store.interpolate(lon, lat, p, t0()).unwrap();
    let late = store.interpolate(lon, lat, p, t0() + Duration::hours(30)).unwrap();
    assert_eq!(early, late);
}

#[test]
fn advances_report_only_loaded_snapshots() {
    let horizontal = regional();
    let vertical = VerticalCoordinate::era5();
    let grid = MetGrid { horizontal, vertical: vertical.clone() };
    let calm = |time| MetSnapshot::from_fn(&grid, time, |_, _, _| WindVector::CALM, |_, _| 100_000.0);

    let mut source = InMemoryMetSource::new(horizontal, Duration::hours(1));
    source.insert(calm(t0()));
    let mut fixed = MetFieldStore::new(Box::new(source), vertical.clone(), false).unwrap();
    let advances = fixed.advance_to(t0() + Duration::minutes(30)).unwrap();
    assert_eq!(advances.len(), 1);
    assert_eq!(advances[0].current, t0());
    assert_eq!(advances[0].next, None);
    assert!(fixed.advance_to(t0() + Duration::hours(5)).unwrap().is_empty());

    let mut source = InMemoryMetSource::new(horizontal, Duration::hours(1));
    for hour in 0..3 {
        source.insert(calm(t0() + Duration::hours(hour)));
    }
    let mut moving = MetFieldStore::new(Box::new(source), vertical, true).unwrap();
    let first = moving.advance_to(t0()).unwrap();
    assert_eq!(first[0].next, Some(t0() + Duration::hours(1)));
    let shifted = moving.advance_to(t0() + Duration::hours(1)).unwrap();
    assert_eq!(shifted.len(), 1);
    assert_eq!(shifted[0].current, t0() + Duration::hours(1));
    assert_eq!(shifted[0].next, Some(t0() + Duration::hours(2)));
}

#[test]
fn global_grid_wraps_longitude() {
    let horizontal = HorizontalGrid::global(90.0, 45.0);
    let store = store_with(horizontal, VerticalCoordinate::era5(), &[0.0, 0.0], true);
    let p = store.grid().vertical.pressure_at(0, 0.0);
    // Columns sit at -180, -90, 0, 90; 135 E lies between the last and the first.
    let w = store.interpolate(135.0, 0.0, p, t0()).unwrap();
    let expected = 0.5 * (node_value(0, 2, 3) + node_value(0, 2, 0));
    assert!((w.u - expected).abs() < 1e-9);
    // The same place written as -225 E.
    let wrapped = store.interpolate(-225.0, 0.0, p, t0()).unwrap();
    assert!((wrapped.u - expected).abs() < 1e-9);
}

#[test]
fn latitude_and_pressure_clamp_to_the_grid() {
    let store = store_with(regional(), VerticalCoordinate::era5(), &[0.0, 0.0], true);
    let grid = store.grid().clone();
    let lon = grid.horizontal.lon_at(1);
    let top = grid.vertical.pressure_at(0, 0.0);
    let bottom = grid.vertical.pressure_at(27, 0.0);

    let north = store.interpolate(lon, 89.0, top, t0()).unwrap();
    assert_eq!(north.u, node_value(0, 3, 1));
    let above = store.interpolate(lon, grid.horizontal.lat_at(0), top * 0.5, t0()).unwrap();
    assert_eq!(above.u, node_value(0, 0, 1));
    let below = store.interpolate(lon, grid.horizontal.lat_at(0), bottom + 5_000.0, t0()).unwrap();
    assert_eq!(below.u, node_value(27, 0, 1));
}

#[test]
fn missing_snapshot_reports_simulation_time() {
    let mut store = store_with(regional(), VerticalCoordinate::era5(), &[0.0, 0.0], true);
    let when = t0() + Duration::minutes(70);
    match store.advance_to(when) {
        Err(SimError::MetUnavailable { time, .. }) => assert_eq!(time, when),
        other => panic!("expected MetUnavailable, got {other:?}"),
    }
    // The window is left as it was.
    assert_eq!(store.current_time(), Some(t0()));
}

#[test]
fn era5_kind_matches_era5_table() {
    assert_eq!(MetSourceKind::Era5.vertical(), VerticalCoordinate::era5());
    assert_eq!(MetSourceKind::Merra2.vertical().n_levels(), 72);
}
