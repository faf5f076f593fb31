//! Shared primitive types used across the entire simulation.

/// A physics step index. Step 0 starts at the configured start date.
pub type Step = u64;

/// A stable, unique identifier for a simulated point.
pub type PointId = u64;

/// The canonical run identifier.
pub type RunId = String;

/// Mean Earth radius used for all horizontal distance conversions (m).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Standard gravity (m s⁻²).
pub const GRAVITY: f64 = 9.806_65;

/// Specific gas constant for dry air (J kg⁻¹ K⁻¹).
pub const R_DRY_AIR: f64 = 287.05;

/// Wind at a point: horizontal components in m/s, vertical in Pa/s.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WindVector {
    pub u:     f64,
    pub v:     f64,
    pub omega: f64,
}

impl WindVector {
    pub const CALM: WindVector = WindVector { u: 0.0, v: 0.0, omega: 0.0 };

    pub fn new(u: f64, v: f64, omega: f64) -> Self {
        Self { u, v, omega }
    }

    /// Weighted combination `a·(1-f) + b·f`, exact at f = 0 and f = 1.
    #[inline]
    pub fn lerp(a: WindVector, b: WindVector, f: f64) -> WindVector {
        WindVector {
            u:     lerp(a.u, b.u, f),
            v:     lerp(a.v, b.v, f),
            omega: lerp(a.omega, b.omega, f),
        }
    }
}

/// Linear interpolation written so the end points are reproduced exactly.
#[inline]
pub fn lerp(a: f64, b: f64, f: f64) -> f64 {
    a * (1.0 - f) + b * f
}

/// Wrap a longitude into [-180, 180). In-range values pass through
/// bit-for-bit.
#[inline]
pub fn normalize_lon(lon: f64) -> f64 {
    if (-180.0..180.0).contains(&lon) {
        return lon;
    }
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

/// Move a position by metric offsets on a spherical Earth. Longitude
/// steps scale with the radius of the latitude circle.
#[inline]
pub fn displace(lon: f64, lat: f64, east_m: f64, north_m: f64) -> (f64, f64) {
    let cos_lat = lat.to_radians().cos().max(1e-6);
    let lon = lon + (east_m / (EARTH_RADIUS_M * cos_lat)).to_degrees();
    let lat = (lat + (north_m / EARTH_RADIUS_M).to_degrees()).clamp(-90.0, 90.0);
    (normalize_lon(lon), lat)
}

/// Great-circle distance (m) between two lon/lat positions in degrees.
pub fn great_circle_distance(a: [f64; 2], b: [f64; 2]) -> f64 {
    let (lat1, lat2) = (a[1].to_radians(), b[1].to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b[0] - a[0]).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}
