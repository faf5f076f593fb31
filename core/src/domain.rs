//! Simulation domain: the spatial bounding box and the geometry derived
//! from it.

use crate::{
    error::{SimError, SimResult},
    types::{GRAVITY, R_DRY_AIR},
};
use serde::{Deserialize, Serialize};

/// Layer-mean temperature assumed when converting level spacing to a
/// geometric box height (K).
pub const BOX_HEIGHT_REFERENCE_TEMPERATURE: f64 = 240.0;

/// Lon/lat in degrees, pressure in Pa. `pressure_floor` is the high-pressure
/// (low-altitude) bound.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Domain {
    pub lon_min:          f64,
    pub lon_max:          f64,
    pub lat_min:          f64,
    pub lat_max:          f64,
    pub pressure_floor:   f64,
    pub pressure_ceiling: f64,
}

impl Domain {
    pub fn new(
        lon_limits: [f64; 2],
        lat_limits: [f64; 2],
        pressure_floor: f64,
        pressure_ceiling: f64,
    ) -> SimResult<Self> {
        let [lon_min, lon_max] = lon_limits;
        let [lat_min, lat_max] = lat_limits;
        if !(lon_min < lon_max) || lon_max - lon_min > 360.0 {
            return Err(SimError::config(
                "domain.lon_limits",
                format!("need lon_min < lon_max spanning at most 360 degrees, got [{lon_min}, {lon_max}]"),
            ));
        }
        if !(lat_min < lat_max) || lat_min < -90.0 || lat_max > 90.0 {
            return Err(SimError::config(
                "domain.lat_limits",
                format!("need -90 <= lat_min < lat_max <= 90, got [{lat_min}, {lat_max}]"),
            ));
        }
        if !(pressure_ceiling < pressure_floor) || pressure_ceiling <= 0.0 {
            return Err(SimError::config(
                "domain.pressure_ceiling",
                format!(
                    "need 0 < pressure_ceiling < pressure_base, got ceiling {pressure_ceiling} Pa, base {pressure_floor} Pa"
                ),
            ));
        }
        Ok(Self { lon_min, lon_max, lat_min, lat_max, pressure_floor, pressure_ceiling })
    }

    /// Longitude is compared on the 360° image starting at `lon_min`, so
    /// domains across the antimeridian work with normalised positions.
    pub fn contains(&self, lon: f64, lat: f64, pressure: f64) -> bool {
        let lon_rel = (lon - self.lon_min).rem_euclid(360.0);
        lon_rel <= self.lon_max - self.lon_min
            && (self.lat_min..=self.lat_max).contains(&lat)
            && (self.pressure_ceiling..=self.pressure_floor).contains(&pressure)
    }
}

/// Owns the domain plus optional derived geometry.
#[derive(Debug, Clone)]
pub struct DomainManager {
    domain:      Domain,
    box_heights: bool,
}

impl DomainManager {
    pub fn new(domain: Domain, box_heights: bool) -> Self {
        Self { domain, box_heights }
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Whether points carry a derived vertical box height.
    pub fn box_heights_enabled(&self) -> bool {
        self.box_heights
    }

    pub fn contains(&self, lon: f64, lat: f64, pressure: f64) -> bool {
        self.domain.contains(lon, lat, pressure)
    }

    /// Geometric height (m) of a model box `thickness` Pa deep centred on
    /// `pressure`, from the hypsometric equation at a fixed layer temperature.
    pub fn box_height(&self, pressure: f64, thickness: f64) -> f64 {
        let half = 0.5 * thickness.abs();
        let top = (pressure - half).max(1.0);
        let bottom = pressure + half;
        R_DRY_AIR * BOX_HEIGHT_REFERENCE_TEMPERATURE / GRAVITY * (bottom / top).ln()
    }
}
