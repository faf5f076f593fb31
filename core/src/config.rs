use crate::{
    domain::Domain,
    error::{SimError, SimResult},
    met_field::HorizontalGrid,
    met_source::{MetSourceKind, UniformWindSource},
    physics_subsystem::IntegrationScheme,
    types::WindVector,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ── Domain ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Degrees east.
    pub lon_limits:       [f64; 2],
    /// Degrees north.
    pub lat_limits:       [f64; 2],
    /// hPa, the high-pressure (bottom) bound.
    pub pressure_base:    f64,
    /// hPa, the low-pressure (top) bound.
    pub pressure_ceiling: f64,
}

// ── Timing ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    pub start_date: DateTime<Utc>,
    pub end_date:   DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestepConfig {
    /// Physics step (s).
    pub simulation: f64,
    /// In-memory archive cadence (s).
    pub storage:    f64,
    /// Progress report cadence (s).
    pub reporting:  f64,
    /// Archive flush cadence as `HHMMSS`.
    pub output:     String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputOutputConfig {
    /// `"MERRA-2"` or `"ERA5"`.
    pub met_source: String,
    #[serde(default = "default_output_db")]
    pub output_db:  String,
}

fn default_output_db() -> String {
    "tracer_output.db".into()
}

// ── Point sources ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlightsConfig {
    #[serde(default)]
    pub active:            bool,
    /// Enables derived per-point quantities (box heights).
    #[serde(default)]
    pub complex_contrails: bool,
    #[serde(default)]
    pub tracks:            Vec<FlightTrackConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightTrackConfig {
    pub flight_id:           String,
    pub departure:           DateTime<Utc>,
    /// `[lon, lat]` pairs in flight order.
    pub waypoints:           Vec<[f64; 2]>,
    pub cruise_pressure_hpa: f64,
    /// Ground speed (m/s).
    pub speed_ms:            f64,
    pub points_per_step:     u32,
    /// Horizontal jitter radius for emitted points (m).
    #[serde(default)]
    pub dispersion_m:        f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseConfig {
    #[serde(default)]
    pub name:         String,
    pub time:         DateTime<Utc>,
    pub lon:          f64,
    pub lat:          f64,
    pub pressure_hpa: f64,
    #[serde(default = "default_release_count")]
    pub count:        u32,
    /// Horizontal jitter radius (m). Zero puts every point on the release site.
    #[serde(default)]
    pub spread_m:     f64,
}

fn default_release_count() -> u32 {
    1
}

// ── Physics and culling ────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CullingConfig {
    #[serde(default)]
    pub max_age_hours: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhysicsConfig {
    #[serde(default)]
    pub scheme: IntegrationScheme,
}

/// Uniform analytic meteorology for runs without reanalysis readers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticMetConfig {
    #[serde(default)]
    pub u:                    f64,
    #[serde(default)]
    pub v:                    f64,
    #[serde(default)]
    pub omega:                f64,
    #[serde(default = "default_surface_pressure_hpa")]
    pub surface_pressure_hpa: f64,
    #[serde(default = "default_grid_spacing")]
    pub dlon:                 f64,
    #[serde(default = "default_grid_spacing")]
    pub dlat:                 f64,
}

fn default_surface_pressure_hpa() -> f64 {
    1013.25
}

fn default_grid_spacing() -> f64 {
    1.0
}

impl SyntheticMetConfig {
    pub fn build(&self, kind: MetSourceKind) -> UniformWindSource {
        let mut source = UniformWindSource::new(
            HorizontalGrid::global(self.dlon, self.dlat),
            WindVector::new(self.u, self.v, self.omega),
        )
        .with_interval(kind.native_interval());
        source.surface_pressure = self.surface_pressure_hpa * 100.0;
        source
    }
}

// ── Top level ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub verbose:                   bool,
    #[serde(default = "default_true")]
    pub time_dependent_meteorology: bool,
    #[serde(default)]
    pub seed:                      u64,
    pub domain:                    DomainConfig,
    pub timing:                    TimingConfig,
    pub timesteps:                 TimestepConfig,
    pub input_output:              InputOutputConfig,
    #[serde(default)]
    pub points_flights:            FlightsConfig,
    #[serde(default)]
    pub points_release:            Vec<ReleaseConfig>,
    #[serde(default)]
    pub culling:                   CullingConfig,
    #[serde(default)]
    pub physics:                   PhysicsConfig,
    #[serde(default)]
    pub synthetic_met:             Option<SyntheticMetConfig>,
}

fn default_true() -> bool {
    true
}

impl SimConfig {
    /// Read and validate a JSON run configuration.
    pub fn load(path: impl AsRef<Path>) -> SimResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SimError::config("config_file", format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> SimResult<Self> {
        let config: SimConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Every check that can fail a run happens here, before step 0.
    pub fn validate(&self) -> SimResult<()> {
        self.met_source_kind()?;
        self.domain()?;

        if self.timing.end_date <= self.timing.start_date {
            return Err(SimError::config(
                "timing.end_date",
                format!("end {} is not after start {}", self.timing.end_date, self.timing.start_date),
            ));
        }
        for (field, value) in [
            ("timesteps.simulation", self.timesteps.simulation),
            ("timesteps.storage", self.timesteps.storage),
            ("timesteps.reporting", self.timesteps.reporting),
        ] {
            if !(value > 0.0) || !value.is_finite() {
                return Err(SimError::config(field, format!("must be a positive number of seconds, got {value}")));
            }
        }

        let dt_output = self.dt_output_seconds()?;
        let ratio = dt_output / self.timesteps.storage;
        if ratio < 1.0 - 1e-9 || (ratio - ratio.round()).abs() > 1e-9 {
            return Err(SimError::config(
                "timesteps.output",
                format!(
                    "output cadence {dt_output} s is not an integer multiple of storage cadence {} s",
                    self.timesteps.storage
                ),
            ));
        }

        for (n, track) in self.points_flights.tracks.iter().enumerate() {
            let field = format!("points_flights.tracks[{n}]");
            if track.waypoints.len() < 2 {
                return Err(SimError::config(field, "a flight track needs at least 2 waypoints"));
            }
            if !(track.speed_ms > 0.0) {
                return Err(SimError::config(field, format!("speed_ms must be positive, got {}", track.speed_ms)));
            }
            if !(track.cruise_pressure_hpa > 0.0) || track.dispersion_m < 0.0 {
                return Err(SimError::config(field, "cruise pressure must be positive and dispersion non-negative"));
            }
        }
        for (n, release) in self.points_release.iter().enumerate() {
            if !(release.pressure_hpa > 0.0) || release.spread_m < 0.0 {
                return Err(SimError::config(
                    format!("points_release[{n}]"),
                    "pressure must be positive and spread non-negative",
                ));
            }
        }
        if let Some(hours) = self.culling.max_age_hours {
            if !(hours > 0.0) {
                return Err(SimError::config("culling.max_age_hours", format!("must be positive, got {hours}")));
            }
        }
        Ok(())
    }

    pub fn met_source_kind(&self) -> SimResult<MetSourceKind> {
        MetSourceKind::parse(&self.input_output.met_source)
    }

    /// Domain with pressure bounds converted from hPa to Pa.
    pub fn domain(&self) -> SimResult<Domain> {
        Domain::new(
            self.domain.lon_limits,
            self.domain.lat_limits,
            self.domain.pressure_base * 100.0,
            self.domain.pressure_ceiling * 100.0,
        )
    }

    pub fn dt_output_seconds(&self) -> SimResult<f64> {
        parse_hms(&self.timesteps.output)
    }

    /// Box heights are expensive; only flights with complex contrail
    /// physics need them.
    pub fn box_heights_needed(&self) -> bool {
        self.points_flights.active && self.points_flights.complex_contrails
    }

    pub fn max_age_seconds(&self) -> Option<f64> {
        self.culling.max_age_hours.map(|h| h * 3600.0)
    }

    /// Config with hardcoded defaults for use in tests: a two-hour ERA5 run
    /// over a 20°×20° box with a single point released at the origin.
    pub fn default_test() -> Self {
        let start = DateTime::parse_from_rfc3339("2023-01-01T00:00:00Z")
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_default();
        Self {
            verbose: false,
            time_dependent_meteorology: true,
            seed: 42,
            domain: DomainConfig {
                lon_limits:       [-10.0, 10.0],
                lat_limits:       [-10.0, 10.0],
                pressure_base:    1000.0,
                pressure_ceiling: 200.0,
            },
            timing: TimingConfig {
                start_date: start,
                end_date:   start + Duration::hours(2),
            },
            timesteps: TimestepConfig {
                simulation: 60.0,
                storage:    60.0,
                reporting:  600.0,
                output:     "010000".into(),
            },
            input_output: InputOutputConfig {
                met_source: "ERA5".into(),
                output_db:  ":memory:".into(),
            },
            points_flights: FlightsConfig::default(),
            points_release: vec![ReleaseConfig {
                name:         "origin".into(),
                time:         start,
                lon:          0.0,
                lat:          0.0,
                pressure_hpa: 500.0,
                count:        1,
                spread_m:     0.0,
            }],
            culling: CullingConfig::default(),
            physics: PhysicsConfig::default(),
            synthetic_met: None,
        }
    }
}

/// Parse an `HHMMSS` duration into seconds.
pub fn parse_hms(text: &str) -> SimResult<f64> {
    let text = text.trim();
    let bad = |why: &str| SimError::config("timesteps.output", format!("'{text}' is not an HHMMSS duration: {why}"));
    if text.len() != 6 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad("expected exactly six digits"));
    }
    let field = |range: std::ops::Range<usize>| text[range].parse::<u32>().map_err(|_| bad("not a number"));
    let (hours, minutes, seconds) = (field(0..2)?, field(2..4)?, field(4..6)?);
    if minutes >= 60 || seconds >= 60 {
        return Err(bad("minutes and seconds must be below 60"));
    }
    let total = hours * 3600 + minutes * 60 + seconds;
    if total == 0 {
        return Err(bad("duration must be positive"));
    }
    Ok(total as f64)
}

/// Inverse of `parse_hms` for whole-second durations below 100 hours.
pub fn format_hms(seconds: f64) -> String {
    let total = seconds.round() as u64;
    format!("{:02}{:02}{:02}", total / 3600, (total % 3600) / 60, total % 60)
}
