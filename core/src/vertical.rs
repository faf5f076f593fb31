//! Vertical coordinate systems.
//!
//! Two flavours sit behind one enum: hybrid sigma-pressure levels
//! (`P = AP + BP·Ps`, MERRA-2) and fixed pressure levels (ERA5).
//! Callers only ever ask for "pressure at level" and "which levels
//! bracket this pressure".
//!
//! CANONICAL ORDER: every table is stored with pressure ascending
//! (index 0 = model top). The order is fixed at construction and
//! nothing downstream re-sorts.

use crate::error::{SimError, SimResult};

/// Surface pressures at which hybrid tables must be strictly monotonic.
const HYBRID_CHECK_SURFACE_PRESSURES: [f64; 2] = [50_000.0, 101_325.0];

/// ERA5 pressure levels (Pa) in the order the reader delivers them,
/// surface first. Reversed into canonical order by `era5()`.
pub const ERA5_PRESSURE_LEVELS_PA: [f64; 28] = [
    1000.0e2, 975.0e2, 950.0e2, 925.0e2, 900.0e2, 875.0e2, 850.0e2,
     825.0e2, 800.0e2, 775.0e2, 750.0e2, 700.0e2, 650.0e2, 600.0e2,
     550.0e2, 500.0e2, 450.0e2, 400.0e2, 350.0e2, 300.0e2, 250.0e2,
     225.0e2, 200.0e2, 175.0e2, 150.0e2, 125.0e2, 100.0e2,  70.0e2,
];

/// GEOS-5 / MERRA-2 72-layer grid: `AP` at the 73 layer edges (hPa),
/// surface edge first.
pub const MERRA2_AP_EDGES_HPA: [f64; 73] = [
    0.000000e+00, 4.804826e-02, 6.593752e+00, 1.313480e+01, 1.961311e+01,
    2.609201e+01, 3.257081e+01, 3.898201e+01, 4.533901e+01, 5.169611e+01,
    5.805321e+01, 6.436264e+01, 7.062198e+01, 7.883422e+01, 8.909992e+01,
    9.936521e+01, 1.091817e+02, 1.189586e+02, 1.286959e+02, 1.429100e+02,
    1.562600e+02, 1.696090e+02, 1.816190e+02, 1.930970e+02, 2.032590e+02,
    2.121500e+02, 2.187760e+02, 2.238980e+02, 2.243630e+02, 2.168650e+02,
    2.011920e+02, 1.769300e+02, 1.503930e+02, 1.278370e+02, 1.086630e+02,
    9.236572e+01, 7.851231e+01, 6.660341e+01, 5.638791e+01, 4.764391e+01,
    4.017541e+01, 3.381001e+01, 2.836781e+01, 2.373041e+01, 1.979160e+01,
    1.645710e+01, 1.364340e+01, 1.127690e+01, 9.292942e+00, 7.619842e+00,
    6.216801e+00, 5.046801e+00, 4.076571e+00, 3.276431e+00, 2.620211e+00,
    2.084970e+00, 1.650790e+00, 1.300510e+00, 1.019440e+00, 7.951341e-01,
    6.167791e-01, 4.758061e-01, 3.650411e-01, 2.785261e-01, 2.113490e-01,
    1.594950e-01, 1.197030e-01, 8.934502e-02, 6.600001e-02, 4.758501e-02,
    3.270000e-02, 2.000000e-02, 1.000000e-02,
];

/// GEOS-5 / MERRA-2 72-layer grid: `BP` at the 73 layer edges,
/// surface edge first.
pub const MERRA2_BP_EDGES: [f64; 73] = [
    1.000000e+00, 9.849520e-01, 9.634060e-01, 9.418650e-01, 9.203870e-01,
    8.989080e-01, 8.774290e-01, 8.560180e-01, 8.346609e-01, 8.133039e-01,
    7.919469e-01, 7.706375e-01, 7.493782e-01, 7.211660e-01, 6.858999e-01,
    6.506349e-01, 6.158184e-01, 5.810415e-01, 5.463042e-01, 4.945902e-01,
    4.437402e-01, 3.928911e-01, 3.433811e-01, 2.944031e-01, 2.467411e-01,
    2.003501e-01, 1.562241e-01, 1.136021e-01, 6.372006e-02, 2.801004e-02,
    6.960025e-03, 8.175413e-09, 0.0, 0.0, 0.0,
    0.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 0.0, 0.0, 0.0, 0.0,
    0.0, 0.0, 0.0,
];

/// The two levels surrounding a target pressure.
///
/// `lower` and `upper` are level *indices* (`upper = lower + 1`);
/// `fraction` is the linear weight of `upper`, in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelBracket {
    pub lower:    usize,
    pub upper:    usize,
    pub fraction: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerticalCoordinate {
    Hybrid { ap: Vec<f64>, bp: Vec<f64> },
    FixedPressure { levels: Vec<f64> },
}

impl VerticalCoordinate {
    /// Build a hybrid coordinate from `AP` (Pa) and `BP` tables given in
    /// either vertical order.
    pub fn hybrid(mut ap: Vec<f64>, mut bp: Vec<f64>) -> SimResult<Self> {
        if ap.len() != bp.len() {
            return Err(SimError::config(
                "vertical.bp",
                format!("AP has {} entries but BP has {}", ap.len(), bp.len()),
            ));
        }
        check_length("vertical.ap", ap.len())?;

        let column = |ps: f64, ap: &[f64], bp: &[f64]| -> Vec<f64> {
            ap.iter().zip(bp).map(|(a, b)| a + b * ps).collect()
        };
        let reference = column(HYBRID_CHECK_SURFACE_PRESSURES[1], &ap, &bp);
        if reference[0] > reference[reference.len() - 1] {
            ap.reverse();
            bp.reverse();
        }
        for ps in HYBRID_CHECK_SURFACE_PRESSURES {
            check_ascending("vertical.ap", &column(ps, &ap, &bp))?;
        }
        Ok(Self::Hybrid { ap, bp })
    }

    /// Build a fixed-pressure coordinate from level pressures (Pa) given
    /// in either vertical order.
    pub fn fixed_pressure(mut levels: Vec<f64>) -> SimResult<Self> {
        check_length("vertical.levels", levels.len())?;
        if levels[0] > levels[levels.len() - 1] {
            levels.reverse();
        }
        check_ascending("vertical.levels", &levels)?;
        Ok(Self::FixedPressure { levels })
    }

    /// ERA5 pressure levels, reversed from reader order into canonical order.
    pub fn era5() -> Self {
        let mut levels = ERA5_PRESSURE_LEVELS_PA.to_vec();
        levels.reverse();
        Self::FixedPressure { levels }
    }

    /// MERRA-2 model levels: layer midpoints of the 73-edge table, in Pa.
    pub fn merra2() -> Self {
        let mid = |edges: &[f64], scale: f64| -> Vec<f64> {
            edges.windows(2).map(|w| 0.5 * (w[0] + w[1]) * scale).collect()
        };
        let mut ap = mid(&MERRA2_AP_EDGES_HPA, 100.0);
        let mut bp = mid(&MERRA2_BP_EDGES, 1.0);
        ap.reverse();
        bp.reverse();
        Self::Hybrid { ap, bp }
    }

    pub fn n_levels(&self) -> usize {
        match self {
            Self::Hybrid { ap, .. } => ap.len(),
            Self::FixedPressure { levels } => levels.len(),
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, Self::FixedPressure { .. })
    }

    /// Pressure (Pa) of `level` in a column with the given surface pressure.
    /// Fixed levels ignore `surface_pressure`.
    #[inline]
    pub fn pressure_at(&self, level: usize, surface_pressure: f64) -> f64 {
        match self {
            Self::Hybrid { ap, bp } => ap[level] + bp[level] * surface_pressure,
            Self::FixedPressure { levels } => levels[level],
        }
    }

    /// All level pressures of one column, canonical order.
    pub fn column_pressures(&self, surface_pressure: f64) -> Vec<f64> {
        (0..self.n_levels())
            .map(|k| self.pressure_at(k, surface_pressure))
            .collect()
    }

    /// Levels bracketing `target` (Pa). Targets above the top level or
    /// below the bottom level clamp to the end pair.
    pub fn bracket(&self, target: f64, surface_pressure: f64) -> LevelBracket {
        match self {
            Self::FixedPressure { levels } => bracket_by(levels.len(), target, |k| levels[k]),
            Self::Hybrid { ap, bp } => {
                bracket_by(ap.len(), target, |k| ap[k] + bp[k] * surface_pressure)
            }
        }
    }

    /// Pressure distance (Pa) between the two levels of a bracket.
    pub fn level_thickness(&self, bracket: LevelBracket, surface_pressure: f64) -> f64 {
        self.pressure_at(bracket.upper, surface_pressure)
            - self.pressure_at(bracket.lower, surface_pressure)
    }
}

fn check_length(field: &str, n: usize) -> SimResult<()> {
    if n < 2 {
        return Err(SimError::config(field, format!("need at least 2 levels, got {n}")));
    }
    Ok(())
}

fn check_ascending(field: &str, pressures: &[f64]) -> SimResult<()> {
    if let Some(k) = pressures.windows(2).position(|w| !(w[0] < w[1])) {
        return Err(SimError::config(
            field,
            format!(
                "level pressures are not strictly monotonic at level {k} ({} then {})",
                pressures[k],
                pressures[k + 1]
            ),
        ));
    }
    Ok(())
}

fn bracket_by(n: usize, target: f64, pressure_at: impl Fn(usize) -> f64) -> LevelBracket {
    if target <= pressure_at(0) {
        return LevelBracket { lower: 0, upper: 1, fraction: 0.0 };
    }
    if target >= pressure_at(n - 1) {
        return LevelBracket { lower: n - 2, upper: n - 1, fraction: 1.0 };
    }
    // p(lo) <= target < p(hi)
    let (mut lo, mut hi) = (0, n - 1);
    while hi - lo > 1 {
        let mid = (lo + hi) / 2;
        if pressure_at(mid) <= target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    let (p0, p1) = (pressure_at(lo), pressure_at(hi));
    LevelBracket { lower: lo, upper: hi, fraction: (target - p0) / (p1 - p0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracket_hits_levels_exactly() {
        let vc = VerticalCoordinate::fixed_pressure(vec![100.0, 200.0, 400.0]).unwrap();
        let b = vc.bracket(200.0, 0.0);
        assert_eq!((b.lower, b.upper, b.fraction), (1, 2, 0.0));
        let b = vc.bracket(400.0, 0.0);
        assert_eq!((b.lower, b.upper, b.fraction), (1, 2, 1.0));
        let b = vc.bracket(300.0, 0.0);
        assert_eq!((b.lower, b.upper), (1, 2));
        assert!((b.fraction - 0.5).abs() < 1e-12);
    }

    #[test]
    fn bracket_clamps_outside_column() {
        let vc = VerticalCoordinate::fixed_pressure(vec![100.0, 200.0, 400.0]).unwrap();
        assert_eq!(vc.bracket(10.0, 0.0).fraction, 0.0);
        assert_eq!(vc.bracket(10.0, 0.0).lower, 0);
        assert_eq!(vc.bracket(9e9, 0.0).upper, 2);
        assert_eq!(vc.bracket(9e9, 0.0).fraction, 1.0);
    }

    #[test]
    fn hybrid_levels_follow_surface_pressure() {
        // surface-first input is reversed into ascending order
        let vc = VerticalCoordinate::hybrid(vec![0.0, 500.0, 1000.0], vec![1.0, 0.5, 0.0]).unwrap();
        assert_eq!(vc.pressure_at(0, 100_000.0), 1000.0);
        assert_eq!(vc.pressure_at(1, 100_000.0), 50_500.0);
        assert_eq!(vc.pressure_at(2, 100_000.0), 100_000.0);
        assert_eq!(vc.pressure_at(2, 90_000.0), 90_000.0);
    }

    #[test]
    fn era5_table_is_ascending() {
        let vc = VerticalCoordinate::era5();
        assert!(vc.is_fixed());
        assert_eq!(vc.n_levels(), ERA5_PRESSURE_LEVELS_PA.len());
        let col = vc.column_pressures(0.0);
        assert!(col.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(col[0], 7_000.0);
        assert_eq!(col[col.len() - 1], 100_000.0);
    }

    #[test]
    fn bad_tables_are_configuration_errors() {
        assert!(VerticalCoordinate::fixed_pressure(vec![500.0]).is_err());
        assert!(VerticalCoordinate::fixed_pressure(vec![100.0, 300.0, 200.0]).is_err());
        assert!(VerticalCoordinate::hybrid(vec![0.0, 1.0], vec![1.0]).is_err());
    }

    #[test]
    fn merra2_table_is_canonical() {
        let vc = VerticalCoordinate::merra2();
        assert_eq!(vc.n_levels(), 72);
        let col = vc.column_pressures(101_325.0);
        assert!(col.windows(2).all(|w| w[0] < w[1]));
    }
}
