//! Loaded opacity and grid tables.
//!
//! All tabulated physical data is collected into an immutable
//! [`AtmosphereTables`] at construction time: the shared wavelength,
//! temperature and pressure grids, per-species opacity cubes and
//! collisional-pair tables. Parsing of the on-disk formats is out of scope;
//! callers hand over plain `ndarray` arrays.
//!
//! Opacities are floored and converted to log10 once here, so the hot
//! interpolation path never has to guard against log-domain singularities.
//!
//! A process-wide cache with an explicit init/get/clear contract is provided
//! for sharing one table set between calculator instances (e.g. parallel
//! retrieval workers); tables are always injected explicitly, never loaded
//! implicitly.

use crate::errors::{AtmResult, AtmosphereError};
use crate::species::{SpeciesId, SpeciesRegistry};
use ndarray::{Array1, Array2, Array3};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Floor applied to opacities and collisional coefficients before taking
/// logs, matching the reference data pipeline.
pub const DEFAULT_MIN_OPACITY: f64 = 1e-99;

/// Immutable, loaded-once tabulated data shared by all forward-model calls.
#[derive(Debug, Clone)]
pub struct AtmosphereTables {
    /// Native wavelength grid, strictly increasing
    /// unit: m
    pub wavelengths: Array1<f64>,
    /// Temperature grid of all opacity tables, strictly increasing
    /// unit: K
    pub temperatures: Array1<f64>,
    /// Pressure grid of all opacity tables, strictly increasing
    /// unit: Pa
    pub pressures: Array1<f64>,
    /// log10 of the pressure grid, the axis actually interpolated on
    pub log_pressures: Array1<f64>,
    /// Species registry (masses, polarizabilities, name interning)
    pub species: SpeciesRegistry,
    /// log10 opacity per species, shape `(N_T, N_P, N_lambda)`
    pub log_opacity: HashMap<SpeciesId, Array3<f64>>,
    /// log10 collisional absorption per unordered species pair,
    /// shape `(N_lambda, N_T)`; keys are stored with the smaller id first
    pub log_collisional: HashMap<(SpeciesId, SpeciesId), Array2<f64>>,
}

impl AtmosphereTables {
    /// Assemble and validate a table set.
    ///
    /// `opacity` maps species name to a raw `(N_T, N_P, N_lambda)` opacity
    /// cube; `collisional` maps species-name pairs to raw `(N_lambda, N_T)`
    /// coefficients. Values below `min_opacity` are floored before log10.
    pub fn new(
        wavelengths: Array1<f64>,
        temperatures: Array1<f64>,
        pressures: Array1<f64>,
        species: SpeciesRegistry,
        opacity: HashMap<String, Array3<f64>>,
        collisional: HashMap<(String, String), Array2<f64>>,
        min_opacity: f64,
    ) -> AtmResult<Self> {
        for (name, grid) in [
            ("wavelength", &wavelengths),
            ("temperature", &temperatures),
            ("pressure", &pressures),
        ] {
            if grid.is_empty() {
                return Err(AtmosphereError::InvalidTables(format!(
                    "{name} grid is empty"
                )));
            }
            if grid.windows(2).into_iter().any(|w| w[1] <= w[0]) {
                return Err(AtmosphereError::InvalidTables(format!(
                    "{name} grid is not strictly increasing"
                )));
            }
        }

        let (n_t, n_p, n_lambda) = (temperatures.len(), pressures.len(), wavelengths.len());

        let mut log_opacity = HashMap::new();
        for (name, cube) in opacity {
            if cube.shape() != [n_t, n_p, n_lambda] {
                return Err(AtmosphereError::InvalidTables(format!(
                    "opacity table for {} has shape {:?}, expected ({}, {}, {})",
                    name,
                    cube.shape(),
                    n_t,
                    n_p,
                    n_lambda
                )));
            }
            let id = species.get(&name).ok_or_else(|| {
                AtmosphereError::InvalidTables(format!("opacity table for unregistered species {name}"))
            })?;
            log_opacity.insert(id, cube.mapv(|v| v.max(min_opacity).log10()));
        }

        let mut log_collisional = HashMap::new();
        for ((a, b), table) in collisional {
            if table.shape() != [n_lambda, n_t] {
                return Err(AtmosphereError::InvalidTables(format!(
                    "collisional table for {}-{} has shape {:?}, expected ({}, {})",
                    a,
                    b,
                    table.shape(),
                    n_lambda,
                    n_t
                )));
            }
            let (ia, ib) = match (species.get(&a), species.get(&b)) {
                (Some(ia), Some(ib)) => (ia, ib),
                _ => {
                    return Err(AtmosphereError::InvalidTables(format!(
                        "collisional table for unregistered pair {a}-{b}"
                    )))
                }
            };
            let key = if ia.0 <= ib.0 { (ia, ib) } else { (ib, ia) };
            log_collisional.insert(key, table.mapv(|v| v.max(min_opacity).log10()));
        }

        let log_pressures = pressures.mapv(f64::log10);
        Ok(Self {
            wavelengths,
            temperatures,
            pressures,
            log_pressures,
            species,
            log_opacity,
            log_collisional,
        })
    }

    pub fn n_lambda(&self) -> usize {
        self.wavelengths.len()
    }

    pub fn n_t(&self) -> usize {
        self.temperatures.len()
    }

    pub fn n_p(&self) -> usize {
        self.pressures.len()
    }

    /// Bounds of the temperature grid.
    pub fn temperature_bounds(&self) -> (f64, f64) {
        (
            self.temperatures[0],
            self.temperatures[self.temperatures.len() - 1],
        )
    }

    /// Bounds of the pressure grid.
    pub fn pressure_bounds(&self) -> (f64, f64) {
        (self.pressures[0], self.pressures[self.pressures.len() - 1])
    }
}

static SHARED: RwLock<Option<Arc<AtmosphereTables>>> = RwLock::new(None);

/// Install a table set as the process-wide shared instance.
///
/// Returns the shared handle. Calling this again replaces the previous
/// instance; calculators holding the old `Arc` are unaffected.
pub fn init_shared(tables: AtmosphereTables) -> Arc<AtmosphereTables> {
    let arc = Arc::new(tables);
    *SHARED.write().expect("shared table lock poisoned") = Some(arc.clone());
    arc
}

/// Fetch the process-wide shared table set, if one has been installed.
pub fn shared() -> Option<Arc<AtmosphereTables>> {
    SHARED.read().expect("shared table lock poisoned").clone()
}

/// Drop the process-wide shared table set.
pub fn clear_shared() {
    *SHARED.write().expect("shared table lock poisoned") = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;

    fn registry() -> SpeciesRegistry {
        let mut r = SpeciesRegistry::new();
        r.register("H2O", 18.0, 1.45e-30);
        r.register("H2", 2.0, 0.8e-30);
        r
    }

    #[test]
    fn rejects_non_monotonic_grid() {
        let err = AtmosphereTables::new(
            arr1(&[1e-6, 1e-6]),
            arr1(&[100.0, 200.0]),
            arr1(&[1.0, 10.0]),
            registry(),
            HashMap::new(),
            HashMap::new(),
            DEFAULT_MIN_OPACITY,
        )
        .unwrap_err();
        assert!(matches!(err, AtmosphereError::InvalidTables(_)));
    }

    #[test]
    fn rejects_misshapen_opacity() {
        let mut opacity = HashMap::new();
        opacity.insert("H2O".to_string(), Array3::zeros((1, 2, 2)));
        let err = AtmosphereTables::new(
            arr1(&[1e-6, 2e-6]),
            arr1(&[100.0, 200.0]),
            arr1(&[1.0, 10.0]),
            registry(),
            opacity,
            HashMap::new(),
            DEFAULT_MIN_OPACITY,
        )
        .unwrap_err();
        assert!(matches!(err, AtmosphereError::InvalidTables(_)));
    }

    #[test]
    fn floors_opacity_before_log() {
        let mut opacity = HashMap::new();
        opacity.insert("H2O".to_string(), Array3::zeros((2, 2, 2)));
        let tables = AtmosphereTables::new(
            arr1(&[1e-6, 2e-6]),
            arr1(&[100.0, 200.0]),
            arr1(&[1.0, 10.0]),
            registry(),
            opacity,
            HashMap::new(),
            DEFAULT_MIN_OPACITY,
        )
        .unwrap();
        let id = tables.species.get("H2O").unwrap();
        let cube = &tables.log_opacity[&id];
        assert!(cube.iter().all(|&v| v.is_finite() && v <= -98.0));
    }

    #[test]
    fn shared_cache_init_get_clear() {
        let tables = AtmosphereTables::new(
            arr1(&[1e-6, 2e-6]),
            arr1(&[100.0, 200.0]),
            arr1(&[1.0, 10.0]),
            registry(),
            HashMap::new(),
            HashMap::new(),
            DEFAULT_MIN_OPACITY,
        )
        .unwrap();
        let arc = init_shared(tables);
        assert!(Arc::ptr_eq(&arc, &shared().unwrap()));
        clear_shared();
        assert!(shared().is_none());
    }
}
