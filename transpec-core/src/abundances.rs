//! Chemical-equilibrium abundance store.
//!
//! Mixing-ratio tables are precomputed on a log-metallicity grid (optionally
//! crossed with a C/O-ratio grid); each grid point carries a full
//! per-species `(N_T, N_P)` array. A query interpolates whole `(T, P)` grids
//! along the metallicity (and C/O) axis at once, so a query that lands
//! exactly on a stored grid point reproduces the stored tables bit-for-bit.
//!
//! Callers may instead supply their own per-species `(T, P)` arrays
//! ("custom abundances"); those are shape-validated here and bypass the
//! equilibrium grids entirely.

use crate::errors::{AtmResult, AtmosphereError};
use crate::interpolate::bracket;
use crate::species::{SpeciesId, SpeciesRegistry};
use ndarray::{Array1, Array2};
use std::collections::HashMap;

/// Per-species mixing-ratio grids on the native `(N_T, N_P)` tabulation.
pub type AbundanceSet = HashMap<SpeciesId, Array2<f64>>;

/// Chemical-equilibrium abundance tables indexed by metallicity and
/// (optionally) C/O ratio.
#[derive(Debug, Clone)]
pub struct AbundanceStore {
    /// log10 metallicity axis, strictly increasing
    log_zs: Array1<f64>,
    /// C/O ratio axis, strictly increasing; `None` for metallicity-only data
    co_ratios: Option<Array1<f64>>,
    /// One abundance set per (logZ, C/O) grid point, C/O fastest-varying
    grids: Vec<AbundanceSet>,
    n_t: usize,
    n_p: usize,
}

impl AbundanceStore {
    /// Assemble and validate a store.
    ///
    /// `grids` holds one abundance set per axis grid point with the C/O axis
    /// fastest-varying; every set must contain the same species, each with a
    /// `(n_t, n_p)` array.
    pub fn new(
        log_zs: Array1<f64>,
        co_ratios: Option<Array1<f64>>,
        grids: Vec<AbundanceSet>,
        n_t: usize,
        n_p: usize,
    ) -> AtmResult<Self> {
        let n_co = co_ratios.as_ref().map_or(1, |c| c.len());
        if grids.len() != log_zs.len() * n_co {
            return Err(AtmosphereError::InvalidTables(format!(
                "expected {} abundance grids, got {}",
                log_zs.len() * n_co,
                grids.len()
            )));
        }
        for axis in [Some(&log_zs), co_ratios.as_ref()].into_iter().flatten() {
            if axis.is_empty() || axis.windows(2).into_iter().any(|w| w[1] <= w[0]) {
                return Err(AtmosphereError::InvalidTables(
                    "abundance axis is empty or not strictly increasing".to_string(),
                ));
            }
        }
        for set in &grids {
            if set.len() != grids[0].len() {
                return Err(AtmosphereError::InvalidTables(
                    "abundance grids do not all contain the same species".to_string(),
                ));
            }
            for (id, table) in set {
                if table.shape() != [n_t, n_p] {
                    return Err(AtmosphereError::InvalidTables(format!(
                        "abundance table for species {} has shape {:?}, expected ({n_t}, {n_p})",
                        id.0,
                        table.shape()
                    )));
                }
            }
        }
        Ok(Self {
            log_zs,
            co_ratios,
            grids,
            n_t,
            n_p,
        })
    }

    /// Native `(N_T, N_P)` tabulation shape of every stored grid.
    pub fn shape(&self) -> (usize, usize) {
        (self.n_t, self.n_p)
    }

    /// Bounds of the log-metallicity axis.
    pub fn log_z_bounds(&self) -> (f64, f64) {
        (self.log_zs[0], self.log_zs[self.log_zs.len() - 1])
    }

    /// Bounds of the C/O axis, if present.
    pub fn co_bounds(&self) -> Option<(f64, f64)> {
        self.co_ratios.as_ref().map(|c| (c[0], c[c.len() - 1]))
    }

    /// Interpolate a full per-species `(T, P)` abundance set at the given
    /// metallicity and C/O ratio.
    ///
    /// Queries outside the stored axes fail with
    /// [`AtmosphereError::ParameterOutOfRange`].
    pub fn interp(&self, log_z: f64, co_ratio: Option<f64>) -> AtmResult<AbundanceSet> {
        let (z_min, z_max) = self.log_z_bounds();
        if log_z < z_min || log_z > z_max {
            return Err(AtmosphereError::ParameterOutOfRange {
                name: "logZ",
                value: log_z,
                min: z_min,
                max: z_max,
            });
        }

        let co_weights = match (&self.co_ratios, co_ratio) {
            (Some(cos), Some(co)) => {
                let (co_min, co_max) = self.co_bounds().expect("axis present");
                if co < co_min || co > co_max {
                    return Err(AtmosphereError::ParameterOutOfRange {
                        name: "C/O ratio",
                        value: co,
                        min: co_min,
                        max: co_max,
                    });
                }
                let b = bracket(cos.view(), co);
                vec![(b.lower, 1.0 - b.weight), (b.upper, b.weight)]
            }
            (None, None) => vec![(0, 1.0)],
            (Some(_), None) => {
                return Err(AtmosphereError::InvalidAbundances(
                    "this abundance store is tabulated over C/O; a C/O ratio is required"
                        .to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(AtmosphereError::InvalidAbundances(
                    "this abundance store has no C/O axis".to_string(),
                ))
            }
        };

        let n_co = self.co_ratios.as_ref().map_or(1, |c| c.len());
        let bz = bracket(self.log_zs.view(), log_z);
        let z_weights = [(bz.lower, 1.0 - bz.weight), (bz.upper, bz.weight)];

        let mut result: AbundanceSet = self.grids[0]
            .keys()
            .map(|&id| (id, Array2::zeros((self.n_t, self.n_p))))
            .collect();

        for &(zi, zw) in &z_weights {
            for &(ci, cw) in &co_weights {
                let w = zw * cw;
                if w == 0.0 {
                    continue;
                }
                let set = &self.grids[zi * n_co + ci];
                for (id, acc) in result.iter_mut() {
                    acc.scaled_add(w, &set[id]);
                }
            }
        }
        Ok(result)
    }

    /// Validate caller-supplied per-species abundance arrays and resolve the
    /// species names against the registry.
    pub fn validate_custom(
        custom: &HashMap<String, Array2<f64>>,
        registry: &SpeciesRegistry,
        n_t: usize,
        n_p: usize,
    ) -> AtmResult<AbundanceSet> {
        let mut result = AbundanceSet::new();
        for (name, table) in custom {
            if table.shape() != [n_t, n_p] {
                return Err(AtmosphereError::InvalidAbundances(format!(
                    "array for {} has shape {:?}, expected ({n_t}, {n_p})",
                    name,
                    table.shape()
                )));
            }
            let id = registry.get(name).ok_or_else(|| {
                AtmosphereError::InvalidAbundances(format!("unknown species {name}"))
            })?;
            result.insert(id, table.clone());
        }
        Ok(result)
    }
}

/// Replace NaNs and sub-floor mixing ratios with the floor value.
pub fn floor_abundances(set: &mut AbundanceSet, min_abundance: f64) {
    for table in set.values_mut() {
        table.mapv_inplace(|v| if v.is_nan() || v < min_abundance { min_abundance } else { v });
    }
}
