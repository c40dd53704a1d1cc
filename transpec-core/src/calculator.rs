//! Transit-depth forward model.
//!
//! [`TransitDepthCalculator`] ties the pipeline together: parameter
//! validation, abundance interpolation, hydrostatic structure, opacity
//! synthesis, line-of-sight integration and the final depth compilation
//!
//! $$D(\lambda) = \left(\frac{R_p}{R_s}\right)^2
//!   + \frac{2}{R_s^2} \sum_i \left(1 - e^{-\tau_i(\lambda)}\right) r_i \, dr_i$$
//!
//! A calculator is cheap to construct from a shared
//! [`Arc<AtmosphereTables>`]; parallel retrieval workers should each hold
//! their own instance, since wavelength binning mutates per-instance state.

use crate::abundances::{floor_abundances, AbundanceSet, AbundanceStore};
use crate::config::CalculatorOptions;
use crate::errors::{AtmResult, AtmosphereError};
use crate::hydrostatic::{self, Gravity};
use crate::interpolate::{condition_array, interp1d, interp_table};
use crate::opacity::{
    collisional_absorption, gas_absorption, h_minus_absorption, rayleigh_absorption, LayerMix,
};
use crate::species::SpeciesId;
use crate::tables::AtmosphereTables;
use crate::tau::line_of_sight_tau;
use log::{debug, warn};
use ndarray::{Array1, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Per-call retrieval parameters of the forward model.
///
/// Defaults follow the reference configuration: solar metallicity,
/// C/O = 0.53, classical Rayleigh scattering, no cloud deck, no quenching,
/// H⁻ continuum off.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthParams {
    /// Stellar radius
    /// unit: m
    pub star_radius: f64,
    /// Planet radius at the reference pressure
    /// unit: m
    pub planet_radius: f64,
    /// Planet mass or fixed surface gravity
    pub gravity: Gravity,
    /// Pressure profile, ascending
    /// unit: Pa
    pub p_profile: Array1<f64>,
    /// Temperature at each pressure
    /// unit: K
    pub t_profile: Array1<f64>,
    /// log10 metallicity relative to solar; `None` with custom abundances
    pub log_z: Option<f64>,
    /// C/O ratio; `None` with custom abundances or metallicity-only tables
    pub co_ratio: Option<f64>,
    /// Caller-supplied per-species `(N_T, N_P)` mixing ratios, replacing the
    /// equilibrium tables; mutually exclusive with `log_z`/`co_ratio`
    pub custom_abundances: Option<HashMap<String, Array2<f64>>>,
    /// Pressure below which the atmosphere is opaque; `f64::INFINITY`
    /// disables the cloud deck entirely
    /// unit: Pa
    pub cloudtop_pressure: f64,
    /// Abundances above this pressure are frozen at their value here;
    /// zero disables quenching
    /// unit: Pa
    pub quench_pressure: f64,
    pub add_gas_absorption: bool,
    pub add_scattering: bool,
    pub scattering_factor: f64,
    pub scattering_slope: f64,
    /// unit: m
    pub scattering_ref_wavelength: f64,
    pub add_collisional_absorption: bool,
    pub add_h_minus_absorption: bool,
    /// Particulate refractive index for Mie scattering; not supported
    pub refractive_index: Option<f64>,
}

impl Default for DepthParams {
    fn default() -> Self {
        Self {
            star_radius: crate::constants::R_SUN,
            planet_radius: crate::constants::R_JUP,
            gravity: Gravity::Mass(crate::constants::M_JUP),
            p_profile: Array1::zeros(0),
            t_profile: Array1::zeros(0),
            log_z: Some(0.0),
            co_ratio: Some(0.53),
            custom_abundances: None,
            cloudtop_pressure: f64::INFINITY,
            quench_pressure: 0.0,
            add_gas_absorption: true,
            add_scattering: true,
            scattering_factor: 1.0,
            scattering_slope: 4.0,
            scattering_ref_wavelength: 1e-6,
            add_collisional_absorption: true,
            add_h_minus_absorption: false,
            refractive_index: None,
        }
    }
}

/// Computed transit-depth spectrum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitSpectrum {
    /// unit: m
    pub wavelengths: Array1<f64>,
    /// Fractional area ratio, dimensionless
    pub depths: Array1<f64>,
}

/// Diagnostic per-layer profiles of the above-cloud atmosphere.
#[derive(Debug, Clone)]
pub struct ProfileDiagnostics {
    /// unit: Pa
    pub pressures: Array1<f64>,
    /// unit: K
    pub temperatures: Array1<f64>,
    /// Mean molecular weight
    /// unit: AMU
    pub mu: Array1<f64>,
    /// Shell boundary radii, see [`hydrostatic::AltitudeProfile`]
    pub radii: Array1<f64>,
    /// unit: m
    pub dr: Array1<f64>,
    /// Per-layer mixing ratio by species name
    pub abundances: HashMap<String, Array1<f64>>,
}

/// Wavelength-restricted copies of the source tables while bins are active.
#[derive(Debug, Clone)]
struct BinnedState {
    bins: Vec<(f64, f64)>,
    wavelengths: Array1<f64>,
    log_opacity: HashMap<SpeciesId, Array3<f64>>,
    log_collisional: HashMap<(SpeciesId, SpeciesId), Array2<f64>>,
}

/// The forward model: parameters in, transit-depth spectrum out.
#[derive(Debug, Clone)]
pub struct TransitDepthCalculator {
    tables: Arc<AtmosphereTables>,
    abundances: AbundanceStore,
    options: CalculatorOptions,
    binned: Option<BinnedState>,
}

impl TransitDepthCalculator {
    /// Build a calculator over a shared table set and abundance store.
    pub fn new(
        tables: Arc<AtmosphereTables>,
        abundances: AbundanceStore,
        options: CalculatorOptions,
    ) -> AtmResult<Self> {
        if abundances.shape() != (tables.n_t(), tables.n_p()) {
            return Err(AtmosphereError::InvalidTables(format!(
                "abundance store tabulated on {:?}, opacity tables on ({}, {})",
                abundances.shape(),
                tables.n_t(),
                tables.n_p()
            )));
        }
        Ok(Self {
            tables,
            abundances,
            options,
            binned: None,
        })
    }

    /// The current (possibly binned) wavelength grid.
    pub fn wavelengths(&self) -> &Array1<f64> {
        self.binned
            .as_ref()
            .map_or(&self.tables.wavelengths, |b| &b.wavelengths)
    }

    fn log_opacity(&self) -> &HashMap<SpeciesId, Array3<f64>> {
        self.binned
            .as_ref()
            .map_or(&self.tables.log_opacity, |b| &b.log_opacity)
    }

    fn log_collisional(&self) -> &HashMap<(SpeciesId, SpeciesId), Array2<f64>> {
        self.binned
            .as_ref()
            .map_or(&self.tables.log_collisional, |b| &b.log_collisional)
    }

    /// Active wavelength bins, if any.
    pub fn wavelength_bins(&self) -> Option<&[(f64, f64)]> {
        self.binned.as_ref().map(|b| b.bins.as_slice())
    }

    /// Restrict all wavelength-indexed state to the union of `bins`.
    ///
    /// Bins are half-open `[start, end)` intervals in meters and must lie
    /// within the native grid; a bin with no native points is an error and
    /// one with five or fewer produces an inaccurate-results warning.
    /// Re-binning an already-binned calculator fails; call
    /// [`reset_bins`](Self::reset_bins) first.
    pub fn set_wavelength_bins(&mut self, bins: &[(f64, f64)]) -> AtmResult<()> {
        if self.binned.is_some() {
            return Err(AtmosphereError::AlreadyBinned);
        }
        let native = &self.tables.wavelengths;
        let (lambda_min, lambda_max) = (native[0], native[native.len() - 1]);

        for &(start, end) in bins {
            if start >= end {
                return Err(AtmosphereError::InvalidBin {
                    start,
                    end,
                    reason: "zero or negative width".to_string(),
                });
            }
            if start < lambda_min || end > lambda_max {
                return Err(AtmosphereError::InvalidBin {
                    start,
                    end,
                    reason: format!("outside native grid {lambda_min}-{lambda_max} m"),
                });
            }
            let n_points = native.iter().filter(|&&l| l >= start && l < end).count();
            if n_points == 0 {
                return Err(AtmosphereError::InvalidBin {
                    start,
                    end,
                    reason: "no native wavelength points".to_string(),
                });
            }
            if n_points <= 5 {
                warn!(
                    "only {} native points in {:.3e}-{:.3e} m bin; results will be inaccurate",
                    n_points, start, end
                );
            }
        }

        let keep: Vec<usize> = native
            .iter()
            .enumerate()
            .filter(|(_, &l)| bins.iter().any(|&(s, e)| l >= s && l < e))
            .map(|(i, _)| i)
            .collect();

        let log_opacity = self
            .tables
            .log_opacity
            .iter()
            .map(|(&id, cube)| (id, cube.select(Axis(2), &keep)))
            .collect();
        let log_collisional = self
            .tables
            .log_collisional
            .iter()
            .map(|(&pair, table)| (pair, table.select(Axis(0), &keep)))
            .collect();

        self.binned = Some(BinnedState {
            bins: bins.to_vec(),
            wavelengths: native.select(Axis(0), &keep),
            log_opacity,
            log_collisional,
        });
        debug!(
            "wavelength grid restricted from {} to {} points across {} bins",
            native.len(),
            keep.len(),
            bins.len()
        );
        Ok(())
    }

    /// Restore the unbinned wavelength grid and tables.
    ///
    /// The immutable sources are retained, so this never reloads data.
    pub fn reset_bins(&mut self) {
        self.binned = None;
    }

    /// Compute the transit-depth spectrum for one parameter set.
    pub fn compute_depths(&self, params: &DepthParams) -> AtmResult<TransitSpectrum> {
        self.compute_depths_with_profiles(params)
            .map(|(spectrum, _)| spectrum)
    }

    /// Compute the spectrum along with diagnostic atmosphere profiles.
    pub fn compute_depths_with_profiles(
        &self,
        params: &DepthParams,
    ) -> AtmResult<(TransitSpectrum, ProfileDiagnostics)> {
        self.validate(params)?;

        let table_set = self.resolve_abundances(params)?;
        let (mix_per_layer, mu) = self.layer_abundances(params, &table_set);

        let above_clouds: Vec<bool> = params
            .p_profile
            .iter()
            .map(|&p| p < params.cloudtop_pressure)
            .collect();
        let n_kept = above_clouds.iter().take_while(|&&m| m).count();

        if n_kept == 0 {
            // The deck sits above the whole profile: bare opaque disk.
            return Ok(self.bare_disk(params, mu));
        }

        let altitude = hydrostatic::solve(
            params.p_profile.view(),
            params.t_profile.view(),
            mu.view(),
            self.options.ref_pressure,
            params.gravity,
            params.planet_radius,
            &above_clouds,
        )?;

        let pressures: Vec<f64> = params.p_profile.iter().take(n_kept).copied().collect();
        let temperatures: Vec<f64> = params.t_profile.iter().take(n_kept).copied().collect();
        let layer_abundances: HashMap<SpeciesId, Array1<f64>> = mix_per_layer
            .into_iter()
            .map(|(id, a)| (id, a.slice(ndarray::s![..n_kept]).to_owned()))
            .collect();

        let mix = LayerMix {
            pressures: &pressures,
            temperatures: &temperatures,
            abundances: &layer_abundances,
        };

        let n_lambda = self.wavelengths().len();
        let mut absorption = Array2::zeros((n_kept, n_lambda));

        if params.add_gas_absorption {
            let t_cond = condition_array(
                Array1::from_vec(temperatures.clone()).view(),
                self.tables.temperatures.view(),
                f64::INFINITY,
            );
            let p_cond = condition_array(
                Array1::from_vec(pressures.clone()).view(),
                self.tables.pressures.view(),
                params.cloudtop_pressure,
            );
            let t_idx: Vec<usize> = indices(&t_cond);
            let p_idx: Vec<usize> = indices(&p_cond);
            absorption += &gas_absorption(
                &self.tables,
                self.log_opacity(),
                &t_idx,
                &p_idx,
                &mix,
                n_lambda,
            );
        }
        if params.add_scattering {
            absorption += &rayleigh_absorption(
                self.wavelengths(),
                &self.tables.species,
                &mix,
                params.scattering_factor,
                params.scattering_slope,
                params.scattering_ref_wavelength,
            );
        }
        if params.add_collisional_absorption {
            absorption += &collisional_absorption(
                &self.tables,
                self.log_collisional(),
                &mix,
                n_lambda,
            );
        }
        if params.add_h_minus_absorption {
            absorption += &h_minus_absorption(self.wavelengths(), &self.tables.species, &mix);
        }

        let tau = line_of_sight_tau(absorption.view(), altitude.radii.view());

        let scale = 2.0 / (params.star_radius * params.star_radius);
        let disk = (params.planet_radius / params.star_radius).powi(2);
        let mut depths = Array1::from_elem(n_lambda, disk);
        for i in 0..n_kept {
            let annulus = altitude.radii[i + 1] * altitude.dr[i];
            for (d, &t) in depths.iter_mut().zip(tau.row(i)) {
                *d += scale * (1.0 - (-t).exp()) * annulus;
            }
        }

        let spectrum = self.bin_output(depths);

        let diagnostics = ProfileDiagnostics {
            pressures: Array1::from_vec(pressures),
            temperatures: Array1::from_vec(temperatures),
            mu,
            radii: altitude.radii,
            dr: altitude.dr,
            abundances: layer_abundances
                .into_iter()
                .map(|(id, a)| (self.tables.species.name(id).to_string(), a))
                .collect(),
        };
        Ok((spectrum, diagnostics))
    }

    /// Fail-fast validation of a parameter proposal, before any heavy work.
    fn validate(&self, params: &DepthParams) -> AtmResult<()> {
        if params.p_profile.len() != params.t_profile.len() || params.p_profile.is_empty() {
            return Err(AtmosphereError::InvalidConfig(
                "pressure and temperature profiles must be non-empty and equal length".to_string(),
            ));
        }
        if params
            .p_profile
            .windows(2)
            .into_iter()
            .any(|w| w[1] <= w[0])
        {
            return Err(AtmosphereError::InvalidConfig(
                "pressure profile must be strictly ascending".to_string(),
            ));
        }
        if params.refractive_index.is_some() {
            return Err(AtmosphereError::Unsupported(
                "refractive-index (Mie) scattering",
            ));
        }

        let (t_min, t_max) = self.tables.temperature_bounds();
        for &t in &params.t_profile {
            if t < t_min || t > t_max {
                return Err(AtmosphereError::TemperatureOutOfRange {
                    value: t,
                    min: t_min,
                    max: t_max,
                });
            }
        }

        if params.custom_abundances.is_some() {
            if params.log_z.is_some() || params.co_ratio.is_some() {
                return Err(AtmosphereError::InvalidAbundances(
                    "set log_z and co_ratio to None to use custom abundances".to_string(),
                ));
            }
        } else if let Some(log_z) = params.log_z {
            let (z_min, z_max) = self.abundances.log_z_bounds();
            if log_z < z_min || log_z > z_max {
                return Err(AtmosphereError::ParameterOutOfRange {
                    name: "logZ",
                    value: log_z,
                    min: z_min,
                    max: z_max,
                });
            }
            if let (Some(co), Some((co_min, co_max))) = (params.co_ratio, self.abundances.co_bounds())
            {
                if co < co_min || co > co_max {
                    return Err(AtmosphereError::ParameterOutOfRange {
                        name: "C/O ratio",
                        value: co,
                        min: co_min,
                        max: co_max,
                    });
                }
            }
        } else {
            return Err(AtmosphereError::InvalidAbundances(
                "either log_z or custom_abundances is required".to_string(),
            ));
        }

        if !params.cloudtop_pressure.is_infinite() {
            let (p_min, p_max) = self.tables.pressure_bounds();
            if params.cloudtop_pressure < p_min || params.cloudtop_pressure > p_max {
                return Err(AtmosphereError::ParameterOutOfRange {
                    name: "cloud-top pressure",
                    value: params.cloudtop_pressure,
                    min: p_min,
                    max: p_max,
                });
            }
        }
        Ok(())
    }

    fn resolve_abundances(&self, params: &DepthParams) -> AtmResult<AbundanceSet> {
        let mut set = match &params.custom_abundances {
            Some(custom) => AbundanceStore::validate_custom(
                custom,
                &self.tables.species,
                self.tables.n_t(),
                self.tables.n_p(),
            )?,
            None => {
                let log_z = params.log_z.ok_or_else(|| {
                    AtmosphereError::InvalidAbundances(
                        "either log_z or custom_abundances is required".to_string(),
                    )
                })?;
                self.abundances.interp(log_z, params.co_ratio)?
            }
        };
        floor_abundances(&mut set, self.options.min_abundance);
        Ok(set)
    }

    /// Interpolate every species' `(T, P)` table onto the profile layers and
    /// accumulate the mean-molecular-weight profile, then apply quenching.
    fn layer_abundances(
        &self,
        params: &DepthParams,
        set: &AbundanceSet,
    ) -> (HashMap<SpeciesId, Array1<f64>>, Array1<f64>) {
        let n = params.p_profile.len();
        let t_query: Vec<f64> = params.t_profile.to_vec();
        let logp_query: Vec<f64> = params.p_profile.iter().map(|p| p.log10()).collect();

        let mut mu = Array1::zeros(n);
        let mut per_layer = HashMap::with_capacity(set.len());

        for (&id, table) in set {
            let log_table = table.mapv(|v| v.log10());
            let mut abund = interp_table(
                self.tables.temperatures.view(),
                self.tables.log_pressures.view(),
                log_table.view(),
                &t_query,
                &logp_query,
            );
            abund.mapv_inplace(|v| 10f64.powf(v));

            if params.quench_pressure > 0.0 {
                quench(&mut abund, &params.p_profile, params.quench_pressure);
            }

            let mass = self.tables.species.info(id).mass;
            mu.scaled_add(mass, &abund);
            per_layer.insert(id, abund);
        }
        (per_layer, mu)
    }

    fn bare_disk(&self, params: &DepthParams, mu: Array1<f64>) -> (TransitSpectrum, ProfileDiagnostics) {
        let disk = (params.planet_radius / params.star_radius).powi(2);
        let depths = Array1::from_elem(self.wavelengths().len(), disk);
        (
            self.bin_output(depths),
            ProfileDiagnostics {
                pressures: Array1::zeros(0),
                temperatures: Array1::zeros(0),
                mu,
                radii: Array1::zeros(0),
                dr: Array1::zeros(0),
                abundances: HashMap::new(),
            },
        )
    }

    /// Average native-grid depths into the active bins, if any.
    fn bin_output(&self, depths: Array1<f64>) -> TransitSpectrum {
        let Some(binned) = &self.binned else {
            return TransitSpectrum {
                wavelengths: self.tables.wavelengths.clone(),
                depths,
            };
        };

        let mut out_wavelengths = Array1::zeros(binned.bins.len());
        let mut out_depths = Array1::zeros(binned.bins.len());
        for (i, &(start, end)) in binned.bins.iter().enumerate() {
            let mut lambda_sum = 0.0;
            let mut depth_sum = 0.0;
            let mut count = 0usize;
            for (l, d) in binned.wavelengths.iter().zip(&depths) {
                if *l >= start && *l < end {
                    lambda_sum += l;
                    depth_sum += d;
                    count += 1;
                }
            }
            // bins were validated non-empty when set
            out_wavelengths[i] = lambda_sum / count as f64;
            out_depths[i] = depth_sum / count as f64;
        }
        TransitSpectrum {
            wavelengths: out_wavelengths,
            depths: out_depths,
        }
    }
}

/// Freeze abundances above the quench pressure at their quench-level value.
fn quench(abund: &mut Array1<f64>, p_profile: &Array1<f64>, quench_pressure: f64) {
    let ln_p: Vec<f64> = p_profile.iter().map(|p| p.ln()).collect();
    let ln_a: Vec<f64> = abund.iter().map(|a| a.ln()).collect();
    let quench_value = interp1d(quench_pressure.ln(), &ln_p, &ln_a).exp();
    for (a, &p) in abund.iter_mut().zip(p_profile) {
        if p < quench_pressure {
            *a = quench_value;
        }
    }
}

fn indices(cond: &[bool]) -> Vec<usize> {
    cond.iter()
        .enumerate()
        .filter(|(_, &c)| c)
        .map(|(i, _)| i)
        .collect()
}
