//! Gaussian log-likelihood over measured transit depths.
//!
//! [`TransitLikelihood`] owns a configured forward model and the observed
//! spectrum, and maps a sampler's flat parameter vector onto the model's
//! [`DepthParams`] by name. Out-of-limits or out-of-grid proposals score
//! `f64::NEG_INFINITY`; only setup mistakes are hard errors.

use crate::{Error, FitInfo, Result};
use indexmap::IndexMap;
use log::{debug, warn};
use ndarray::{Array1, ArrayView1};
use transpec_core::calculator::{DepthParams, TransitDepthCalculator};
use transpec_core::errors::AtmosphereError;
use transpec_core::hydrostatic::Gravity;

/// Names the likelihood knows how to map onto [`DepthParams`].
///
/// `error_multiple` scales the measurement uncertainties instead;
/// `temperature` replaces the whole profile with an isothermal one.
const KNOWN_PARAMS: &[&str] = &[
    "star_radius",
    "planet_radius",
    "mass",
    "temperature",
    "log_z",
    "co_ratio",
    "log_cloudtop_pressure",
    "log_quench_pressure",
    "log_scattering_factor",
    "scattering_slope",
    "error_multiple",
];

/// The function an external sampler evaluates.
#[derive(Debug)]
pub struct TransitLikelihood {
    calculator: TransitDepthCalculator,
    base: DepthParams,
    measured: Array1<f64>,
    errors: Array1<f64>,
    fit_info: FitInfo,
}

impl TransitLikelihood {
    /// Wire a forward model to an observed spectrum.
    ///
    /// `base` supplies every [`DepthParams`] field the registry does not
    /// override, the pressure profile included. `measured` and `errors` must
    /// match the calculator's output length, so bin the calculator before
    /// constructing the likelihood. Every registered parameter name must be
    /// one this likelihood knows how to apply.
    pub fn new(
        calculator: TransitDepthCalculator,
        base: DepthParams,
        measured: Array1<f64>,
        errors: Array1<f64>,
        fit_info: FitInfo,
    ) -> Result<Self> {
        let n_out = calculator
            .wavelength_bins()
            .map_or(calculator.wavelengths().len(), |bins| bins.len());
        if measured.len() != n_out || errors.len() != n_out {
            return Err(Error::InvalidSetup(format!(
                "measured {} and error {} lengths must match the {} model outputs",
                measured.len(),
                errors.len(),
                n_out
            )));
        }
        if errors.iter().any(|&e| !(e > 0.0)) {
            return Err(Error::InvalidSetup(
                "measurement uncertainties must be positive".to_string(),
            ));
        }
        let likelihood = Self {
            calculator,
            base,
            measured,
            errors,
            fit_info,
        };
        // Fail at setup, not on the first proposal.
        likelihood.apply(&likelihood.fit_info.interpret(likelihood.fit_info.param_array().view())?)?;
        Ok(likelihood)
    }

    pub fn fit_info(&self) -> &FitInfo {
        &self.fit_info
    }

    /// Log-probability of a fitted-parameter vector.
    ///
    /// Never panics and never returns an error: proposals outside the hard
    /// limits, outside the tabulated grids, or otherwise rejected by the
    /// forward model all score `f64::NEG_INFINITY`.
    pub fn ln_prob(&self, values: ArrayView1<f64>) -> f64 {
        let within = match self.fit_info.within_limits(values) {
            Ok(within) => within,
            Err(e) => {
                warn!("rejecting malformed proposal: {e}");
                return f64::NEG_INFINITY;
            }
        };
        if !within {
            return f64::NEG_INFINITY;
        }

        // length validated above
        let full = match self.fit_info.interpret(values) {
            Ok(full) => full,
            Err(_) => return f64::NEG_INFINITY,
        };
        let (params, error_multiple) = match self.apply(&full) {
            Ok(applied) => applied,
            Err(e) => {
                warn!("rejecting proposal the likelihood cannot apply: {e}");
                return f64::NEG_INFINITY;
            }
        };
        if error_multiple <= 0.0 {
            return f64::NEG_INFINITY;
        }

        let spectrum = match self.calculator.compute_depths(&params) {
            Ok(spectrum) => spectrum,
            Err(
                e @ (AtmosphereError::ParameterOutOfRange { .. }
                | AtmosphereError::TemperatureOutOfRange { .. }),
            ) => {
                debug!("proposal outside tabulated grids: {e}");
                return f64::NEG_INFINITY;
            }
            Err(e) => {
                warn!("forward model failed: {e}");
                return f64::NEG_INFINITY;
            }
        };

        let mut chi2 = 0.0;
        for ((&model, &measured), &sigma) in spectrum
            .depths
            .iter()
            .zip(self.measured.iter())
            .zip(self.errors.iter())
        {
            let r = (model - measured) / (error_multiple * sigma);
            chi2 += r * r;
        }
        -0.5 * chi2
    }

    /// Overlay a full name-to-value map onto the base parameters.
    ///
    /// Returns the per-call parameters and the uncertainty scale factor.
    fn apply(&self, full: &IndexMap<String, f64>) -> Result<(DepthParams, f64)> {
        let mut params = self.base.clone();
        let mut error_multiple = 1.0;
        for (name, &value) in full {
            match name.as_str() {
                "star_radius" => params.star_radius = value,
                "planet_radius" => params.planet_radius = value,
                "mass" => params.gravity = Gravity::Mass(value),
                "temperature" => {
                    params.t_profile = Array1::from_elem(params.p_profile.len(), value)
                }
                "log_z" => params.log_z = Some(value),
                "co_ratio" => params.co_ratio = Some(value),
                "log_cloudtop_pressure" => params.cloudtop_pressure = 10f64.powf(value),
                "log_quench_pressure" => params.quench_pressure = 10f64.powf(value),
                "log_scattering_factor" => params.scattering_factor = 10f64.powf(value),
                "scattering_slope" => params.scattering_slope = value,
                "error_multiple" => error_multiple = value,
                _ => {
                    debug_assert!(!KNOWN_PARAMS.contains(&name.as_str()));
                    return Err(Error::UnknownParameter(name.clone()));
                }
            }
        }
        Ok((params, error_multiple))
    }
}
