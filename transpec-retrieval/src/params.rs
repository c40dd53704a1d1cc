//! Fit-parameter bookkeeping.
//!
//! A retrieval mixes parameters that are sampled with parameters that are
//! held fixed. [`FitInfo`] keeps both in one ordered registry so that the
//! flat vectors a sampler passes around always line up with parameter names,
//! and so that [`FitInfo::interpret`] can hand the forward model a complete
//! name-to-value map regardless of which subset is being fitted.

use crate::{Error, Result};
use indexmap::IndexMap;
use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A single fitted parameter.
///
/// `low_guess`/`high_guess` bound the ball walkers are initialised in;
/// `low_lim`/`high_lim` are the hard limits outside which a proposal is
/// rejected. The guess range must sit inside the limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitParam {
    /// Fiducial value, used for walker 0 and as the starting point
    pub value: f64,
    pub low_guess: f64,
    pub high_guess: f64,
    pub low_lim: f64,
    pub high_lim: f64,
}

impl FitParam {
    /// A fitted parameter whose guess range is `fraction` either side of the
    /// fiducial value and whose limits are unbounded.
    pub fn from_fraction(value: f64, fraction: f64) -> Self {
        let spread = fraction * value.abs();
        Self {
            value,
            low_guess: value - spread,
            high_guess: value + spread,
            low_lim: f64::NEG_INFINITY,
            high_lim: f64::INFINITY,
        }
    }

    /// Clamp the limits of an existing parameter.
    pub fn with_limits(mut self, low_lim: f64, high_lim: f64) -> Self {
        self.low_lim = low_lim;
        self.high_lim = high_lim;
        self
    }

    fn validate(&self, name: &str) -> Result<()> {
        if !(self.low_guess < self.high_guess) {
            return Err(Error::InvalidSetup(format!(
                "{name}: low_guess {} must be below high_guess {}",
                self.low_guess, self.high_guess
            )));
        }
        if self.low_guess < self.low_lim || self.high_guess > self.high_lim {
            return Err(Error::InvalidSetup(format!(
                "{name}: guess range [{}, {}] falls outside limits [{}, {}]",
                self.low_guess, self.high_guess, self.low_lim, self.high_lim
            )));
        }
        if self.value < self.low_lim || self.value > self.high_lim {
            return Err(Error::InvalidSetup(format!(
                "{name}: fiducial value {} falls outside limits [{}, {}]",
                self.value, self.low_lim, self.high_lim
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Entry {
    Fixed(f64),
    Fitted(FitParam),
}

/// Ordered registry of retrieval parameters.
///
/// Fitted parameters appear in flat vectors in registration order; fixed
/// parameters never do, but [`FitInfo::interpret`] reports both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FitInfo {
    entries: IndexMap<String, Entry>,
}

impl FitInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter held fixed at `value`.
    pub fn add_fixed(&mut self, name: &str, value: f64) -> Result<()> {
        self.insert(name, Entry::Fixed(value))
    }

    /// Register a fitted parameter.
    pub fn add_fitted(&mut self, name: &str, param: FitParam) -> Result<()> {
        param.validate(name)?;
        self.insert(name, Entry::Fitted(param))
    }

    fn insert(&mut self, name: &str, entry: Entry) -> Result<()> {
        if self.entries.contains_key(name) {
            return Err(Error::InvalidSetup(format!(
                "parameter '{name}' registered twice"
            )));
        }
        self.entries.insert(name.to_string(), entry);
        Ok(())
    }

    /// Number of fitted parameters (the sampler's dimensionality).
    pub fn n_fitted(&self) -> usize {
        self.fitted().count()
    }

    /// Names of the fitted parameters, in vector order.
    pub fn fitted_names(&self) -> Vec<&str> {
        self.fitted().map(|(name, _)| name.as_str()).collect()
    }

    fn fitted(&self) -> impl Iterator<Item = (&String, &FitParam)> {
        self.entries.iter().filter_map(|(name, e)| match e {
            Entry::Fitted(p) => Some((name, p)),
            Entry::Fixed(_) => None,
        })
    }

    /// Fiducial values of the fitted parameters, in vector order.
    pub fn param_array(&self) -> Array1<f64> {
        Array1::from_iter(self.fitted().map(|(_, p)| p.value))
    }

    /// Expand a flat fitted-parameter vector into the full name-to-value map,
    /// fixed parameters included.
    pub fn interpret(&self, values: ArrayView1<f64>) -> Result<IndexMap<String, f64>> {
        if values.len() != self.n_fitted() {
            return Err(Error::ParameterCount {
                got: values.len(),
                expected: self.n_fitted(),
            });
        }
        let mut next = values.iter();
        let mut out = IndexMap::with_capacity(self.entries.len());
        for (name, entry) in &self.entries {
            let value = match entry {
                Entry::Fixed(v) => *v,
                // lengths already checked
                Entry::Fitted(_) => *next.next().unwrap_or(&f64::NAN),
            };
            out.insert(name.clone(), value);
        }
        Ok(out)
    }

    /// Whether every element of a proposal lies within its hard limits.
    pub fn within_limits(&self, values: ArrayView1<f64>) -> Result<bool> {
        if values.len() != self.n_fitted() {
            return Err(Error::ParameterCount {
                got: values.len(),
                expected: self.n_fitted(),
            });
        }
        Ok(self
            .fitted()
            .zip(values.iter())
            .all(|((_, p), &v)| v >= p.low_lim && v <= p.high_lim))
    }

    /// Draw initial walker positions, uniform within each parameter's guess
    /// range. Walker 0 is pinned at the fiducial values so the chain always
    /// contains the starting point.
    pub fn initial_positions<R: Rng>(&self, n_walkers: usize, rng: &mut R) -> Result<Array2<f64>> {
        let n_params = self.n_fitted();
        if n_params == 0 {
            return Err(Error::InvalidSetup(
                "no fitted parameters registered".to_string(),
            ));
        }
        if n_walkers == 0 {
            return Err(Error::InvalidSetup("need at least one walker".to_string()));
        }
        let mut positions = Array2::zeros((n_walkers, n_params));
        for (j, (_, param)) in self.fitted().enumerate() {
            positions[[0, j]] = param.value;
            for i in 1..n_walkers {
                positions[[i, j]] = rng.gen_range(param.low_guess..param.high_guess);
            }
        }
        Ok(positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr1;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn fit_info() -> FitInfo {
        let mut info = FitInfo::new();
        info.add_fixed("star_radius", 7e8).unwrap();
        info.add_fitted(
            "planet_radius",
            FitParam::from_fraction(7e7, 0.1).with_limits(0.0, f64::INFINITY),
        )
        .unwrap();
        info.add_fitted(
            "temperature",
            FitParam {
                value: 1200.0,
                low_guess: 1000.0,
                high_guess: 1400.0,
                low_lim: 300.0,
                high_lim: 3000.0,
            },
        )
        .unwrap();
        info
    }

    #[test]
    fn param_array_follows_registration_order() {
        let info = fit_info();
        assert_eq!(info.n_fitted(), 2);
        assert_eq!(info.fitted_names(), vec!["planet_radius", "temperature"]);
        assert_eq!(info.param_array(), arr1(&[7e7, 1200.0]));
    }

    #[test]
    fn interpret_fills_in_fixed_parameters() {
        let info = fit_info();
        let full = info.interpret(arr1(&[7.7e7, 1100.0]).view()).unwrap();
        assert_eq!(full["star_radius"], 7e8);
        assert_eq!(full["planet_radius"], 7.7e7);
        assert_eq!(full["temperature"], 1100.0);
    }

    #[test]
    fn interpret_rejects_wrong_length() {
        let info = fit_info();
        assert!(matches!(
            info.interpret(arr1(&[1.0]).view()).unwrap_err(),
            Error::ParameterCount {
                got: 1,
                expected: 2
            }
        ));
    }

    #[test]
    fn limits_are_inclusive() {
        let info = fit_info();
        assert!(info.within_limits(arr1(&[7e7, 3000.0]).view()).unwrap());
        assert!(!info.within_limits(arr1(&[7e7, 3000.1]).view()).unwrap());
        assert!(!info.within_limits(arr1(&[-1.0, 1200.0]).view()).unwrap());
    }

    #[test]
    fn walker_zero_is_pinned_and_the_rest_stay_in_guess_range() {
        let info = fit_info();
        let mut rng = SmallRng::seed_from_u64(7);
        let positions = info.initial_positions(32, &mut rng).unwrap();
        assert_eq!(positions.dim(), (32, 2));
        assert_eq!(positions[[0, 0]], 7e7);
        assert_eq!(positions[[0, 1]], 1200.0);
        for i in 1..32 {
            assert!(positions[[i, 0]] >= 7e7 * 0.9 && positions[[i, 0]] <= 7e7 * 1.1);
            assert!(positions[[i, 1]] >= 1000.0 && positions[[i, 1]] <= 1400.0);
        }
    }

    #[test]
    fn duplicate_registration_is_an_error() {
        let mut info = fit_info();
        assert!(matches!(
            info.add_fixed("temperature", 1000.0).unwrap_err(),
            Error::InvalidSetup(_)
        ));
    }

    #[test]
    fn guess_range_outside_limits_is_an_error() {
        let mut info = FitInfo::new();
        let bad = FitParam {
            value: 0.5,
            low_guess: 0.0,
            high_guess: 1.0,
            low_lim: 0.2,
            high_lim: 1.0,
        };
        assert!(matches!(
            info.add_fitted("x", bad).unwrap_err(),
            Error::InvalidSetup(_)
        ));
    }
}
