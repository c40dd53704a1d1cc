//! Retrieval support for the transmission-spectrum forward model.
//!
//! This crate sits between [`transpec_core`] and an external MCMC or nested
//! sampler. It provides the two pieces every sampler needs:
//!
//! - [`FitInfo`]: an ordered registry of retrieval parameters, each either
//!   fixed or fitted, with guess ranges for initialising walkers and hard
//!   limits for rejecting proposals;
//! - [`TransitLikelihood`]: a Gaussian log-likelihood over measured transit
//!   depths, evaluated by running the forward model at a proposed parameter
//!   vector.
//!
//! The sampler itself is out of scope; [`TransitLikelihood::ln_prob`] is the
//! pure `Array1<f64> -> f64` function a sampler calls.

pub mod likelihood;
pub mod params;

pub use likelihood::TransitLikelihood;
pub use params::{FitInfo, FitParam};

use transpec_core::errors::AtmosphereError;

/// Errors raised while setting up a retrieval.
///
/// Proposal-time failures (out-of-limits or out-of-grid parameter vectors)
/// are not errors; they map to a log-probability of negative infinity.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A fit parameter name is not recognised by the likelihood.
    #[error("unknown fit parameter '{0}'")]
    UnknownParameter(String),

    /// A parameter was registered twice, or guesses/limits are inconsistent.
    #[error("invalid fit setup: {0}")]
    InvalidSetup(String),

    /// A parameter vector has the wrong length for the registry.
    #[error("parameter vector has length {got}, expected {expected}")]
    ParameterCount { got: usize, expected: usize },

    /// The forward model rejected the retrieval configuration outright.
    #[error(transparent)]
    Atmosphere(#[from] AtmosphereError),
}

pub type Result<T> = std::result::Result<T, Error>;
