//! Exoplanet transmission-spectrum forward modelling and retrieval support.
//!
//! This facade crate re-exports the two workspace members:
//!
//! - [`core`] (`transpec-core`): the radiative-transfer forward model that
//!   turns planet/atmosphere parameters into a transit-depth spectrum.
//! - [`retrieval`] (`transpec-retrieval`): fit-parameter bookkeeping and the
//!   log-likelihood function an external sampler evaluates.

pub use transpec_core as core;
pub use transpec_retrieval as retrieval;

pub use transpec_core::calculator::{DepthParams, TransitDepthCalculator, TransitSpectrum};
pub use transpec_retrieval::likelihood::TransitLikelihood;
