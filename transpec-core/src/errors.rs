//! Error types for the forward model.
//!
//! All validation happens before any heavy computation. The forward model
//! never clamps an out-of-range physical parameter silently; it returns an
//! error so the calling sampler can reject the proposal (typically by
//! treating it as -infinity log-likelihood) instead of receiving a
//! physically meaningless spectrum.

use thiserror::Error;

/// Error type for invalid forward-model inputs and state.
#[derive(Error, Debug)]
pub enum AtmosphereError {
    /// Temperature outside the tabulated grid. Interpolation is undefined
    /// outside the grid, so this is fatal for the proposal.
    #[error("temperature {value} K is outside the tabulated grid ({min} to {max} K)")]
    TemperatureOutOfRange { value: f64, min: f64, max: f64 },

    /// A retrieval parameter (metallicity, C/O ratio, cloud-top pressure)
    /// outside the tabulated bounds.
    #[error("{name} is {value}, but must be between {min} and {max}")]
    ParameterOutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Custom per-species abundance arrays with the wrong shape, or custom
    /// abundances combined with a metallicity/C-O query.
    #[error("invalid custom abundances: {0}")]
    InvalidAbundances(String),

    /// Malformed tabulated data at load time.
    #[error("invalid table data: {0}")]
    InvalidTables(String),

    /// Malformed calculator configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid wavelength bin specification.
    #[error("invalid wavelength bin: {start}-{end} m ({reason})")]
    InvalidBin {
        start: f64,
        end: f64,
        reason: String,
    },

    /// Wavelength bins were set on a calculator that is already binned.
    /// Call `reset_bins` first.
    #[error("wavelength bins are already set; reset the calculator before re-binning")]
    AlreadyBinned,

    /// A requested physics path is not implemented in this build.
    #[error("unsupported feature: {0}")]
    Unsupported(&'static str),
}

/// Convenience type for `Result<T, AtmosphereError>`.
pub type AtmResult<T> = Result<T, AtmosphereError>;
