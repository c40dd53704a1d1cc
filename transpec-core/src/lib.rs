//! Core radiative-transfer forward model for exoplanet transmission spectra.
//!
//! Given a pressure-temperature profile, a chemical composition and a cloud
//! deck, this crate computes the wavelength-dependent transit depth of a
//! planet crossing its host star. The pipeline is:
//!
//! 1. [`abundances`] interpolates chemical-equilibrium mixing ratios for the
//!    requested metallicity and C/O ratio.
//! 2. [`hydrostatic`] converts the P-T profile into an altitude structure.
//! 3. [`opacity`] synthesizes a per-layer, per-wavelength absorption
//!    coefficient from gas, Rayleigh-type scattering, collisional and
//!    (optionally) H⁻ continuum terms.
//! 4. [`tau`] integrates slant optical depths through the spherical shells.
//! 5. [`calculator`] compiles the transit-depth spectrum, optionally rebinned
//!    onto instrument wavelength bins.
//!
//! All tabulated data (opacities, collisional pairs, abundances, grids) is
//! loaded once into an immutable [`tables::AtmosphereTables`] and shared
//! between calculator instances. The forward model is a pure function of its
//! parameters and is intended to be called many thousands of times from an
//! external sampling loop.

pub mod abundances;
pub mod calculator;
pub mod config;
pub mod constants;
pub mod errors;
pub mod hydrostatic;
pub mod interpolate;
pub mod opacity;
pub mod species;
pub mod tables;
pub mod tau;

pub use calculator::{DepthParams, TransitDepthCalculator, TransitSpectrum};
pub use errors::{AtmResult, AtmosphereError};
pub use tables::AtmosphereTables;
