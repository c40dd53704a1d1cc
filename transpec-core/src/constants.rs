//! Physical constants in SI units.

/// Boltzmann constant
/// unit: J / K
pub const K_B: f64 = 1.380_649e-23;

/// Atomic mass unit
/// unit: kg
pub const AMU: f64 = 1.660_539_066_60e-27;

/// Gravitational constant
/// unit: m^3 / (kg s^2)
pub const G: f64 = 6.674_30e-11;

/// Solar radius
/// unit: m
pub const R_SUN: f64 = 6.957e8;

/// Jupiter mass
/// unit: kg
pub const M_JUP: f64 = 1.898_13e27;

/// Jupiter radius
/// unit: m
pub const R_JUP: f64 = 7.149_2e7;

/// Earth mass
/// unit: kg
pub const M_EARTH: f64 = 5.972_2e24;
