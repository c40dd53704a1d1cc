//! Hydrostatic atmospheric structure.
//!
//! Converts a pressure/temperature/mean-molecular-weight profile into an
//! altitude (radius) profile by integrating the hydrostatic relation
//!
//! $$dr = \frac{dP}{P} \cdot \frac{k_B T}{\mu \, g}$$
//!
//! outward and inward from a reference (pressure, radius) anchor. The
//! reference pressure need not be an endpoint of the profile, so the
//! integration is two-sided. Layers at or below the cloud deck are removed
//! before the structure is returned; the deck is opaque, so only the
//! structure above it is externally visible.

use crate::constants::{AMU, G, K_B};
use crate::errors::{AtmResult, AtmosphereError};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// How gravity is specified.
///
/// With a planet mass, gravity follows `g(r) = G M / r^2` as the integration
/// walks through the shells; a fixed surface gravity is treated as constant
/// with altitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Gravity {
    /// Planet mass
    /// unit: kg
    Mass(f64),
    /// Constant gravitational acceleration
    /// unit: m / s^2
    Surface(f64),
}

impl Gravity {
    fn at(&self, radius: f64) -> f64 {
        match *self {
            Gravity::Mass(m) => G * m / (radius * radius),
            Gravity::Surface(g) => g,
        }
    }
}

/// Altitude structure of the above-cloud atmosphere.
#[derive(Debug, Clone)]
pub struct AltitudeProfile {
    /// Shell boundary radii, strictly decreasing; `radii[0]` is the
    /// top-of-atmosphere boundary one scale height above the lowest-pressure
    /// layer, `radii[i + 1]` is the radius of layer `i`
    /// unit: m
    pub radii: Array1<f64>,
    /// Thickness of each layer, `radii[i] - radii[i + 1]`
    /// unit: m
    pub dr: Array1<f64>,
}

impl AltitudeProfile {
    pub fn n_layers(&self) -> usize {
        self.dr.len()
    }
}

/// Integrate the hydrostatic relation over an ascending pressure profile.
///
/// `planet_radius` anchors the structure at `ref_pressure`; `mu_profile` is
/// in AMU. `above_cloud` masks the layers kept in the output and must be a
/// contiguous prefix of the (ascending-pressure) profile, i.e. everything
/// above the cloud deck.
pub fn solve(
    p_profile: ArrayView1<f64>,
    t_profile: ArrayView1<f64>,
    mu_profile: ArrayView1<f64>,
    ref_pressure: f64,
    gravity: Gravity,
    planet_radius: f64,
    above_cloud: &[bool],
) -> AtmResult<AltitudeProfile> {
    let n = p_profile.len();
    if t_profile.len() != n || mu_profile.len() != n || above_cloud.len() != n {
        return Err(AtmosphereError::InvalidTables(
            "P, T, mu and cloud-mask profiles must have equal length".to_string(),
        ));
    }
    if n == 0 || !above_cloud[0] {
        return Err(AtmosphereError::InvalidTables(
            "atmospheric profile has no layers above the cloud deck".to_string(),
        ));
    }

    let scale_height = |i: usize, r: f64| K_B * t_profile[i] / (mu_profile[i] * AMU * gravity.at(r));

    let mut radii = Array1::zeros(n);

    // Anchor at the profile point nearest the reference pressure in log
    // space, correcting for the partial segment between them.
    let i_ref = nearest_log_index(p_profile, ref_pressure);
    radii[i_ref] =
        planet_radius + scale_height(i_ref, planet_radius) * (ref_pressure / p_profile[i_ref]).ln();

    // Outward (decreasing pressure, increasing radius).
    for i in (0..i_ref).rev() {
        let h = 0.5 * (scale_height(i, radii[i + 1]) + scale_height(i + 1, radii[i + 1]));
        radii[i] = radii[i + 1] + h * (p_profile[i + 1] / p_profile[i]).ln();
    }
    // Inward (increasing pressure, decreasing radius).
    for i in (i_ref + 1)..n {
        let h = 0.5 * (scale_height(i, radii[i - 1]) + scale_height(i - 1, radii[i - 1]));
        radii[i] = radii[i - 1] - h * (p_profile[i] / p_profile[i - 1]).ln();
    }

    let n_kept = above_cloud.iter().take_while(|&&m| m).count();

    // Top-of-atmosphere boundary: one scale height above the top layer.
    let top = radii[0] + scale_height(0, radii[0]);

    let mut boundaries = Array1::zeros(n_kept + 1);
    boundaries[0] = top;
    for i in 0..n_kept {
        boundaries[i + 1] = radii[i];
    }
    if boundaries.windows(2).into_iter().any(|w| w[1] >= w[0]) {
        return Err(AtmosphereError::InvalidTables(
            "hydrostatic radii are not strictly decreasing with pressure".to_string(),
        ));
    }

    let dr = Array1::from_iter((0..n_kept).map(|i| boundaries[i] - boundaries[i + 1]));

    Ok(AltitudeProfile {
        radii: boundaries,
        dr,
    })
}

fn nearest_log_index(p_profile: ArrayView1<f64>, ref_pressure: f64) -> usize {
    let target = ref_pressure.ln();
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, &p) in p_profile.iter().enumerate() {
        let d = (p.ln() - target).abs();
        if d < best_dist {
            best = i;
            best_dist = d;
        }
    }
    best
}
