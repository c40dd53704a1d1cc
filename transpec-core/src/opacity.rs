//! Opacity synthesis.
//!
//! Builds the per-layer, per-wavelength absorption coefficient as a sum of
//! independently toggleable terms: tabulated gas absorption, Rayleigh-type
//! scattering with a free slope, collision-induced absorption and the H⁻
//! bound-free/free-free continuum. Number density is always the ideal-gas
//! `n = P / (k_B T)`.
//!
//! All terms return a `(layer, wavelength)` array on the calculator's
//! current (possibly binned) wavelength grid.

use crate::constants::K_B;
use crate::interpolate::{bracket, interp_cube};
use crate::species::{SpeciesId, SpeciesRegistry};
use crate::tables::AtmosphereTables;
use ndarray::{Array1, Array2, Axis};
use std::collections::HashMap;
use std::f64::consts::PI;

/// Per-layer state of the above-cloud atmosphere handed to each opacity term.
#[derive(Debug)]
pub struct LayerMix<'a> {
    /// Layer pressures, ascending
    /// unit: Pa
    pub pressures: &'a [f64],
    /// Layer temperatures
    /// unit: K
    pub temperatures: &'a [f64],
    /// Per-layer mixing ratio for every species in the mixture
    pub abundances: &'a HashMap<SpeciesId, Array1<f64>>,
}

impl LayerMix<'_> {
    pub fn n_layers(&self) -> usize {
        self.pressures.len()
    }

    /// Ideal-gas total number density at layer `i`
    /// unit: 1 / m^3
    pub fn number_density(&self, i: usize) -> f64 {
        self.pressures[i] / (K_B * self.temperatures[i])
    }
}

/// Tabulated gas absorption.
///
/// For every species with an opacity cube, log10 opacity is interpolated
/// bilinearly in (T, log10 P) at each layer on the restricted grid selected
/// by `t_idx`/`p_idx`, exponentiated back and weighted by the species mixing
/// ratio. Opacity cubes are already floored at load time, so the log domain
/// is safe.
pub fn gas_absorption(
    tables: &AtmosphereTables,
    log_opacity: &HashMap<SpeciesId, ndarray::Array3<f64>>,
    t_idx: &[usize],
    p_idx: &[usize],
    mix: &LayerMix,
    n_lambda: usize,
) -> Array2<f64> {
    let t_sub = tables.temperatures.select(Axis(0), t_idx);
    let logp_sub = tables.log_pressures.select(Axis(0), p_idx);
    let log_p_query: Vec<f64> = mix.pressures.iter().map(|p| p.log10()).collect();

    let mut total = Array2::zeros((mix.n_layers(), n_lambda));
    for (id, abundance) in mix.abundances {
        let Some(cube) = log_opacity.get(id) else {
            continue;
        };
        let sub = cube.select(Axis(0), t_idx).select(Axis(1), p_idx);
        let mut interp = interp_cube(
            t_sub.view(),
            logp_sub.view(),
            sub.view(),
            mix.temperatures,
            &log_p_query,
        );
        interp.mapv_inplace(|v| 10f64.powf(v));
        for (mut row, &x) in interp.rows_mut().into_iter().zip(abundance) {
            row *= x;
        }
        total += &interp;
    }
    total
}

/// Rayleigh-type scattering with a retrievable slope.
///
/// $$\kappa = f \cdot \frac{128 \pi^5}{3} \lambda_{ref}^{s-4}
///   \cdot n \sum_s x_s \alpha_s^2 \cdot \lambda^{-s}$$
///
/// The default slope 4 recovers classical Rayleigh scattering; steeper or
/// shallower slopes model non-Rayleigh hazes.
pub fn rayleigh_absorption(
    wavelengths: &Array1<f64>,
    species: &SpeciesRegistry,
    mix: &LayerMix,
    factor: f64,
    slope: f64,
    ref_wavelength: f64,
) -> Array2<f64> {
    let mut layer_term = Array1::<f64>::zeros(mix.n_layers());
    for (id, abundance) in mix.abundances {
        let alpha = species.info(*id).polarizability;
        if alpha == 0.0 {
            continue;
        }
        for (i, &x) in abundance.iter().enumerate() {
            layer_term[i] += x * alpha * alpha;
        }
    }
    for i in 0..mix.n_layers() {
        layer_term[i] *= mix.number_density(i);
    }

    let prefactor = factor * (128.0 / 3.0) * PI.powi(5) * ref_wavelength.powf(slope - 4.0);
    let lambda_term = wavelengths.mapv(|l| prefactor / l.powf(slope));

    let mut out = Array2::zeros((mix.n_layers(), wavelengths.len()));
    for (mut row, &a) in out.rows_mut().into_iter().zip(&layer_term) {
        row.assign(&lambda_term);
        row *= a;
    }
    out
}

/// Collision-induced absorption.
///
/// Each unordered species pair present both in the table set and the mixture
/// contributes its `(wavelength, T)` coefficient, interpolated in log10
/// along the temperature axis at every layer and scaled by the product of
/// the two partial number densities.
pub fn collisional_absorption(
    tables: &AtmosphereTables,
    log_collisional: &HashMap<(SpeciesId, SpeciesId), Array2<f64>>,
    mix: &LayerMix,
    n_lambda: usize,
) -> Array2<f64> {
    let mut total = Array2::zeros((mix.n_layers(), n_lambda));

    for (&(s1, s2), table) in log_collisional {
        let (Some(x1), Some(x2)) = (mix.abundances.get(&s1), mix.abundances.get(&s2)) else {
            continue;
        };
        for layer in 0..mix.n_layers() {
            let n = mix.number_density(layer);
            let n1n2 = x1[layer] * n * x2[layer] * n;
            let b = bracket(tables.temperatures.view(), mix.temperatures[layer]);
            let lo = table.column(b.lower);
            let hi = table.column(b.upper);
            let mut row = total.row_mut(layer);
            for (li, r) in row.iter_mut().enumerate() {
                let log_k = (1.0 - b.weight) * lo[li] + b.weight * hi[li];
                *r += n1n2 * 10f64.powf(log_k);
            }
        }
    }
    total
}

/// H⁻ bound-free + free-free absorption coefficient per unit electron
/// pressure and neutral-hydrogen density, after John (1988).
///
/// `wavelengths` in meters; the fit is evaluated in microns internally.
/// Returns k in m^4/N (per H atom, per unit electron partial pressure).
pub fn h_minus_k(temperature: f64, wavelengths: &Array1<f64>) -> Array1<f64> {
    const ALPHA: f64 = 1.439e4;
    const LAMBDA_0: f64 = 1.6419;
    const C_BF: [f64; 6] = [152.519, 49.534, -118.858, 92.536, -34.194, 4.982];

    const FF_RED: [[f64; 6]; 6] = [
        [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        [2483.346, 285.827, -2054.291, 2827.776, -1341.537, 208.952],
        [-3449.889, -1158.382, 8746.523, -11485.632, 5303.609, -812.939],
        [2200.04, 2427.719, -13651.105, 16755.524, -7510.494, 1132.738],
        [-696.271, -1841.4, 8624.97, -10051.53, 4400.067, -655.02],
        [88.283, 444.517, -1863.864, 2095.288, -901.788, 132.985],
    ];
    const FF_MID: [[f64; 6]; 6] = [
        [518.1021, -734.8666, 1021.1775, -479.0721, 93.1373, -6.4285],
        [473.2636, 1443.4137, -1977.3395, 922.3575, -178.9275, 12.36],
        [-482.2089, -737.1616, 1096.8827, -521.1341, 101.7963, -7.0571],
        [115.5291, 169.6374, -245.649, 114.243, -21.9972, 1.5097],
        [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    ];

    let t = temperature;
    wavelengths.mapv(|lambda_m| {
        let l = lambda_m * 1e6;

        let mut k_bf = 0.0;
        if l < LAMBDA_0 {
            let x = 1.0 / l - 1.0 / LAMBDA_0;
            let mut f = 0.0;
            for (i, c) in C_BF.iter().enumerate() {
                f += c * x.powf(i as f64 / 2.0);
            }
            let sigma = 1e-18 * l.powi(3) * x.powf(1.5) * f;
            k_bf = 0.75
                * t.powf(-2.5)
                * (ALPHA / (LAMBDA_0 * t)).exp()
                * (1.0 - (-ALPHA / (l * t)).exp())
                * sigma;
        }

        let mut k_ff = 0.0;
        let matrix = if l > 0.3645 {
            Some(&FF_RED)
        } else if l > 0.1823 {
            Some(&FF_MID)
        } else {
            None
        };
        if let Some(matrix) = matrix {
            let powers = [l * l, 1.0, 1.0 / l, 1.0 / (l * l), l.powi(-3), l.powi(-4)];
            for (n, row) in matrix.iter().enumerate() {
                let a: f64 = powers.iter().zip(row).map(|(p, c)| p * c).sum();
                k_ff += 1e-29 * (5040.0 / t).powf((n as f64 + 2.0) / 2.0) * a;
            }
        }

        // 1e-4 converts from cm^4/dyne to m^4/N
        (k_bf + k_ff) * 1e-4
    })
}

/// H⁻ continuum absorption per layer.
///
/// Scaled by the electron and neutral-hydrogen partial pressures:
/// `k(λ, T) · x_el x_H P² / (k_B T)`. Layers without free electrons or
/// atomic hydrogen in the mixture contribute nothing.
pub fn h_minus_absorption(
    wavelengths: &Array1<f64>,
    species: &SpeciesRegistry,
    mix: &LayerMix,
) -> Array2<f64> {
    let mut out = Array2::zeros((mix.n_layers(), wavelengths.len()));
    let (Some(el), Some(h)) = (species.get("el"), species.get("H")) else {
        return out;
    };
    let (Some(x_el), Some(x_h)) = (mix.abundances.get(&el), mix.abundances.get(&h)) else {
        return out;
    };

    for layer in 0..mix.n_layers() {
        let t = mix.temperatures[layer];
        let p = mix.pressures[layer];
        let k = h_minus_k(t, wavelengths);
        let scale = x_el[layer] * x_h[layer] * p * p / (K_B * t);
        let mut row = out.row_mut(layer);
        row.assign(&k);
        row *= scale;
    }
    out
}
