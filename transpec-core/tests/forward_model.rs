//! End-to-end properties of the transit-depth forward model.
//!
//! These tests drive the whole pipeline on small synthetic table sets whose
//! behaviour can be predicted analytically: constant opacities, isothermal
//! profiles and constant surface gravity make every stage solvable in
//! closed form.

use approx::assert_relative_eq;
use ndarray::{arr1, Array1, Array2, Array3};
use std::collections::HashMap;
use std::sync::Arc;
use transpec_core::abundances::AbundanceStore;
use transpec_core::calculator::{DepthParams, TransitDepthCalculator};
use transpec_core::config::CalculatorOptions;
use transpec_core::constants::{AMU, K_B};
use transpec_core::errors::AtmosphereError;
use transpec_core::hydrostatic::Gravity;
use transpec_core::species::SpeciesRegistry;
use transpec_core::tables::{AtmosphereTables, DEFAULT_MIN_OPACITY};

const N_LAMBDA: usize = 24;
const MU: f64 = 2.3;
const SURFACE_G: f64 = 10.0;
const STAR_RADIUS: f64 = 7e8;
const PLANET_RADIUS: f64 = 7e7;
const REF_PRESSURE: f64 = 1e5;

/// Opacity at wavelength index `l` for a base value `kappa`; a mild tilt
/// across the grid keeps the spectrum wavelength-dependent.
fn kappa_at(kappa: f64, l: usize) -> f64 {
    kappa * (1.0 + 0.05 * l as f64)
}

/// Build a calculator with one absorbing species of known opacity
/// (`kappa_at(kappa, l)` at every (T, P)) and unit mixing ratio everywhere.
fn make_calculator(kappa: f64) -> TransitDepthCalculator {
    let mut registry = SpeciesRegistry::new();
    let gas = registry.register("H2", MU, 0.0);

    let wavelengths = Array1::from_iter((0..N_LAMBDA).map(|i| 1e-6 + 1e-7 * i as f64));
    let t_grid = arr1(&[500.0, 1000.0, 1500.0, 2000.0, 2500.0, 3000.0]);
    let p_grid = Array1::from_iter((0..10).map(|i| 0.1 * 10f64.powi(i)));

    let mut opacity = HashMap::new();
    opacity.insert(
        "H2".to_string(),
        Array3::from_shape_fn((t_grid.len(), p_grid.len(), N_LAMBDA), |(_, _, l)| {
            kappa_at(kappa, l)
        }),
    );

    let tables = AtmosphereTables::new(
        wavelengths,
        t_grid.clone(),
        p_grid.clone(),
        registry,
        opacity,
        HashMap::new(),
        DEFAULT_MIN_OPACITY,
    )
    .unwrap();

    let unit = Array2::from_elem((t_grid.len(), p_grid.len()), 1.0);
    let grids = vec![
        HashMap::from([(gas, unit.clone())]),
        HashMap::from([(gas, unit.clone())]),
        HashMap::from([(gas, unit)]),
    ];
    let store = AbundanceStore::new(
        arr1(&[-1.0, 0.0, 1.0]),
        None,
        grids,
        t_grid.len(),
        p_grid.len(),
    )
    .unwrap();

    TransitDepthCalculator::new(Arc::new(tables), store, CalculatorOptions::default()).unwrap()
}

fn isothermal_params() -> DepthParams {
    let n = 100;
    let (lo, hi) = (1.0f64.ln(), 1e7f64.ln());
    let p_profile =
        Array1::from_iter((0..n).map(|i| (lo + (hi - lo) * i as f64 / (n - 1) as f64).exp()));
    DepthParams {
        star_radius: STAR_RADIUS,
        planet_radius: PLANET_RADIUS,
        gravity: Gravity::Surface(SURFACE_G),
        p_profile,
        t_profile: Array1::from_elem(n, 1200.0),
        log_z: Some(0.0),
        co_ratio: None,
        add_scattering: false,
        add_collisional_absorption: false,
        ..Default::default()
    }
}

#[test]
fn zero_absorption_gives_bare_disk_depth() {
    let calc = make_calculator(1e-10);
    let params = DepthParams {
        add_gas_absorption: false,
        ..isothermal_params()
    };
    let spectrum = calc.compute_depths(&params).unwrap();
    let disk = (PLANET_RADIUS / STAR_RADIUS).powi(2);
    assert!(spectrum.depths.iter().all(|&d| d == disk));
}

#[test]
fn depth_increases_with_planet_radius() {
    let calc = make_calculator(1e-9);
    let small = calc.compute_depths(&isothermal_params()).unwrap();
    let large = calc
        .compute_depths(&DepthParams {
            planet_radius: PLANET_RADIUS * 1.1,
            ..isothermal_params()
        })
        .unwrap();
    for (s, l) in small.depths.iter().zip(&large.depths) {
        assert!(l > s);
    }
}

#[test]
fn cloud_deck_above_profile_leaves_only_the_disk() {
    let calc = make_calculator(1e-8);
    // cloud top at the minimum tabulated pressure, below every profile layer
    let params = DepthParams {
        cloudtop_pressure: 0.1,
        ..isothermal_params()
    };
    let spectrum = calc.compute_depths(&params).unwrap();
    let disk = (PLANET_RADIUS / STAR_RADIUS).powi(2);
    for &d in &spectrum.depths {
        assert_relative_eq!(d, disk, max_relative = 1e-12);
    }
}

#[test]
fn cloudtop_at_grid_minimum_with_sub_grid_layer_computes() {
    let calc = make_calculator(1e-8);
    // the only above-cloud layer sits below the tabulated pressure minimum,
    // so pressure interpolation clamps to the first grid node
    let params = DepthParams {
        p_profile: arr1(&[0.01, 1.0, 100.0]),
        t_profile: Array1::from_elem(3, 1200.0),
        cloudtop_pressure: 0.1,
        ..isothermal_params()
    };
    let spectrum = calc.compute_depths(&params).unwrap();
    let disk = (PLANET_RADIUS / STAR_RADIUS).powi(2);
    assert!(spectrum.depths.iter().all(|&d| d.is_finite() && d >= disk));
}

#[test]
fn infinite_cloudtop_matches_deep_cloudtop_bit_for_bit() {
    let calc = make_calculator(1e-9);
    let clear = calc.compute_depths(&isothermal_params()).unwrap();
    // deck at the bottom of the pressure grid, below the whole profile
    let clouded = calc
        .compute_depths(&DepthParams {
            cloudtop_pressure: 1e8,
            ..isothermal_params()
        })
        .unwrap();
    assert_eq!(clear.depths, clouded.depths);
    assert_eq!(clear.wavelengths, clouded.wavelengths);
}

#[test]
fn temperature_above_grid_is_a_domain_error() {
    let calc = make_calculator(1e-9);
    let mut params = isothermal_params();
    params.t_profile[50] = 3001.0;
    assert!(matches!(
        calc.compute_depths(&params).unwrap_err(),
        AtmosphereError::TemperatureOutOfRange { .. }
    ));
}

#[test]
fn metallicity_outside_store_is_a_range_error() {
    let calc = make_calculator(1e-9);
    let params = DepthParams {
        log_z: Some(2.5),
        ..isothermal_params()
    };
    assert!(matches!(
        calc.compute_depths(&params).unwrap_err(),
        AtmosphereError::ParameterOutOfRange { name: "logZ", .. }
    ));
}

#[test]
fn cloudtop_outside_pressure_grid_is_a_range_error() {
    let calc = make_calculator(1e-9);
    let params = DepthParams {
        cloudtop_pressure: 1e9,
        ..isothermal_params()
    };
    assert!(matches!(
        calc.compute_depths(&params).unwrap_err(),
        AtmosphereError::ParameterOutOfRange {
            name: "cloud-top pressure",
            ..
        }
    ));
}

#[test]
fn single_full_range_bin_averages_native_depths() {
    let mut calc = make_calculator(1e-9);
    let unbinned = calc.compute_depths(&isothermal_params()).unwrap();

    let lambda_min = unbinned.wavelengths[0];
    let lambda_max = unbinned.wavelengths[unbinned.wavelengths.len() - 1];
    calc.set_wavelength_bins(&[(lambda_min, lambda_max)]).unwrap();
    let binned = calc.compute_depths(&isothermal_params()).unwrap();

    // half-open bin: everything except the last native point
    let kept: Vec<f64> = unbinned
        .wavelengths
        .iter()
        .zip(&unbinned.depths)
        .filter(|(&l, _)| l < lambda_max)
        .map(|(_, &d)| d)
        .collect();
    let mean = kept.iter().sum::<f64>() / kept.len() as f64;

    assert_eq!(binned.depths.len(), 1);
    assert_relative_eq!(binned.depths[0], mean, max_relative = 1e-12);
}

#[test]
fn isothermal_constant_opacity_matches_analytic_depth() {
    let kappa = 3e-8;
    let calc = make_calculator(kappa);
    let params = isothermal_params();
    let (spectrum, diag) = calc.compute_depths_with_profiles(&params).unwrap();

    // analytic isothermal structure
    let h = K_B * 1200.0 / (MU * AMU * SURFACE_G);
    let n = params.p_profile.len();
    let mut radii = Vec::with_capacity(n + 1);
    radii.push(0.0); // placeholder for the top boundary
    for &p in &params.p_profile {
        radii.push(PLANET_RADIUS + h * (REF_PRESSURE / p).ln());
    }
    radii[0] = radii[1] + h;

    for (i, &r) in radii.iter().enumerate() {
        assert_relative_eq!(diag.radii[i], r, max_relative = 1e-10);
    }

    // uniform absorber at each wavelength: tau telescopes to the full
    // half-chord above the impact parameter
    let top = radii[0];
    for (l, &d) in spectrum.depths.iter().enumerate() {
        let k = kappa_at(kappa, l);
        let mut expected = (PLANET_RADIUS / STAR_RADIUS).powi(2);
        for i in 0..n {
            let b = radii[i + 1];
            let tau = 2.0 * k * (top * top - b * b).sqrt();
            let dr = radii[i] - radii[i + 1];
            expected += 2.0 / (STAR_RADIUS * STAR_RADIUS) * (1.0 - (-tau).exp()) * b * dr;
        }
        assert_relative_eq!(d, expected, max_relative = 1e-8);
    }

    // the chosen opacity straddles the thin/thick transition: deep rays are
    // saturated, the topmost ray is not
    let b_top = radii[1];
    let tau_top = 2.0 * kappa * (top * top - b_top * b_top).sqrt();
    assert!(tau_top < 1.0);
    let b_bottom = radii[n];
    let tau_bottom = 2.0 * kappa * (top * top - b_bottom * b_bottom).sqrt();
    assert!(tau_bottom > 1.0);
}

#[test]
fn custom_abundances_replace_the_equilibrium_tables() {
    let calc = make_calculator(1e-9);
    let mut params = isothermal_params();
    params.log_z = None;
    params.custom_abundances = Some(HashMap::from([(
        "H2".to_string(),
        Array2::from_elem((6, 10), 1.0),
    )]));
    let custom = calc.compute_depths(&params).unwrap();
    let equilibrium = calc.compute_depths(&isothermal_params()).unwrap();
    // unit mixing ratios either way
    assert_eq!(custom.depths, equilibrium.depths);
}

#[test]
fn custom_abundances_with_metallicity_is_an_error() {
    let calc = make_calculator(1e-9);
    let mut params = isothermal_params();
    params.custom_abundances = Some(HashMap::from([(
        "H2".to_string(),
        Array2::from_elem((6, 10), 1.0),
    )]));
    assert!(matches!(
        calc.compute_depths(&params).unwrap_err(),
        AtmosphereError::InvalidAbundances(_)
    ));
}

#[test]
fn depth_params_serde_round_trip() {
    let mut params = isothermal_params();
    // JSON has no representation for the infinite (cloud-free) default
    params.cloudtop_pressure = 1e4;
    let text = serde_json::to_string(&params).unwrap();
    let back: DepthParams = serde_json::from_str(&text).unwrap();
    assert_eq!(back.p_profile, params.p_profile);
    assert_eq!(back.gravity, params.gravity);
    assert_eq!(back.cloudtop_pressure, 1e4);
}
