//! Line-of-sight optical depth through concentric spherical shells.
//!
//! During transit a ray grazes the atmosphere at some impact parameter and
//! crosses every shell lying above that radius twice. The chord length
//! through the shell bounded by radii $r_j > r_{j+1}$ at impact parameter
//! $b$ is
//!
//! $$\ell_j(b) = 2\left(\sqrt{r_j^2 - b^2} - \sqrt{r_{j+1}^2 - b^2}\right)$$
//!
//! and the slant optical depth is the sum of $\kappa_j \ell_j$ over the
//! shells the ray traverses.

use ndarray::{Array2, ArrayView1, ArrayView2};

/// Slant optical depth for a ray at each layer's impact parameter.
///
/// `absorption` is `(layer, wavelength)` ordered outer to inner;
/// `radii` holds the `n_layers + 1` shell boundary radii, strictly
/// decreasing. Row `i` of the result is the optical depth of a ray whose
/// impact parameter is the inner boundary of layer `i` (`radii[i + 1]`);
/// a ray at the outermost boundary grazes no shell and sees zero depth.
///
/// Differences under the square roots are clamped at zero so the innermost
/// ray (`r_j == b`) stays real.
pub fn line_of_sight_tau(absorption: ArrayView2<f64>, radii: ArrayView1<f64>) -> Array2<f64> {
    let n_layers = absorption.nrows();
    let n_lambda = absorption.ncols();
    debug_assert_eq!(radii.len(), n_layers + 1);

    let mut tau = Array2::zeros((n_layers, n_lambda));

    for i in 0..n_layers {
        let b = radii[i + 1];
        let b2 = b * b;
        let mut row = tau.row_mut(i);
        // half-chord distance from the midplane to each boundary above b
        let mut outer = (radii[0] * radii[0] - b2).max(0.0).sqrt();
        for j in 0..=i {
            let inner = (radii[j + 1] * radii[j + 1] - b2).max(0.0).sqrt();
            let path = 2.0 * (outer - inner);
            row.scaled_add(path, &absorption.row(j));
            outer = inner;
        }
    }
    tau
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{arr1, Array2};

    #[test]
    fn single_shell_matches_chord_geometry() {
        let radii = arr1(&[2.0, 1.0]);
        let absorption = Array2::from_elem((1, 1), 0.5);
        let tau = line_of_sight_tau(absorption.view(), radii.view());
        // chord through a shell from r=2 down to b=1: 2*sqrt(3)
        assert_relative_eq!(tau[[0, 0]], 0.5 * 2.0 * 3.0f64.sqrt(), max_relative = 1e-12);
    }

    #[test]
    fn deeper_rays_accumulate_more_depth() {
        let radii = arr1(&[5.0, 4.0, 3.0, 2.0]);
        let absorption = Array2::from_elem((3, 2), 1e-3);
        let tau = line_of_sight_tau(absorption.view(), radii.view());
        for l in 0..2 {
            assert!(tau[[0, l]] < tau[[1, l]]);
            assert!(tau[[1, l]] < tau[[2, l]]);
        }
    }

    #[test]
    fn innermost_ray_stays_real() {
        let radii = arr1(&[3.0, 2.0, 2.0 - 1e-14]);
        let absorption = Array2::from_elem((2, 1), 1.0);
        let tau = line_of_sight_tau(absorption.view(), radii.view());
        assert!(tau.iter().all(|&v| v.is_finite() && v >= 0.0));
    }

    #[test]
    fn zero_absorption_gives_zero_tau() {
        let radii = arr1(&[5.0, 4.0, 3.0]);
        let absorption = Array2::zeros((2, 3));
        let tau = line_of_sight_tau(absorption.view(), radii.view());
        assert!(tau.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn uniform_absorber_matches_analytic_path() {
        // path of the deepest ray through both shells equals the full chord
        // from the top boundary down to the impact parameter
        let radii = arr1(&[4.0, 3.0, 1.0]);
        let kappa = 0.25;
        let absorption = Array2::from_elem((2, 1), kappa);
        let tau = line_of_sight_tau(absorption.view(), radii.view());
        let full_chord = 2.0 * (16.0f64 - 1.0).sqrt();
        assert_relative_eq!(tau[[1, 0]], kappa * full_chord, max_relative = 1e-12);
    }
}
