//! Fast interpolation over the tabulated (temperature, pressure, wavelength)
//! grids.
//!
//! Every physics term looks values up on the same native grids, so the
//! helpers here are shared leaves: bracketing of a query between grid nodes,
//! monotone 1-D linear interpolation, restriction of a table to the grid
//! points that actually bracket a profile, and vectorized bilinear
//! interpolation of whole wavelength rows at once.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayView3};
use num::Float;

/// Bracketing of a query value between two grid nodes.
///
/// `value = (1 - weight) * grid[lower] + weight * grid[upper]`. Queries
/// outside the grid are clamped to the nearest node; callers are expected to
/// have validated ranges already. A single-node grid degrades to nearest.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    pub lower: usize,
    pub upper: usize,
    pub weight: f64,
}

/// Find the nodes of an ascending grid bracketing `x`.
pub fn bracket(grid: ArrayView1<f64>, x: f64) -> Bracket {
    let n = grid.len();
    if n == 1 || x <= grid[0] {
        return Bracket {
            lower: 0,
            upper: 0,
            weight: 0.0,
        };
    }
    if x >= grid[n - 1] {
        return Bracket {
            lower: n - 1,
            upper: n - 1,
            weight: 0.0,
        };
    }
    // grid[i] <= x < grid[i + 1]
    let i = match grid
        .as_slice()
        .expect("grids are contiguous")
        .partition_point(|&g| g <= x)
    {
        0 => 0,
        p => p - 1,
    };
    Bracket {
        lower: i,
        upper: i + 1,
        weight: (x - grid[i]) / (grid[i + 1] - grid[i]),
    }
}

/// Monotone 1-D linear interpolation with endpoint clamping
/// (`numpy.interp` semantics).
pub fn interp1d<F: Float>(x: F, xs: &[F], ys: &[F]) -> F {
    debug_assert_eq!(xs.len(), ys.len());
    if x <= xs[0] {
        return ys[0];
    }
    if x >= xs[xs.len() - 1] {
        return ys[ys.len() - 1];
    }
    let i = match xs.partition_point(|&g| g <= x) {
        0 => 0,
        p => p - 1,
    };
    let w = (x - xs[i]) / (xs[i + 1] - xs[i]);
    ys[i] + w * (ys[i + 1] - ys[i])
}

/// Boolean selection of the native grid indices that bracket a profile.
///
/// Only the grid points between (and including) the neighbours of the
/// profile's min/max are kept, so downstream interpolation never touches the
/// full table when the profile spans a narrow range. An additional `cutoff`
/// (used for the cloud-top pressure) drops all nodes at or above it; pass
/// `f64::INFINITY` to disable.
pub fn condition_array(values: ArrayView1<f64>, grid: ArrayView1<f64>, cutoff: f64) -> Vec<bool> {
    let min = values.fold(f64::INFINITY, |a, &b| a.min(b));
    let max = values.fold(f64::NEG_INFINITY, |a, &b| a.max(b));

    let slice = grid.as_slice().expect("grids are contiguous");
    let start = slice.partition_point(|&g| g < min).saturating_sub(1);
    let end = (slice.partition_point(|&g| g <= max) + 1).min(grid.len());

    let mut cond: Vec<bool> = (0..grid.len())
        .map(|i| i >= start && i < end && grid[i] < cutoff)
        .collect();
    // A cutoff at the first bracketing node would empty the selection when
    // the whole profile sits below the grid; keep that node so clamped
    // interpolation still has a value to read.
    if !cond.iter().any(|&c| c) {
        cond[start] = true;
    }
    cond
}

/// Bilinear interpolation of a `(T, P, lambda)` cube at a set of query
/// layers, producing a `(layer, lambda)` array in one pass.
///
/// The cube is tabulated on `t_grid` x `p_axis` (usually log10 pressure),
/// typically already restricted by [`condition_array`]. When only one node
/// brackets an axis the interpolation degrades to linear along the other
/// axis, and to nearest when both axes are single-node.
pub fn interp_cube(
    t_grid: ArrayView1<f64>,
    p_axis: ArrayView1<f64>,
    cube: ArrayView3<'_, f64>,
    t_query: &[f64],
    p_query: &[f64],
) -> Array2<f64> {
    debug_assert_eq!(t_query.len(), p_query.len());
    debug_assert_eq!(cube.shape()[0], t_grid.len());
    debug_assert_eq!(cube.shape()[1], p_axis.len());

    let n_lambda = cube.shape()[2];
    let mut out = Array2::zeros((t_query.len(), n_lambda));

    for (layer, (&t, &p)) in t_query.iter().zip(p_query).enumerate() {
        let bt = bracket(t_grid, t);
        let bp = bracket(p_axis, p);
        let mut row = out.row_mut(layer);

        for (ti, tw) in [(bt.lower, 1.0 - bt.weight), (bt.upper, bt.weight)] {
            for (pi, pw) in [(bp.lower, 1.0 - bp.weight), (bp.upper, bp.weight)] {
                let w = tw * pw;
                if w == 0.0 {
                    continue;
                }
                row.scaled_add(w, &cube.slice(ndarray::s![ti, pi, ..]));
            }
        }
    }
    out
}

/// Bilinear interpolation of a `(T, P)` table at a set of query layers.
///
/// Same weighting as [`interp_cube`] with a scalar value per node.
pub fn interp_table(
    t_grid: ArrayView1<f64>,
    p_axis: ArrayView1<f64>,
    table: ArrayView2<'_, f64>,
    t_query: &[f64],
    p_query: &[f64],
) -> Array1<f64> {
    debug_assert_eq!(t_query.len(), p_query.len());

    Array1::from_iter(t_query.iter().zip(p_query).map(|(&t, &p)| {
        let bt = bracket(t_grid, t);
        let bp = bracket(p_axis, p);
        let mut acc = 0.0;
        for (ti, tw) in [(bt.lower, 1.0 - bt.weight), (bt.upper, bt.weight)] {
            for (pi, pw) in [(bp.lower, 1.0 - bp.weight), (bp.upper, bp.weight)] {
                let w = tw * pw;
                if w != 0.0 {
                    acc += w * table[[ti, pi]];
                }
            }
        }
        acc
    }))
}
