// src/utils/linear_algebra.rs

use nalgebra::DMatrix;

/// Builds the diffusion (Laplacian) operator for a 1-D slab on a possibly
/// non-uniform grid.
///
/// Finite-difference stencils account for the diffusion coefficient and cell
/// spacing of each neighbor; one-sided differences close the boundaries.
///
/// # Arguments
///
/// * `diffusion` - Per-cell diffusion coefficients.
/// * `delta_x` - Per-cell spacings.
///
/// # Returns
///
/// * A tridiagonal operator matrix of size N x N.
pub fn build_diffusion_operator(diffusion: &[f64], delta_x: &[f64]) -> DMatrix<f64> {
    let n = diffusion.len();
    assert_eq!(delta_x.len(), n, "diffusion and delta_x must be the same length");
    let mut op = DMatrix::zeros(n, n);

    for i in 0..n {
        if i == 0 {
            let d = diffusion[i] / delta_x[i];
            op[(i, i)] = -d;
            op[(i, i + 1)] = d;
        } else if i == n - 1 {
            let d = diffusion[i - 1] / delta_x[i - 1];
            op[(i, i - 1)] = d;
            op[(i, i)] = -d;
        } else {
            let dx_b = delta_x[i - 1];
            let dx_f = delta_x[i];
            let a = diffusion[i - 1] / (dx_b * (dx_b + dx_f));
            let c = diffusion[i] / (dx_f * (dx_b + dx_f));
            op[(i, i - 1)] = a;
            op[(i, i)] = -(a + c);
            op[(i, i + 1)] = c;
        }
    }

    op
}

/// Builds a diagonal matrix from per-cell parameters, used to place removal
/// and production cross sections on the diagonal of the eigenvalue system.
pub fn build_diagonal_operator(parameters: &[f64]) -> DMatrix<f64> {
    let n = parameters.len();
    let mut diag = DMatrix::zeros(n, n);
    for i in 0..n {
        diag[(i, i)] = parameters[i];
    }
    diag
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_diffusion_operator_uniform_grid() {
        let diffusion = [1.0, 1.0, 1.0];
        let delta_x = [1.0, 1.0, 1.0];
        let op = build_diffusion_operator(&diffusion, &delta_x);

        let expected = DMatrix::from_row_slice(3, 3, &[
            -1.0, 1.0, 0.0,
             0.5, -1.0, 0.5,
             0.0, 1.0, -1.0,
        ]);

        for i in 0..3 {
            for j in 0..3 {
                assert!((op[(i, j)] - expected[(i, j)]).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_build_diffusion_operator_rows_sum_to_zero_interior() {
        let diffusion = [1.0, 2.0, 3.0, 2.0];
        let delta_x = [1.0, 2.0, 1.0, 0.5];
        let op = build_diffusion_operator(&diffusion, &delta_x);

        // Interior stencils conserve neutrons: coefficients sum to zero.
        for i in 1..3 {
            let row_sum: f64 = (0..4).map(|j| op[(i, j)]).sum();
            assert!(row_sum.abs() < 1e-12);
        }
    }

    #[test]
    fn test_build_diagonal_operator() {
        let diag = build_diagonal_operator(&[4.0, 5.0, 6.0]);
        let expected = DMatrix::from_row_slice(3, 3, &[
            4.0, 0.0, 0.0,
            0.0, 5.0, 0.0,
            0.0, 0.0, 6.0,
        ]);
        assert_eq!(diag, expected);
    }
}
