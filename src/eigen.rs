//! Weighted 3x3 covariance and principal-eigenvector extraction.
//!
//! `nalgebra`'s `SymmetricEigen` solves the well-posed 3x3 symmetric
//! eigenproblem directly, without an external BLAS dependency.

use glam::DVec3;
use nalgebra::{Matrix3, SymmetricEigen};

use crate::color::Color;

/// Accumulate `Σ weight_k · (|color_k − center| )(|color_k − center|)ᵀ`,
/// taking the absolute value of each component of the difference before the
/// outer product, deliberately. Not mean-centered and not a conventional
/// covariance — `center` is the subcluster's own color, not the mean of
/// `colors`.
///
/// No further normalization is applied; callers fold any `1/π` or `1/N`
/// factor into `weights` themselves.
pub fn weighted_abs_outer_product(center: Color, colors: &[Color], weights: &[f64]) -> Matrix3<f64> {
    debug_assert_eq!(colors.len(), weights.len());

    let center = DVec3::from(center.to_array());
    let mut accum = Matrix3::zeros();
    for (color, weight) in colors.iter().zip(weights) {
        let d = (DVec3::from(color.to_array()) - center).abs();
        let outer = Matrix3::new(
            d.x * d.x, d.x * d.y, d.x * d.z,
            d.y * d.x, d.y * d.y, d.y * d.z,
            d.z * d.x, d.z * d.y, d.z * d.z,
        );
        accum += outer * *weight;
    }
    accum
}

/// The eigenvector/eigenvalue pair of largest absolute eigenvalue, the
/// principal axis of color variation used both for the initial temperature
/// calibration and for subcluster perturbation direction.
///
/// Returns `(DVec3::ZERO, 0.0)` for a degenerate (all-zero) matrix.
pub fn max_eigen(matrix: Matrix3<f64>) -> (DVec3, f64) {
    let eigen = SymmetricEigen::new(matrix);

    let mut best_idx = 0;
    let mut best_abs = 0.0f64;
    for (i, value) in eigen.eigenvalues.iter().enumerate() {
        if value.abs() > best_abs {
            best_abs = value.abs();
            best_idx = i;
        }
    }

    let value = eigen.eigenvalues[best_idx];
    let vector = eigen.eigenvectors.column(best_idx);
    let mut vector = DVec3::new(vector[0], vector[1], vector[2]);
    if vector.length_squared() > 0.0 {
        vector = vector.normalize();
    }

    (vector, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_colors_have_zero_spread() {
        let center = Color::new(50.0, 0.0, 0.0);
        let colors = vec![Color::new(50.0, 0.0, 0.0); 4];
        let weights = vec![0.25; 4];
        let m = weighted_abs_outer_product(center, &colors, &weights);
        let (_, eigenvalue) = max_eigen(m);
        assert!(eigenvalue.abs() < 1e-9);
    }

    #[test]
    fn variation_along_l_is_the_principal_axis() {
        let center = Color::new(50.0, 0.0, 0.0);
        let colors = vec![
            Color::new(0.0, 0.0, 0.0),
            Color::new(100.0, 0.0, 0.0),
            Color::new(0.0, 0.0, 0.0),
            Color::new(100.0, 0.0, 0.0),
        ];
        let weights = vec![0.25; 4];
        let m = weighted_abs_outer_product(center, &colors, &weights);
        let (vector, eigenvalue) = max_eigen(m);
        assert!(eigenvalue > 0.0);
        assert!(vector.x.abs() > vector.y.abs());
        assert!(vector.x.abs() > vector.z.abs());
    }

    #[test]
    fn empty_input_is_degenerate_but_stable() {
        let (vector, eigenvalue) = max_eigen(weighted_abs_outer_product(Color::BLACK, &[], &[]));
        assert_eq!(eigenvalue, 0.0);
        assert_eq!(vector, DVec3::ZERO);
    }
}
