//! Uniform scale plus translation: `p' = s * p + t`, parameters `[s, tx, ty]`.

use nalgebra::{Cholesky, Matrix3, Point2, Vector3};

use crate::core::{check_parameters, Selection, TransformModel};
use crate::error::{EstimationError, Result};
use crate::normalization::Normalization;
use crate::settings::TransformSettings;
use crate::types::{Correspondences, Parameters};

const NAME: &str = "translation-scale";
const PARAMETERS: usize = 3;
const MIN_CORRESPONDENCES: usize = 2;

/// First-view spread (sum of squared distances to the centroid) below which
/// the scale is undetermined.
const MIN_SPREAD: f64 = 1e-12;

#[derive(Debug, Clone, Copy, Default)]
pub struct TranslationScaleModel {
    settings: TransformSettings,
}

impl TranslationScaleModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: TransformSettings) -> Self {
        Self { settings }
    }
}

impl TransformModel for TranslationScaleModel {
    fn name(&self) -> &'static str {
        NAME
    }

    fn min_number_correspondences(&self) -> usize {
        MIN_CORRESPONDENCES
    }

    fn parameter_count(&self) -> usize {
        PARAMETERS
    }

    fn computes_squared_error(&self) -> bool {
        self.settings.compute_sq_error
    }

    /// Linear least squares on the 3×3 normal equations.
    fn fit(&self, data: &Correspondences, selection: Selection<'_>) -> Result<Parameters> {
        let n = selection.len() as f64;
        let (mut sxx, mut sx, mut sy) = (0.0, 0.0, 0.0);
        let (mut sxu, mut su, mut sv) = (0.0, 0.0, 0.0);

        for idx in selection.indices() {
            let (p, q) = data.pair(idx);
            sxx += p.x * p.x + p.y * p.y;
            sx += p.x;
            sy += p.y;
            sxu += p.x * q.x + p.y * q.y;
            su += q.x;
            sv += q.y;
        }

        let spread = sxx - (sx * sx + sy * sy) / n;
        if spread <= MIN_SPREAD * sxx.max(1.0) {
            return Err(EstimationError::DegenerateSample(
                "first-view points coincide, scale is undetermined".to_string(),
            ));
        }

        let normal = Matrix3::new(sxx, sx, sy, sx, n, 0.0, sy, 0.0, n);
        let rhs = Vector3::new(sxu, su, sv);
        let solution = Cholesky::new(normal)
            .ok_or_else(|| {
                EstimationError::NumericalSingularity(
                    "translation-scale normal matrix is not positive definite".to_string(),
                )
            })?
            .solve(&rhs);

        if solution.iter().any(|v| !v.is_finite()) {
            return Err(EstimationError::NumericalSingularity(
                "translation-scale solve produced non-finite values".to_string(),
            ));
        }
        Ok(solution.as_slice().to_vec())
    }

    fn residual_into(&self, data: &Correspondences, params: &[f64], out: &mut Vec<f64>) -> Result<()> {
        check_parameters(NAME, PARAMETERS, params)?;
        out.clear();
        out.reserve(data.len());
        let (s, tx, ty) = (params[0], params[1], params[2]);
        for (p, q) in data.first().iter().zip(data.second()) {
            let dx = s * p.x + tx - q.x;
            let dy = s * p.y + ty - q.y;
            let sq = dx * dx + dy * dy;
            out.push(if self.settings.compute_sq_error { sq } else { sq.sqrt() });
        }
        Ok(())
    }

    /// With `pₙ = a·p + b` in both views: `s = sₙ·a1/a2`, `t = (sₙ·b1 + tₙ − b2)/a2`.
    fn denormalize(&self, params: &mut Parameters, first: &Normalization, second: &Normalization) -> Result<()> {
        check_parameters(NAME, PARAMETERS, params)?;
        if second.scale.abs() < f64::EPSILON {
            return Err(EstimationError::NumericalSingularity(
                "second-view normalization has zero scale".to_string(),
            ));
        }
        let s = params[0];
        let tx = (s * first.shift.x + params[1] - second.shift.x) / second.scale;
        let ty = (s * first.shift.y + params[2] - second.shift.y) / second.scale;
        params[0] = s * first.scale / second.scale;
        params[1] = tx;
        params[2] = ty;
        Ok(())
    }

    fn to_matrix(&self, params: &[f64]) -> Result<Matrix3<f64>> {
        check_parameters(NAME, PARAMETERS, params)?;
        Ok(Matrix3::new(
            params[0], 0.0, params[1], 0.0, params[0], params[2], 0.0, 0.0, 1.0,
        ))
    }

    #[inline]
    fn evaluate(&self, point: &Point2<f64>, params: &[f64]) -> Option<Point2<f64>> {
        if params.len() != PARAMETERS {
            return None;
        }
        Some(Point2::new(
            params[0] * point.x + params[1],
            params[0] * point.y + params[2],
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalization::{normalize_correspondences, IsotropicNormalizer};
    use approx::assert_abs_diff_eq;

    fn scaled_shifted(first: &[Point2<f64>], s: f64, tx: f64, ty: f64) -> Correspondences {
        let second = first
            .iter()
            .map(|p| Point2::new(s * p.x + tx, s * p.y + ty))
            .collect();
        Correspondences::new(first.to_vec(), second).unwrap()
    }

    #[test]
    fn recovers_scale_two_shift_three_minus_two() {
        let first = [
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(0.0, 1.0),
            Point2::new(1.0, 1.0),
        ];
        let data = scaled_shifted(&first, 2.0, 3.0, -2.0);

        let (params, residuals) = TranslationScaleModel::new()
            .estimate_with_residual(&data)
            .unwrap();

        assert_abs_diff_eq!(params[0], 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(params[1], 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(params[2], -2.0, epsilon = 1e-6);
        assert_eq!(residuals.len(), 4);
        assert!(residuals.iter().all(|r| r.abs() < 1e-9));
    }

    #[test]
    fn subset_fit_ignores_unselected_outliers() {
        let first = [
            Point2::new(10.0, 4.0),
            Point2::new(-3.0, 8.0),
            Point2::new(7.0, -1.0),
            Point2::new(2.0, 2.0),
        ];
        let mut data = scaled_shifted(&first, 0.5, -1.0, 6.0);
        let mut second = data.second().to_vec();
        second[3] = Point2::new(500.0, -500.0);
        data = Correspondences::new(first.to_vec(), second).unwrap();

        let (params, residuals) = TranslationScaleModel::new()
            .estimate_subset_with_residual(&data, &[2, 0, 3], 2)
            .unwrap();
        assert_abs_diff_eq!(params[0], 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(params[1], -1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(params[2], 6.0, epsilon = 1e-9);
        assert!(residuals[1] < 1e-9);
        assert!(residuals[3] > 100.0);
    }

    #[test]
    fn coincident_first_view_points_are_degenerate() {
        let first = [Point2::new(4.0, 4.0); 3];
        let second = vec![Point2::new(1.0, 1.0), Point2::new(2.0, 2.0), Point2::new(3.0, 3.0)];
        let data = Correspondences::new(first.to_vec(), second).unwrap();
        let err = TranslationScaleModel::new().estimate(&data).unwrap_err();
        assert!(matches!(err, EstimationError::DegenerateSample(_)));
    }

    #[test]
    fn denormalized_fit_matches_raw_fit() {
        let first: Vec<_> = (0..12)
            .map(|i| Point2::new(300.0 + (i * 17 % 50) as f64, 120.0 + (i * 7 % 23) as f64))
            .collect();
        let data = scaled_shifted(&first, 1.75, -40.0, 12.5);

        let model = TranslationScaleModel::new();
        let (normalized, n1, n2) =
            normalize_correspondences(&IsotropicNormalizer::default(), &data).unwrap();
        let mut params = model.estimate(&normalized).unwrap();
        model.denormalize(&mut params, &n1, &n2).unwrap();

        assert_abs_diff_eq!(params[0], 1.75, epsilon = 1e-9);
        assert_abs_diff_eq!(params[1], -40.0, epsilon = 1e-7);
        assert_abs_diff_eq!(params[2], 12.5, epsilon = 1e-7);
    }

    #[test]
    fn matrix_view_matches_evaluate() {
        let model = TranslationScaleModel::new();
        let params = [2.0, 3.0, -2.0];
        let m = model.to_matrix(&params).unwrap();
        let p = Point2::new(1.5, -4.0);
        let via_matrix = m * p.to_homogeneous();
        let direct = model.evaluate(&p, &params).unwrap();
        assert_abs_diff_eq!(via_matrix.x, direct.x);
        assert_abs_diff_eq!(via_matrix.y, direct.y);
        assert_abs_diff_eq!(via_matrix.z, 1.0);
    }

    #[test]
    fn evaluate_rejects_wrong_parameter_counts() {
        let model = TranslationScaleModel::new();
        let p = Point2::new(1.0, 2.0);
        assert!(model.evaluate(&p, &[2.0, 1.0]).is_none());
        assert!(model.evaluate(&p, &[]).is_none());
        assert!(model.evaluate(&p, &[2.0, 1.0, 1.0, 0.0]).is_none());
    }

    #[test]
    fn squared_mode() {
        let first = [Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)];
        let second = vec![Point2::new(3.0, 4.0), Point2::new(4.0, 4.0)];
        let data = Correspondences::new(first.to_vec(), second).unwrap();
        let model = TranslationScaleModel::with_settings(TransformSettings {
            compute_sq_error: true,
        });
        let residuals = model.residual(&data, &[1.0, 0.0, 0.0]).unwrap();
        assert_abs_diff_eq!(residuals[0], 25.0);
        assert_abs_diff_eq!(residuals[1], 25.0);
    }
}
