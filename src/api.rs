//! High-level entry points taking N×2 point matrices.
//!
//! Each function runs adaptive RANSAC with the model fixed by the function and
//! everything else taken from the optional [`EstimationSettings`].

use nalgebra::DMatrix;

use crate::core::RobustEstimator;
use crate::error::Result;
use crate::models::{FundamentalMatrix, Homography, ModelView, TranslationScale};
use crate::ransac::RansacEstimator;
use crate::settings::EstimationSettings;
use crate::types::{Correspondences, Parameters};

/// Result of a RANSAC estimation.
#[derive(Debug, Clone)]
pub struct EstimationResult<M> {
    /// The estimated model.
    pub model: M,
    /// Flat parameters of `model`.
    pub parameters: Parameters,
    /// Indices of inlier correspondences.
    pub inliers: Vec<usize>,
    /// One residual per correspondence, in input coordinates.
    pub residuals: Vec<f64>,
    /// Number of RANSAC trials performed.
    pub trials: usize,
    /// Outlier fraction of the result.
    pub contamination: f64,
}

/// Estimate a homography mapping `points1` onto `points2`.
///
/// # Arguments
/// * `points1` - First set of 2D points (Nx2 matrix)
/// * `points2` - Second set of 2D points (Nx2 matrix)
/// * `max_error` - Inlier threshold, in normalized coordinates unless
///   normalization is disabled in `settings`
/// * `settings` - Optional settings (defaults if `None`)
pub fn estimate_homography(
    points1: &DMatrix<f64>,
    points2: &DMatrix<f64>,
    max_error: f64,
    settings: Option<EstimationSettings>,
) -> Result<EstimationResult<Homography>> {
    estimate(points1, points2, max_error, settings)
}

/// Estimate `[s, tx, ty]` with `points2 ≈ s * points1 + t`.
///
/// Arguments as for [`estimate_homography`].
pub fn estimate_translation_scale(
    points1: &DMatrix<f64>,
    points2: &DMatrix<f64>,
    max_error: f64,
    settings: Option<EstimationSettings>,
) -> Result<EstimationResult<TranslationScale>> {
    estimate(points1, points2, max_error, settings)
}

/// Estimate the fundamental matrix with `p2ᵀ F p1 = 0`.
///
/// Arguments as for [`estimate_homography`]; at least eight correspondences
/// are required.
pub fn estimate_fundamental_matrix(
    points1: &DMatrix<f64>,
    points2: &DMatrix<f64>,
    max_error: f64,
    settings: Option<EstimationSettings>,
) -> Result<EstimationResult<FundamentalMatrix>> {
    estimate(points1, points2, max_error, settings)
}

fn estimate<M: ModelView>(
    points1: &DMatrix<f64>,
    points2: &DMatrix<f64>,
    max_error: f64,
    settings: Option<EstimationSettings>,
) -> Result<EstimationResult<M>> {
    let data = Correspondences::from_matrices(points1, points2)?;

    let mut settings = settings.unwrap_or_default();
    settings.model = M::KIND;
    settings.ransac.max_error = max_error;

    let estimate = RansacEstimator::from_settings(&settings)?.apply(&data)?;
    Ok(EstimationResult {
        model: M::from_parameters(&estimate.parameters)?,
        parameters: estimate.parameters,
        inliers: estimate.inliers,
        residuals: estimate.residuals,
        trials: estimate.trials,
        contamination: estimate.contamination,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EstimationError;
    use crate::settings::NormalizationType;
    use approx::assert_abs_diff_eq;

    fn rows(points: &[[f64; 2]]) -> DMatrix<f64> {
        DMatrix::from_fn(points.len(), 2, |i, j| points[i][j])
    }

    #[test]
    fn translation_scale_from_matrices() {
        let first = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0], [2.0, 3.0]];
        let second: Vec<[f64; 2]> = first.iter().map(|p| [2.0 * p[0] + 3.0, 2.0 * p[1] - 2.0]).collect();

        let mut settings = EstimationSettings::default();
        settings.normalization.kind = NormalizationType::None;
        settings.ransac.seed = Some(1);

        let result = estimate_translation_scale(&rows(&first), &rows(&second), 1e-6, Some(settings)).unwrap();
        assert_abs_diff_eq!(result.model.scale, 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.model.translation.x, 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(result.model.translation.y, -2.0, epsilon = 1e-9);
        assert_eq!(result.inliers.len(), 5);
        assert!(result.residuals.iter().all(|r| *r < 1e-9));
    }

    #[test]
    fn homography_with_default_settings() {
        let first = [[10.0, 10.0], [200.0, 15.0], [190.0, 220.0], [5.0, 180.0], [100.0, 100.0], [60.0, 140.0]];
        let second: Vec<[f64; 2]> = first.iter().map(|p| [p[0] + 7.0, p[1] - 4.0]).collect();
        let result = estimate_homography(&rows(&first), &rows(&second), 0.01, None).unwrap();
        let q = result.model.transform_point(&nalgebra::Point2::new(50.0, 50.0)).unwrap();
        assert_abs_diff_eq!(q.x, 57.0, epsilon = 1e-6);
        assert_abs_diff_eq!(q.y, 46.0, epsilon = 1e-6);
        assert_eq!(result.parameters.len(), 8);
    }

    #[test]
    fn malformed_matrices_are_rejected() {
        let a = DMatrix::<f64>::zeros(10, 3);
        let b = DMatrix::<f64>::zeros(10, 2);
        let err = estimate_fundamental_matrix(&a, &b, 0.1, None).unwrap_err();
        assert!(matches!(err, EstimationError::Config(_)));

        let a = DMatrix::<f64>::zeros(10, 2);
        let b = DMatrix::<f64>::zeros(9, 2);
        let err = estimate_fundamental_matrix(&a, &b, 0.1, None).unwrap_err();
        assert!(matches!(err, EstimationError::MismatchedSets { first: 10, second: 9 }));
    }

    #[test]
    fn invalid_threshold_is_a_config_error() {
        let a = DMatrix::<f64>::zeros(10, 2);
        let err = estimate_homography(&a, &a, -1.0, None).unwrap_err();
        assert!(matches!(err, EstimationError::Config(_)));
    }
}
