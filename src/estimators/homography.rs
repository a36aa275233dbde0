//! Projective homography with eight degrees of freedom.
//!
//! Parameters are `[h0, .., h7]` with `h8 = 1` fixed:
//!
//! ```text
//! x' = (h0 x + h1 y + h2) / (h6 x + h7 y + 1)
//! y' = (h3 x + h4 y + h5) / (h6 x + h7 y + 1)
//! ```

use nalgebra::{DMatrix, DVector, Matrix3, Point2};

use crate::core::{check_parameters, Selection, TransformModel};
use crate::error::{EstimationError, Result};
use crate::normalization::Normalization;
use crate::settings::TransformSettings;
use crate::types::{Correspondences, Parameters};
use crate::utils::gauss_elimination;

const NAME: &str = "homography";
const PARAMETERS: usize = 8;
const MIN_CORRESPONDENCES: usize = 4;

/// Relative singular value cut-off of the over-determined solve.
const RANK_EPSILON: f64 = 1e-12;

/// Eight-parameter homography fitted by direct linear transform.
#[derive(Debug, Clone, Copy, Default)]
pub struct HomographyModel {
    settings: TransformSettings,
}

impl HomographyModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: TransformSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &TransformSettings {
        &self.settings
    }

    /// Exactly four correspondences: 8×9 augmented system, Gaussian elimination.
    fn fit_minimal(&self, data: &Correspondences, selection: Selection<'_>) -> Result<Parameters> {
        let mut augmented = DMatrix::<f64>::zeros(8, 9);

        for (i, idx) in selection.indices().enumerate() {
            let (p1, p2) = data.pair(idx);
            let (x1, y1, x2, y2) = (p1.x, p1.y, p2.x, p2.y);

            let r = 2 * i;
            augmented[(r, 0)] = -x1;
            augmented[(r, 1)] = -y1;
            augmented[(r, 2)] = -1.0;
            augmented[(r, 6)] = x2 * x1;
            augmented[(r, 7)] = x2 * y1;
            augmented[(r, 8)] = -x2;

            augmented[(r + 1, 3)] = -x1;
            augmented[(r + 1, 4)] = -y1;
            augmented[(r + 1, 5)] = -1.0;
            augmented[(r + 1, 6)] = y2 * x1;
            augmented[(r + 1, 7)] = y2 * y1;
            augmented[(r + 1, 8)] = -y2;
        }

        let mut h = DVector::<f64>::zeros(PARAMETERS);
        if !gauss_elimination(&mut augmented, &mut h) {
            return Err(EstimationError::DegenerateSample(
                "four-point homography system is singular".to_string(),
            ));
        }
        finite_parameters(h.as_slice())
    }

    /// More than four correspondences: 2N×8 least squares through the SVD.
    fn fit_overdetermined(&self, data: &Correspondences, selection: Selection<'_>) -> Result<Parameters> {
        let n = selection.len();
        let mut coefficients = DMatrix::<f64>::zeros(2 * n, PARAMETERS);
        let mut inhomogeneous = DVector::<f64>::zeros(2 * n);

        for (i, idx) in selection.indices().enumerate() {
            let (p1, p2) = data.pair(idx);
            let (x1, y1, x2, y2) = (p1.x, p1.y, p2.x, p2.y);

            let r = 2 * i;
            coefficients[(r, 0)] = -x1;
            coefficients[(r, 1)] = -y1;
            coefficients[(r, 2)] = -1.0;
            coefficients[(r, 6)] = x2 * x1;
            coefficients[(r, 7)] = x2 * y1;
            inhomogeneous[r] = -x2;

            coefficients[(r + 1, 3)] = -x1;
            coefficients[(r + 1, 4)] = -y1;
            coefficients[(r + 1, 5)] = -1.0;
            coefficients[(r + 1, 6)] = y2 * x1;
            coefficients[(r + 1, 7)] = y2 * y1;
            inhomogeneous[r + 1] = -y2;
        }

        let svd = coefficients.svd(true, true);
        let max_sv = svd.singular_values.max();
        if svd.singular_values.min() <= RANK_EPSILON * max_sv {
            return Err(EstimationError::DegenerateSample(
                "homography design matrix is rank deficient".to_string(),
            ));
        }
        let h = svd
            .solve(&inhomogeneous, RANK_EPSILON * max_sv)
            .map_err(|e| EstimationError::NumericalSingularity(e.to_string()))?;
        finite_parameters(h.as_slice())
    }
}

fn finite_parameters(h: &[f64]) -> Result<Parameters> {
    if h.iter().any(|v| !v.is_finite()) {
        return Err(EstimationError::NumericalSingularity(
            "homography solve produced non-finite values".to_string(),
        ));
    }
    Ok(h.to_vec())
}

/// 3×3 matrix of an 8-parameter homography.
pub(crate) fn homography_matrix(h: &[f64]) -> Matrix3<f64> {
    Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0)
}

impl TransformModel for HomographyModel {
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

    fn fit(&self, data: &Correspondences, selection: Selection<'_>) -> Result<Parameters> {
        if selection.len() == MIN_CORRESPONDENCES {
            self.fit_minimal(data, selection)
        } else {
            self.fit_overdetermined(data, selection)
        }
    }

    fn residual_into(&self, data: &Correspondences, params: &[f64], out: &mut Vec<f64>) -> Result<()> {
        check_parameters(NAME, PARAMETERS, params)?;
        out.clear();
        out.reserve(data.len());
        for (p1, p2) in data.first().iter().zip(data.second()) {
            let sq = match self.evaluate(p1, params) {
                Some(mapped) => (mapped - p2).norm_squared(),
                None => f64::INFINITY,
            };
            out.push(if self.settings.compute_sq_error { sq } else { sq.sqrt() });
        }
        Ok(())
    }

    /// `H = T2⁻¹ Hₙ T1`, rescaled so that `h8 = 1`.
    fn denormalize(&self, params: &mut Parameters, first: &Normalization, second: &Normalization) -> Result<()> {
        check_parameters(NAME, PARAMETERS, params)?;
        let h = second.inverse_matrix() * homography_matrix(params) * first.matrix();
        let h22 = h[(2, 2)];
        if h22.abs() < f64::EPSILON {
            return Err(EstimationError::NumericalSingularity(
                "denormalized homography has a vanishing h8".to_string(),
            ));
        }
        let h = h / h22;
        params.copy_from_slice(&[
            h[(0, 0)],
            h[(0, 1)],
            h[(0, 2)],
            h[(1, 0)],
            h[(1, 1)],
            h[(1, 2)],
            h[(2, 0)],
            h[(2, 1)],
        ]);
        Ok(())
    }

    fn to_matrix(&self, params: &[f64]) -> Result<Matrix3<f64>> {
        check_parameters(NAME, PARAMETERS, params)?;
        Ok(homography_matrix(params))
    }

    #[inline]
    fn evaluate(&self, point: &Point2<f64>, params: &[f64]) -> Option<Point2<f64>> {
        if params.len() != PARAMETERS {
            return None;
        }
        let (x, y) = (point.x, point.y);
        let w = params[6] * x + params[7] * y + 1.0;
        if w.abs() < f64::EPSILON {
            return None;
        }
        Some(Point2::new(
            (params[0] * x + params[1] * y + params[2]) / w,
            (params[3] * x + params[4] * y + params[5]) / w,
        ))
    }
}
