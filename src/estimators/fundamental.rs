//! Fundamental matrix from eight or more correspondences.
//!
//! Parameters are the nine entries of `F` in row-major order, scaled to unit
//! Frobenius norm, with `p2ᵀ F p1 = 0` for every true correspondence.
//!
//! The linear system is never materialized: [`normal_equations`] accumulates
//! `AᵀA` directly from 36 sums of monomial products. Its null vector is `Fᵀ`,
//! which [`rank2::enforce_rank2`] turns into a singular `F`.
//!
//! A fit first conditions the selected points of each view (centroid to the
//! origin, mean distance √2), so the degeneracy test on `AᵀA` does not depend
//! on the coordinate range of the input.

use nalgebra::{Matrix3, Point2, SMatrix};

use crate::core::{check_parameters, Selection, TransformModel};
use crate::error::{EstimationError, Result};
use crate::estimators::rank2::{self, conditioning_score, PermutationScore};
use crate::normalization::{IsotropicNormalizer, Normalization};
use crate::settings::{DistanceMeasure, FundamentalSettings};
use crate::types::{Correspondences, Parameters};

const NAME: &str = "fundamental-matrix";
const PARAMETERS: usize = 9;
const MIN_CORRESPONDENCES: usize = 8;

/// Monomial index of entry `(i, j)` of `p pᵀ` in `[x², xy, x, y², y, 1]`.
const SYM6: [[usize; 3]; 3] = [[0, 1, 2], [1, 3, 4], [2, 4, 5]];

/// Relative size of the second-smallest singular value of the conditioned
/// `AᵀA` below which the null space is taken to be more than one-dimensional.
const NULL_SPACE_EPSILON: f64 = 1e-12;

pub type NormalMatrix = SMatrix<f64, 9, 9>;

#[derive(Debug, Clone, Copy)]
pub struct FundamentalMatrixModel {
    settings: FundamentalSettings,
    permutation_score: PermutationScore,
}

impl Default for FundamentalMatrixModel {
    fn default() -> Self {
        Self::with_settings(FundamentalSettings::default())
    }
}

impl FundamentalMatrixModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: FundamentalSettings) -> Self {
        Self {
            settings,
            permutation_score: conditioning_score,
        }
    }

    /// Replace the ranking of pivot placements used by the T-parameterization.
    pub fn with_permutation_score(mut self, score: PermutationScore) -> Self {
        self.permutation_score = score;
        self
    }

    pub fn settings(&self) -> &FundamentalSettings {
        &self.settings
    }
}

#[inline]
fn monomials(p: &Point2<f64>) -> [f64; 6] {
    [p.x * p.x, p.x * p.y, p.x, p.y * p.y, p.y, 1.0]
}

/// `AᵀA` for design rows `p1 ⊗ p2` over the selected correspondences.
///
/// Block `(I, K)` holds `Σ (p1 p1ᵀ)[I][K] · p2 p2ᵀ`. Only the six distinct
/// symmetric blocks are computed; the rest is mirrored.
pub fn normal_equations(data: &Correspondences, selection: Selection<'_>) -> NormalMatrix {
    let identity = Normalization::identity();
    conditioned_normal_equations(data, selection, &identity, &identity)
}

/// [`normal_equations`] of the correspondences mapped through `first` and
/// `second`, without materializing the mapped points.
fn conditioned_normal_equations(
    data: &Correspondences,
    selection: Selection<'_>,
    first: &Normalization,
    second: &Normalization,
) -> NormalMatrix {
    let mut sums = [[0.0f64; 6]; 6];
    for idx in selection.indices() {
        let (p1, p2) = data.pair(idx);
        let m1 = monomials(&first.normalize_point(p1));
        let m2 = monomials(&second.normalize_point(p2));
        for (row, a) in sums.iter_mut().zip(m1) {
            for (cell, b) in row.iter_mut().zip(m2) {
                *cell += a * b;
            }
        }
    }

    let mut ata = NormalMatrix::zeros();
    for bi in 0..3 {
        for bk in bi..3 {
            let block = &sums[SYM6[bi][bk]];
            for j in 0..3 {
                for l in j..3 {
                    let value = block[SYM6[j][l]];
                    ata[(3 * bi + j, 3 * bk + l)] = value;
                    ata[(3 * bi + l, 3 * bk + j)] = value;
                }
            }
        }
    }
    for r in 0..9 {
        for c in 0..9 {
            if r / 3 > c / 3 {
                ata[(r, c)] = ata[(c, r)];
            }
        }
    }
    ata
}

/// Null vector of `ata`, reshaped row-major. Rejects selections whose null
/// space is more than one-dimensional.
fn transposed_candidate(ata: &NormalMatrix) -> Result<Matrix3<f64>> {
    let svd = ata.svd(false, true);
    let v_t = svd.v_t.ok_or_else(|| {
        EstimationError::NumericalSingularity("normal-equation SVD did not converge".to_string())
    })?;
    let sigma = &svd.singular_values;
    let smallest = sigma.imin();
    let second = sigma
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != smallest)
        .map(|(_, s)| *s)
        .fold(f64::INFINITY, f64::min);

    if second <= NULL_SPACE_EPSILON * sigma.max() {
        return Err(EstimationError::DegenerateSample(
            "correspondences do not determine a unique fundamental matrix".to_string(),
        ));
    }

    let null = v_t.row(smallest);
    Ok(Matrix3::from_fn(|i, j| null[3 * i + j]))
}

/// `T2ᵀ F T1`: a matrix estimated on normalized points, in raw coordinates.
fn denormalized(f: &Matrix3<f64>, first: &Normalization, second: &Normalization) -> Matrix3<f64> {
    second.matrix().transpose() * f * first.matrix()
}

fn unit_parameters(f: &Matrix3<f64>) -> Result<Parameters> {
    let norm = f.norm();
    if !(norm > f64::EPSILON) || !norm.is_finite() {
        return Err(EstimationError::NumericalSingularity(
            "fundamental matrix vanished".to_string(),
        ));
    }
    Ok((0..PARAMETERS).map(|k| f[(k / 3, k % 3)] / norm).collect())
}

impl TransformModel for FundamentalMatrixModel {
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
        let conditioner = IsotropicNormalizer::default();
        let first = conditioner.record_iter(selection.indices().map(|i| &data.first()[i]))?;
        let second = conditioner.record_iter(selection.indices().map(|i| &data.second()[i]))?;

        let ata = conditioned_normal_equations(data, selection, &first, &second);
        let transposed = transposed_candidate(&ata)?;
        let f = rank2::enforce_rank2(
            &transposed,
            self.settings.rank2_enforcement,
            self.settings.epipole_method,
            self.permutation_score,
        )?;
        unit_parameters(&denormalized(&f, &first, &second))
    }

    fn residual_into(&self, data: &Correspondences, params: &[f64], out: &mut Vec<f64>) -> Result<()> {
        check_parameters(NAME, PARAMETERS, params)?;
        let f = Matrix3::from_row_slice(params);
        let ft = f.transpose();
        out.clear();
        out.reserve(data.len());

        for (p1, p2) in data.first().iter().zip(data.second()) {
            let x1 = p1.to_homogeneous();
            let x2 = p2.to_homogeneous();
            let fx1 = f * x1;
            let e = x2.dot(&fx1);
            let sq = match self.settings.distance_measure {
                DistanceMeasure::Epipolar => e * e,
                DistanceMeasure::Sampson => {
                    let ftx2 = ft * x2;
                    let denom = fx1.x * fx1.x + fx1.y * fx1.y + ftx2.x * ftx2.x + ftx2.y * ftx2.y;
                    if denom > 0.0 {
                        e * e / denom
                    } else if e == 0.0 {
                        0.0
                    } else {
                        f64::INFINITY
                    }
                }
            };
            out.push(if self.settings.compute_sq_error { sq } else { sq.sqrt() });
        }
        Ok(())
    }

    /// `F = T2ᵀ Fₙ T1`, rescaled to unit norm.
    fn denormalize(&self, params: &mut Parameters, first: &Normalization, second: &Normalization) -> Result<()> {
        check_parameters(NAME, PARAMETERS, params)?;
        let f = denormalized(&Matrix3::from_row_slice(params), first, second);
        *params = unit_parameters(&f)?;
        Ok(())
    }

    fn to_matrix(&self, params: &[f64]) -> Result<Matrix3<f64>> {
        check_parameters(NAME, PARAMETERS, params)?;
        Ok(Matrix3::from_row_slice(params))
    }

    /// A fundamental matrix maps points to lines, not points.
    fn evaluate(&self, _point: &Point2<f64>, _params: &[f64]) -> Option<Point2<f64>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::test_scenes::{calibrated_views, camera_views, pixel_views, scale_invariant_distance};
    use crate::normalization::{normalize_correspondences, IsotropicNormalizer};
    use crate::settings::{EpipoleMethod, Rank2Enforcement};
    use approx::assert_abs_diff_eq;
    use nalgebra::{SVector, Vector2};

    fn perturbed(data: &Correspondences, amplitude: f64) -> Correspondences {
        let second = data
            .second()
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let phase = i as f64 * 1.7;
                p + Vector2::new(phase.sin(), phase.cos()) * amplitude
            })
            .collect();
        Correspondences::new(data.first().to_vec(), second).unwrap()
    }

    fn with_policy(rank2_enforcement: Rank2Enforcement) -> FundamentalMatrixModel {
        FundamentalMatrixModel::with_settings(FundamentalSettings {
            rank2_enforcement,
            ..FundamentalSettings::default()
        })
    }

    #[test]
    fn eight_points_recover_the_true_matrix() {
        let (data, f_true) = calibrated_views(8);
        let model = FundamentalMatrixModel::new();
        let (params, residuals) = model.estimate_with_residual(&data).unwrap();

        assert_eq!(params.len(), 9);
        let f = model.to_matrix(&params).unwrap();
        assert_abs_diff_eq!(f.norm(), 1.0, epsilon = 1e-12);
        assert!(scale_invariant_distance(&f, &f_true) < 1e-6);
        assert!(residuals.iter().all(|r| *r < 1e-8));
    }

    #[test]
    fn overdetermined_fit_satisfies_every_constraint() {
        let (data, f_true) = calibrated_views(30);
        for policy in [Rank2Enforcement::Frobenius, Rank2Enforcement::TParameterization] {
            let model = with_policy(policy);
            let params = model.estimate(&data).unwrap();
            let f = model.to_matrix(&params).unwrap();
            assert!(scale_invariant_distance(&f, &f_true) < 1e-6, "{policy:?}");
        }
    }

    #[test]
    fn noisy_fits_are_singular_under_both_policies() {
        let (clean, _) = calibrated_views(25);
        let data = perturbed(&clean, 1e-3);
        for method in [EpipoleMethod::ThreeDof, EpipoleMethod::TwoDof] {
            for policy in [Rank2Enforcement::Frobenius, Rank2Enforcement::TParameterization] {
                let model = FundamentalMatrixModel::with_settings(FundamentalSettings {
                    rank2_enforcement: policy,
                    epipole_method: method,
                    ..FundamentalSettings::default()
                });
                let f = model.to_matrix(&model.estimate(&data).unwrap()).unwrap();
                assert!(f.determinant().abs() < 1e-10, "{policy:?} / {method:?}");
                assert!(f.singular_values().min() < 1e-10);
            }
        }
    }

    #[test]
    fn policies_agree_on_noise_free_data() {
        let (data, _) = calibrated_views(16);
        let a = with_policy(Rank2Enforcement::Frobenius);
        let b = with_policy(Rank2Enforcement::TParameterization);
        let fa = a.to_matrix(&a.estimate(&data).unwrap()).unwrap();
        let fb = b.to_matrix(&b.estimate(&data).unwrap()).unwrap();
        assert!(scale_invariant_distance(&fa, &fb) < 1e-6);
    }

    #[test]
    fn normal_equations_match_the_explicit_product() {
        let (data, _) = calibrated_views(12);
        let mut expected = NormalMatrix::zeros();
        for i in 0..data.len() {
            let (p1, p2) = data.pair(i);
            let (x1, x2) = (p1.to_homogeneous(), p2.to_homogeneous());
            let row = SVector::<f64, 9>::from_fn(|k, _| x1[k / 3] * x2[k % 3]);
            expected += row * row.transpose();
        }
        let ata = normal_equations(&data, Selection::All(data.len()));
        assert_abs_diff_eq!(ata, expected, epsilon = 1e-12);
    }

    #[test]
    fn subset_fit_uses_only_the_selected_rows() {
        let (clean, f_true) = calibrated_views(12);
        let mut second = clean.second().to_vec();
        second[10] += Vector2::new(0.3, -0.2);
        second[11] += Vector2::new(-0.5, 0.1);
        let data = Correspondences::new(clean.first().to_vec(), second).unwrap();

        let indices: Vec<usize> = (0..10).collect();
        let model = FundamentalMatrixModel::new();
        let (params, residuals) = model.estimate_subset_with_residual(&data, &indices, 10).unwrap();
        let f = model.to_matrix(&params).unwrap();
        assert!(scale_invariant_distance(&f, &f_true) < 1e-6);
        assert!(residuals[..10].iter().all(|r| *r < 1e-8));
        assert!(residuals[10] > 1e-3 && residuals[11] > 1e-3);
    }

    #[test]
    fn sampson_and_squared_residuals() {
        let (clean, _) = calibrated_views(10);
        let params = FundamentalMatrixModel::new().estimate(&clean).unwrap();
        let data = perturbed(&clean, 1e-2);

        let epipolar = FundamentalMatrixModel::new().residual(&data, &params).unwrap();
        let sampson = FundamentalMatrixModel::with_settings(FundamentalSettings {
            distance_measure: DistanceMeasure::Sampson,
            ..FundamentalSettings::default()
        });
        let sampson_sq = FundamentalMatrixModel::with_settings(FundamentalSettings {
            distance_measure: DistanceMeasure::Sampson,
            compute_sq_error: true,
            ..FundamentalSettings::default()
        });
        let d = sampson.residual(&data, &params).unwrap();
        let d_sq = sampson_sq.residual(&data, &params).unwrap();

        let f = Matrix3::from_row_slice(&params);
        for i in 0..data.len() {
            let (p1, p2) = data.pair(i);
            let (x1, x2) = (p1.to_homogeneous(), p2.to_homogeneous());
            let e = x2.dot(&(f * x1));
            let fx1 = f * x1;
            let ftx2 = f.transpose() * x2;
            let denom = fx1.x.powi(2) + fx1.y.powi(2) + ftx2.x.powi(2) + ftx2.y.powi(2);

            assert_abs_diff_eq!(epipolar[i], e.abs(), epsilon = 1e-14);
            assert_abs_diff_eq!(d[i], e.abs() / denom.sqrt(), epsilon = 1e-12);
            assert_abs_diff_eq!(d_sq[i], d[i] * d[i], epsilon = 1e-12);
            assert!(d[i] > 0.0);
        }
    }

    #[test]
    fn denormalized_fit_holds_in_pixels() {
        let (data, f_true) = pixel_views(20);
        let model = FundamentalMatrixModel::new();
        let (normalized, n1, n2) =
            normalize_correspondences(&IsotropicNormalizer::default(), &data).unwrap();

        let mut params = model.estimate(&normalized).unwrap();
        model.denormalize(&mut params, &n1, &n2).unwrap();

        let f = model.to_matrix(&params).unwrap();
        assert_abs_diff_eq!(f.norm(), 1.0, epsilon = 1e-12);
        assert!(scale_invariant_distance(&f, &f_true) < 1e-6);

        let sampson = FundamentalMatrixModel::with_settings(FundamentalSettings {
            distance_measure: DistanceMeasure::Sampson,
            ..FundamentalSettings::default()
        });
        let residuals = sampson.residual(&data, &params).unwrap();
        assert!(residuals.iter().all(|r| *r < 1e-6));
    }

    #[test]
    fn raw_full_hd_pixels_fit_exactly() {
        let k = Matrix3::new(1500.0, 0.0, 960.0, 0.0, 1500.0, 540.0, 0.0, 0.0, 1.0);
        let (data, f_true) = camera_views(k, 8);
        let indices: Vec<usize> = (0..8).collect();
        let sampson = FundamentalMatrixModel::with_settings(FundamentalSettings {
            distance_measure: DistanceMeasure::Sampson,
            ..FundamentalSettings::default()
        });

        for policy in [Rank2Enforcement::Frobenius, Rank2Enforcement::TParameterization] {
            let model = with_policy(policy);
            let params = model.estimate_subset(&data, &indices, 8).unwrap();
            let f = model.to_matrix(&params).unwrap();
            assert_abs_diff_eq!(f.norm(), 1.0, epsilon = 1e-12);
            assert!(scale_invariant_distance(&f, &f_true) < 1e-6, "{policy:?}");

            let residuals = sampson.residual(&data, &params).unwrap();
            assert!(residuals.iter().all(|r| *r < 1e-6), "{policy:?}: {residuals:?}");
        }
    }

    #[test]
    fn raw_vga_pixels_fit_exactly() {
        let (data, f_true) = pixel_views(8);
        let model = FundamentalMatrixModel::new();
        let f = model.to_matrix(&model.estimate(&data).unwrap()).unwrap();
        assert!(scale_invariant_distance(&f, &f_true) < 1e-6);
    }

    #[test]
    fn translated_copies_are_degenerate() {
        let (data, _) = calibrated_views(10);
        let second = data.first().iter().map(|p| p + Vector2::new(0.1, 0.2)).collect();
        let data = Correspondences::new(data.first().to_vec(), second).unwrap();
        let err = FundamentalMatrixModel::new().estimate(&data).unwrap_err();
        assert!(matches!(err, EstimationError::DegenerateSample(_)));
    }

    #[test]
    fn seven_points_are_too_few() {
        let (data, _) = calibrated_views(7);
        let err = FundamentalMatrixModel::new().estimate(&data).unwrap_err();
        assert!(matches!(err, EstimationError::InputSize { required: 8, actual: 7, .. }));
    }

    #[test]
    fn does_not_map_points() {
        let model = FundamentalMatrixModel::new();
        let params = [0.0; 9];
        assert!(model.evaluate(&Point2::new(1.0, 2.0), &params).is_none());
        assert!(model.to_matrix(&params[..8]).is_err());
    }
}
