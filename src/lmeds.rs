//! Least-median-of-squares estimation.
//!
//! Same sampling loop as RANSAC, but candidates are ranked by the median of
//! their residuals, so no inlier threshold is needed up front. The inlier set
//! is derived afterwards from a robust standard deviation estimate:
//!
//! ```text
//! sigma = 1.4826 * (1 + 5 / (N - k)) * median
//! inlier  <=>  residual < inlier_factor * sigma
//! ```

use log::{debug, trace};

use crate::choices::{build_model, build_normalizer};
use crate::core::{
    Consensus, Estimate, ModelHandle, MonteCarloEstimator, RobustEstimator, Sampler, Scoring,
    TransformModel,
};
use crate::error::{EstimationError, Result};
use crate::normalization::PointSetNormalizer;
use crate::samplers::UniformRandomSampler;
use crate::scoring::{InlierCountScoring, MedianScore, MedianScoring};
use crate::settings::{EstimationSettings, LmedsSettings};
use crate::types::{Correspondences, Parameters};

/// Consistency factor of the median absolute residual under Gaussian noise.
const GAUSSIAN_CONSISTENCY: f64 = 1.4826;

/// Lower bound of the inlier threshold, so noise-free data keeps its inliers.
const MIN_THRESHOLD: f64 = 1e-8;

pub struct LmedsEstimator<'m> {
    base: MonteCarloEstimator<'m>,
    settings: LmedsSettings,
}

impl LmedsEstimator<'static> {
    pub fn new(model: impl TransformModel + 'static, settings: LmedsSettings) -> Self {
        Self::from_handle(ModelHandle::Owned(Box::new(model)), settings)
    }

    pub fn from_settings(settings: &EstimationSettings) -> Result<Self> {
        settings.validate()?;
        let mut estimator = Self::new(build_model(settings), settings.lmeds);
        estimator
            .base
            .set_normalizer(build_normalizer(&settings.normalization));
        Ok(estimator)
    }
}

impl<'m> LmedsEstimator<'m> {
    pub fn with_borrowed_model(model: &'m dyn TransformModel, settings: LmedsSettings) -> Self {
        Self::from_handle(ModelHandle::Borrowed(model), settings)
    }

    fn from_handle(model: ModelHandle<'m>, settings: LmedsSettings) -> Self {
        Self {
            base: MonteCarloEstimator::new(model),
            settings,
        }
    }

    pub fn with_normalizer(mut self, normalizer: Box<dyn PointSetNormalizer>) -> Self {
        self.base.set_normalizer(Some(normalizer));
        self
    }

    pub fn model(&self) -> &dyn TransformModel {
        self.base.model()
    }

    pub fn settings(&self) -> &LmedsSettings {
        &self.settings
    }

    fn search(&self, model: &dyn TransformModel, data: &Correspondences) -> Result<Consensus> {
        let n = data.len();
        let k = model.min_number_correspondences();
        let scoring = MedianScoring::new(f64::INFINITY);
        let mut sampler = self
            .settings
            .seed
            .map_or_else(UniformRandomSampler::new, UniformRandomSampler::from_seed);

        let mut indices: Vec<usize> = (0..n).collect();
        let mut residuals = Vec::with_capacity(n);
        let mut scratch = Vec::with_capacity(n);
        let mut best: Option<(MedianScore, Parameters)> = None;
        let mut trials = 0;

        while trials < self.settings.max_iterations {
            trials += 1;
            if !sampler.sample(&mut indices, k) {
                break;
            }

            let params = match model.estimate_subset(data, &indices, k) {
                Ok(params) => params,
                Err(err) if err.is_recoverable() => {
                    trace!("trial {trials}: {err}");
                    continue;
                }
                Err(err) => return Err(err),
            };

            model.residual_into(data, &params, &mut residuals)?;
            let score = scoring.score(&residuals, &mut scratch);
            if best.as_ref().map_or(false, |(b, _)| score <= *b) {
                continue;
            }

            trace!("trial {trials}: new best median {:.6}", score.median);
            let done = score.median <= self.settings.median_threshold;
            best = Some((score, params));
            if done {
                debug!("{}: median below threshold after {trials} trials", model.name());
                break;
            }
        }

        let (score, parameters) = best.ok_or(EstimationError::ConvergenceExhaustion { trials })?;

        let squared = model.computes_squared_error();
        let sigma = robust_sigma(score.median, n, k, squared);
        let mut threshold = (self.settings.inlier_factor * sigma).max(MIN_THRESHOLD);
        if squared {
            threshold *= threshold;
        }

        let inlier_scoring = InlierCountScoring::new(threshold);
        let mut inliers = Vec::with_capacity(n);
        model.residual_into(data, &parameters, &mut residuals)?;
        inlier_scoring.score(&residuals, &mut inliers);

        debug!(
            "{}: best median {:.6}, sigma {sigma:.6}, {} inliers",
            model.name(),
            score.median,
            inliers.len()
        );

        Ok(Consensus {
            parameters,
            inliers,
            threshold: inlier_scoring.threshold(),
            trials,
            bound_history: Vec::new(),
        })
    }
}

impl RobustEstimator for LmedsEstimator<'_> {
    fn apply(&self, data: &Correspondences) -> Result<Estimate> {
        self.settings.validate()?;
        self.base
            .run(data, |model, working| self.search(model, working))
    }
}

impl std::fmt::Debug for LmedsEstimator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmedsEstimator")
            .field("base", &self.base)
            .field("settings", &self.settings)
            .finish()
    }
}

/// Robust standard deviation from the best median residual, with the
/// small-sample correction `1 + 5 / (N - k)`.
///
/// `median` is a squared distance when `squared` is set.
pub fn robust_sigma(median: f64, n: usize, k: usize, squared: bool) -> f64 {
    let median = if squared { median.max(0.0).sqrt() } else { median };
    let dof = n.saturating_sub(k).max(1) as f64;
    GAUSSIAN_CONSISTENCY * (1.0 + 5.0 / dof) * median
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::TranslationScaleModel;
    use crate::settings::TransformSettings;
    use approx::assert_abs_diff_eq;
    use nalgebra::{Point2, Vector2};
    use rand::prelude::*;

    fn scene(inliers: usize, outliers: usize, noise: f64, seed: u64) -> Correspondences {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut first = Vec::new();
        let mut second = Vec::new();
        for i in 0..inliers + outliers {
            let p = Point2::new(rng.gen_range(-20.0..20.0), rng.gen_range(-20.0..20.0));
            let mut q = Point2::new(0.5 * p.x - 1.0, 0.5 * p.y + 6.0);
            if i < inliers {
                q += Vector2::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)) * noise;
            } else {
                q += Vector2::new(rng.gen_range(15.0..30.0), rng.gen_range(-30.0..-15.0));
            }
            first.push(p);
            second.push(q);
        }
        Correspondences::new(first, second).unwrap()
    }

    fn settings(seed: u64) -> LmedsSettings {
        LmedsSettings {
            max_iterations: 100,
            seed: Some(seed),
            ..LmedsSettings::default()
        }
    }

    #[test]
    fn sigma_follows_the_corrected_median() {
        assert_abs_diff_eq!(robust_sigma(2.0, 10, 2, false), 1.4826 * 1.625 * 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(robust_sigma(4.0, 10, 2, true), robust_sigma(2.0, 10, 2, false), epsilon = 1e-12);
        assert!(robust_sigma(1.0, 2, 2, false).is_finite());
    }

    #[test]
    fn recovers_the_model_with_a_third_of_outliers() {
        let data = scene(40, 20, 0.05, 21);
        let estimate = LmedsEstimator::new(TranslationScaleModel::new(), settings(21))
            .apply(&data)
            .unwrap();

        assert!(estimate.inliers.len() >= 36);
        assert!(estimate.inliers.iter().all(|&i| i < 40));
        assert_abs_diff_eq!(estimate.parameters[0], 0.5, epsilon = 1e-2);
        assert_abs_diff_eq!(estimate.parameters[1], -1.0, epsilon = 0.1);
        assert_abs_diff_eq!(estimate.parameters[2], 6.0, epsilon = 0.1);
        assert!(estimate.bound_history.is_empty());
    }

    #[test]
    fn consensus_threshold_is_derived_from_the_median() {
        let data = scene(40, 20, 0.05, 21);
        let lmeds = LmedsEstimator::new(TranslationScaleModel::new(), settings(21));
        let consensus = lmeds.search(lmeds.model(), &data).unwrap();
        assert!(consensus.threshold.is_finite());
        assert!(consensus.threshold >= MIN_THRESHOLD);

        let residuals = lmeds.model().residual(&data, &consensus.parameters).unwrap();
        for (i, r) in residuals.iter().enumerate() {
            assert_eq!(consensus.inliers.contains(&i), *r < consensus.threshold);
        }
    }

    #[test]
    fn squared_residuals_give_the_same_inliers() {
        let data = scene(40, 20, 0.05, 8);
        let plain = LmedsEstimator::new(TranslationScaleModel::new(), settings(8))
            .apply(&data)
            .unwrap();
        let squared = LmedsEstimator::new(
            TranslationScaleModel::with_settings(TransformSettings {
                compute_sq_error: true,
            }),
            settings(8),
        )
        .apply(&data)
        .unwrap();
        assert_eq!(plain.inliers, squared.inliers);
    }

    #[test]
    fn median_threshold_stops_early_on_clean_data() {
        let data = scene(15, 0, 0.0, 2);
        let estimate = LmedsEstimator::new(TranslationScaleModel::new(), LmedsSettings {
            median_threshold: 1e-9,
            ..settings(2)
        })
        .apply(&data)
        .unwrap();
        assert_eq!(estimate.trials, 1);
        assert_eq!(estimate.inliers.len(), 15);
    }

    #[test]
    fn degenerate_data_exhausts_the_budget() {
        let first = vec![Point2::new(1.0, 1.0); 6];
        let second = (0..6).map(|i| Point2::new(i as f64, 1.0)).collect();
        let data = Correspondences::new(first, second).unwrap();
        let err = LmedsEstimator::new(TranslationScaleModel::new(), settings(0))
            .apply(&data)
            .unwrap_err();
        assert_eq!(err, EstimationError::ConvergenceExhaustion { trials: 100 });
    }
}
