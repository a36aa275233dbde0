//! Adaptive RANSAC over any [`TransformModel`].
//!
//! Each trial draws a sample of `k` correspondences, fits the model, and
//! counts the residuals below `max_error`. A strictly larger consensus set
//! replaces the best candidate. With `adaptive_contamination` the outlier
//! fraction estimate and the trial bound it implies shrink as better
//! candidates appear. The search stops when the budget is spent, or, with
//! `check_stop`, as soon as the best candidate is no more contaminated than
//! the configured `contamination`.
//!
//! Degenerate samples are discarded without aborting the run; they still use
//! up a trial.

use log::{debug, trace, warn};

use crate::choices::{build_model, build_normalizer};
use crate::core::{
    AdaptiveTermination, BoundUpdate, Consensus, Estimate, ModelHandle, MonteCarloEstimator,
    RobustEstimator, Sampler, Scoring, TransformModel,
};
use crate::error::{EstimationError, Result};
use crate::normalization::PointSetNormalizer;
use crate::samplers::UniformRandomSampler;
use crate::scoring::{InlierCountScoring, Score};
use crate::settings::{EstimationSettings, RansacSettings};
use crate::types::{Correspondences, Parameters};

pub struct RansacEstimator<'m> {
    pub(crate) base: MonteCarloEstimator<'m>,
    pub(crate) settings: RansacSettings,
}

impl RansacEstimator<'static> {
    /// Estimator owning `model`, without normalization.
    pub fn new(model: impl TransformModel + 'static, settings: RansacSettings) -> Self {
        Self::from_handle(ModelHandle::Owned(Box::new(model)), settings)
    }

    /// Model, normalizer and RANSAC settings as described by `settings`.
    pub fn from_settings(settings: &EstimationSettings) -> Result<Self> {
        settings.validate()?;
        let mut estimator = Self::new(build_model(settings), settings.ransac);
        estimator
            .base
            .set_normalizer(build_normalizer(&settings.normalization));
        Ok(estimator)
    }
}

impl<'m> RansacEstimator<'m> {
    /// Estimator running a model owned by the caller.
    pub fn with_borrowed_model(model: &'m dyn TransformModel, settings: RansacSettings) -> Self {
        Self::from_handle(ModelHandle::Borrowed(model), settings)
    }

    fn from_handle(model: ModelHandle<'m>, settings: RansacSettings) -> Self {
        Self {
            base: MonteCarloEstimator::new(model),
            settings,
        }
    }

    /// Normalize both views before sampling. `max_error` then applies in
    /// normalized coordinates.
    pub fn with_normalizer(mut self, normalizer: Box<dyn PointSetNormalizer>) -> Self {
        self.base.set_normalizer(Some(normalizer));
        self
    }

    pub fn model(&self) -> &dyn TransformModel {
        self.base.model()
    }

    pub fn settings(&self) -> &RansacSettings {
        &self.settings
    }

    fn search(&self, model: &dyn TransformModel, data: &Correspondences) -> Result<Consensus> {
        let n = data.len();
        let k = sample_size(model, &self.settings, n)?;
        let scoring = InlierCountScoring::new(self.settings.max_error);
        let mut sampler = self
            .settings
            .seed
            .map_or_else(UniformRandomSampler::new, UniformRandomSampler::from_seed);
        let mut termination = AdaptiveTermination::new(
            self.settings.confidence,
            self.settings.contamination,
            k,
            self.settings.max_iterations,
        );

        debug!(
            "{}: sampling {k} of {n} correspondences, at most {} trials",
            model.name(),
            self.settings.max_iterations
        );

        let mut indices: Vec<usize> = (0..n).collect();
        let mut residuals = Vec::with_capacity(n);
        let mut inliers = Vec::with_capacity(n);
        let mut best: Option<(Score, Parameters, Vec<usize>)> = None;
        let mut bound_history = Vec::new();
        let mut trials = 0;

        while trials < termination.budget() {
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
            let score = scoring.score(&residuals, &mut inliers);
            if best.as_ref().map_or(false, |(b, _, _)| score <= *b) {
                continue;
            }

            trace!("trial {trials}: new best with {} inliers", score.inlier_count);
            if self.settings.adaptive_contamination {
                bound_history.push(termination.update(trials, score.inlier_count, n));
            }
            let observed = outlier_fraction(score.inlier_count, n);
            best = Some((score, params, inliers.clone()));

            if self.settings.check_stop && observed <= self.settings.contamination {
                debug!(
                    "{}: stopping after {trials} trials, contamination {observed:.3}",
                    model.name()
                );
                break;
            }
        }

        let best = best.map(|(_, parameters, inliers)| Candidate { parameters, inliers });
        conclude(model, &self.settings, scoring.threshold(), best, trials, bound_history, n)
    }
}

impl RobustEstimator for RansacEstimator<'_> {
    fn apply(&self, data: &Correspondences) -> Result<Estimate> {
        self.settings.validate()?;
        self.base
            .run(data, |model, working| self.search(model, working))
    }
}

impl std::fmt::Debug for RansacEstimator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RansacEstimator")
            .field("base", &self.base)
            .field("settings", &self.settings)
            .finish()
    }
}

/// Best sample fit of a search.
pub(crate) struct Candidate {
    pub parameters: Parameters,
    pub inliers: Vec<usize>,
}

/// Turn the outcome of a search into a consensus, or
/// [`EstimationError::ConvergenceExhaustion`] if no trial produced a fit.
///
/// `threshold` is the one the candidate was scored with; the refit reuses it.
pub(crate) fn conclude(
    model: &dyn TransformModel,
    settings: &RansacSettings,
    threshold: f64,
    best: Option<Candidate>,
    trials: usize,
    bound_history: Vec<BoundUpdate>,
    n: usize,
) -> Result<Consensus> {
    let Candidate { parameters, inliers } =
        best.ok_or(EstimationError::ConvergenceExhaustion { trials })?;

    let observed = outlier_fraction(inliers.len(), n);
    if observed > settings.contamination {
        warn!(
            "{}: best consensus is {:.1}% contaminated, above the expected {:.1}%",
            model.name(),
            observed * 100.0,
            settings.contamination * 100.0
        );
    }

    Ok(Consensus {
        parameters,
        inliers,
        threshold,
        trials,
        bound_history,
    })
}

pub(crate) fn outlier_fraction(inlier_count: usize, total: usize) -> f64 {
    1.0 - inlier_count as f64 / total.max(1) as f64
}

/// Correspondences per trial: the model minimum, or the configured count,
/// which must lie between the minimum and `n`.
pub(crate) fn sample_size(model: &dyn TransformModel, settings: &RansacSettings, n: usize) -> Result<usize> {
    let min = model.min_number_correspondences();
    if settings.use_min_correspondences {
        return Ok(min);
    }
    let k = settings.correspondences_per_trial;
    if k < min || k > n {
        return Err(EstimationError::Config(format!(
            "correspondences_per_trial must lie in [{min}, {n}] for {}, got {k}",
            model.name()
        )));
    }
    Ok(k)
}
