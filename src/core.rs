//! Core traits and the shared Monte Carlo estimation skeleton.
//!
//! - [`TransformModel`]: fits a parameter vector to a correspondence set (or an
//!   index subset of it), evaluates residuals, and converts between normalized
//!   and raw coordinates.
//! - [`Sampler`] and [`Scoring`]: the per-trial seams of the sampling loops.
//! - [`AdaptiveTermination`]: the shrinking trial bound of adaptive RANSAC.
//! - [`MonteCarloEstimator`]: model ownership, optional normalization, final
//!   refit and denormalization shared by every [`RobustEstimator`].

use std::borrow::Cow;
use std::fmt;
use std::ops::Deref;

use log::{debug, trace, warn};
use nalgebra::{Matrix3, Point2};

use crate::error::{EstimationError, Result};
use crate::normalization::{normalize_correspondences, Normalization, PointSetNormalizer};
use crate::types::{Correspondences, Parameters};
use crate::utils::required_trials;

/// Which correspondences a fit should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection<'a> {
    /// The first `n` correspondences, i.e. the whole set.
    All(usize),
    /// Exactly these indices, in this order.
    Subset(&'a [usize]),
}

impl<'a> Selection<'a> {
    pub fn len(&self) -> usize {
        match self {
            Selection::All(n) => *n,
            Selection::Subset(indices) => indices.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the `i`-th selected correspondence.
    #[inline]
    pub fn get(&self, i: usize) -> usize {
        match self {
            Selection::All(_) => i,
            Selection::Subset(indices) => indices[i],
        }
    }

    pub fn indices(self) -> impl Iterator<Item = usize> + Clone + 'a {
        (0..self.len()).map(move |i| self.get(i))
    }
}

/// A geometric relation between two views that can be fitted to correspondences.
///
/// Implementors provide [`fit`](Self::fit) and the per-model conversions; the
/// size and index validation of the `estimate*` entry points is shared.
pub trait TransformModel: Send + Sync {
    /// Short model name used in error messages and logs.
    fn name(&self) -> &'static str;

    /// Smallest number of correspondences a fit accepts.
    fn min_number_correspondences(&self) -> usize;

    /// Smallest point dimension the model accepts.
    fn min_correspondence_dimension(&self) -> usize {
        2
    }

    /// Largest point dimension the model accepts.
    fn max_correspondence_dimension(&self) -> usize {
        2
    }

    /// Length of the parameter vectors produced by [`fit`](Self::fit).
    fn parameter_count(&self) -> usize;

    /// Whether residuals are squared distances.
    fn computes_squared_error(&self) -> bool;

    /// Fit parameters to the selected correspondences.
    ///
    /// Callers guarantee that the selection is valid and large enough; use
    /// [`estimate`](Self::estimate) or [`estimate_subset`](Self::estimate_subset)
    /// for checked entry points.
    fn fit(&self, data: &Correspondences, selection: Selection<'_>) -> Result<Parameters>;

    /// Write one residual per correspondence of `data` into `out`.
    fn residual_into(&self, data: &Correspondences, params: &[f64], out: &mut Vec<f64>) -> Result<()>;

    /// Turn parameters fitted on normalized points into raw-coordinate parameters.
    fn denormalize(
        &self,
        params: &mut Parameters,
        first: &Normalization,
        second: &Normalization,
    ) -> Result<()>;

    /// Homogeneous 3×3 matrix view of `params`.
    fn to_matrix(&self, params: &[f64]) -> Result<Matrix3<f64>>;

    /// Map a single first-view point into the second view.
    ///
    /// `None` for models that do not map points to points, for points the
    /// model sends to infinity, and when `params` has the wrong length.
    fn evaluate(&self, point: &Point2<f64>, params: &[f64]) -> Option<Point2<f64>>;

    fn ensure_correspondences(&self, actual: usize) -> Result<()> {
        let required = self.min_number_correspondences();
        if actual < required {
            return Err(EstimationError::InputSize {
                model: self.name(),
                required,
                actual,
            });
        }
        Ok(())
    }

    /// Fit to every correspondence of `data`.
    fn estimate(&self, data: &Correspondences) -> Result<Parameters> {
        self.ensure_correspondences(data.len())?;
        self.fit(data, Selection::All(data.len()))
    }

    /// Fit to the first `count` entries of `indices`.
    fn estimate_subset(
        &self,
        data: &Correspondences,
        indices: &[usize],
        count: usize,
    ) -> Result<Parameters> {
        if count > indices.len() {
            return Err(EstimationError::InvalidSubset(format!(
                "count {count} exceeds the {} given indices",
                indices.len()
            )));
        }
        let subset = &indices[..count];
        if let Some(&bad) = subset.iter().find(|&&i| i >= data.len()) {
            return Err(EstimationError::InvalidSubset(format!(
                "index {bad} out of range for {} correspondences",
                data.len()
            )));
        }
        self.ensure_correspondences(count)?;
        self.fit(data, Selection::Subset(subset))
    }

    /// [`estimate`](Self::estimate) plus residuals over the whole set.
    fn estimate_with_residual(&self, data: &Correspondences) -> Result<(Parameters, Vec<f64>)> {
        let params = self.estimate(data)?;
        let residuals = self.residual(data, &params)?;
        Ok((params, residuals))
    }

    /// [`estimate_subset`](Self::estimate_subset) plus residuals over the whole set.
    fn estimate_subset_with_residual(
        &self,
        data: &Correspondences,
        indices: &[usize],
        count: usize,
    ) -> Result<(Parameters, Vec<f64>)> {
        let params = self.estimate_subset(data, indices, count)?;
        let residuals = self.residual(data, &params)?;
        Ok((params, residuals))
    }

    fn residual(&self, data: &Correspondences, params: &[f64]) -> Result<Vec<f64>> {
        let mut out = Vec::with_capacity(data.len());
        self.residual_into(data, params, &mut out)?;
        Ok(out)
    }
}

/// Reject parameter vectors of the wrong length.
pub(crate) fn check_parameters(model: &'static str, expected: usize, params: &[f64]) -> Result<()> {
    if params.len() != expected {
        return Err(EstimationError::InvalidParameters {
            model,
            expected,
            actual: params.len(),
        });
    }
    Ok(())
}

/// Sampler drawing the index subsets of a sampling loop.
pub trait Sampler {
    /// Move a duplicate-free random selection of `sample_size` entries of
    /// `indices` to its front.
    ///
    /// `indices` must stay a permutation of the original index set. Returns
    /// `false` if no sample can be drawn.
    fn sample(&mut self, indices: &mut [usize], sample_size: usize) -> bool;
}

/// Scoring strategy turning a residual vector into a comparable score.
pub trait Scoring {
    /// Larger is better.
    type Score: Clone + PartialOrd + fmt::Debug;

    /// Residual threshold separating inliers from outliers.
    fn threshold(&self) -> f64;

    /// Score `residuals` and write the inlier indices into `inliers_out`.
    fn score(&self, residuals: &[f64], inliers_out: &mut Vec<usize>) -> Self::Score;
}

/// One update of the adaptive trial bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundUpdate {
    /// Trial (1-based) that produced the new best candidate.
    pub trial: usize,
    /// Running contamination estimate after the update.
    pub contamination: f64,
    /// Trial bound derived from it, clipped to the configured maximum.
    pub required_trials: usize,
}

/// Adaptive RANSAC termination.
///
/// The contamination estimate only ever decreases, so the derived trial bound
/// and the remaining budget never grow.
#[derive(Debug, Clone)]
pub struct AdaptiveTermination {
    confidence: f64,
    contamination: f64,
    sample_size: usize,
    max_trials: usize,
    budget: usize,
}

impl AdaptiveTermination {
    pub fn new(confidence: f64, prior_contamination: f64, sample_size: usize, max_trials: usize) -> Self {
        Self {
            confidence,
            contamination: prior_contamination,
            sample_size,
            max_trials,
            budget: max_trials,
        }
    }

    /// Total number of trials allowed so far.
    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn contamination(&self) -> f64 {
        self.contamination
    }

    /// Fold in a new best candidate with `inlier_count` of `total` inliers.
    pub fn update(&mut self, trial: usize, inlier_count: usize, total: usize) -> BoundUpdate {
        let observed = 1.0 - inlier_count as f64 / total.max(1) as f64;
        self.contamination = self.contamination.min(observed);
        let required = required_trials(self.confidence, self.contamination, self.sample_size)
            .min(self.max_trials);
        self.budget = self.budget.min(required);
        trace!(
            "trial {trial}: contamination {:.4}, required trials {required}",
            self.contamination
        );
        BoundUpdate {
            trial,
            contamination: self.contamination,
            required_trials: required,
        }
    }
}

/// Model slot of a robust estimator: owned by default, or borrowed from the
/// caller.
pub enum ModelHandle<'m> {
    Owned(Box<dyn TransformModel + 'm>),
    Borrowed(&'m dyn TransformModel),
}

impl<'m> Deref for ModelHandle<'m> {
    type Target = dyn TransformModel + 'm;

    fn deref(&self) -> &Self::Target {
        match self {
            ModelHandle::Owned(model) => model.as_ref(),
            ModelHandle::Borrowed(model) => *model,
        }
    }
}

impl fmt::Debug for ModelHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelHandle::Owned(model) => f.debug_tuple("Owned").field(&model.name()).finish(),
            ModelHandle::Borrowed(model) => f.debug_tuple("Borrowed").field(&model.name()).finish(),
        }
    }
}

/// Best candidate of a search, in working (possibly normalized) coordinates.
#[derive(Debug, Clone)]
pub struct Consensus {
    pub parameters: Parameters,
    pub inliers: Vec<usize>,
    /// Residual threshold that produced `inliers`; reused by the refit.
    pub threshold: f64,
    pub trials: usize,
    pub bound_history: Vec<BoundUpdate>,
}

/// Outcome of a robust estimation, in raw coordinates.
#[derive(Debug, Clone)]
pub struct Estimate {
    pub parameters: Parameters,
    /// One residual per input correspondence.
    pub residuals: Vec<f64>,
    /// Indices of the final consensus set.
    pub inliers: Vec<usize>,
    /// Number of sampling trials performed.
    pub trials: usize,
    /// Outlier fraction of the final consensus set.
    pub contamination: f64,
    /// Successive adaptive bound updates, oldest first.
    pub bound_history: Vec<BoundUpdate>,
}

/// A robust estimator turning contaminated correspondences into one transform.
pub trait RobustEstimator {
    fn apply(&self, data: &Correspondences) -> Result<Estimate>;
}

/// State shared by the sampling estimators.
pub struct MonteCarloEstimator<'m> {
    model: ModelHandle<'m>,
    normalizer: Option<Box<dyn PointSetNormalizer>>,
}

impl<'m> MonteCarloEstimator<'m> {
    pub fn new(model: ModelHandle<'m>) -> Self {
        Self {
            model,
            normalizer: None,
        }
    }

    pub fn model(&self) -> &dyn TransformModel {
        &*self.model
    }

    pub fn normalizer(&self) -> Option<&dyn PointSetNormalizer> {
        self.normalizer.as_deref()
    }

    pub fn set_normalizer(&mut self, normalizer: Option<Box<dyn PointSetNormalizer>>) {
        self.normalizer = normalizer;
    }

    /// Normalize, search, refit, denormalize.
    ///
    /// `search` receives the model and the working correspondences and returns
    /// the best consensus it found.
    pub fn run<F>(&self, data: &Correspondences, search: F) -> Result<Estimate>
    where
        F: FnOnce(&dyn TransformModel, &Correspondences) -> Result<Consensus>,
    {
        let model = self.model();
        model.ensure_correspondences(data.len())?;

        let (working, normalizations) = match self.normalizer() {
            Some(normalizer) => {
                let (normalized, first, second) = normalize_correspondences(normalizer, data)?;
                (Cow::Owned(normalized), Some((first, second)))
            }
            None => (Cow::Borrowed(data), None),
        };

        let consensus = search(model, &*working)?;
        let consensus = refit(model, &*working, consensus)?;

        let mut parameters = consensus.parameters;
        if let Some((first, second)) = &normalizations {
            model.denormalize(&mut parameters, first, second)?;
        }
        let residuals = model.residual(data, &parameters)?;
        let contamination = 1.0 - consensus.inliers.len() as f64 / data.len() as f64;

        debug!(
            "{}: {} of {} inliers after {} trials",
            model.name(),
            consensus.inliers.len(),
            data.len(),
            consensus.trials
        );

        Ok(Estimate {
            parameters,
            residuals,
            inliers: consensus.inliers,
            trials: consensus.trials,
            contamination,
            bound_history: consensus.bound_history,
        })
    }
}

impl fmt::Debug for MonteCarloEstimator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonteCarloEstimator")
            .field("model", &self.model)
            .field("normalized", &self.normalizer.is_some())
            .finish()
    }
}

/// Re-estimate from every inlier of `consensus`.
///
/// The refit replaces the candidate only if it succeeds and keeps at least as
/// many inliers under the same threshold.
fn refit(model: &dyn TransformModel, data: &Correspondences, consensus: Consensus) -> Result<Consensus> {
    if consensus.inliers.len() < model.min_number_correspondences() {
        debug!(
            "{}: {} inliers, too few to refit",
            model.name(),
            consensus.inliers.len()
        );
        return Ok(consensus);
    }

    let params = match model.estimate_subset(data, &consensus.inliers, consensus.inliers.len()) {
        Ok(params) => params,
        Err(err) if err.is_recoverable() => {
            warn!("{}: refit on inliers failed ({err}), keeping sample fit", model.name());
            return Ok(consensus);
        }
        Err(err) => return Err(err),
    };

    let residuals = model.residual(data, &params)?;
    let inliers: Vec<usize> = residuals
        .iter()
        .enumerate()
        .filter(|(_, r)| **r < consensus.threshold)
        .map(|(i, _)| i)
        .collect();

    if inliers.len() < consensus.inliers.len() {
        warn!(
            "{}: refit would drop inliers ({} -> {}), keeping sample fit",
            model.name(),
            consensus.inliers.len(),
            inliers.len()
        );
        return Ok(consensus);
    }

    Ok(Consensus {
        parameters: params,
        inliers,
        ..consensus
    })
}
