//! RANSAC trials spread over the rayon thread pool.
//!
//! Every trial seeds its own generator from the run seed and its 1-based trial
//! number, so with a fixed seed the set of drawn samples does not depend on
//! the thread count. Which of two equally good candidates wins can still
//! depend on scheduling.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Mutex, PoisonError};

use log::{debug, trace};
use rayon::prelude::*;

use crate::core::{BoundUpdate, Consensus, Estimate, Sampler, Scoring, TransformModel};
use crate::error::{EstimationError, Result};
use crate::ransac::{conclude, outlier_fraction, sample_size, Candidate, RansacEstimator};
use crate::samplers::UniformRandomSampler;
use crate::scoring::InlierCountScoring;
use crate::settings::RansacSettings;
use crate::types::Correspondences;
use crate::utils::required_trials;

impl RansacEstimator<'_> {
    /// [`RobustEstimator::apply`](crate::core::RobustEstimator::apply) with
    /// trials running concurrently.
    pub fn apply_parallel(&self, data: &Correspondences) -> Result<Estimate> {
        self.settings.validate()?;
        let settings = &self.settings;
        self.base
            .run(data, |model, working| search(model, working, settings))
    }
}

/// SplitMix64 finalizer over the run seed and the trial number.
fn trial_seed(base: u64, trial: usize) -> u64 {
    let mut z = base.wrapping_add((trial as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

struct Shared {
    started: AtomicUsize,
    completed: AtomicUsize,
    budget: AtomicUsize,
    /// Inlier count of the best candidate plus one; zero while there is none.
    best_count: AtomicUsize,
    /// Running contamination minimum, as `f64` bits.
    contamination: AtomicU64,
    stop: AtomicBool,
    best: Mutex<Option<Candidate>>,
    history: Mutex<Vec<BoundUpdate>>,
    failure: Mutex<Option<EstimationError>>,
}

fn search(model: &dyn TransformModel, data: &Correspondences, settings: &RansacSettings) -> Result<Consensus> {
    let n = data.len();
    let k = sample_size(model, settings, n)?;
    let base_seed = settings.seed.unwrap_or_else(rand::random);
    let shared = Shared {
        started: AtomicUsize::new(0),
        completed: AtomicUsize::new(0),
        budget: AtomicUsize::new(settings.max_iterations),
        best_count: AtomicUsize::new(0),
        contamination: AtomicU64::new(settings.contamination.to_bits()),
        stop: AtomicBool::new(false),
        best: Mutex::new(None),
        history: Mutex::new(Vec::new()),
        failure: Mutex::new(None),
    };

    let workers = rayon::current_num_threads().max(1);
    debug!(
        "{}: sampling {k} of {n} correspondences on {workers} threads, at most {} trials",
        model.name(),
        settings.max_iterations
    );

    let scoring = InlierCountScoring::new(settings.max_error);
    (0..workers).into_par_iter().for_each(|_| {
        if let Err(err) = worker(model, data, settings, scoring, k, base_seed, &shared) {
            shared.stop.store(true, AtomicOrdering::Release);
            let mut failure = shared.failure.lock().unwrap_or_else(PoisonError::into_inner);
            failure.get_or_insert(err);
        }
    });

    let Shared {
        completed,
        best,
        history,
        failure,
        ..
    } = shared;
    if let Some(err) = failure.into_inner().unwrap_or_else(PoisonError::into_inner) {
        return Err(err);
    }
    let best = best.into_inner().unwrap_or_else(PoisonError::into_inner);
    let history = history.into_inner().unwrap_or_else(PoisonError::into_inner);
    conclude(model, settings, scoring.threshold(), best, completed.into_inner(), history, n)
}

fn worker(
    model: &dyn TransformModel,
    data: &Correspondences,
    settings: &RansacSettings,
    scoring: InlierCountScoring,
    k: usize,
    base_seed: u64,
    shared: &Shared,
) -> Result<()> {
    let n = data.len();
    let mut indices: Vec<usize> = (0..n).collect();
    let mut drawn = Vec::with_capacity(k);
    let mut residuals = Vec::with_capacity(n);
    let mut inliers = Vec::with_capacity(n);

    while !shared.stop.load(AtomicOrdering::Acquire) {
        let trial = shared.started.fetch_add(1, AtomicOrdering::Relaxed) + 1;
        if trial > shared.budget.load(AtomicOrdering::Acquire) {
            break;
        }
        shared.completed.fetch_add(1, AtomicOrdering::Relaxed);

        let mut sampler = UniformRandomSampler::from_seed(trial_seed(base_seed, trial));
        if !sampler.sample(&mut indices, k) {
            break;
        }

        let fitted = model.estimate_subset(data, &indices, k);
        // Samples must not depend on which trials this worker ran before.
        restore_identity(&mut indices, &mut drawn, k);
        let params = match fitted {
            Ok(params) => params,
            Err(err) if err.is_recoverable() => {
                trace!("trial {trial}: {err}");
                continue;
            }
            Err(err) => return Err(err),
        };

        model.residual_into(data, &params, &mut residuals)?;
        let count = scoring.score(&residuals, &mut inliers).inlier_count;
        let previous = shared.best_count.fetch_max(count + 1, AtomicOrdering::AcqRel);
        if count + 1 <= previous {
            continue;
        }

        {
            let mut best = shared.best.lock().unwrap_or_else(PoisonError::into_inner);
            // A better candidate may have been stored between the fetch_max and the lock.
            if best.as_ref().map_or(true, |b| b.inliers.len() < count) {
                *best = Some(Candidate {
                    parameters: params,
                    inliers: inliers.clone(),
                });
            }
        }
        trace!("trial {trial}: new best with {count} inliers");

        let observed = outlier_fraction(count, n);
        if settings.adaptive_contamination {
            let _ = shared.contamination.fetch_update(
                AtomicOrdering::AcqRel,
                AtomicOrdering::Acquire,
                |bits| (observed < f64::from_bits(bits)).then(|| observed.to_bits()),
            );
            let mut history = shared.history.lock().unwrap_or_else(PoisonError::into_inner);
            // Read under the lock so the recorded history never increases.
            let contamination = f64::from_bits(shared.contamination.load(AtomicOrdering::Acquire));
            let required = required_trials(settings.confidence, contamination, k).min(settings.max_iterations);
            shared.budget.fetch_min(required, AtomicOrdering::AcqRel);
            history.push(BoundUpdate {
                trial,
                contamination,
                required_trials: required,
            });
        }

        if settings.check_stop && observed <= settings.contamination {
            shared.stop.store(true, AtomicOrdering::Release);
        }
    }
    Ok(())
}

/// Undo a partial shuffle of the identity permutation in `O(k)`.
///
/// After the swaps every displaced slot outside the prefix holds one of the
/// first `k` values, so resetting the prefix and the slots named by it
/// restores `0..n`.
fn restore_identity(indices: &mut [usize], drawn: &mut Vec<usize>, k: usize) {
    drawn.clear();
    drawn.extend_from_slice(&indices[..k]);
    for (i, slot) in indices[..k].iter_mut().enumerate() {
        *slot = i;
    }
    for &v in drawn.iter() {
        indices[v] = v;
    }
}
