//! Scoring primitives for the sampling estimators.
//!
//! [`InlierCountScoring`] is the RANSAC criterion: more residuals below the
//! threshold is better. [`MedianScoring`] backs least-median-of-squares, where
//! a smaller median residual is better.

use std::cmp::Ordering;

use crate::core::Scoring;
use crate::utils::median_in_place;

/// Consensus size of a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Score {
    pub inlier_count: usize,
}

impl Score {
    pub fn new(inlier_count: usize) -> Self {
        Self { inlier_count }
    }
}

/// Counts residuals strictly below the threshold.
#[derive(Debug, Clone, Copy)]
pub struct InlierCountScoring {
    threshold: f64,
}

impl InlierCountScoring {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Scoring for InlierCountScoring {
    type Score = Score;

    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn score(&self, residuals: &[f64], inliers_out: &mut Vec<usize>) -> Score {
        inliers_out.clear();
        inliers_out.extend(
            residuals
                .iter()
                .enumerate()
                .filter(|(_, r)| **r < self.threshold)
                .map(|(i, _)| i),
        );
        Score::new(inliers_out.len())
    }
}

/// Median residual of a candidate; compares so that a lower median is better.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MedianScore {
    pub median: f64,
}

impl PartialOrd for MedianScore {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        other.median.partial_cmp(&self.median)
    }
}

/// Least-median scoring. Inliers are residuals within the fixed `threshold`,
/// which the caller usually derives from the best median afterwards.
#[derive(Debug, Clone)]
pub struct MedianScoring {
    threshold: f64,
    scratch: std::cell::RefCell<Vec<f64>>,
}

impl MedianScoring {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            scratch: std::cell::RefCell::new(Vec::new()),
        }
    }
}

impl Scoring for MedianScoring {
    type Score = MedianScore;

    fn threshold(&self) -> f64 {
        self.threshold
    }

    fn score(&self, residuals: &[f64], inliers_out: &mut Vec<usize>) -> MedianScore {
        inliers_out.clear();
        inliers_out.extend(
            residuals
                .iter()
                .enumerate()
                .filter(|(_, r)| **r <= self.threshold)
                .map(|(i, _)| i),
        );

        let mut scratch = self.scratch.borrow_mut();
        scratch.clear();
        scratch.extend(residuals.iter().map(|r| if r.is_nan() { f64::INFINITY } else { *r }));
        let median = median_in_place(&mut scratch).unwrap_or(f64::INFINITY);
        MedianScore { median }
    }
}
