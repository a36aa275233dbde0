//! Error taxonomy shared by the models and the robust estimators.

use thiserror::Error;

/// Failure reported by a model fit, a normalizer or a robust estimator.
///
/// [`DegenerateSample`](EstimationError::DegenerateSample) and
/// [`NumericalSingularity`](EstimationError::NumericalSingularity) are local to a
/// single sample: the sampling loops discard the trial and draw again. All other
/// variants end the estimation call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EstimationError {
    /// Fewer correspondences than the model needs.
    #[error("{model} needs at least {required} correspondences, got {actual}")]
    InputSize {
        model: &'static str,
        required: usize,
        actual: usize,
    },

    /// The two point sets of a correspondence set differ in length.
    #[error("point sets differ in length: {first} vs {second}")]
    MismatchedSets { first: usize, second: usize },

    /// An index subset references points outside the set, or `count` exceeds it.
    #[error("invalid index subset: {0}")]
    InvalidSubset(String),

    /// A parameter vector has the wrong length for the model.
    #[error("{model} expects {expected} parameters, got {actual}")]
    InvalidParameters {
        model: &'static str,
        expected: usize,
        actual: usize,
    },

    /// The sample spans a singular system (collinear or coincident points).
    #[error("degenerate sample: {0}")]
    DegenerateSample(String),

    /// A decomposition or solve could not be completed within tolerance.
    #[error("numerical singularity: {0}")]
    NumericalSingularity(String),

    /// The trial budget ran out before any sample produced a valid fit.
    #[error("no valid fit found in {trials} trials")]
    ConvergenceExhaustion { trials: usize },

    /// Invalid settings, or a settings document that could not be read.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EstimationError {
    /// Whether a sampling loop may discard the current trial and continue.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EstimationError::DegenerateSample(_) | EstimationError::NumericalSingularity(_)
        )
    }
}

impl From<serde_json::Error> for EstimationError {
    fn from(err: serde_json::Error) -> Self {
        EstimationError::Config(err.to_string())
    }
}

impl From<std::io::Error> for EstimationError {
    fn from(err: std::io::Error) -> Self {
        EstimationError::Config(err.to_string())
    }
}

pub type Result<T, E = EstimationError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_sample_local_failures_are_recoverable() {
        assert!(EstimationError::DegenerateSample("collinear".into()).is_recoverable());
        assert!(EstimationError::NumericalSingularity("svd".into()).is_recoverable());
        assert!(!EstimationError::ConvergenceExhaustion { trials: 10 }.is_recoverable());
        assert!(!EstimationError::InputSize {
            model: "homography",
            required: 4,
            actual: 3
        }
        .is_recoverable());
    }

    #[test]
    fn status_strings_are_human_readable() {
        let err = EstimationError::InputSize {
            model: "homography",
            required: 4,
            actual: 3,
        };
        assert_eq!(
            err.to_string(),
            "homography needs at least 4 correspondences, got 3"
        );

        let err = EstimationError::ConvergenceExhaustion { trials: 50 };
        assert_eq!(err.to_string(), "no valid fit found in 50 trials");
    }

    #[test]
    fn json_errors_become_config_errors() {
        let parse: std::result::Result<u32, _> = serde_json::from_str("not json");
        let err: EstimationError = parse.unwrap_err().into();
        assert!(matches!(err, EstimationError::Config(_)));
    }
}
