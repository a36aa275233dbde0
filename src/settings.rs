//! Configuration types for the models and robust estimators.
//!
//! Every struct derives serde's `Serialize`/`Deserialize` with
//! `#[serde(default)]`, so a settings document only needs the keys it changes.
//! [`EstimationSettings::from_json`] and [`EstimationSettings::load`] read JSON;
//! the caller owns the files.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EstimationError, Result};

/// Transform family to estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Homography,
    TranslationScale,
    FundamentalMatrix,
}

/// Point set normalization applied before estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationType {
    None,
    Isotropic,
}

/// How the fundamental matrix is forced to rank 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rank2Enforcement {
    /// Zero the smallest singular value. Cheap, less accurate under noise.
    Frobenius,
    /// Rebuild one row and one column as combinations of the others, choosing
    /// the best of the nine pivot placements.
    TParameterization,
}

/// Residual reported by the fundamental matrix model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMeasure {
    /// Algebraic epipolar residual `|p2ᵀ F p1|`.
    Epipolar,
    /// First-order geometric (Sampson) distance.
    Sampson,
}

/// How epipoles are computed inside the T-parameterization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpipoleMethod {
    /// Null vectors from the SVD of the full matrix.
    ThreeDof,
    /// Two 3×2 pseudo-inverse solves with the third coordinate fixed to one.
    TwoDof,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationSettings {
    pub kind: NormalizationType,
    /// Mean distance of normalized points to the origin.
    pub average_distance: f64,
}

impl Default for NormalizationSettings {
    fn default() -> Self {
        Self {
            kind: NormalizationType::Isotropic,
            average_distance: std::f64::consts::SQRT_2,
        }
    }
}

/// Settings of the homography and translation+scale models.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformSettings {
    /// Report squared residuals instead of distances.
    pub compute_sq_error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FundamentalSettings {
    pub rank2_enforcement: Rank2Enforcement,
    pub distance_measure: DistanceMeasure,
    pub epipole_method: EpipoleMethod,
    /// Report squared residuals instead of distances.
    pub compute_sq_error: bool,
}

impl Default for FundamentalSettings {
    fn default() -> Self {
        Self {
            rank2_enforcement: Rank2Enforcement::Frobenius,
            distance_measure: DistanceMeasure::Epipolar,
            epipole_method: EpipoleMethod::ThreeDof,
            compute_sq_error: false,
        }
    }
}

/// Adaptive RANSAC settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacSettings {
    /// Hard cap on the number of trials.
    pub max_iterations: usize,
    /// Residuals below this are inliers. Applied in normalized coordinates
    /// when normalization is enabled.
    pub max_error: f64,
    /// Shrink the trial bound as better consensus sets are found.
    pub adaptive_contamination: bool,
    /// Stop as soon as a candidate is at most `contamination` contaminated.
    pub check_stop: bool,
    /// Expected outlier fraction; prior of the adaptive estimate and target of
    /// `check_stop`.
    pub contamination: f64,
    /// Probability of drawing at least one all-inlier sample.
    pub confidence: f64,
    /// Draw minimal samples; otherwise `correspondences_per_trial`.
    pub use_min_correspondences: bool,
    pub correspondences_per_trial: usize,
    /// Seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for RansacSettings {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            max_error: 0.8,
            adaptive_contamination: false,
            check_stop: true,
            contamination: 0.5,
            confidence: 0.99,
            use_min_correspondences: true,
            correspondences_per_trial: 8,
            seed: None,
        }
    }
}

impl RansacSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(EstimationError::Config("max_iterations must be positive".into()));
        }
        if !(self.max_error > 0.0) {
            return Err(EstimationError::Config(format!(
                "max_error must be positive, got {}",
                self.max_error
            )));
        }
        if !(0.0..1.0).contains(&self.contamination) {
            return Err(EstimationError::Config(format!(
                "contamination must lie in [0, 1), got {}",
                self.contamination
            )));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(EstimationError::Config(format!(
                "confidence must lie in (0, 1), got {}",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// Least-median-of-squares settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LmedsSettings {
    pub max_iterations: usize,
    /// Stop once the best median residual is at or below this value.
    pub median_threshold: f64,
    /// Inliers lie within `inlier_factor` robust standard deviations.
    pub inlier_factor: f64,
    pub seed: Option<u64>,
}

impl Default for LmedsSettings {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            median_threshold: 0.0,
            inlier_factor: 2.5,
            seed: None,
        }
    }
}

impl LmedsSettings {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(EstimationError::Config("max_iterations must be positive".into()));
        }
        if !(self.inlier_factor > 0.0) {
            return Err(EstimationError::Config(format!(
                "inlier_factor must be positive, got {}",
                self.inlier_factor
            )));
        }
        Ok(())
    }
}

/// Complete estimation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimationSettings {
    pub model: ModelKind,
    pub normalization: NormalizationSettings,
    pub transform: TransformSettings,
    pub fundamental: FundamentalSettings,
    pub ransac: RansacSettings,
    pub lmeds: LmedsSettings,
}

impl Default for EstimationSettings {
    fn default() -> Self {
        Self {
            model: ModelKind::Homography,
            normalization: NormalizationSettings::default(),
            transform: TransformSettings::default(),
            fundamental: FundamentalSettings::default(),
            ransac: RansacSettings::default(),
            lmeds: LmedsSettings::default(),
        }
    }
}

impl EstimationSettings {
    /// Defaults for `model`.
    pub fn for_model(model: ModelKind) -> Self {
        Self {
            model,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.normalization.kind == NormalizationType::Isotropic
            && !(self.normalization.average_distance > 0.0)
        {
            return Err(EstimationError::Config(format!(
                "average_distance must be positive, got {}",
                self.normalization.average_distance
            )));
        }
        self.ransac.validate()?;
        self.lmeds.validate()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| {
            EstimationError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&data)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
