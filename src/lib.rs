//! # Consensus Geometry - Two-View Transforms with Adaptive RANSAC
//!
//! `consensus_geometry` estimates planar transforms between two sets of
//! corresponding 2D points in the presence of outliers:
//!
//! - **Homography**: 8 parameters, bottom-right entry fixed to one
//! - **Translation + scale**: `[s, tx, ty]` with `p2 = s * p1 + t`
//! - **Fundamental matrix**: 9 parameters, `p2ᵀ F p1 = 0`, rank two, unit norm
//!
//! ## Quick Start
//!
//! The easiest way in is through the high-level API functions:
//!
//! ```rust
//! use consensus_geometry::estimate_translation_scale;
//! use nalgebra::DMatrix;
//!
//! let points1 = DMatrix::from_row_slice(4, 2, &[0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0]);
//! let points2 = DMatrix::from_row_slice(4, 2, &[1.0, 1.0, 3.0, 1.0, 3.0, 3.0, 1.0, 3.0]);
//!
//! let result = estimate_translation_scale(&points1, &points2, 0.01, None).unwrap();
//! assert_eq!(result.inliers.len(), 4);
//! assert!((result.model.scale - 2.0).abs() < 1e-9);
//! ```
//!
//! ## Estimators and models
//!
//! The robust estimators ([`RansacEstimator`], [`LmedsEstimator`]) run on
//! [`Correspondences`] and any [`TransformModel`]. Models are plain trait
//! objects, so a custom model plugs into the same loops:
//!
//! ```rust
//! use consensus_geometry::{
//!     Correspondences, RansacEstimator, RansacSettings, RobustEstimator, TranslationScaleModel,
//! };
//! use nalgebra::Point2;
//!
//! let first: Vec<_> = (0..10).map(|i| Point2::new(i as f64, (i * i) as f64)).collect();
//! let second = first.iter().map(|p| Point2::new(0.5 * p.x + 2.0, 0.5 * p.y)).collect();
//! let data = Correspondences::new(first, second).unwrap();
//!
//! let settings = RansacSettings { max_error: 1e-6, seed: Some(3), ..RansacSettings::default() };
//! let estimate = RansacEstimator::new(TranslationScaleModel::new(), settings)
//!     .apply(&data)
//!     .unwrap();
//! assert_eq!(estimate.inliers.len(), 10);
//! ```
//!
//! Settings are serde types and round-trip through JSON
//! ([`EstimationSettings::from_json`], [`EstimationSettings::to_json`]).
//!
//! ## Modules
//!
//! - **[`api`]**: High-level functions taking N×2 point matrices
//! - **[`core`]**: The model, sampler and scoring traits and the shared sampling state
//! - **[`estimators`]**: Homography, translation+scale and fundamental matrix fits
//! - **[`ransac`]** / **[`lmeds`]**: The robust estimators
//! - **[`models`]**: Typed views over estimated parameters
//! - **[`normalization`]**: Isotropic point normalization
//! - **[`settings`]**: Configuration types
//!
//! With the `parallel` feature, [`RansacEstimator::apply_parallel`] spreads
//! trials over the rayon thread pool.

pub mod api;
pub mod choices;
pub mod core;
pub mod error;
pub mod estimators;
pub mod lmeds;
pub mod models;
pub mod normalization;
#[cfg(feature = "parallel")]
mod parallel;
pub mod ransac;
pub mod samplers;
pub mod scoring;
pub mod settings;
pub mod types;
pub mod utils;

// Re-export high-level API
pub use api::{
    estimate_fundamental_matrix, estimate_homography, estimate_translation_scale, EstimationResult,
};

// Core traits and results
pub use core::{BoundUpdate, Estimate, RobustEstimator, Sampler, Scoring, Selection, TransformModel};

pub use choices::{build_model, build_normalizer, ModelChoice};
pub use error::{EstimationError, Result};
pub use estimators::{FundamentalMatrixModel, HomographyModel, TranslationScaleModel};
pub use lmeds::LmedsEstimator;
pub use models::{FundamentalMatrix, Homography, ModelView, TranslationScale};
pub use normalization::{IsotropicNormalizer, Normalization, PointSetNormalizer};
pub use ransac::RansacEstimator;
pub use settings::{
    DistanceMeasure, EpipoleMethod, EstimationSettings, FundamentalSettings, LmedsSettings,
    ModelKind, NormalizationSettings, NormalizationType, Rank2Enforcement, RansacSettings,
    TransformSettings,
};
pub use types::{Correspondences, Parameters};
