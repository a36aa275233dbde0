//! Transform models fitted to two-view correspondences.
//!
//! - [`HomographyModel`]: projective 8-DoF homography
//! - [`TranslationScaleModel`]: uniform scale plus translation
//! - [`FundamentalMatrixModel`]: rank-2 fundamental matrix, with rank
//!   enforcement and epipoles in [`rank2`]

pub mod fundamental;
pub mod homography;
pub mod rank2;
pub mod translation_scale;

pub use fundamental::FundamentalMatrixModel;
pub use homography::HomographyModel;
pub use rank2::{Epipole, Epipoles};
pub use translation_scale::TranslationScaleModel;
