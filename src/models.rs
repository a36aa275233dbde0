//! Typed views over estimated parameter vectors.
//!
//! The estimators work on flat [`Parameters`]; these types give them a
//! geometric meaning: point transfer for homographies and translation+scale,
//! epipolar lines and epipoles for fundamental matrices.

use nalgebra::{Matrix3, Point2, Vector2, Vector3};

use crate::core::check_parameters;
use crate::error::{EstimationError, Result};
use crate::estimators::homography::homography_matrix;
use crate::estimators::rank2::{self, Epipoles};
use crate::settings::{EpipoleMethod, ModelKind};
use crate::types::Parameters;

/// A model type that can be rebuilt from its parameter vector.
pub trait ModelView: Sized {
    const KIND: ModelKind;

    fn from_parameters(params: &[f64]) -> Result<Self>;

    /// Flat parameter vector, as produced by the matching model.
    fn parameters(&self) -> Parameters;

    /// Homogeneous 3×3 matrix.
    fn matrix(&self) -> Matrix3<f64>;
}

/// Planar projective transformation, normalized so that `h[(2, 2)] == 1`.
#[derive(Clone, Debug, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    /// Wrap `h`, rescaling it so its bottom-right entry is one.
    pub fn new(h: Matrix3<f64>) -> Result<Self> {
        let w = h[(2, 2)];
        if w.abs() < f64::EPSILON {
            return Err(EstimationError::NumericalSingularity(
                "homography has a vanishing bottom-right entry".to_string(),
            ));
        }
        Ok(Self { h: h / w })
    }

    pub fn identity() -> Self {
        Self {
            h: Matrix3::identity(),
        }
    }

    /// Image of `p`, `None` when it maps to infinity.
    pub fn transform_point(&self, p: &Point2<f64>) -> Option<Point2<f64>> {
        let q = self.h * p.to_homogeneous();
        if q.z.abs() < f64::EPSILON {
            return None;
        }
        Some(Point2::new(q.x / q.z, q.y / q.z))
    }

    /// Mapping from the second view back to the first.
    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().and_then(|inv| Self::new(inv).ok())
    }
}

impl ModelView for Homography {
    const KIND: ModelKind = ModelKind::Homography;

    fn from_parameters(params: &[f64]) -> Result<Self> {
        check_parameters("homography", 8, params)?;
        Ok(Self {
            h: homography_matrix(params),
        })
    }

    fn parameters(&self) -> Parameters {
        (0..8).map(|k| self.h[(k / 3, k % 3)]).collect()
    }

    fn matrix(&self) -> Matrix3<f64> {
        self.h
    }
}

/// `p' = scale * p + translation`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TranslationScale {
    pub scale: f64,
    pub translation: Vector2<f64>,
}

impl TranslationScale {
    pub fn new(scale: f64, translation: Vector2<f64>) -> Self {
        Self { scale, translation }
    }

    pub fn transform_point(&self, p: &Point2<f64>) -> Point2<f64> {
        Point2::from(p.coords * self.scale + self.translation)
    }

    /// `None` for a zero scale.
    pub fn inverse(&self) -> Option<Self> {
        if self.scale.abs() < f64::EPSILON {
            return None;
        }
        let scale = 1.0 / self.scale;
        Some(Self::new(scale, -self.translation * scale))
    }
}

impl ModelView for TranslationScale {
    const KIND: ModelKind = ModelKind::TranslationScale;

    fn from_parameters(params: &[f64]) -> Result<Self> {
        check_parameters("translation-scale", 3, params)?;
        Ok(Self::new(params[0], Vector2::new(params[1], params[2])))
    }

    fn parameters(&self) -> Parameters {
        vec![self.scale, self.translation.x, self.translation.y]
    }

    fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.scale,
            0.0,
            self.translation.x,
            0.0,
            self.scale,
            self.translation.y,
            0.0,
            0.0,
            1.0,
        )
    }
}

/// Fundamental matrix with `p2ᵀ F p1 = 0`.
#[derive(Clone, Debug, PartialEq)]
pub struct FundamentalMatrix {
    pub f: Matrix3<f64>,
}

impl FundamentalMatrix {
    pub fn new(f: Matrix3<f64>) -> Self {
        Self { f }
    }

    /// Line `l = F p1` in the second view on which the match of `p1` lies.
    pub fn epipolar_line(&self, p1: &Point2<f64>) -> Vector3<f64> {
        self.f * p1.to_homogeneous()
    }

    /// Line `l = Fᵀ p2` in the first view on which the match of `p2` lies.
    pub fn epipolar_line_first(&self, p2: &Point2<f64>) -> Vector3<f64> {
        self.f.transpose() * p2.to_homogeneous()
    }

    /// Algebraic epipolar residual `p2ᵀ F p1`.
    pub fn epipolar_constraint(&self, p1: &Point2<f64>, p2: &Point2<f64>) -> f64 {
        p2.to_homogeneous().dot(&self.epipolar_line(p1))
    }

    pub fn epipoles(&self, method: EpipoleMethod) -> Result<Epipoles> {
        rank2::epipoles(&self.f, method)
    }

    /// Singular values in descending order; the last is ≈0 for a valid `F`.
    pub fn singular_values(&self) -> Vector3<f64> {
        let mut sigma = self.f.singular_values();
        sigma.as_mut_slice().sort_by(|a, b| b.total_cmp(a));
        sigma
    }

    /// The same relation with the views swapped.
    pub fn swapped(&self) -> Self {
        Self::new(self.f.transpose())
    }
}

impl ModelView for FundamentalMatrix {
    const KIND: ModelKind = ModelKind::FundamentalMatrix;

    fn from_parameters(params: &[f64]) -> Result<Self> {
        check_parameters("fundamental-matrix", 9, params)?;
        Ok(Self::new(Matrix3::from_row_slice(params)))
    }

    fn parameters(&self) -> Parameters {
        (0..9).map(|k| self.f[(k / 3, k % 3)]).collect()
    }

    fn matrix(&self) -> Matrix3<f64> {
        self.f
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimators::test_scenes::calibrated_views;
    use crate::estimators::Epipole;
    use approx::assert_abs_diff_eq;

    #[test]
    fn homography_round_trips_through_its_inverse() {
        let h = Homography::from_parameters(&[1.1, 0.05, 3.0, -0.02, 0.95, -1.5, 1e-4, -2e-4]).unwrap();
        let inv = h.inverse().unwrap();
        let p = Point2::new(12.0, -7.5);
        let q = h.transform_point(&p).unwrap();
        let back = inv.transform_point(&q).unwrap();
        assert_abs_diff_eq!(back, p, epsilon = 1e-9);
        assert_abs_diff_eq!(inv.h[(2, 2)], 1.0);
    }

    #[test]
    fn homography_parameters_round_trip() {
        let params = vec![2.0, 0.1, -4.0, 0.3, 1.5, 7.0, 0.001, 0.002];
        let h = Homography::from_parameters(&params).unwrap();
        assert_eq!(h.parameters(), params);
        assert!(Homography::from_parameters(&params[..7]).is_err());
    }

    #[test]
    fn translation_scale_inverse_undoes_the_map() {
        let ts = TranslationScale::from_parameters(&[2.0, 3.0, -2.0]).unwrap();
        let p = Point2::new(1.0, 1.0);
        let q = ts.transform_point(&p);
        assert_abs_diff_eq!(q, Point2::new(5.0, 0.0));
        assert_abs_diff_eq!(ts.inverse().unwrap().transform_point(&q), p, epsilon = 1e-12);
        assert!(TranslationScale::new(0.0, Vector2::zeros()).inverse().is_none());
        assert_abs_diff_eq!(ts.matrix() * p.to_homogeneous(), q.to_homogeneous());
    }

    #[test]
    fn fundamental_view_exposes_lines_and_epipoles() {
        let (data, f_true) = calibrated_views(6);
        let f = FundamentalMatrix::from_parameters(
            &(0..9).map(|k| f_true[(k / 3, k % 3)]).collect::<Vec<_>>(),
        )
        .unwrap();

        for i in 0..data.len() {
            let (p1, p2) = data.pair(i);
            assert_abs_diff_eq!(f.epipolar_constraint(p1, p2), 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(f.swapped().epipolar_constraint(p2, p1), 0.0, epsilon = 1e-12);
        }

        let sigma = f.singular_values();
        assert!(sigma[0] >= sigma[1] && sigma[1] >= sigma[2]);
        assert!(sigma[2] < 1e-12);

        let e = f.epipoles(EpipoleMethod::ThreeDof).unwrap();
        let e1 = match e.first {
            Epipole::Finite(p) => p,
            Epipole::AtInfinity(v) => panic!("unexpected epipole at infinity {v:?}"),
        };
        // Every epipolar line in the first view passes through the first epipole.
        let (_, p2) = data.pair(0);
        assert_abs_diff_eq!(f.epipolar_line_first(p2).dot(&e1.to_homogeneous()), 0.0, epsilon = 1e-12);
    }
}
