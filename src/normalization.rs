//! Isotropic point set normalization.
//!
//! Each view is centred on its centroid and scaled uniformly so that the mean
//! distance to the origin hits a target value (√2 by default). Linear solvers
//! are far better conditioned on such data; the [`Normalization`] record lets a
//! model map its parameters back to raw coordinates afterwards.

use crate::error::{EstimationError, Result};
use crate::types::Correspondences;
use nalgebra::{Matrix3, Point2, Vector2};

/// Mean distances below this are treated as coincident points.
const MIN_MEAN_DISTANCE: f64 = 1e-10;

/// Similarity applied to one point set: `normalized = scale * raw + shift`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub scale: f64,
    pub shift: Vector2<f64>,
}

impl Default for Normalization {
    fn default() -> Self {
        Self::identity()
    }
}

impl Normalization {
    pub fn identity() -> Self {
        Self {
            scale: 1.0,
            shift: Vector2::zeros(),
        }
    }

    #[inline]
    pub fn normalize_point(&self, p: &Point2<f64>) -> Point2<f64> {
        Point2::from(p.coords * self.scale + self.shift)
    }

    #[inline]
    pub fn denormalize_point(&self, p: &Point2<f64>) -> Point2<f64> {
        Point2::from((p.coords - self.shift) / self.scale)
    }

    /// Homogeneous form `T` with `T * [raw; 1] = [normalized; 1]`.
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.scale,
            0.0,
            self.shift.x,
            0.0,
            self.scale,
            self.shift.y,
            0.0,
            0.0,
            1.0,
        )
    }

    /// Homogeneous form of the inverse map, `T⁻¹`.
    pub fn inverse_matrix(&self) -> Matrix3<f64> {
        let inv = 1.0 / self.scale;
        Matrix3::new(
            inv,
            0.0,
            -self.shift.x * inv,
            0.0,
            inv,
            -self.shift.y * inv,
            0.0,
            0.0,
            1.0,
        )
    }
}

/// Strategy producing a normalized copy of a point set and its record.
pub trait PointSetNormalizer: Send + Sync {
    fn apply(&self, points: &[Point2<f64>]) -> Result<(Vec<Point2<f64>>, Normalization)>;
}

/// Centroid-to-origin, uniform-scale normalizer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsotropicNormalizer {
    /// Mean distance of the normalized points to the origin.
    pub average_distance: f64,
}

impl Default for IsotropicNormalizer {
    fn default() -> Self {
        Self {
            average_distance: std::f64::consts::SQRT_2,
        }
    }
}

impl IsotropicNormalizer {
    pub fn new(average_distance: f64) -> Self {
        Self { average_distance }
    }

    /// Compute the normalization record for `points` without transforming them.
    pub fn record(&self, points: &[Point2<f64>]) -> Result<Normalization> {
        self.record_iter(points.iter())
    }

    /// [`record`](Self::record) over any re-iterable sequence of points, so a
    /// selection can be normalized without copying it out.
    pub fn record_iter<'a, I>(&self, points: I) -> Result<Normalization>
    where
        I: Iterator<Item = &'a Point2<f64>> + Clone,
    {
        let (count, sum) = points
            .clone()
            .fold((0usize, Vector2::zeros()), |(n, acc), p| (n + 1, acc + p.coords));
        if count == 0 {
            return Err(EstimationError::DegenerateSample(
                "cannot normalize an empty point set".to_string(),
            ));
        }
        let n = count as f64;
        let centroid = sum / n;
        let mean_distance = points.map(|p| (p.coords - centroid).norm()).sum::<f64>() / n;

        if mean_distance < MIN_MEAN_DISTANCE || !mean_distance.is_finite() {
            return Err(EstimationError::DegenerateSample(format!(
                "points are coincident (mean distance {mean_distance:e})"
            )));
        }

        let scale = self.average_distance / mean_distance;
        Ok(Normalization {
            scale,
            shift: -centroid * scale,
        })
    }
}

impl PointSetNormalizer for IsotropicNormalizer {
    fn apply(&self, points: &[Point2<f64>]) -> Result<(Vec<Point2<f64>>, Normalization)> {
        let record = self.record(points)?;
        let normalized = points.iter().map(|p| record.normalize_point(p)).collect();
        Ok((normalized, record))
    }
}

/// Normalize both views of `data` independently.
pub fn normalize_correspondences(
    normalizer: &dyn PointSetNormalizer,
    data: &Correspondences,
) -> Result<(Correspondences, Normalization, Normalization)> {
    let (first, n1) = normalizer.apply(data.first())?;
    let (second, n2) = normalizer.apply(data.second())?;
    Ok((Correspondences::new(first, second)?, n1, n2))
}
