//! Core shared types: correspondence sets and parameter vectors.
//!
//! All numerics run in `f64`. Point data of other precisions (single precision,
//! integer pixel positions) enters through [`Correspondences::from_pairs`], so
//! the models and estimators only ever see one point type.

use crate::error::{EstimationError, Result};
use nalgebra::{DMatrix, Point2};

/// Flat transform parameter vector. Length and meaning depend on the model.
pub type Parameters = Vec<f64>;

/// Index-aligned pairs of 2D points observed in two views.
///
/// Index `i` of [`first`](Self::first) and [`second`](Self::second) refers to the
/// same physical feature.
#[derive(Debug, Clone, PartialEq)]
pub struct Correspondences {
    first: Vec<Point2<f64>>,
    second: Vec<Point2<f64>>,
}

impl Correspondences {
    pub fn new(first: Vec<Point2<f64>>, second: Vec<Point2<f64>>) -> Result<Self> {
        if first.len() != second.len() {
            return Err(EstimationError::MismatchedSets {
                first: first.len(),
                second: second.len(),
            });
        }
        Ok(Self { first, second })
    }

    /// Build a set from `[x, y]` pairs of any scalar type convertible to `f64`.
    pub fn from_pairs<S>(first: &[[S; 2]], second: &[[S; 2]]) -> Result<Self>
    where
        S: Copy + Into<f64>,
    {
        let convert = |pts: &[[S; 2]]| -> Vec<Point2<f64>> {
            pts.iter()
                .map(|p| Point2::new(p[0].into(), p[1].into()))
                .collect()
        };
        Self::new(convert(first), convert(second))
    }

    /// Build a set from two N×2 matrices (one row per point).
    pub fn from_matrices(points1: &DMatrix<f64>, points2: &DMatrix<f64>) -> Result<Self> {
        if points1.ncols() != 2 || points2.ncols() != 2 {
            return Err(EstimationError::Config(format!(
                "points must be Nx2 matrices, got {}x{} and {}x{}",
                points1.nrows(),
                points1.ncols(),
                points2.nrows(),
                points2.ncols()
            )));
        }
        let rows = |m: &DMatrix<f64>| -> Vec<Point2<f64>> {
            (0..m.nrows())
                .map(|i| Point2::new(m[(i, 0)], m[(i, 1)]))
                .collect()
        };
        Self::new(rows(points1), rows(points2))
    }

    pub fn len(&self) -> usize {
        self.first.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_empty()
    }

    /// Points of the first view.
    pub fn first(&self) -> &[Point2<f64>] {
        &self.first
    }

    /// Points of the second view.
    pub fn second(&self) -> &[Point2<f64>] {
        &self.second
    }

    /// The `i`-th correspondence.
    #[inline]
    pub fn pair(&self, i: usize) -> (&Point2<f64>, &Point2<f64>) {
        (&self.first[i], &self.second[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatched_lengths_are_rejected() {
        let err = Correspondences::new(vec![Point2::origin(); 3], vec![Point2::origin(); 2])
            .unwrap_err();
        assert_eq!(
            err,
            EstimationError::MismatchedSets {
                first: 3,
                second: 2
            }
        );
    }

    #[test]
    fn integer_and_single_precision_points_are_widened() {
        let ints = Correspondences::from_pairs(&[[1i32, 2], [3, 4]], &[[5i32, 6], [7, 8]]).unwrap();
        let floats =
            Correspondences::from_pairs(&[[1.0f32, 2.0], [3.0, 4.0]], &[[5.0f32, 6.0], [7.0, 8.0]])
                .unwrap();
        assert_eq!(ints, floats);
        assert_eq!(ints.pair(1), (&Point2::new(3.0, 4.0), &Point2::new(7.0, 8.0)));
    }

    #[test]
    fn matrices_must_have_two_columns() {
        let good = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, 2.0, 3.0]);
        let bad = DMatrix::zeros(2, 3);
        assert!(Correspondences::from_matrices(&good, &good).is_ok());
        assert!(matches!(
            Correspondences::from_matrices(&good, &bad),
            Err(EstimationError::Config(_))
        ));
    }
}
