//! Rank-2 enforcement and epipoles of fundamental matrices.
//!
//! The linear solve of the fundamental model yields a full-rank candidate.
//! [`enforce_rank2`] turns it into a singular matrix, either by zeroing the
//! smallest singular value ([`frobenius`]) or by the T-parameterization
//! ([`t_parameterization`]): for one of nine pivot placements, the pivot row
//! and column are rebuilt as combinations of the others, weighted by the
//! epipoles of the permuted matrix. Both functions take the *transposed*
//! candidate produced by the normal equations and return `F` itself.

use log::trace;
use nalgebra::{Matrix2, Matrix3, Matrix3x2, Point2, Vector3};

use crate::error::{EstimationError, Result};
use crate::settings::{EpipoleMethod, Rank2Enforcement};
use crate::utils::solve_3x2_pseudo_inverse;

/// Ranks the admissible pivot placements of the T-parameterization.
///
/// Receives the 2×2 block of the permuted matrix that is kept as is, and the
/// right (`lambda`) and left (`mu`) epipoles of the permuted matrix as
/// `[x, y, 1]`. The placement with the highest score wins.
pub type PermutationScore = fn(&Matrix2<f64>, &Vector3<f64>, &Vector3<f64>) -> f64;

/// An epipole, finite or at infinity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Epipole {
    Finite(Point2<f64>),
    /// Direction of an epipole whose homogeneous third coordinate vanishes.
    AtInfinity(Vector3<f64>),
}

impl Epipole {
    pub fn is_at_infinity(&self) -> bool {
        matches!(self, Epipole::AtInfinity(_))
    }

    pub fn homogeneous(&self) -> Vector3<f64> {
        match self {
            Epipole::Finite(p) => p.to_homogeneous(),
            Epipole::AtInfinity(v) => *v,
        }
    }
}

/// Epipoles of a fundamental matrix: `F * first = 0` and `secondᵀ * F = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Epipoles {
    pub first: Epipole,
    pub second: Epipole,
}

/// Dehomogenize `v`, or report it at infinity when its third coordinate is
/// within machine epsilon of zero.
pub fn normalize_epipole(v: Vector3<f64>) -> Epipole {
    if v.z.abs() <= f64::EPSILON {
        Epipole::AtInfinity(v)
    } else {
        Epipole::Finite(Point2::new(v.x / v.z, v.y / v.z))
    }
}

/// Epipoles of `f` computed with `method`.
pub fn epipoles(f: &Matrix3<f64>, method: EpipoleMethod) -> Result<Epipoles> {
    let (right, left) = null_vectors(f, method)?;
    Ok(Epipoles {
        first: normalize_epipole(right),
        second: normalize_epipole(left),
    })
}

/// Homogeneous right and left null vectors of `m`.
fn null_vectors(m: &Matrix3<f64>, method: EpipoleMethod) -> Result<(Vector3<f64>, Vector3<f64>)> {
    match method {
        EpipoleMethod::ThreeDof => {
            let svd = m.svd(true, true);
            let (u, v_t) = match (svd.u, svd.v_t) {
                (Some(u), Some(v_t)) => (u, v_t),
                _ => {
                    return Err(EstimationError::NumericalSingularity(
                        "epipole SVD did not converge".to_string(),
                    ))
                }
            };
            let smallest = svd.singular_values.imin();
            Ok((v_t.row(smallest).transpose(), u.column(smallest).into_owned()))
        }
        EpipoleMethod::TwoDof => {
            let columns = Matrix3x2::from_columns(&[m.column(0), m.column(1)]);
            let right = solve_3x2_pseudo_inverse(&columns, &(-m.column(2)), f64::EPSILON);
            let rows = Matrix3x2::from_columns(&[m.row(0).transpose(), m.row(1).transpose()]);
            let left = solve_3x2_pseudo_inverse(&rows, &(-m.row(2).transpose()), f64::EPSILON);
            match (right, left) {
                (Some(r), Some(l)) => Ok((Vector3::new(r.x, r.y, 1.0), Vector3::new(l.x, l.y, 1.0))),
                _ => Err(EstimationError::NumericalSingularity(
                    "epipole system has rank below two".to_string(),
                )),
            }
        }
    }
}

/// Force the transposed candidate to rank 2 and return `F`.
pub fn enforce_rank2(
    transposed: &Matrix3<f64>,
    policy: Rank2Enforcement,
    method: EpipoleMethod,
    score: PermutationScore,
) -> Result<Matrix3<f64>> {
    match policy {
        Rank2Enforcement::Frobenius => frobenius(transposed),
        Rank2Enforcement::TParameterization => t_parameterization(transposed, method, score),
    }
}

/// Closest rank-2 matrix in Frobenius norm, transposed back to `F`.
pub fn frobenius(transposed: &Matrix3<f64>) -> Result<Matrix3<f64>> {
    let svd = transposed.svd(true, true);
    let (u, v_t) = match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => (u, v_t),
        _ => {
            return Err(EstimationError::NumericalSingularity(
                "rank-2 SVD did not converge".to_string(),
            ))
        }
    };
    let mut sigma = svd.singular_values;
    let smallest = sigma.imin();
    sigma[smallest] = 0.0;
    Ok((u * Matrix3::from_diagonal(&sigma) * v_t).transpose())
}

/// Default [`PermutationScore`]: favours well-conditioned kept blocks and
/// small epipole coordinates. `minor` must not be all zero.
pub fn conditioning_score(minor: &Matrix2<f64>, lambda: &Vector3<f64>, mu: &Vector3<f64>) -> f64 {
    let a = minor / minor.amax();
    let cross = a[(0, 1)] * a[(1, 0)] + a[(0, 0)] * a[(1, 1)];
    cross * cross + lambda.norm() * mu.norm()
}

/// T-parameterization over all nine pivot placements.
///
/// A placement is skipped when its kept block vanishes or when either epipole
/// of the permuted matrix lies at infinity. Fails with
/// [`EstimationError::NumericalSingularity`] if no placement is admissible.
pub fn t_parameterization(
    transposed: &Matrix3<f64>,
    method: EpipoleMethod,
    score: PermutationScore,
) -> Result<Matrix3<f64>> {
    let f = transposed.transpose();
    let mut best: Option<(f64, Matrix3<f64>)> = None;

    for row in 0..3 {
        for col in 0..3 {
            let rows = [(row + 1) % 3, (row + 2) % 3, row];
            let cols = [(col + 1) % 3, (col + 2) % 3, col];
            let s = Matrix3::from_fn(|r, c| f[(rows[r], cols[c])]);

            let minor = s.fixed_view::<2, 2>(0, 0).into_owned();
            if minor.amax() < f64::EPSILON {
                trace!("pivot ({row}, {col}): kept block vanishes");
                continue;
            }

            let (lambda, mu) = match null_vectors(&s, method) {
                Ok((right, left)) => match (normalize_epipole(right), normalize_epipole(left)) {
                    (Epipole::Finite(l), Epipole::Finite(m)) => (l.to_homogeneous(), m.to_homogeneous()),
                    _ => {
                        trace!("pivot ({row}, {col}): epipole at infinity");
                        continue;
                    }
                },
                Err(err) => {
                    trace!("pivot ({row}, {col}): {err}");
                    continue;
                }
            };

            let value = score(&minor, &lambda, &mu);
            if best.as_ref().map_or(true, |(b, _)| value > *b) {
                best = Some((value, rebuild(&s, &rows, &cols, &lambda, &mu)));
            }
        }
    }

    best.map(|(_, f)| f).ok_or_else(|| {
        EstimationError::NumericalSingularity(
            "no admissible pivot for the T-parameterization".to_string(),
        )
    })
}

/// Undo the permutation, replacing the pivot row and column so that
/// `lambda` and `mu` become exact null vectors.
fn rebuild(
    s: &Matrix3<f64>,
    rows: &[usize; 3],
    cols: &[usize; 3],
    lambda: &Vector3<f64>,
    mu: &Vector3<f64>,
) -> Matrix3<f64> {
    let (row, col) = (rows[2], cols[2]);
    let mut f = Matrix3::zeros();
    for r in 0..2 {
        for c in 0..2 {
            f[(rows[r], cols[c])] = s[(r, c)];
        }
        f[(rows[r], col)] = -(lambda[0] * s[(r, 0)] + lambda[1] * s[(r, 1)]);
    }
    for c in 0..2 {
        f[(row, cols[c])] = -(mu[0] * s[(0, c)] + mu[1] * s[(1, c)]);
    }
    f[(row, col)] = -(mu[0] * f[(rows[0], col)] + mu[1] * f[(rows[1], col)]);
    f
}
