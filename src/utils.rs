//! Miscellaneous numeric helpers shared by the models and estimators.

use nalgebra::{DMatrix, DVector, Matrix3x2, Vector2, Vector3};
use rand::prelude::*;

/// Pivots below this magnitude make [`gauss_elimination`] give up.
const PIVOT_EPSILON: f64 = 1e-10;

/// Seeded generator when `seed` is given, entropy-seeded otherwise.
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Gaussian elimination with partial pivoting to solve `A * x = b`.
///
/// `augmented` holds `[A | b]` with `A` square; it is overwritten. Returns
/// `false` when a pivot vanishes, i.e. `A` is singular.
pub fn gauss_elimination(augmented: &mut DMatrix<f64>, result: &mut DVector<f64>) -> bool {
    let n = augmented.nrows();
    if n + 1 != augmented.ncols() || n != result.len() {
        return false;
    }

    for i in 0..n {
        let mut max_row = i;
        let mut max_val = augmented[(i, i)].abs();
        for k in (i + 1)..n {
            let val = augmented[(k, i)].abs();
            if val > max_val {
                max_val = val;
                max_row = k;
            }
        }

        if max_row != i {
            augmented.swap_rows(i, max_row);
        }

        if augmented[(i, i)].abs() < PIVOT_EPSILON {
            return false;
        }

        for k in (i + 1)..n {
            let factor = augmented[(k, i)] / augmented[(i, i)];
            for j in i..=n {
                augmented[(k, j)] -= factor * augmented[(i, j)];
            }
        }
    }

    for i in (0..n).rev() {
        result[i] = augmented[(i, n)];
        for j in (i + 1)..n {
            result[i] -= augmented[(i, j)] * result[j];
        }
        result[i] /= augmented[(i, i)];
    }

    true
}

/// Least-squares solution of the 3×2 system `a * x = b` through the SVD
/// pseudo-inverse. Singular values at or below `eps` are treated as zero;
/// `None` if fewer than two survive.
pub fn solve_3x2_pseudo_inverse(a: &Matrix3x2<f64>, b: &Vector3<f64>, eps: f64) -> Option<Vector2<f64>> {
    let svd = a.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let max_sv = svd.singular_values.max();
    let mut x = Vector2::zeros();
    for k in 0..2 {
        let s = svd.singular_values[k];
        if s <= eps * max_sv.max(1.0) {
            return None;
        }
        let coeff = u.column(k).dot(b) / s;
        x += v_t.row(k).transpose() * coeff;
    }
    Some(x)
}

/// Number of trials that draw one all-inlier sample of `sample_size` with
/// probability `confidence`, given an outlier fraction `contamination`.
///
/// Returns `1` for a clean data set and `usize::MAX` when no finite bound
/// exists. The result is non-increasing as `contamination` decreases.
pub fn required_trials(confidence: f64, contamination: f64, sample_size: usize) -> usize {
    let good_sample = (1.0 - contamination.clamp(0.0, 1.0)).powi(sample_size as i32);
    if good_sample >= 1.0 - f64::EPSILON {
        return 1;
    }
    if good_sample <= 0.0 {
        return usize::MAX;
    }

    let log_one_minus_conf = (1.0 - confidence).ln();
    let log_one_minus_p = (1.0 - good_sample).ln();
    if !log_one_minus_conf.is_finite() || !log_one_minus_p.is_finite() || log_one_minus_p >= 0.0 {
        return usize::MAX;
    }

    let required = (log_one_minus_conf / log_one_minus_p).ceil().max(1.0);
    if required >= usize::MAX as f64 {
        usize::MAX
    } else {
        required as usize
    }
}

/// Median of `values`, reordering the slice in place. `None` when empty.
pub fn median_in_place(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mid = values.len() / 2;
    let (_, m, _) = values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
    Some(*m)
}
