//! Example: Translation + scale estimation with RANSAC and LMedS
//!
//! Runs both robust estimators on the same data. LMedS needs no inlier
//! threshold; it derives one from the best median residual.

use consensus_geometry::*;
use nalgebra::{Point2, Vector2};
use rand::Rng;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    println!("=== Translation + Scale Example ===\n");

    let n_points = 50;
    let n_outliers = 20;
    let scale = 1.7;
    let shift = Vector2::new(-12.0, 40.0);

    let mut rng = rand::thread_rng();
    let mut first = Vec::new();
    let mut second = Vec::new();
    for i in 0..n_points + n_outliers {
        let p = Point2::new(rng.gen_range(-200.0..200.0), rng.gen_range(-200.0..200.0));
        let q = if i < n_points {
            Point2::from(p.coords * scale + shift)
                + Vector2::new(rng.gen_range(-0.5..0.5), rng.gen_range(-0.5..0.5))
        } else {
            Point2::new(rng.gen_range(-300.0..300.0), rng.gen_range(-300.0..300.0))
        };
        first.push(p);
        second.push(q);
    }
    let data = Correspondences::new(first, second)?;

    println!("True model: scale {scale}, translation ({}, {})\n", shift.x, shift.y);

    let mut settings = EstimationSettings::for_model(ModelKind::TranslationScale);
    settings.ransac.max_error = 0.02;
    settings.ransac.adaptive_contamination = true;
    settings.ransac.max_iterations = 500;

    let ransac = RansacEstimator::from_settings(&settings)?.apply(&data)?;
    report("RANSAC", &ransac, n_points)?;

    let lmeds = LmedsEstimator::from_settings(&settings)?.apply(&data)?;
    report("LMedS", &lmeds, n_points)?;

    Ok(())
}

fn report(label: &str, estimate: &Estimate, n_points: usize) -> Result<()> {
    let model = TranslationScale::from_parameters(&estimate.parameters)?;
    let correct = estimate.inliers.iter().filter(|&&i| i < n_points).count();
    println!("{label}:");
    println!(
        "  scale {:.4}, translation ({:.3}, {:.3})",
        model.scale, model.translation.x, model.translation.y
    );
    println!(
        "  {} inliers ({} true), {} trials",
        estimate.inliers.len(),
        correct,
        estimate.trials
    );
    if !estimate.bound_history.is_empty() {
        println!("  trial bound updates: {}", estimate.bound_history.len());
    }
    println!();
    Ok(())
}
