//! Example: Homography estimation from point correspondences
//!
//! Points on a plane seen under a known perspective warp, with noise and a
//! block of random mismatches. Run with `RUST_LOG=debug` to see the search.

use consensus_geometry::*;
use nalgebra::{DMatrix, Matrix3, Point2};
use rand::Rng;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    println!("=== Homography Estimation Example ===\n");

    let n_points = 60;
    let n_outliers = 25;
    let n_total = n_points + n_outliers;

    let truth = Matrix3::new(0.95, -0.12, 30.0, 0.08, 1.05, -12.0, 2e-4, -1e-4, 1.0);

    let mut rng = rand::thread_rng();
    let mut points1 = DMatrix::<f64>::zeros(n_total, 2);
    let mut points2 = DMatrix::<f64>::zeros(n_total, 2);

    for i in 0..n_total {
        let p = Point2::new(rng.gen_range(0.0..640.0), rng.gen_range(0.0..480.0));
        points1[(i, 0)] = p.x;
        points1[(i, 1)] = p.y;

        if i < n_points {
            let q = truth * p.to_homogeneous();
            points2[(i, 0)] = q.x / q.z + rng.gen_range(-0.5..0.5);
            points2[(i, 1)] = q.y / q.z + rng.gen_range(-0.5..0.5);
        } else {
            points2[(i, 0)] = rng.gen_range(0.0..640.0);
            points2[(i, 1)] = rng.gen_range(0.0..480.0);
        }
    }

    println!("Generated {} inliers and {} outliers\n", n_points, n_outliers);

    let mut settings = EstimationSettings::default();
    settings.ransac.max_iterations = 1000;
    settings.ransac.adaptive_contamination = true;
    settings.ransac.check_stop = false;

    // Threshold in normalized coordinates; roughly 2 px for this image size.
    let result = estimate_homography(&points1, &points2, 0.01, Some(settings))?;

    println!("Estimation results:");
    println!("  Found {} inliers out of {} points", result.inliers.len(), n_total);
    println!("  Contamination: {:.2}%", 100.0 * result.contamination);
    println!("  Trials: {}", result.trials);

    println!("\nEstimated homography matrix:");
    for i in 0..3 {
        println!(
            "  [{:10.5}, {:10.5}, {:10.5}]",
            result.model.h[(i, 0)],
            result.model.h[(i, 1)],
            result.model.h[(i, 2)]
        );
    }

    let correct_inliers = result.inliers.iter().filter(|&&idx| idx < n_points).count();
    println!(
        "\nCorrectly identified {} out of {} true inliers",
        correct_inliers, n_points
    );

    if let Some(inverse) = result.model.inverse() {
        let back = inverse.transform_point(&Point2::new(points2[(0, 0)], points2[(0, 1)]));
        println!("First point mapped back: {:?}", back.map(|p| (p.x, p.y)));
    }

    Ok(())
}
