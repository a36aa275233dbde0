//! Example: Fundamental matrix estimation from point correspondences
//!
//! Two pinhole views of a random point cloud with pixel noise and random
//! mismatches. Both rank-2 enforcement strategies are run on the same data.

use consensus_geometry::*;
use nalgebra::{DMatrix, Matrix3, Point2, Rotation3, Vector3};
use rand::Rng;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    println!("=== Fundamental Matrix Estimation Example ===\n");

    let n_points = 80;
    let n_outliers = 30;
    let n_total = n_points + n_outliers;

    let k = Matrix3::new(500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0);
    let rotation = Rotation3::from_euler_angles(0.03, -0.1, 0.02);
    let translation = Vector3::new(0.6, -0.05, 0.1);

    let mut rng = rand::thread_rng();
    let mut points1 = DMatrix::<f64>::zeros(n_total, 2);
    let mut points2 = DMatrix::<f64>::zeros(n_total, 2);

    for i in 0..n_total {
        let x = Vector3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(4.0..8.0),
        );
        let p1 = k * x;
        let p2 = k * (rotation * x + translation);
        points1[(i, 0)] = p1.x / p1.z + rng.gen_range(-0.3..0.3);
        points1[(i, 1)] = p1.y / p1.z + rng.gen_range(-0.3..0.3);

        if i < n_points {
            points2[(i, 0)] = p2.x / p2.z + rng.gen_range(-0.3..0.3);
            points2[(i, 1)] = p2.y / p2.z + rng.gen_range(-0.3..0.3);
        } else {
            points2[(i, 0)] = rng.gen_range(0.0..640.0);
            points2[(i, 1)] = rng.gen_range(0.0..480.0);
        }
    }

    println!("Generated {} inliers and {} outliers\n", n_points, n_outliers);

    for enforcement in [Rank2Enforcement::Frobenius, Rank2Enforcement::TParameterization] {
        let mut settings = EstimationSettings::for_model(ModelKind::FundamentalMatrix);
        settings.fundamental.rank2_enforcement = enforcement;
        settings.fundamental.distance_measure = DistanceMeasure::Sampson;
        settings.ransac.max_iterations = 2000;
        settings.ransac.adaptive_contamination = true;
        settings.ransac.check_stop = false;

        let result = estimate_fundamental_matrix(&points1, &points2, 0.01, Some(settings))?;

        println!("{enforcement:?}:");
        println!("  Found {} inliers out of {} points", result.inliers.len(), n_total);
        println!("  Trials: {}", result.trials);
        for i in 0..3 {
            println!(
                "  [{:12.8}, {:12.8}, {:12.8}]",
                result.model.f[(i, 0)],
                result.model.f[(i, 1)],
                result.model.f[(i, 2)]
            );
        }

        let sv = result.model.singular_values();
        println!("  Singular values: [{:.3e}, {:.3e}, {:.3e}]", sv[0], sv[1], sv[2]);

        let epipoles = result.model.epipoles(EpipoleMethod::ThreeDof)?;
        println!("  Epipoles: {:?} / {:?}", epipoles.first, epipoles.second);

        let correct_inliers = result.inliers.iter().filter(|&&idx| idx < n_points).count();
        println!(
            "  Correctly identified {} out of {} true inliers",
            correct_inliers, n_points
        );

        let p1 = Point2::new(points1[(0, 0)], points1[(0, 1)]);
        let line = result.model.epipolar_line(&p1);
        println!("  Epipolar line of the first point: {:?}\n", (line.x, line.y, line.z));
    }

    Ok(())
}
