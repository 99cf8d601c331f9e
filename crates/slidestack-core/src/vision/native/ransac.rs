//! RANSAC homography estimation.
//!
//! Minimal 4-point DLT hypotheses are scored by inlier count (ties broken by
//! total squared error), the best hypothesis is refit on all of its inliers,
//! and the iteration budget shrinks adaptively as the inlier ratio improves.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::consts::{MIN_HOMOGRAPHY_DETERMINANT, RANSAC_CONFIDENCE};
use crate::geometry::Point2;
use crate::transform::{fit_homography, Homography};

const SAMPLE_SIZE: usize = 4;

#[derive(Clone, Debug)]
pub struct RansacParams {
    /// Reprojection error (pixels) below which a correspondence is an inlier.
    pub tolerance_px: f64,
    pub max_iterations: usize,
    pub seed: u64,
}

#[derive(Clone, Debug)]
pub struct RansacFit {
    pub homography: Homography,
    pub inliers: Vec<usize>,
    pub iterations: usize,
}

fn score(h: &Homography, from: &[Point2], to: &[Point2], tol_sq: f64) -> (Vec<usize>, f64) {
    let mut inliers = Vec::new();
    let mut error = 0.0;
    for (i, (p, q)) in from.iter().zip(to).enumerate() {
        if let Some(m) = h.apply(*p) {
            let d = m.distance_squared(q);
            if d <= tol_sq {
                inliers.push(i);
                error += d;
            }
        }
    }
    (inliers, error)
}

fn adaptive_iterations(inlier_ratio: f64) -> usize {
    let p_good = inlier_ratio.powi(SAMPLE_SIZE as i32);
    if p_good >= 1.0 - f64::EPSILON {
        return 1;
    }
    if p_good <= f64::EPSILON {
        return usize::MAX;
    }
    ((1.0 - RANSAC_CONFIDENCE).ln() / (1.0 - p_good).ln()).ceil() as usize
}

fn acceptable(h: &Homography) -> bool {
    h.is_finite() && h.determinant().abs() >= MIN_HOMOGRAPHY_DETERMINANT
}

/// Robustly fit a homography mapping `from[i]` onto `to[i]`.
///
/// Returns `None` with fewer than four correspondences, when no hypothesis
/// gathers four inliers, or when the result is degenerate.
pub fn estimate(from: &[Point2], to: &[Point2], params: &RansacParams) -> Option<RansacFit> {
    let n = from.len();
    if n < SAMPLE_SIZE || n != to.len() {
        return None;
    }
    let tol_sq = params.tolerance_px * params.tolerance_px;
    let mut rng = StdRng::seed_from_u64(params.seed);

    let mut best: Option<(Homography, Vec<usize>, f64)> = None;
    let mut budget = params.max_iterations.max(1);
    let mut iterations = 0;

    while iterations < budget {
        iterations += 1;
        let sample = rand::seq::index::sample(&mut rng, n, SAMPLE_SIZE);
        let sample_from: Vec<Point2> = sample.iter().map(|i| from[i]).collect();
        let sample_to: Vec<Point2> = sample.iter().map(|i| to[i]).collect();

        let Some(h) = fit_homography(&sample_from, &sample_to, None) else {
            continue;
        };
        if !acceptable(&h) {
            continue;
        }

        let (inliers, error) = score(&h, from, to, tol_sq);
        let better = match &best {
            None => true,
            Some((_, best_inliers, best_error)) => {
                inliers.len() > best_inliers.len()
                    || (inliers.len() == best_inliers.len() && error < *best_error)
            }
        };
        if better {
            let ratio = inliers.len() as f64 / n as f64;
            budget = budget.min(adaptive_iterations(ratio).max(1));
            best = Some((h, inliers, error));
        }
    }

    let (hypothesis, inliers, _) = best?;
    if inliers.len() < SAMPLE_SIZE {
        return None;
    }

    let inlier_from: Vec<Point2> = inliers.iter().map(|&i| from[i]).collect();
    let inlier_to: Vec<Point2> = inliers.iter().map(|&i| to[i]).collect();
    let refined = fit_homography(&inlier_from, &inlier_to, None)
        .filter(acceptable)
        .unwrap_or(hypothesis);
    let (final_inliers, _) = score(&refined, from, to, tol_sq);

    debug!(
        iterations,
        inliers = final_inliers.len(),
        total = n,
        "RANSAC homography"
    );

    (final_inliers.len() >= SAMPLE_SIZE && acceptable(&refined)).then_some(RansacFit {
        homography: refined,
        inliers: final_inliers,
        iterations,
    })
}
