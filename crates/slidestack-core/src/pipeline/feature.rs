//! Automatic registration: keypoints on every image are matched against the
//! source image and a homography maps each image into the source frame.

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::consts::{
    KNN_NEIGHBOURS, MIN_GOOD_MATCHES, MIN_HOMOGRAPHY_DETERMINANT, MIN_IMAGES,
    PARALLEL_IMAGE_THRESHOLD,
};
use crate::error::{AlignmentFailure, InputError, Result, SlideStackError};
use crate::geometry::{OffsetVector, Point2};
use crate::image::SlideImage;
use crate::offsets::{compute_offsets, PlacementReference};
use crate::transform::Homography;
use crate::vision::{FeatureMatch, Features, Interpolation, VisionBackend, WarpModel, WarpedImage};

use super::session::AlignmentSession;
use super::types::{ProgressReporter, RunStage, SkippedImage};
use super::{RegisteredImage, Registration};

/// Lowe's ratio test over k-NN results: keep the best neighbour iff its
/// distance is strictly below `ratio` times the second best. Entries with
/// fewer than two neighbours are dropped.
pub fn filter_good_matches(knn: &[Vec<FeatureMatch>], ratio: f32) -> Vec<FeatureMatch> {
    knn.iter()
        .filter_map(|neighbours| match neighbours.as_slice() {
            [best, second, ..] if best.distance < ratio * second.distance => Some(*best),
            _ => None,
        })
        .collect()
}

type Outcome = std::result::Result<(Homography, WarpedImage), AlignmentFailure>;

/// Warp failures caused by the estimated geometry are per-image failures;
/// anything else aborts the run.
fn warp_failure(err: SlideStackError) -> Result<AlignmentFailure> {
    match err {
        SlideStackError::Warp(msg) => Ok(AlignmentFailure::HomographyFailed(msg)),
        SlideStackError::Resource(e) => Ok(AlignmentFailure::HomographyFailed(e.to_string())),
        other => Err(other),
    }
}

fn register_one(
    backend: &dyn VisionBackend,
    image: &SlideImage,
    source: &Features,
    ratio: f32,
    tolerance_px: f64,
) -> Result<Outcome> {
    let features = backend.detect_and_describe(&image.luminance())?;
    let knn = backend.knn_match(&features, source, KNN_NEIGHBOURS);
    let good = filter_good_matches(&knn, ratio);
    debug!(
        name = %image.name,
        keypoints = features.len(),
        good_matches = good.len(),
        "matched against source"
    );
    if good.len() < MIN_GOOD_MATCHES {
        return Ok(Err(AlignmentFailure::InsufficientMatches {
            found: good.len(),
            required: MIN_GOOD_MATCHES,
        }));
    }

    let from: Vec<Point2> = good
        .iter()
        .map(|m| features.keypoints[m.query_idx].position)
        .collect();
    let to: Vec<Point2> = good
        .iter()
        .map(|m| source.keypoints[m.train_idx].position)
        .collect();

    let Some(h) = backend.estimate_homography(&from, &to, tolerance_px) else {
        return Ok(Err(AlignmentFailure::HomographyFailed(
            "no consistent homography".into(),
        )));
    };
    if !h.is_finite() || h.determinant().abs() < MIN_HOMOGRAPHY_DETERMINANT {
        return Ok(Err(AlignmentFailure::HomographyFailed(format!(
            "degenerate homography (det = {:.3e})",
            h.determinant()
        ))));
    }

    match backend.warp_mesh(image, &WarpModel::Homography(h), Interpolation::Bilinear) {
        Ok(warped) => Ok(Ok((h, warped))),
        Err(e) => Ok(Err(warp_failure(e)?)),
    }
}

/// Register every image onto the source by feature matching.
///
/// Images that cannot be matched are reported as skipped; the run fails only
/// when the source itself offers too few keypoints to match anything.
pub fn register_features(
    session: &AlignmentSession,
    reporter: &dyn ProgressReporter,
) -> Result<Registration> {
    let images = session.images();
    if images.len() < MIN_IMAGES {
        return Err(InputError::TooFewImages {
            required: MIN_IMAGES,
            found: images.len(),
        }
        .into());
    }
    let source_index = session.source_index()?;
    let source_image = &images[source_index];
    let backend = session.backend();
    let config = &session.config.features;

    reporter.begin_stage(RunStage::DetectingFeatures, Some(1));
    let source_features = backend.detect_and_describe(&source_image.luminance())?;
    reporter.advance(1);
    reporter.finish_stage();
    info!(
        keypoints = source_features.len(),
        backend = backend.name(),
        "Source features detected"
    );
    if source_features.len() < MIN_GOOD_MATCHES {
        return Err(SlideStackError::EmptyResult("not enough matches".into()));
    }

    let tolerance_px =
        config.inlier_threshold * source_image.width().max(source_image.height()) as f64;
    let others: Vec<usize> = (0..images.len()).filter(|&i| i != source_index).collect();

    reporter.begin_stage(RunStage::Registering, Some(others.len()));
    let counter = AtomicUsize::new(0);
    let run = |i: usize| -> Result<(usize, Outcome)> {
        let outcome = register_one(
            backend,
            &images[i],
            &source_features,
            config.match_ratio,
            tolerance_px,
        )?;
        let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
        reporter.advance(done);
        Ok((i, outcome))
    };
    let outcomes: Vec<Result<(usize, Outcome)>> = if images.len() >= PARALLEL_IMAGE_THRESHOLD {
        others.par_iter().map(|&i| run(i)).collect()
    } else {
        others.iter().map(|&i| run(i)).collect()
    };
    reporter.finish_stage();

    let mut aligned = vec![(
        RegisteredImage {
            index: source_index,
            warped: WarpedImage::identity(source_image.clone()),
            origin: OffsetVector::ZERO,
            original_origin: None,
        },
        Homography::identity(),
    )];
    let mut skipped = Vec::new();

    for result in outcomes {
        let (i, outcome) = result?;
        match outcome {
            Ok((h, warped)) => aligned.push((
                RegisteredImage {
                    index: i,
                    origin: OffsetVector::new(warped.bounds.x, warped.bounds.y),
                    warped,
                    original_origin: None,
                },
                h,
            )),
            Err(reason) => {
                let skip = SkippedImage {
                    index: i,
                    name: images[i].name.clone(),
                    reason,
                };
                warn!(index = i, name = %skip.name, reason = %skip.reason, "Image skipped");
                reporter.image_skipped(&skip);
                skipped.push(skip);
            }
        }
    }
    aligned.sort_by_key(|(r, _)| r.index);
    let (registered, transforms): (Vec<RegisteredImage>, Vec<Homography>) =
        aligned.into_iter().unzip();

    reporter.begin_stage(RunStage::ComputingOffsets, None);
    let placed: Vec<usize> = registered.iter().map(|r| r.index).collect();
    let dimensions: Vec<_> = placed.iter().map(|&i| images[i].dimensions()).collect();
    let bounds: Vec<_> = registered.iter().map(|r| r.warped.bounds).collect();
    let source_pos = registered
        .iter()
        .position(|r| r.index == source_index)
        .unwrap_or(0);
    let table = compute_offsets(
        &dimensions,
        PlacementReference::Transforms {
            transforms: &transforms,
            warped_bounds: &bounds,
        },
        source_pos,
    )?
    .with_image_indices(&placed);
    reporter.finish_stage();

    info!(
        aligned = registered.len(),
        skipped = skipped.len(),
        canvas = %table.canvas,
        "Feature registration complete"
    );

    Ok(Registration {
        source_index,
        registered,
        skipped,
        table,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(distance: f32) -> FeatureMatch {
        FeatureMatch {
            query_idx: 0,
            train_idx: 0,
            distance,
        }
    }

    #[test]
    fn ratio_boundary_is_exclusive() {
        let knn = vec![vec![m(0.75), m(1.0)], vec![m(0.7499), m(1.0)]];
        let good = filter_good_matches(&knn, 0.75);
        assert_eq!(good.len(), 1);
        assert_eq!(good[0].distance, 0.7499);
    }

    #[test]
    fn single_neighbour_is_dropped() {
        let knn = vec![vec![m(0.1)], vec![]];
        assert!(filter_good_matches(&knn, 0.75).is_empty());
    }
}
