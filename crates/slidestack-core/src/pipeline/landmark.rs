//! Manual registration: each image is deformed so its landmarks land on the
//! source image's landmarks.

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use tracing::{info, warn};

use crate::consts::PARALLEL_IMAGE_THRESHOLD;
use crate::error::{AlignmentFailure, Result, SlideStackError};
use crate::geometry::{OffsetVector, Rect};
use crate::image::SlideImage;
use crate::landmarks::{validate_landmarks, LandmarkSet};
use crate::offsets::{compute_offsets, PlacementReference};
use crate::transform::{fit_model, TransformModel};
use crate::vision::{Interpolation, MlsModel, VisionBackend, WarpModel, WarpedImage};

use super::config::MeshConfig;
use super::session::AlignmentSession;
use super::types::{ProgressReporter, RunStage, SkippedImage};
use super::{RegisteredImage, Registration};

fn warp_one(
    backend: &dyn VisionBackend,
    image: &SlideImage,
    landmarks: &LandmarkSet,
    source_landmarks: &LandmarkSet,
    model: TransformModel,
    mesh: &MeshConfig,
) -> Result<std::result::Result<WarpedImage, AlignmentFailure>> {
    // A global fit exposes collinear or coincident landmarks before the
    // local fits are attempted.
    if fit_model(model, &landmarks.points, &source_landmarks.points, None).is_none() {
        return Ok(Err(AlignmentFailure::NotEnoughLandmarks { model }));
    }
    let mls = MlsModel {
        image_points: landmarks.points.clone(),
        target_points: source_landmarks.points.clone(),
        model,
        alpha: mesh.alpha,
        mesh_resolution: mesh.resolution,
    };
    match backend.warp_mesh(image, &WarpModel::MovingLeastSquares(mls), Interpolation::Bicubic) {
        Ok(warped) => Ok(Ok(warped)),
        Err(SlideStackError::Warp(msg)) => Ok(Err(AlignmentFailure::MeshFitFailed(msg))),
        Err(SlideStackError::Resource(e)) => {
            Ok(Err(AlignmentFailure::MeshFitFailed(e.to_string())))
        }
        Err(e) => Err(e),
    }
}

/// Register every image onto the source through its landmarks.
///
/// Landmark preconditions are checked before anything is warped. An image
/// whose landmarks are degenerate is skipped, except when it is the only
/// image besides the source: it is then placed untransformed at its landmark
/// offset.
pub fn register_landmarks(
    session: &AlignmentSession,
    reporter: &dyn ProgressReporter,
) -> Result<Registration> {
    let images = session.images();
    let sets = session.landmarks();
    let source_index = session.source_index()?;
    let model = session.config.model;
    let count = validate_landmarks(images.len(), sets, source_index, model)?;
    info!(
        images = images.len(),
        landmarks = count,
        %model,
        "Landmark registration"
    );

    let backend = session.backend();
    let mesh = &session.config.mesh;
    let source_set = &sets[source_index];
    let others: Vec<usize> = (0..images.len()).filter(|&i| i != source_index).collect();

    reporter.begin_stage(RunStage::Registering, Some(others.len()));
    let counter = AtomicUsize::new(0);
    let run = |i: usize| -> Result<(usize, std::result::Result<WarpedImage, AlignmentFailure>)> {
        let outcome = warp_one(backend, &images[i], &sets[i], source_set, model, mesh)?;
        let done = counter.fetch_add(1, Ordering::Relaxed) + 1;
        reporter.advance(done);
        Ok((i, outcome))
    };
    let outcomes: Vec<_> = if images.len() >= PARALLEL_IMAGE_THRESHOLD {
        others.par_iter().map(|&i| run(i)).collect()
    } else {
        others.iter().map(|&i| run(i)).collect()
    };
    reporter.finish_stage();

    // Warped raster plus the source landmarks expressed in its frame.
    let mut aligned: Vec<(usize, WarpedImage, LandmarkSet)> = vec![(
        source_index,
        WarpedImage::identity(images[source_index].clone()),
        source_set.clone(),
    )];
    let mut skipped = Vec::new();
    let lone_pair = others.len() == 1;

    for result in outcomes {
        let (i, outcome) = result?;
        match outcome {
            Ok(warped) => {
                let local = source_set.shifted(-warped.bounds.x as f64, -warped.bounds.y as f64);
                aligned.push((i, warped, local));
            }
            Err(reason) if lone_pair => {
                warn!(
                    index = i,
                    %reason,
                    "Only one image to register and its fit failed; placing it untransformed"
                );
                let mut warped = WarpedImage::identity(images[i].clone());
                let anchor = source_set.first().unwrap_or_default();
                let lm = sets[i].first().unwrap_or_default();
                warped.bounds = Rect::at(
                    OffsetVector::from_subpixel(anchor.x - lm.x, anchor.y - lm.y),
                    images[i].dimensions(),
                );
                aligned.push((i, warped, sets[i].clone()));
            }
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
    aligned.sort_by_key(|(i, _, _)| *i);

    reporter.begin_stage(RunStage::ComputingOffsets, None);
    let source_pos = aligned
        .iter()
        .position(|(i, _, _)| *i == source_index)
        .unwrap_or(0);
    let placed: Vec<usize> = aligned.iter().map(|(i, _, _)| *i).collect();
    let dimensions: Vec<_> = placed.iter().map(|&i| images[i].dimensions()).collect();
    let warped_sets: Vec<LandmarkSet> = aligned.iter().map(|(_, _, s)| s.clone()).collect();
    let table = compute_offsets(
        &dimensions,
        PlacementReference::Landmarks(&warped_sets),
        source_pos,
    )?
    .with_image_indices(&placed);

    // Untransformed originals, aligned on their first landmark.
    let original_offsets = if session.config.keep_all_pixel_data {
        let original_sets: Vec<LandmarkSet> = placed.iter().map(|&i| sets[i].clone()).collect();
        Some(
            compute_offsets(
                &dimensions,
                PlacementReference::Landmarks(&original_sets),
                source_pos,
            )?
            .offsets,
        )
    } else {
        None
    };
    reporter.finish_stage();

    let registered: Vec<RegisteredImage> = aligned
        .into_iter()
        .enumerate()
        .map(|(k, (index, warped, _))| RegisteredImage {
            index,
            warped,
            origin: table.offsets[k],
            original_origin: original_offsets
                .as_ref()
                .filter(|_| index != source_index)
                .map(|o| o[k]),
        })
        .collect();

    info!(
        aligned = registered.len(),
        skipped = skipped.len(),
        canvas = %table.canvas,
        "Landmark registration complete"
    );

    Ok(Registration {
        source_index,
        registered,
        skipped,
        table,
    })
}
