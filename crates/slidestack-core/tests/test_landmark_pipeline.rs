mod common;

use std::sync::Arc;

use approx::assert_abs_diff_eq;

use slidestack_core::error::{AlignmentFailure, InputError, SlideStackError};
use slidestack_core::geometry::{Dimensions, OffsetVector};
use slidestack_core::landmarks::LandmarkSet;
use slidestack_core::pipeline::landmark::register_landmarks;
use slidestack_core::pipeline::{
    run_alignment, AlignmentSession, NoOpReporter, SourceSelection,
};
use slidestack_core::transform::TransformModel;
use slidestack_core::vision::VisionBackend;

use common::*;

// ---------------------------------------------------------------------------
// Preconditions
// ---------------------------------------------------------------------------

#[test]
fn test_projective_needs_four_landmarks_before_any_warp() {
    let backend = Arc::new(CountingBackend::default());
    let session = AlignmentSession::new(
        vec![flat(100, 100, 0.5, "a"), flat(100, 100, 0.5, "b")],
        landmark_config(TransformModel::Projective),
    )
    .with_landmarks(vec![triangle_landmarks(), triangle_landmarks()])
    .with_backend(backend.clone() as Arc<dyn VisionBackend>);

    let err = run_alignment(&session, &NoOpReporter).unwrap_err();
    assert!(matches!(
        err,
        SlideStackError::Input(InputError::TooFewLandmarks {
            model: TransformModel::Projective,
            required: 4,
            found: 3
        })
    ));
    assert_eq!(backend.warp_count(), 0);
}

#[test]
fn test_unequal_landmark_counts_are_rejected() {
    let mut longer = triangle_landmarks();
    longer.points.push(slidestack_core::geometry::Point2::new(10.0, 10.0));
    let session = AlignmentSession::new(
        vec![flat(100, 100, 0.5, "a"), flat(100, 100, 0.5, "b")],
        landmark_config(TransformModel::Affine),
    )
    .with_landmarks(vec![triangle_landmarks(), longer]);

    let err = run_alignment(&session, &NoOpReporter).unwrap_err();
    assert!(matches!(
        err,
        SlideStackError::Input(InputError::UnequalLandmarkCounts {
            image: 1,
            expected: 3,
            found: 4
        })
    ));
}

#[test]
fn test_single_image_is_rejected() {
    let session = AlignmentSession::new(
        vec![flat(100, 100, 0.5, "a")],
        landmark_config(TransformModel::Translation),
    )
    .with_landmarks(vec![triangle_landmarks()]);
    let err = run_alignment(&session, &NoOpReporter).unwrap_err();
    assert!(matches!(
        err,
        SlideStackError::Input(InputError::TooFewImages { .. })
    ));
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

#[test]
fn test_identical_images_align_pixel_exact() {
    let data = textured(100, 100, 7);
    let session = AlignmentSession::new(
        vec![gray(data.clone(), "a"), gray(data.clone(), "b")],
        landmark_config(TransformModel::Translation),
    )
    .with_landmarks(vec![triangle_landmarks(), triangle_landmarks()]);

    let outcome = run_alignment(&session, &NoOpReporter).unwrap();
    assert_eq!(outcome.report.aligned_count, 2);
    assert!(outcome.report.skipped.is_empty());
    assert_eq!(outcome.stack.canvas.dimensions(), Dimensions::new(100, 100));
    assert_eq!(outcome.report.offsets, vec![OffsetVector::ZERO; 2]);
    for page in 0..2 {
        let image = outcome.stack.page_image(page).unwrap();
        assert_eq!(image.planes[0], data);
    }
}

#[test]
fn test_identical_images_affine() {
    let data = textured(100, 100, 8);
    let session = AlignmentSession::new(
        vec![gray(data.clone(), "a"), gray(data.clone(), "b")],
        landmark_config(TransformModel::Affine),
    )
    .with_landmarks(vec![triangle_landmarks(), triangle_landmarks()]);

    let outcome = run_alignment(&session, &NoOpReporter).unwrap();
    assert_eq!(outcome.stack.canvas.dimensions(), Dimensions::new(100, 100));
    let page = outcome.stack.page_image(1).unwrap();
    assert_planes_close(&page.planes[0], &data, 1e-4);
}

#[test]
fn test_shifted_crop_is_placed_at_its_offset() {
    let source = textured(120, 100, 11);
    let moved = crop(&source, 15, 9, 105, 91);
    let session = AlignmentSession::new(
        vec![gray(source.clone(), "source"), gray(moved, "moved")],
        landmark_config(TransformModel::Translation),
    )
    .with_landmarks(vec![
        triangle_landmarks(),
        triangle_landmarks().shifted(-15.0, -9.0),
    ]);

    let outcome = run_alignment(&session, &NoOpReporter).unwrap();
    assert_eq!(
        outcome.report.offsets,
        vec![OffsetVector::ZERO, OffsetVector::new(15, 9)]
    );
    assert_eq!(outcome.stack.canvas.dimensions(), Dimensions::new(135, 109));

    let page = outcome.stack.page_image(1).unwrap();
    for y in 11..98 {
        for x in 17..118 {
            assert!(
                (page.planes[0][[y, x]] - source[[y, x]]).abs() < 1e-4,
                "pixel ({x}, {y})"
            );
        }
    }
    // Nothing of the moved image lands left of its offset.
    assert_eq!(page.planes[0][[50, 5]], 0.0);
}

#[test]
fn test_source_selection_by_index() {
    let data = textured(100, 100, 3);
    let mut config = landmark_config(TransformModel::Translation);
    config.source = SourceSelection::Index(1);
    let session = AlignmentSession::new(
        vec![gray(data.clone(), "a"), gray(data, "b")],
        config,
    )
    .with_landmarks(vec![
        triangle_landmarks().shifted(5.0, 0.0),
        triangle_landmarks(),
    ]);

    let outcome = run_alignment(&session, &NoOpReporter).unwrap();
    assert_eq!(outcome.report.source_index, 1);
    assert_eq!(outcome.report.offsets[1], OffsetVector::ZERO);
    assert_eq!(outcome.report.offsets[0], OffsetVector::new(-5, 0));
}

#[test]
fn test_fractional_shift_keeps_vertical_margin() {
    let data = textured(100, 100, 13);
    let session = AlignmentSession::new(
        vec![gray(data.clone(), "a"), gray(data, "b")],
        landmark_config(TransformModel::Translation),
    )
    .with_landmarks(vec![
        triangle_landmarks(),
        triangle_landmarks().shifted(-10.4, -10.4),
    ]);

    let registration = register_landmarks(&session, &NoOpReporter).unwrap();
    let table = &registration.table;
    assert_eq!(table.offsets, vec![OffsetVector::ZERO, OffsetVector::new(10, 10)]);
    assert_eq!(table.max_offset_x, 10);
    assert_eq!(table.max_offset_y, 10);
    assert_eq!(table.canvas.dimensions(), Dimensions::new(110, 110));
}

// ---------------------------------------------------------------------------
// Degenerate landmarks
// ---------------------------------------------------------------------------

fn collinear() -> LandmarkSet {
    LandmarkSet::from_pairs(&[(10.0, 10.0), (20.0, 20.0), (30.0, 30.0)])
}

#[test]
fn test_lone_pair_falls_back_to_untransformed_placement() {
    let session = AlignmentSession::new(
        vec![flat(100, 100, 0.2, "source"), flat(60, 60, 0.5, "other")],
        landmark_config(TransformModel::Affine),
    )
    .with_landmarks(vec![triangle_landmarks(), collinear()]);

    let outcome = run_alignment(&session, &NoOpReporter).unwrap();
    assert_eq!(outcome.report.aligned_count, 2);
    assert!(outcome.report.skipped.is_empty());
    assert_eq!(outcome.report.offsets[1], OffsetVector::new(30, 20));
    assert_eq!(outcome.stack.canvas.dimensions(), Dimensions::new(130, 120));

    let page = outcome.stack.page_image(1).unwrap();
    assert_eq!(page.planes[0][[20, 30]], 0.5);
    assert_eq!(page.planes[0][[79, 89]], 0.5);
    assert_eq!(page.planes[0][[0, 0]], 0.0);
    assert_eq!(page.planes[0][[80, 90]], 0.0);
}

#[test]
fn test_degenerate_image_is_skipped_among_many() {
    let data = textured(100, 100, 5);
    let session = AlignmentSession::new(
        vec![
            gray(data.clone(), "a"),
            gray(data.clone(), "b"),
            gray(data, "c"),
        ],
        landmark_config(TransformModel::Affine),
    )
    .with_landmarks(vec![triangle_landmarks(), collinear(), triangle_landmarks()]);

    let outcome = run_alignment(&session, &NoOpReporter).unwrap();
    assert_eq!(outcome.report.aligned_count, 2);
    assert_eq!(outcome.report.aligned, vec![0, 2]);
    assert_eq!(outcome.report.skipped.len(), 1);
    assert_eq!(outcome.report.skipped[0].index, 1);
    assert_eq!(outcome.report.skipped[0].name, "b");
    assert_eq!(
        outcome.report.skipped[0].reason,
        AlignmentFailure::NotEnoughLandmarks {
            model: TransformModel::Affine
        }
    );
    assert_eq!(outcome.stack.len(), 2);
}

#[test]
fn test_max_offset_indices_name_images_after_a_skip() {
    let data = textured(100, 100, 21);
    let session = AlignmentSession::new(
        vec![
            gray(data.clone(), "a"),
            gray(data.clone(), "b"),
            gray(data, "c"),
        ],
        landmark_config(TransformModel::Affine),
    )
    .with_landmarks(vec![
        triangle_landmarks(),
        collinear(),
        triangle_landmarks().shifted(-7.0, -4.0),
    ]);

    let registration = register_landmarks(&session, &NoOpReporter).unwrap();
    assert_eq!(registration.skipped.len(), 1);
    assert_eq!(registration.skipped[0].index, 1);

    let table = &registration.table;
    assert_eq!(table.source_index, 0);
    assert_eq!(table.max_offset_x, 7);
    assert_eq!(table.max_offset_x_index, Some(2));
    assert_eq!(table.max_offset_y, 4);
    assert_eq!(table.max_offset_y_index, 2);
}

// ---------------------------------------------------------------------------
// Keep all pixel data
// ---------------------------------------------------------------------------

fn overhanging_session(keep_all: bool) -> AlignmentSession {
    let mut config = landmark_config(TransformModel::Translation);
    config.keep_all_pixel_data = keep_all;
    AlignmentSession::new(
        vec![flat(100, 100, 0.2, "source"), flat(100, 100, 0.8, "other")],
        config,
    )
    .with_landmarks(vec![
        triangle_landmarks(),
        triangle_landmarks().shifted(20.0, 10.0),
    ])
}

#[test]
fn test_overhang_is_cropped_by_default() {
    let outcome = run_alignment(&overhanging_session(false), &NoOpReporter).unwrap();
    assert_eq!(outcome.report.offsets[1], OffsetVector::new(-20, -10));
    assert_eq!(outcome.stack.canvas.dimensions(), Dimensions::new(100, 100));
    assert_eq!(outcome.stack.source_origin, OffsetVector::ZERO);

    let page = outcome.stack.page_image(1).unwrap();
    assert_abs_diff_eq!(page.planes[0][[0, 0]], 0.8, epsilon = 1e-5);
    assert_eq!(page.planes[0][[95, 95]], 0.0);
}

#[test]
fn test_keep_all_grows_canvas_to_every_layer() {
    let outcome = run_alignment(&overhanging_session(true), &NoOpReporter).unwrap();
    assert!(outcome.report.keep_all_pixel_data);
    assert_eq!(outcome.stack.canvas.dimensions(), Dimensions::new(120, 110));
    assert_eq!(outcome.stack.source_origin, OffsetVector::new(20, 10));

    let source = outcome.stack.page_image(0).unwrap();
    assert_eq!(source.planes[0][[10, 20]], 0.2);
    assert_eq!(source.planes[0][[0, 0]], 0.0);

    let other = outcome.stack.page_image(1).unwrap();
    assert_abs_diff_eq!(other.planes[0][[0, 0]], 0.8, epsilon = 1e-5);
    assert_abs_diff_eq!(other.planes[0][[99, 99]], 0.8, epsilon = 1e-5);
    assert_eq!(other.planes[0][[50, 105]], 0.0);
}
