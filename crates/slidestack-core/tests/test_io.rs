mod common;

use std::fs::File;
use std::path::Path;

use image::{GrayImage, Luma};
use ndarray::Array2;
use tiff::decoder::{Decoder, DecodingResult};

use slidestack_core::compositor::{composite, Layer, PageLayers};
use slidestack_core::geometry::{CanvasBounds, OffsetVector, Point2};
use slidestack_core::image::{PixelFormat, SlideImage};
use slidestack_core::io::image_io::load_image;
use slidestack_core::io::project::ProjectManifest;
use slidestack_core::io::tiff_stack::write_stack;
use slidestack_core::landmarks::LandmarkSet;
use slidestack_core::offsets::OffsetTable;
use slidestack_core::pipeline::{AlignmentMode, PlaneStorage, SourceSelection};
use slidestack_core::transform::TransformModel;

use common::*;

fn single_layer_stack(images: &[SlideImage]) -> slidestack_core::compositor::AlignedStack {
    let pages: Vec<PageLayers> = images
        .iter()
        .enumerate()
        .map(|(index, image)| PageLayers {
            index,
            name: image.name.clone(),
            layers: vec![Layer {
                image,
                coverage: None,
                origin: OffsetVector::ZERO,
            }],
        })
        .collect();
    let table = OffsetTable {
        offsets: vec![OffsetVector::ZERO; images.len()],
        canvas: CanvasBounds::new(images[0].width() as i64, images[0].height() as i64).unwrap(),
        source_index: 0,
        max_offset_x: 0,
        max_offset_x_index: None,
        max_offset_y: 0,
        max_offset_y_index: 0,
    };
    composite(&pages, &table, false, PlaneStorage::InMemory).unwrap()
}

fn count_pages(path: &Path) -> (usize, Vec<(u32, u32)>) {
    let mut decoder = Decoder::new(File::open(path).unwrap()).unwrap();
    let mut dims = vec![decoder.dimensions().unwrap()];
    while decoder.more_images() {
        decoder.next_image().unwrap();
        dims.push(decoder.dimensions().unwrap());
    }
    (dims.len(), dims)
}

// ---------------------------------------------------------------------------
// Multi-page TIFF
// ---------------------------------------------------------------------------

#[test]
fn test_stack_is_written_one_page_per_image() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stack.tif");
    let stack = single_layer_stack(&[
        flat(30, 20, 0.25, "a"),
        flat(30, 20, 1.0, "b"),
        flat(30, 20, 0.0, "c"),
    ]);
    write_stack(&stack, &path).unwrap();

    let (pages, dims) = count_pages(&path);
    assert_eq!(pages, 3);
    assert!(dims.iter().all(|&d| d == (30, 20)));

    let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
    match decoder.read_image().unwrap() {
        DecodingResult::U8(data) => {
            assert_eq!(data.len(), 600);
            assert!(data.iter().all(|&v| v == 64));
        }
        _ => panic!("unexpected sample type"),
    }

    // Only the finished file is left behind.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
}

#[test]
fn test_rgb16_stack_keeps_depth() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rgb.tif");
    let rgb = SlideImage::from_planes(
        vec![
            Array2::from_elem((4, 5), 1.0),
            Array2::from_elem((4, 5), 0.0),
            Array2::from_elem((4, 5), 0.5),
        ],
        PixelFormat::Rgb16,
    )
    .unwrap();
    write_stack(&single_layer_stack(&[rgb]), &path).unwrap();

    let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
    match decoder.read_image().unwrap() {
        DecodingResult::U16(data) => {
            assert_eq!(data.len(), 4 * 5 * 3);
            assert_eq!(&data[..3], &[65535, 0, 32768]);
        }
        _ => panic!("unexpected sample type"),
    }
}

#[test]
fn test_failed_write_leaves_no_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("stack.tif");
    let stack = single_layer_stack(&[flat(8, 8, 0.5, "a")]);
    assert!(write_stack(&stack, &path).is_err());
    assert!(!path.exists());
}

// ---------------------------------------------------------------------------
// Image decoding
// ---------------------------------------------------------------------------

#[test]
fn test_load_png_keeps_format_and_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("slide_07.png");
    let mut img = GrayImage::new(6, 4);
    img.put_pixel(5, 3, Luma([255]));
    img.save(&path).unwrap();

    let slide = load_image(&path).unwrap();
    assert_eq!(slide.name, "slide_07");
    assert_eq!(slide.format, PixelFormat::Gray8);
    assert_eq!((slide.width(), slide.height()), (6, 4));
    assert_eq!(slide.planes[0][[3, 5]], 1.0);
}

#[test]
fn test_load_missing_file_fails() {
    assert!(load_image(Path::new("/nonexistent/slide.png")).is_err());
}

// ---------------------------------------------------------------------------
// Project manifest
// ---------------------------------------------------------------------------

#[test]
fn test_manifest_resolves_relative_paths() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("project.toml");
    std::fs::write(
        &path,
        r#"
images = ["a.png", "/data/b.png"]
output = "out/stack.tif"

[[landmarks]]
x = 10.0
y = 20.0
image = 0

[[landmarks]]
x = 12.5
y = 21.0
image = 1

[alignment]
mode = "Landmark"
model = "Affine"
source = { Index = 1 }
"#,
    )
    .unwrap();

    let manifest = ProjectManifest::load(&path).unwrap();
    assert_eq!(manifest.images[0], dir.path().join("a.png"));
    assert_eq!(manifest.images[1], Path::new("/data/b.png"));
    assert_eq!(manifest.output, Some(dir.path().join("out/stack.tif")));

    let sets = manifest.landmark_sets().unwrap();
    assert_eq!(sets[1].points, vec![Point2::new(12.5, 21.0)]);

    let config = manifest.alignment.unwrap();
    assert_eq!(config.mode, AlignmentMode::Landmark);
    assert_eq!(config.model, TransformModel::Affine);
    assert_eq!(config.source, SourceSelection::Index(1));
    assert_eq!(config.features, Default::default());
}

#[test]
fn test_manifest_save_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("project.toml");
    let mut manifest = ProjectManifest {
        images: vec![dir.path().join("a.png"), dir.path().join("b.png")],
        ..Default::default()
    };
    manifest.set_landmarks(&[triangle_landmarks(), triangle_landmarks().shifted(3.0, 4.0)]);
    manifest.save(&path).unwrap();

    let reloaded = ProjectManifest::load(&path).unwrap();
    assert_eq!(reloaded, manifest);
    assert_eq!(
        reloaded.landmark_sets().unwrap()[1],
        LandmarkSet::from_pairs(&[(43.0, 34.0), (93.0, 39.0), (63.0, 84.0)])
    );
}

#[test]
fn test_malformed_manifest_is_a_project_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("project.toml");
    std::fs::write(&path, "images = 3").unwrap();
    assert!(matches!(
        ProjectManifest::load(&path),
        Err(slidestack_core::error::SlideStackError::Project(_))
    ));
}
