#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{s, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use slidestack_core::error::Result;
use slidestack_core::geometry::Point2;
use slidestack_core::image::{PixelFormat, SlideImage};
use slidestack_core::landmarks::LandmarkSet;
use slidestack_core::pipeline::config::{AlignmentConfig, AlignmentMode};
use slidestack_core::transform::{Homography, TransformModel};
use slidestack_core::vision::{
    FeatureMatch, Features, Interpolation, NativeBackend, VisionBackend, WarpModel, WarpedImage,
};

/// Memory figure handed to runs so tests do not depend on the host.
pub const PLENTY_OF_MEMORY: u64 = 1 << 40;

/// Random overlapping rectangles over a low-amplitude wave background.
///
/// Rectangles give strong, well-separated corners; the background keeps
/// patches around similar corners distinguishable.
pub fn textured(width: usize, height: usize, seed: u64) -> Array2<f32> {
    let mut data = Array2::from_shape_fn((height, width), |(r, c)| {
        0.1 + 0.05 * ((c as f32 * 0.3).sin() + (r as f32 * 0.21).cos())
    });
    let mut rng = StdRng::seed_from_u64(seed);
    for _ in 0..(width * height / 500).max(8) {
        let w = rng.gen_range(6..30).min(width);
        let h = rng.gen_range(6..30).min(height);
        let x = rng.gen_range(0..=width - w);
        let y = rng.gen_range(0..=height - h);
        let v: f32 = rng.gen_range(0.3..1.0);
        data.slice_mut(s![y..y + h, x..x + w]).fill(v);
    }
    data
}

/// The `(w, h)` window of `data` whose top-left is at `(x, y)`.
pub fn crop(data: &Array2<f32>, x: usize, y: usize, w: usize, h: usize) -> Array2<f32> {
    data.slice(s![y..y + h, x..x + w]).to_owned()
}

pub fn gray(data: Array2<f32>, name: &str) -> SlideImage {
    SlideImage::gray(data, PixelFormat::Gray8).with_name(name)
}

pub fn flat(width: usize, height: usize, value: f32, name: &str) -> SlideImage {
    gray(Array2::from_elem((height, width), value), name)
}

pub fn triangle_landmarks() -> LandmarkSet {
    LandmarkSet::from_pairs(&[(40.0, 30.0), (90.0, 35.0), (60.0, 80.0)])
}

pub fn landmark_config(model: TransformModel) -> AlignmentConfig {
    AlignmentConfig {
        mode: AlignmentMode::Landmark,
        model,
        available_memory_bytes: Some(PLENTY_OF_MEMORY),
        ..Default::default()
    }
}

pub fn automatic_config() -> AlignmentConfig {
    AlignmentConfig {
        mode: AlignmentMode::Automatic,
        available_memory_bytes: Some(PLENTY_OF_MEMORY),
        ..Default::default()
    }
}

pub fn assert_planes_close(a: &Array2<f32>, b: &Array2<f32>, tol: f32) {
    assert_eq!(a.dim(), b.dim());
    for ((idx, x), y) in a.indexed_iter().zip(b.iter()) {
        assert!((x - y).abs() <= tol, "pixel {idx:?}: {x} vs {y}");
    }
}

/// Native backend that counts warp calls.
#[derive(Default)]
pub struct CountingBackend {
    inner: NativeBackend,
    pub warps: AtomicUsize,
}

impl CountingBackend {
    pub fn warp_count(&self) -> usize {
        self.warps.load(Ordering::SeqCst)
    }
}

impl VisionBackend for CountingBackend {
    fn name(&self) -> &str {
        "counting"
    }

    fn detect_and_describe(&self, plane: &Array2<f32>) -> Result<Features> {
        self.inner.detect_and_describe(plane)
    }

    fn knn_match(&self, query: &Features, train: &Features, k: usize) -> Vec<Vec<FeatureMatch>> {
        self.inner.knn_match(query, train, k)
    }

    fn estimate_homography(&self, from: &[Point2], to: &[Point2], tol: f64) -> Option<Homography> {
        self.inner.estimate_homography(from, to, tol)
    }

    fn warp_mesh(
        &self,
        image: &SlideImage,
        model: &WarpModel,
        interpolation: Interpolation,
    ) -> Result<WarpedImage> {
        self.warps.fetch_add(1, Ordering::SeqCst);
        self.inner.warp_mesh(image, model, interpolation)
    }
}

/// Native detection and matching, but every homography collapses the plane.
#[derive(Default)]
pub struct CollapsingBackend {
    inner: NativeBackend,
}

impl VisionBackend for CollapsingBackend {
    fn name(&self) -> &str {
        "collapsing"
    }

    fn detect_and_describe(&self, plane: &Array2<f32>) -> Result<Features> {
        self.inner.detect_and_describe(plane)
    }

    fn knn_match(&self, query: &Features, train: &Features, k: usize) -> Vec<Vec<FeatureMatch>> {
        self.inner.knn_match(query, train, k)
    }

    fn estimate_homography(&self, _: &[Point2], _: &[Point2], _: f64) -> Option<Homography> {
        Some(Homography::from_rows([
            [1.0, 2.0, 0.0],
            [2.0, 4.0, 0.0],
            [0.0, 0.0, 1.0],
        ]))
    }

    fn warp_mesh(
        &self,
        image: &SlideImage,
        model: &WarpModel,
        interpolation: Interpolation,
    ) -> Result<WarpedImage> {
        self.inner.warp_mesh(image, model, interpolation)
    }
}
