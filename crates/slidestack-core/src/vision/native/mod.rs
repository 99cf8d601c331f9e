//! Pure-Rust [`VisionBackend`] implementation.

pub mod keypoints;
pub mod matcher;
pub mod mesh;
pub mod ransac;

use ndarray::Array2;
use rayon::prelude::*;

use crate::consts::{
    DEFAULT_HARRIS_K, DEFAULT_MAX_KEYPOINTS, DEFAULT_RANSAC_ITERATIONS, DEFAULT_RANSAC_SEED,
    PARALLEL_PIXEL_THRESHOLD,
};
use crate::error::Result;
use crate::geometry::Point2;
use crate::image::SlideImage;
use crate::transform::Homography;

use super::{FeatureMatch, Features, Interpolation, VisionBackend, WarpModel, WarpedImage};

/// Harris corners, normalized patch descriptors, brute-force matching,
/// RANSAC homographies and MLS mesh warping.
#[derive(Clone, Debug)]
pub struct NativeBackend {
    pub max_keypoints: usize,
    pub harris_k: f32,
    pub ransac_iterations: usize,
    pub seed: u64,
}

impl Default for NativeBackend {
    fn default() -> Self {
        Self {
            max_keypoints: DEFAULT_MAX_KEYPOINTS,
            harris_k: DEFAULT_HARRIS_K,
            ransac_iterations: DEFAULT_RANSAC_ITERATIONS,
            seed: DEFAULT_RANSAC_SEED,
        }
    }
}

impl VisionBackend for NativeBackend {
    fn name(&self) -> &str {
        "native"
    }

    fn detect_and_describe(&self, plane: &Array2<f32>) -> Result<Features> {
        let corners = keypoints::detect_harris(plane, self.harris_k, self.max_keypoints);
        Ok(keypoints::describe(plane, &corners))
    }

    fn knn_match(&self, query: &Features, train: &Features, k: usize) -> Vec<Vec<FeatureMatch>> {
        matcher::knn_match(&query.descriptors, &train.descriptors, k)
    }

    fn estimate_homography(
        &self,
        from: &[Point2],
        to: &[Point2],
        tolerance_px: f64,
    ) -> Option<Homography> {
        let params = ransac::RansacParams {
            tolerance_px,
            max_iterations: self.ransac_iterations,
            seed: self.seed,
        };
        ransac::estimate(from, to, &params).map(|fit| fit.homography)
    }

    fn warp_mesh(
        &self,
        image: &SlideImage,
        model: &WarpModel,
        interpolation: Interpolation,
    ) -> Result<WarpedImage> {
        match model {
            WarpModel::Homography(h) => mesh::warp_homography(image, h, interpolation),
            WarpModel::MovingLeastSquares(mls) => mesh::warp_mls(image, mls, interpolation),
        }
    }
}

/// Build an `(h, w)` array from a per-pixel function, row-parallel for large
/// rasters.
pub(crate) fn map_pixels<T, F>(h: usize, w: usize, f: F) -> Array2<T>
where
    T: Send + Clone + Default,
    F: Fn(usize, usize) -> T + Sync,
{
    let f = &f;
    let data: Vec<T> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h)
            .into_par_iter()
            .flat_map_iter(|row| (0..w).map(move |col| f(row, col)))
            .collect()
    } else {
        (0..h)
            .flat_map(|row| (0..w).map(move |col| f(row, col)))
            .collect()
    };
    Array2::from_shape_vec((h, w), data).unwrap_or_else(|_| Array2::default((h, w)))
}
