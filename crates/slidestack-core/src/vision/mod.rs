//! Computer-vision capabilities the registration pipelines consume.
//!
//! The pipelines only talk to [`VisionBackend`]; [`NativeBackend`] is the
//! pure-Rust implementation shipped with the crate.

pub mod interpolation;
pub mod native;

use ndarray::Array2;

use crate::error::Result;
use crate::geometry::{Point2, Rect};
use crate::image::SlideImage;
use crate::transform::{Homography, TransformModel};

pub use native::NativeBackend;

/// A detected interest point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    pub position: Point2,
    pub response: f32,
}

/// Keypoints and their descriptors; row `i` of `descriptors` describes
/// `keypoints[i]`.
#[derive(Clone, Debug)]
pub struct Features {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Array2<f32>,
}

impl Features {
    pub fn empty(descriptor_len: usize) -> Self {
        Self {
            keypoints: Vec::new(),
            descriptors: Array2::zeros((0, descriptor_len)),
        }
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// One candidate correspondence between a query and a train descriptor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeatureMatch {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

/// Dense deformation applied by [`VisionBackend::warp_mesh`].
#[derive(Clone, Debug)]
pub enum WarpModel {
    /// Maps image coordinates into the target frame.
    Homography(Homography),
    /// Moving-least-squares deformation driven by control points.
    MovingLeastSquares(MlsModel),
}

/// Control points and parameters of a moving-least-squares warp.
#[derive(Clone, Debug)]
pub struct MlsModel {
    /// Control points in the image being warped.
    pub image_points: Vec<Point2>,
    /// Where those points must land in the target frame.
    pub target_points: Vec<Point2>,
    pub model: TransformModel,
    pub alpha: f64,
    pub mesh_resolution: usize,
}

/// Resampling kernel used by the warper.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Interpolation {
    #[default]
    Bilinear,
    Bicubic,
}

/// An image resampled into the target frame.
///
/// The raster covers `bounds` (target-frame coordinates); `coverage` marks the
/// pixels that received data from the image, everything else is background.
#[derive(Clone, Debug)]
pub struct WarpedImage {
    pub image: SlideImage,
    pub coverage: Array2<bool>,
    pub bounds: Rect,
}

impl WarpedImage {
    /// Wrap an untransformed image placed at the target-frame origin.
    pub fn identity(image: SlideImage) -> Self {
        let (h, w) = (image.height(), image.width());
        Self {
            image,
            coverage: Array2::from_elem((h, w), true),
            bounds: Rect::new(0, 0, w as i64, h as i64),
        }
    }
}

/// Keypoint detection/description, matching, robust homography estimation
/// and mesh warping.
pub trait VisionBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Detect keypoints on a single-channel plane and describe them.
    fn detect_and_describe(&self, plane: &Array2<f32>) -> Result<Features>;

    /// For every query descriptor, the `k` nearest train descriptors sorted by
    /// ascending distance (fewer when `train` is smaller than `k`).
    fn knn_match(&self, query: &Features, train: &Features, k: usize) -> Vec<Vec<FeatureMatch>>;

    /// Robustly fit a homography mapping `from[i]` onto `to[i]`.
    /// `tolerance_px` is the inlier reprojection error in pixels.
    fn estimate_homography(
        &self,
        from: &[Point2],
        to: &[Point2],
        tolerance_px: f64,
    ) -> Option<Homography>;

    /// Resample `image` through `model` into the target frame.
    fn warp_mesh(
        &self,
        image: &SlideImage,
        model: &WarpModel,
        interpolation: Interpolation,
    ) -> Result<WarpedImage>;
}
