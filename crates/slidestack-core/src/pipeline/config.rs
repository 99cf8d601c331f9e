use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_HARRIS_K, DEFAULT_INLIER_THRESHOLD, DEFAULT_MATCH_RATIO, DEFAULT_MAX_KEYPOINTS,
    DEFAULT_MESH_RESOLUTION, DEFAULT_MLS_ALPHA, DEFAULT_RANSAC_ITERATIONS, DEFAULT_RANSAC_SEED,
};
use crate::error::{InputError, Result};
use crate::geometry::Dimensions;
use crate::transform::TransformModel;
use crate::vision::NativeBackend;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    pub mode: AlignmentMode,
    /// Model fitted in landmark mode. Feature mode always fits a homography.
    pub model: TransformModel,
    /// Grow the canvas so no pixel of any image is cropped, and keep the
    /// untransformed originals underneath the warped layers.
    pub keep_all_pixel_data: bool,
    pub source: SourceSelection,
    pub features: FeatureConfig,
    pub mesh: MeshConfig,
    pub storage: PlaneStorage,
    /// Overrides the OS-reported available memory for the memory check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_memory_bytes: Option<u64>,
}

impl AlignmentConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| -> Result<()> {
            Err(InputError::InvalidConfig(msg.to_string()).into())
        };
        let f = &self.features;
        if !(f.match_ratio > 0.0 && f.match_ratio <= 1.0) {
            return invalid("features.match_ratio must be in (0, 1]");
        }
        if !(f.inlier_threshold > 0.0) {
            return invalid("features.inlier_threshold must be positive");
        }
        if f.max_keypoints == 0 {
            return invalid("features.max_keypoints must be at least 1");
        }
        if f.ransac_iterations == 0 {
            return invalid("features.ransac_iterations must be at least 1");
        }
        if !(self.mesh.alpha > 0.0) {
            return invalid("mesh.alpha must be positive");
        }
        if self.mesh.resolution == 0 {
            return invalid("mesh.resolution must be at least 1");
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlignmentMode {
    /// Keypoint matching and homography estimation.
    #[default]
    Automatic,
    /// Least-squares fit of user-picked landmarks.
    Landmark,
}

impl std::fmt::Display for AlignmentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Automatic => write!(f, "Automatic"),
            Self::Landmark => write!(f, "Landmark"),
        }
    }
}

/// Which image the others are registered onto.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceSelection {
    #[default]
    First,
    Index(usize),
    /// The image with the largest area (first on ties).
    Largest,
}

impl SourceSelection {
    pub fn resolve(&self, dimensions: &[Dimensions]) -> Result<usize> {
        let total = dimensions.len();
        let index = match *self {
            Self::First => 0,
            Self::Index(i) => i,
            Self::Largest => dimensions
                .iter()
                .enumerate()
                .fold((0, 0), |best, (i, d)| {
                    if d.area() > best.1 {
                        (i, d.area())
                    } else {
                        best
                    }
                })
                .0,
        };
        if index >= total {
            return Err(InputError::SourceIndexOutOfRange { index, total }.into());
        }
        Ok(index)
    }
}

impl std::fmt::Display for SourceSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::First => write!(f, "First image"),
            Self::Index(i) => write!(f, "Image #{i}"),
            Self::Largest => write!(f, "Largest image"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Lowe ratio: a match is kept iff best < ratio * second best.
    pub match_ratio: f32,
    /// RANSAC tolerance as a fraction of the larger source dimension.
    pub inlier_threshold: f64,
    pub max_keypoints: usize,
    pub harris_k: f32,
    pub ransac_iterations: usize,
    pub seed: u64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            match_ratio: DEFAULT_MATCH_RATIO,
            inlier_threshold: DEFAULT_INLIER_THRESHOLD,
            max_keypoints: DEFAULT_MAX_KEYPOINTS,
            harris_k: DEFAULT_HARRIS_K,
            ransac_iterations: DEFAULT_RANSAC_ITERATIONS,
            seed: DEFAULT_RANSAC_SEED,
        }
    }
}

impl From<&FeatureConfig> for NativeBackend {
    fn from(config: &FeatureConfig) -> Self {
        Self {
            max_keypoints: config.max_keypoints,
            harris_k: config.harris_k,
            ransac_iterations: config.ransac_iterations,
            seed: config.seed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Moving-least-squares weight exponent.
    pub alpha: f64,
    /// Mesh subdivisions per axis.
    pub resolution: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_MLS_ALPHA,
            resolution: DEFAULT_MESH_RESOLUTION,
        }
    }
}

/// Where composited planes are held until they are written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaneStorage {
    /// Spill to disk when the stack is larger than the spill threshold.
    #[default]
    Auto,
    InMemory,
    Disk,
}

impl std::fmt::Display for PlaneStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "Auto"),
            Self::InMemory => write!(f, "In memory"),
            Self::Disk => write!(f, "Disk"),
        }
    }
}
