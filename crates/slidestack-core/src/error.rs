use thiserror::Error;

use crate::transform::TransformModel;

#[derive(Error, Debug)]
pub enum SlideStackError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Invalid input: {0}")]
    Input(#[from] InputError),

    #[error("Resource limit: {0}")]
    Resource(#[from] ResourceError),

    #[error("Alignment produced no result: {0}")]
    EmptyResult(String),

    #[error("Warp failed: {0}")]
    Warp(String),

    #[error("Invalid project file: {0}")]
    Project(String),

    #[error("Worker thread panicked")]
    WorkerPanicked,
}

/// Problems with what the caller handed in. The run is rejected before any
/// image is warped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("At least {required} images are needed to align, got {found}")]
    TooFewImages { required: usize, found: usize },

    #[error("Image {image} has {found} landmarks, expected {expected} like the source image")]
    UnequalLandmarkCounts {
        image: usize,
        expected: usize,
        found: usize,
    },

    #[error("The {model} model needs at least {required} landmarks per image, got {found}")]
    TooFewLandmarks {
        model: TransformModel,
        required: usize,
        found: usize,
    },

    #[error("Image {image} has no landmarks")]
    EmptyLandmarkSet { image: usize },

    #[error("Landmark mode needs one landmark set per image ({images} images, {sets} sets)")]
    MissingLandmarks { images: usize, sets: usize },

    #[error("Unsupported pixel format: {0}")]
    UnsupportedPixelFormat(String),

    #[error("Source index {index} out of range (total: {total})")]
    SourceIndexOutOfRange { index: usize, total: usize },

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// The run would exceed what the machine or the output format can hold.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResourceError {
    #[error(
        "Not enough memory: alignment needs about {} MiB, only {} MiB available",
        required_bytes / (1024 * 1024),
        available_bytes / (1024 * 1024)
    )]
    InsufficientMemory {
        required_bytes: u64,
        available_bytes: u64,
    },

    #[error("Canvas too large: {width}x{height} exceeds the addressable pixel limit")]
    CanvasTooLarge { width: i64, height: i64 },
}

/// Why a single image was left out of the output stack. Recorded in the run
/// report; never aborts the batch.
#[derive(Error, Debug, Clone, PartialEq, serde::Serialize)]
pub enum AlignmentFailure {
    #[error("not enough good matches ({found}, need at least {required})")]
    InsufficientMatches { found: usize, required: usize },

    #[error("homography estimation failed: {0}")]
    HomographyFailed(String),

    #[error("mesh fit failed: {0}")]
    MeshFitFailed(String),

    #[error("not enough usable landmarks for the {model} model")]
    NotEnoughLandmarks { model: TransformModel },
}

pub type Result<T> = std::result::Result<T, SlideStackError>;
