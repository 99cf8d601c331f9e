use std::path::PathBuf;

use serde::Serialize;

use crate::error::{AlignmentFailure, SlideStackError};
use crate::geometry::{CanvasBounds, OffsetVector};

use super::config::AlignmentMode;

/// Run stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStage {
    Loading,
    CheckingMemory,
    DetectingFeatures,
    Registering,
    ComputingOffsets,
    Compositing,
    Writing,
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loading => write!(f, "Loading images"),
            Self::CheckingMemory => write!(f, "Checking memory"),
            Self::DetectingFeatures => write!(f, "Detecting features"),
            Self::Registering => write!(f, "Registering images"),
            Self::ComputingOffsets => write!(f, "Computing offsets"),
            Self::Compositing => write!(f, "Compositing"),
            Self::Writing => write!(f, "Writing output"),
        }
    }
}

/// Thread-safe progress reporting for an alignment run.
///
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new stage has started. `total_items` is the number of work items in
    /// this stage (e.g. image count), if known.
    fn begin_stage(&self, _stage: RunStage, _total_items: Option<usize>) {}

    /// One work item within the current stage has completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}

    /// An image was left out of the stack.
    fn image_skipped(&self, _skipped: &SkippedImage) {}
}

pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// An image that could not be registered and why.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SkippedImage {
    pub index: usize,
    pub name: String,
    pub reason: AlignmentFailure,
}

/// Summary of a finished run.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub mode: AlignmentMode,
    pub source_index: usize,
    /// Includes the source image.
    pub aligned_count: usize,
    pub aligned: Vec<usize>,
    /// Top-left of each aligned image in the source frame, parallel to `aligned`.
    pub offsets: Vec<OffsetVector>,
    pub skipped: Vec<SkippedImage>,
    pub canvas: CanvasBounds,
    pub keep_all_pixel_data: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

/// Everything a background run reports to its owner.
#[derive(Debug)]
pub enum RunEvent {
    StageStarted {
        stage: RunStage,
        total_items: Option<usize>,
    },
    Progress {
        items_done: usize,
    },
    StageFinished,
    ImageSkipped(SkippedImage),
    Finished(RunReport),
    Failed(SlideStackError),
}
