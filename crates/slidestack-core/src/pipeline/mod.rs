pub mod config;
pub mod feature;
pub mod job;
pub mod landmark;
pub mod orchestrator;
pub mod session;
pub mod types;

use crate::geometry::OffsetVector;
use crate::offsets::OffsetTable;
use crate::vision::WarpedImage;

pub use config::{AlignmentConfig, AlignmentMode, PlaneStorage, SourceSelection};
pub use job::{AlignmentJob, ChannelReporter};
pub use orchestrator::{align_and_write, run_alignment, AlignmentOutcome};
pub use session::AlignmentSession;
pub use types::{NoOpReporter, ProgressReporter, RunEvent, RunReport, RunStage, SkippedImage};

/// One image after registration.
#[derive(Clone, Debug)]
pub struct RegisteredImage {
    /// Position in the input sequence.
    pub index: usize,
    pub warped: WarpedImage,
    /// Top-left of the warped raster in the source frame.
    pub origin: OffsetVector,
    /// Where the untransformed original goes when all pixel data is kept.
    pub original_origin: Option<OffsetVector>,
}

/// Output of a registration pipeline, ready for compositing.
#[derive(Clone, Debug)]
pub struct Registration {
    pub source_index: usize,
    /// Registered images in input order, source included.
    pub registered: Vec<RegisteredImage>,
    pub skipped: Vec<SkippedImage>,
    pub table: OffsetTable,
}
