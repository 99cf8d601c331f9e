use std::path::Path;

use tracing::info;

use crate::compositor::{composite, pages_from_registration, AlignedStack};
use crate::error::Result;
use crate::io::tiff_stack::write_stack;
use crate::memory::{check_available, estimate_run_footprint};

use super::config::AlignmentMode;
use super::feature::register_features;
use super::landmark::register_landmarks;
use super::session::AlignmentSession;
use super::types::{ProgressReporter, RunReport, RunStage};

/// A composited stack and the report describing how it was built.
#[derive(Debug)]
pub struct AlignmentOutcome {
    pub stack: AlignedStack,
    pub report: RunReport,
}

/// Register and composite every image of the session.
pub fn run_alignment(
    session: &AlignmentSession,
    reporter: &dyn ProgressReporter,
) -> Result<AlignmentOutcome> {
    let config = &session.config;
    config.validate()?;

    reporter.begin_stage(RunStage::CheckingMemory, None);
    let required = estimate_run_footprint(session.images());
    check_available(required, config.available_memory_bytes)?;
    reporter.finish_stage();

    info!(
        mode = %config.mode,
        images = session.images().len(),
        backend = session.backend().name(),
        "Starting alignment"
    );
    let registration = match config.mode {
        AlignmentMode::Automatic => register_features(session, reporter)?,
        AlignmentMode::Landmark => register_landmarks(session, reporter)?,
    };

    reporter.begin_stage(RunStage::Compositing, Some(registration.registered.len()));
    let pages = pages_from_registration(
        &registration,
        session.images(),
        config.keep_all_pixel_data,
    );
    let stack = composite(
        &pages,
        &registration.table,
        config.keep_all_pixel_data,
        config.storage,
    )?;
    reporter.finish_stage();

    let report = RunReport {
        mode: config.mode,
        source_index: registration.source_index,
        aligned_count: registration.registered.len(),
        aligned: registration.registered.iter().map(|r| r.index).collect(),
        offsets: registration.registered.iter().map(|r| r.origin).collect(),
        skipped: registration.skipped,
        canvas: stack.canvas,
        keep_all_pixel_data: config.keep_all_pixel_data,
        output: None,
    };
    info!(
        aligned = report.aligned_count,
        skipped = report.skipped.len(),
        canvas = %report.canvas,
        "Alignment complete"
    );
    Ok(AlignmentOutcome { stack, report })
}

/// Run the alignment and write the stack to `output` as a multi-page TIFF.
pub fn align_and_write(
    session: &AlignmentSession,
    output: &Path,
    reporter: &dyn ProgressReporter,
) -> Result<RunReport> {
    let outcome = run_alignment(session, reporter)?;
    reporter.begin_stage(RunStage::Writing, Some(outcome.stack.len()));
    write_stack(&outcome.stack, output)?;
    reporter.finish_stage();
    let mut report = outcome.report;
    report.output = Some(output.to_path_buf());
    Ok(report)
}

