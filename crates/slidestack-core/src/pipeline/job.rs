//! Background alignment runs that stream their progress over a channel.

use std::path::PathBuf;
use std::sync::mpsc;
use std::thread::JoinHandle;

use tracing::debug;

use crate::error::{Result, SlideStackError};

use super::orchestrator::{align_and_write, run_alignment};
use super::session::AlignmentSession;
use super::types::{ProgressReporter, RunEvent, RunStage, SkippedImage};

/// Progress reporter that forwards everything as [`RunEvent`]s.
pub struct ChannelReporter {
    tx: mpsc::Sender<RunEvent>,
}

impl ChannelReporter {
    pub fn new(tx: mpsc::Sender<RunEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressReporter for ChannelReporter {
    fn begin_stage(&self, stage: RunStage, total_items: Option<usize>) {
        let _ = self.tx.send(RunEvent::StageStarted { stage, total_items });
    }

    fn advance(&self, items_done: usize) {
        let _ = self.tx.send(RunEvent::Progress { items_done });
    }

    fn finish_stage(&self) {
        let _ = self.tx.send(RunEvent::StageFinished);
    }

    fn image_skipped(&self, skipped: &SkippedImage) {
        let _ = self.tx.send(RunEvent::ImageSkipped(skipped.clone()));
    }
}

/// An alignment running on its own thread.
///
/// The last event is always `Finished` or `Failed`.
pub struct AlignmentJob {
    events: mpsc::Receiver<RunEvent>,
    handle: JoinHandle<()>,
}

impl AlignmentJob {
    /// Start the run. With `output` the stack is also written there.
    pub fn spawn(session: AlignmentSession, output: Option<PathBuf>) -> Self {
        let (tx, events) = mpsc::channel();
        let handle = std::thread::spawn(move || {
            let reporter = ChannelReporter::new(tx.clone());
            let result = match &output {
                Some(path) => align_and_write(&session, path, &reporter),
                None => run_alignment(&session, &reporter).map(|outcome| outcome.report),
            };
            let event = match result {
                Ok(report) => RunEvent::Finished(report),
                Err(e) => RunEvent::Failed(e),
            };
            debug!("alignment job done");
            let _ = tx.send(event);
        });
        Self { events, handle }
    }

    pub fn events(&self) -> &mpsc::Receiver<RunEvent> {
        &self.events
    }

    /// Wait for the worker thread to exit.
    pub fn join(self) -> Result<()> {
        self.handle
            .join()
            .map_err(|_| SlideStackError::WorkerPanicked)
    }
}
