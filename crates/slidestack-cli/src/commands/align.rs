use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use slidestack_core::io::project::{LandmarkEntry, ProjectManifest};
use slidestack_core::pipeline::{
    AlignmentConfig, AlignmentJob, AlignmentMode, AlignmentSession, PlaneStorage, RunEvent,
    RunStage, SourceSelection,
};
use slidestack_core::transform::TransformModel;
use tracing::debug;

const DEFAULT_OUTPUT: &str = "aligned.tiff";

#[derive(Clone, ValueEnum)]
pub enum ModeArg {
    Automatic,
    Landmark,
}

#[derive(Clone, ValueEnum)]
pub enum ModelArg {
    Translation,
    Affine,
    Projective,
}

#[derive(Args)]
pub struct AlignArgs {
    /// Input images in stack order, or a single project file (.toml)
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Alignment config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Registration mode
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Transform model fitted in landmark mode
    #[arg(long, value_enum)]
    pub model: Option<ModelArg>,

    /// Landmark file: a TOML list of [[landmarks]] entries with x, y, image
    #[arg(long)]
    pub landmarks: Option<PathBuf>,

    /// Index of the image the others are registered onto
    #[arg(long)]
    pub source: Option<usize>,

    /// Grow the canvas so no pixel of any image is cropped
    #[arg(long)]
    pub keep_all: bool,

    /// Hold composited pages in temporary files instead of memory
    #[arg(long)]
    pub spill: bool,

    /// Output file path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write the run report to this file as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Deserialize)]
struct LandmarkFile {
    landmarks: Vec<LandmarkEntry>,
}

fn is_project_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {what} {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("Invalid {what} {}", path.display()))
}

/// The project for this run: the single `.toml` input, or one assembled from
/// the image list and the landmark file.
fn resolve_project(args: &AlignArgs) -> Result<ProjectManifest> {
    if let [single] = args.inputs.as_slice() {
        if is_project_file(single) {
            return ProjectManifest::load(single)
                .with_context(|| format!("Failed to load project {}", single.display()));
        }
    }
    let landmarks = match &args.landmarks {
        Some(path) => read_toml::<LandmarkFile>(path, "landmark file")?.landmarks,
        None => Vec::new(),
    };
    Ok(ProjectManifest {
        images: args.inputs.clone(),
        landmarks,
        output: None,
        alignment: None,
    })
}

fn apply_overrides(config: &mut AlignmentConfig, args: &AlignArgs) {
    if let Some(mode) = &args.mode {
        config.mode = match mode {
            ModeArg::Automatic => AlignmentMode::Automatic,
            ModeArg::Landmark => AlignmentMode::Landmark,
        };
    }
    if let Some(model) = &args.model {
        config.model = match model {
            ModelArg::Translation => TransformModel::Translation,
            ModelArg::Affine => TransformModel::Affine,
            ModelArg::Projective => TransformModel::Projective,
        };
    }
    if let Some(index) = args.source {
        config.source = SourceSelection::Index(index);
    }
    if args.keep_all {
        config.keep_all_pixel_data = true;
    }
    if args.spill {
        config.storage = PlaneStorage::Disk;
    }
}

pub fn run(args: &AlignArgs) -> Result<()> {
    let project = resolve_project(args)?;
    let mut config = match &args.config {
        Some(path) => read_toml(path, "alignment config")?,
        None => project.alignment.clone().unwrap_or_default(),
    };
    apply_overrides(&mut config, args);
    debug!(
        images = project.images.len(),
        landmarks = project.landmarks.len(),
        mode = %config.mode,
        "Resolved project"
    );
    if config.mode == AlignmentMode::Landmark && project.landmarks.is_empty() {
        bail!("Landmark mode needs landmarks: pass --landmarks or a project file");
    }

    let output = args
        .output
        .clone()
        .or_else(|| project.output.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

    crate::summary::print_alignment_summary(&config, project.images.len(), &output);

    let spinner = ProgressBar::new_spinner();
    spinner.set_message(RunStage::Loading.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    let landmark_sets = project.landmark_sets()?;
    let session = AlignmentSession::load(&project.images, config)?.with_landmarks(landmark_sets);
    spinner.finish_and_clear();

    let pb = ProgressBar::new(1);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg:20} [{bar:40}] {pos}/{len}")?
            .progress_chars("=> "),
    );

    let job = AlignmentJob::spawn(session, Some(output));
    let mut outcome = None;
    for event in job.events().iter() {
        match event {
            RunEvent::StageStarted { stage, total_items } => {
                pb.set_message(stage.to_string());
                pb.set_length(total_items.unwrap_or(1) as u64);
                pb.set_position(0);
            }
            RunEvent::Progress { items_done } => pb.set_position(items_done as u64),
            RunEvent::StageFinished => {
                if let Some(len) = pb.length() {
                    pb.set_position(len);
                }
            }
            RunEvent::ImageSkipped(skip) => pb.println(format!(
                "  Skipped image #{} ({}): {}",
                skip.index, skip.name, skip.reason
            )),
            RunEvent::Finished(report) => outcome = Some(Ok(report)),
            RunEvent::Failed(e) => outcome = Some(Err(e)),
        }
    }
    job.join()?;

    let report = match outcome {
        Some(Ok(report)) => report,
        Some(Err(e)) => {
            pb.abandon_with_message("Failed");
            return Err(e).context("Alignment failed");
        }
        None => bail!("Alignment ended without a result"),
    };
    pb.finish_with_message("Done");

    crate::summary::print_run_report(&report);

    if let Some(ref path) = args.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("Report saved to {}", path.display());
    }

    Ok(())
}
