use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

use crate::detection::domain::detection_parameters::DetectionParameters;
use crate::detection::domain::interval_tracker::{IntervalTracker, MovementEvent};
use crate::detection::domain::motion_model::MotionModel;
use crate::shared::constants::{EVENT_FILE_EXTENSION, VIDEO_EXTENSIONS};
use crate::video::domain::frame_source::FrameSource;

/// Creates one fresh, unopened source per batch file.
pub type SourceFactory = Box<dyn Fn() -> Box<dyn FrameSource> + Send>;

/// Progress callback: `(files_completed, files_total)`, called after every
/// handled file — processed, skipped, or failed alike.
pub type ProgressFn = Box<dyn Fn(usize, usize) + Send>;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("failed to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to create target directory {path}: {source}")]
    TargetDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchSummary {
    pub completed: usize,
    pub total: usize,
    pub cancelled: bool,
}

/// Applies the full per-frame pipeline to every matching file under a source
/// directory, as fast as possible, writing one interval list per input.
///
/// Files are enumerated once at start (a snapshot — later additions are not
/// picked up) and handled in sorted order. Each file gets a fresh source and
/// a fresh tracker; the shared model is re-armed with the caller-supplied
/// parameters at every file boundary, so no adaptation leaks between files.
///
/// Cancellation is level-triggered and checked once per file boundary: a
/// file in progress runs to completion, trading responsiveness for
/// every-file-fully-processed-or-not-started output consistency. Per-file
/// failures are isolated — the file is skipped, progress still advances, and
/// the missing artifact is the only contract-level failure signal.
pub struct BatchJob {
    factory: SourceFactory,
    model: Box<dyn MotionModel>,
    parameters: DetectionParameters,
    cancelled: Arc<AtomicBool>,
    on_progress: Option<ProgressFn>,
}

impl BatchJob {
    pub fn new(
        factory: SourceFactory,
        model: Box<dyn MotionModel>,
        parameters: DetectionParameters,
    ) -> Self {
        Self {
            factory,
            model,
            parameters,
            cancelled: Arc::new(AtomicBool::new(false)),
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, on_progress: ProgressFn) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    /// Flag observed at file boundaries; setting it stops the job before
    /// the next file starts.
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn run(&mut self, source_dir: &Path, target_dir: &Path) -> Result<BatchSummary, BatchError> {
        let files = collect_video_files(source_dir)?;
        fs::create_dir_all(target_dir).map_err(|e| BatchError::TargetDir {
            path: target_dir.to_path_buf(),
            source: e,
        })?;

        let total = files.len();
        let mut completed = 0;
        let mut cancelled = false;
        log::info!("batch run over {total} files from {}", source_dir.display());

        for path in &files {
            if self.cancelled.load(Ordering::SeqCst) {
                cancelled = true;
                log::info!("batch cancelled after {completed}/{total} files");
                break;
            }

            match artifact_stem(path) {
                None => {
                    // tolerated, not an error: the name cannot produce an
                    // artifact name, so the file is silently skipped
                    log::debug!(
                        "skipping {}: stem is not a well-formed identifier",
                        path.display()
                    );
                }
                Some(stem) => {
                    let output = target_dir.join(format!("{stem}.{EVENT_FILE_EXTENSION}"));
                    if let Err(e) = self.process_file(path, &output) {
                        log::warn!("skipping {}: {e}", path.display());
                    }
                }
            }

            completed += 1;
            if let Some(callback) = &self.on_progress {
                callback(completed, total);
            }
        }

        Ok(BatchSummary {
            completed,
            total,
            cancelled,
        })
    }

    fn process_file(&mut self, input: &Path, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let mut source = (self.factory)();
        source.open(input)?;

        let outcome = self.decode_to_artifact(source.as_mut(), output);
        source.close();
        outcome
    }

    fn decode_to_artifact(
        &mut self,
        source: &mut dyn FrameSource,
        output: &Path,
    ) -> Result<(), Box<dyn std::error::Error>> {
        // same configuration, fresh adaptation for every file
        let params = self.parameters.clone();
        self.model.apply_parameters(&params)?;

        let mut tracker = IntervalTracker::new();
        while let Some(frame) = source.next_frame()? {
            let detection = self.model.detect(&frame)?;
            tracker.update(detection.moving, source.position_secs());
        }

        write_events(output, &tracker.events())?;
        Ok(())
    }
}

/// Recursive snapshot of matching files under `dir`, sorted for a stable
/// processing order.
fn collect_video_files(dir: &Path) -> Result<Vec<PathBuf>, BatchError> {
    let mut files = Vec::new();
    walk(dir, &mut files)?;
    files.sort();
    Ok(files)
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), BatchError> {
    let entries = fs::read_dir(dir).map_err(|e| BatchError::Scan {
        path: dir.to_path_buf(),
        source: e,
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| BatchError::Scan {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_dir() {
            walk(&path, out)?;
        } else if has_video_extension(&path) {
            out.push(path);
        }
    }
    Ok(())
}

fn has_video_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// The artifact name is derived from the input's stem, which must be a
/// well-formed identifier (`[A-Za-z0-9_-]+`). Anything else yields `None`.
fn artifact_stem(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let well_formed = !stem.is_empty()
        && stem
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    well_formed.then(|| stem.to_string())
}

/// One `start,end` pair per line, two decimal places, no header.
fn write_events(path: &Path, events: &[MovementEvent]) -> io::Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    for event in events {
        writeln!(writer, "{:.2},{:.2}", event.start_secs, event.end_secs)?;
    }
    writer.flush()
}
