use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};

use motionscan_core::detection::domain::detection_parameters::DetectionParameters;
use motionscan_core::detection::infrastructure::mixture_model::MixtureModel;
use motionscan_core::pipeline::batch_job::{BatchJob, SourceFactory};
use motionscan_core::pipeline::playback_loop::{PlaybackLoop, PlaybackSink, PlaybackUpdate};
use motionscan_core::video::domain::frame_source::FrameSource;
use motionscan_core::video::infrastructure::ffmpeg_source::FfmpegSource;

/// Movement detection and interval extraction for video files.
#[derive(Parser)]
#[command(name = "motionscan")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    detection: DetectionArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Play a video at its native frame rate with live movement status.
    Play {
        /// Input video file.
        input: PathBuf,
    },
    /// Scan a folder of videos and write one interval list per file.
    Batch {
        /// Folder scanned recursively for video files.
        source: PathBuf,
        /// Folder receiving one interval list per input.
        target: PathBuf,
    },
}

#[derive(Args)]
struct DetectionArgs {
    /// Foreground ratio above which a frame counts as movement (0-1).
    #[arg(long, default_value = "0.001")]
    threshold: f64,

    /// Opening kernel size used to suppress noise blobs.
    #[arg(long, default_value = "3")]
    kernel: usize,

    /// Number of past frames in the background statistics.
    #[arg(long, default_value = "100")]
    history: usize,

    /// Mixture components per pixel (1-10).
    #[arg(long, default_value = "5")]
    mixtures: usize,

    /// Background ratio of the mixture model (0-1).
    #[arg(long, default_value = "0.8")]
    background_ratio: f64,

    /// Complexity reduction threshold of the mixture model (0-1).
    #[arg(long, default_value = "0.05")]
    complexity_reduction: f64,
}

impl DetectionArgs {
    fn to_parameters(&self) -> DetectionParameters {
        DetectionParameters {
            movement_threshold: self.threshold,
            open_kernel_size: self.kernel,
            history: self.history,
            mixtures: self.mixtures,
            background_ratio: self.background_ratio,
            complexity_reduction_threshold: self.complexity_reduction,
        }
    }
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let params = cli.detection.to_parameters();
    params.validate()?;

    match cli.command {
        Command::Play { input } => run_play(&input, params),
        Command::Batch { source, target } => run_batch(&source, &target, params),
    }
}

fn run_play(input: &Path, params: DetectionParameters) -> Result<(), Box<dyn std::error::Error>> {
    let mut source: Box<dyn FrameSource> = Box::new(FfmpegSource::new());
    let metadata = source.open(input)?;
    log::info!(
        "{}: {}x{} @ {:.2} fps, {:.1}s",
        input.display(),
        metadata.width,
        metadata.height,
        metadata.fps,
        metadata.duration_secs
    );

    let model = MixtureModel::new(params)?;
    let sink: PlaybackSink = Box::new(|update: PlaybackUpdate| {
        let marker = if update.moving { "movement" } else { "        " };
        eprint!("\r{:8.2}s  {marker}", update.position_secs);
    });

    let playback = PlaybackLoop::spawn(source, Box::new(model), metadata, sink);

    println!("commands: p=pause  r=resume  s <secs>=seek  q=quit");
    for line in io::stdin().lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("p") => playback.pause(),
            Some("r") => playback.resume(),
            Some("s") => match parts.next().and_then(|v| v.parse::<f64>().ok()) {
                Some(secs) => playback.seek(secs),
                None => eprintln!("usage: s <seconds>"),
            },
            Some("q") => break,
            Some(other) => eprintln!("unknown command: {other}"),
            None => {}
        }
    }

    let events = playback.stop()?;
    eprintln!();
    println!("{} movement intervals:", events.len());
    for event in &events {
        println!("{:.2},{:.2}", event.start_secs, event.end_secs);
    }
    Ok(())
}

fn run_batch(
    source: &Path,
    target: &Path,
    params: DetectionParameters,
) -> Result<(), Box<dyn std::error::Error>> {
    let factory: SourceFactory = Box::new(|| Box::new(FfmpegSource::new()));
    let model = MixtureModel::new(params.clone())?;

    let mut job = BatchJob::new(factory, Box::new(model), params).with_progress(Box::new(
        |done, total| {
            eprint!("\rProcessing file {done}/{total}");
        },
    ));

    let summary = job.run(source, target)?;
    eprintln!();
    log::info!(
        "Completed {}/{} files, output in {}",
        summary.completed,
        summary.total,
        target.display()
    );
    Ok(())
}
