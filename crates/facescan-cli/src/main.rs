use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use facescan_capture::{Camera, FolderSource};
use facescan_core::{AnalysisMode, CancelToken, Pipeline, PixelBuffer, Stage};
use std::path::{Path, PathBuf};

mod config;
mod models;
mod report;
mod sample;

use config::Config;
use models::Needs;
use report::Report;

#[derive(Parser)]
#[command(name = "facescan", version, about = "Face and eye detection with attribute analysis")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect faces and eyes in an image
    Detect {
        image: PathBuf,
        /// Write the annotated image here
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
        /// Skip eye detection
        #[arg(long)]
        no_eyes: bool,
        #[command(flatten)]
        detection: DetectionArgs,
    },
    /// Estimate age, gender, emotion and race for faces in an image
    Analyze {
        image: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        size: SizeArgs,
    },
    /// Process every image in a folder
    Folder {
        dir: PathBuf,
        /// Where annotated copies are written (default: configured output dir)
        #[arg(long)]
        output_dir: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = Mode::Geometric)]
        mode: Mode,
        #[command(flatten)]
        detection: DetectionArgs,
        #[command(flatten)]
        size: SizeArgs,
    },
    /// Process a live camera stream until Ctrl-C
    Stream {
        /// V4L2 device path (default: configured camera device)
        #[arg(short, long)]
        device: Option<String>,
        #[arg(long, value_enum, default_value_t = Mode::Geometric)]
        mode: Mode,
        /// Save every annotated frame here with a timestamped name
        #[arg(long)]
        save_dir: Option<PathBuf>,
        /// Stop after this many frames
        #[arg(long)]
        max_frames: Option<usize>,
        #[command(flatten)]
        detection: DetectionArgs,
    },
    /// Write a synthetic test portrait
    Sample {
        path: PathBuf,
        /// Number of faces in the portrait
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=2))]
        faces: u8,
    },
    /// List V4L2 capture devices
    Devices,
}

/// Overrides for the configured face detection parameters.
#[derive(Args, Debug, Default, Clone)]
struct DetectionArgs {
    #[arg(long)]
    scale_factor: Option<f32>,
    #[arg(long)]
    min_neighbors: Option<u32>,
    /// Minimum face side in pixels
    #[arg(long)]
    min_size: Option<u32>,
}

impl DetectionArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(v) = self.scale_factor {
            config.scale_factor = v;
        }
        if let Some(v) = self.min_neighbors {
            config.min_neighbors = v;
        }
        if let Some(v) = self.min_size {
            config.min_size = v;
        }
    }
}

#[derive(Args, Debug, Clone, Copy)]
struct SizeArgs {
    /// Shrink wider images to this many columns before processing (0 keeps the original size)
    #[arg(long, default_value_t = DEFAULT_MAX_WIDTH)]
    max_width: u32,
}

const DEFAULT_MAX_WIDTH: u32 = 800;

impl SizeArgs {
    fn limit(&self) -> Option<u32> {
        (self.max_width > 0).then_some(self.max_width)
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Geometric,
    Attributes,
    Combined,
}

impl From<Mode> for AnalysisMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Geometric => AnalysisMode::Geometric,
            Mode::Attributes => AnalysisMode::Attributes,
            Mode::Combined => AnalysisMode::Combined,
        }
    }
}

fn needs_for(mode: AnalysisMode) -> Needs {
    Needs {
        eyes: mode != AnalysisMode::Attributes,
        attributes: mode != AnalysisMode::Geometric,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;

    match cli.command {
        Commands::Detect {
            image,
            output,
            json,
            no_eyes,
            detection,
        } => {
            detection.apply(&mut config);
            let needs = Needs {
                eyes: !no_eyes,
                attributes: false,
            };
            let pipeline = models::build_pipeline(&config, needs)?;
            let buffer = facescan_capture::load_image(&image)?;
            run_single(&pipeline, &config, &image, buffer, output.as_deref(), json, AnalysisMode::Geometric)?;
        }
        Commands::Analyze {
            image,
            output,
            json,
            size,
        } => {
            let pipeline = models::build_pipeline(&config, needs_for(AnalysisMode::Attributes))?;
            let buffer = facescan_capture::load_image_within(&image, size.limit())?;
            run_single(&pipeline, &config, &image, buffer, output.as_deref(), json, AnalysisMode::Attributes)?;
        }
        Commands::Folder {
            dir,
            output_dir,
            mode,
            detection,
            size,
        } => {
            detection.apply(&mut config);
            let output_dir = output_dir.unwrap_or_else(|| config.output_dir.clone());
            run_folder(&config, &dir, &output_dir, mode.into(), size.limit())?;
        }
        Commands::Stream {
            device,
            mode,
            save_dir,
            max_frames,
            detection,
        } => {
            detection.apply(&mut config);
            if let Some(device) = device {
                config.camera_device = device;
            }
            run_camera(config, mode.into(), save_dir, max_frames).await?;
        }
        Commands::Sample { path, faces } => {
            let img = if faces == 2 {
                sample::two_faces()
            } else {
                sample::single_face()
            };
            img.save(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("wrote {}", path.display());
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for d in devices {
                println!("{}  {} ({}, {})", d.path, d.name, d.driver, d.bus);
            }
        }
    }

    Ok(())
}

fn run_single(
    pipeline: &Pipeline,
    config: &Config,
    image: &Path,
    buffer: PixelBuffer,
    output: Option<&Path>,
    json: bool,
    mode: AnalysisMode,
) -> Result<()> {
    let result = pipeline.run_once(&buffer, &config.detection_params(), mode)?;

    let report = Report::new(image.display().to_string(), &result);
    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.details());
    }

    if let Some(path) = output {
        facescan_capture::save_buffer(result.annotated.buffer(), path)?;
        tracing::info!(path = %path.display(), "wrote annotated image");
    }
    Ok(())
}

fn run_folder(
    config: &Config,
    dir: &Path,
    output_dir: &Path,
    mode: AnalysisMode,
    max_width: Option<u32>,
) -> Result<()> {
    let pipeline = models::build_pipeline(config, needs_for(mode))?;
    let paths = facescan_capture::list_images(dir)?;
    if paths.is_empty() {
        println!("No images found in {}", dir.display());
        return Ok(());
    }

    let source = FolderSource::new(paths.clone()).with_max_width(max_width);
    let stream = pipeline.run_stream(source, config.detection_params(), mode, CancelToken::new());

    let mut processed = 0usize;
    for (path, result) in paths.iter().zip(stream) {
        let output = match result {
            Ok(output) => output,
            Err(e) if e.stage == Stage::Source => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable image");
                continue;
            }
            Err(e) => return Err(e).with_context(|| format!("processing {}", path.display())),
        };

        print!("{}", Report::new(path.display().to_string(), &output).details());
        let out_path = output_dir.join(annotated_name(path));
        facescan_capture::save_buffer(output.annotated.buffer(), &out_path)?;
        processed += 1;
    }

    println!("{processed}/{} images processed, results in {}", paths.len(), output_dir.display());
    Ok(())
}

/// `photo.jpg` → `photo_annotated.jpg`
fn annotated_name(path: &Path) -> String {
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    match path.extension() {
        Some(ext) => format!("{stem}_annotated.{}", ext.to_string_lossy()),
        None => format!("{stem}_annotated.png"),
    }
}

async fn run_camera(
    config: Config,
    mode: AnalysisMode,
    save_dir: Option<PathBuf>,
    max_frames: Option<usize>,
) -> Result<()> {
    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();
    let mut worker =
        tokio::task::spawn_blocking(move || stream_blocking(&config, mode, save_dir, max_frames, worker_cancel));

    tokio::select! {
        res = &mut worker => res??,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, stopping after the current frame");
            cancel.cancel();
            worker.await??;
        }
    }
    Ok(())
}

fn stream_blocking(
    config: &Config,
    mode: AnalysisMode,
    save_dir: Option<PathBuf>,
    max_frames: Option<usize>,
    cancel: CancelToken,
) -> Result<()> {
    let pipeline = models::build_pipeline(config, needs_for(mode))?;
    let camera = Camera::open(&config.camera_device, config.camera_width, config.camera_height)?;
    let source = camera.stream()?;

    let stream = pipeline.run_stream(source, config.detection_params(), mode, cancel);
    let limit = max_frames.unwrap_or(usize::MAX);

    let mut frames = 0usize;
    for result in stream.take(limit) {
        let output = result?;
        frames += 1;
        tracing::info!(
            frame = frames,
            faces = output.faces.len(),
            attributes = output.attributes().len(),
            "frame"
        );
        if let Some(dir) = &save_dir {
            let path = facescan_capture::save_timestamped(output.annotated.buffer(), dir, "capture")?;
            tracing::debug!(path = %path.display(), "saved frame");
        }
    }

    println!("{frames} frame(s) processed");
    Ok(())
}
