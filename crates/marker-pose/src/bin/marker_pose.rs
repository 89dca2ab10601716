//! marker-pose CLI: replay a directory of frames through the pose pipeline.

use clap::{Args, Parser, Subcommand};
use log::{info, LevelFilter};
use marker_pose::{
    build_pipeline, spin, Backend, DictionarySpec, FramePipeline, ImageDirSource,
    ImageFilePublisher, JsonLinesPublisher, Outputs, PipelineConfig,
};
use std::path::PathBuf;

#[cfg(feature = "tracing")]
use tracing_log::LogTracer;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

const WINDOW_NAME: &str = "Image window";

#[derive(Parser)]
#[command(name = "marker-pose")]
#[command(about = "Detect square fiducial markers in frames and publish their poses")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every image of a directory, in file name order.
    Run(RunArgs),

    /// Print the default pipeline configuration as JSON.
    DefaultConfig,
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    /// Directory with input frames (png, jpg, bmp, tiff, pnm).
    #[arg(long)]
    input: PathBuf,

    /// Directory for annotated frames and pose records.
    #[arg(long)]
    output: PathBuf,

    /// Pipeline configuration (JSON); missing fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dictionary JSON file, overrides the configured dictionary.
    #[arg(long)]
    dictionary: Option<PathBuf>,

    /// Detection and pose backend, overrides the configured one.
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    /// Show each annotated frame in a window.
    #[arg(long)]
    show: bool,

    /// Frame rate used to stamp the replayed frames.
    #[arg(long, default_value_t = 30.0)]
    fps: f64,

    /// Log level (off, error, warn, info, debug, trace). With the `tracing`
    /// feature a set `RUST_LOG` takes precedence.
    #[arg(long, default_value = "info")]
    log_level: LevelFilter,

    /// Emit JSON logs (only with the `tracing` feature).
    #[arg(long)]
    json_logs: bool,
}

fn init_logging(level: LevelFilter, json: bool) -> CliResult<()> {
    #[cfg(feature = "tracing")]
    {
        let bridged = LogTracer::init();
        marker_pose::core::init_tracing_with_level(json, level);
        if let Err(e) = bridged {
            tracing::warn!("`log` records are not forwarded to tracing: {e}");
        }
    }
    #[cfg(not(feature = "tracing"))]
    {
        if json {
            eprintln!("--json-logs needs the `tracing` feature, using plain logs");
        }
        marker_pose::core::init_with_level(level)?;
    }
    Ok(())
}

fn load_config(args: &RunArgs) -> CliResult<PipelineConfig> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::load_json(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(dict) = &args.dictionary {
        config.dictionary = DictionarySpec::File(dict.clone());
    }
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    config.validate()?;
    Ok(config)
}

#[cfg(feature = "opencv")]
fn attach_display(pipeline: FramePipeline) -> CliResult<FramePipeline> {
    let display = marker_pose::opencv_backend::OpencvDisplay::open(WINDOW_NAME)?;
    Ok(pipeline.with_display(Box::new(display)))
}

#[cfg(not(feature = "opencv"))]
fn attach_display(pipeline: FramePipeline) -> CliResult<FramePipeline> {
    log::warn!("--show needs the `opencv` feature, no window for {WINDOW_NAME:?}");
    Ok(pipeline)
}

fn run(args: RunArgs) -> CliResult<()> {
    init_logging(args.log_level, args.json_logs)?;
    let config = load_config(&args)?;
    info!("backend {:?}, marker length {}", config.backend, config.marker_length);

    let source = ImageDirSource::open(&args.input, "camera", args.fps)?;
    info!("{} frames in {}", source.files().len(), args.input.display());

    std::fs::create_dir_all(&args.output)?;
    let topics = config.topics.clone();
    let mut outputs = Outputs {
        rvec: Box::new(JsonLinesPublisher::create(
            &topics.rvec,
            args.output.join("rvec.jsonl"),
        )?),
        tvec: Box::new(JsonLinesPublisher::create(
            &topics.tvec,
            args.output.join("tvec.jsonl"),
        )?),
        image: Box::new(ImageFilePublisher::create(
            &topics.output_image,
            args.output.join("frames"),
        )?),
    };

    let pipeline = build_pipeline(config)?;
    let mut pipeline = if args.show {
        attach_display(pipeline)?
    } else {
        pipeline
    };

    let stats = spin(source, &mut pipeline, &mut outputs);
    println!(
        "frames={} dropped={} markers={}",
        stats.frames, stats.dropped, stats.markers
    );
    Ok(())
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args),
        Commands::DefaultConfig => {
            println!("{}", serde_json::to_string_pretty(&PipelineConfig::default())?);
            Ok(())
        }
    }
}
