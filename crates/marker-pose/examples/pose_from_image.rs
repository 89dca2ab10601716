//! Run the pipeline once on a single image and print the report as JSON.
//!
//! Usage: `cargo run --example pose_from_image -- <image> [dictionary.json]`

use std::{env, path::PathBuf};

use marker_pose::{
    build_pipeline, from_rgb_image, DictionarySpec, Header, ImageMessage, Outputs,
    PipelineConfig, PoseMessage, RecordingPublisher,
};
use serde::Serialize;

#[cfg(not(feature = "tracing"))]
use log::{info, LevelFilter};
#[cfg(feature = "tracing")]
use tracing::info;

#[cfg(feature = "tracing")]
use marker_pose::core::init_tracing;
#[cfg(not(feature = "tracing"))]
use marker_pose::core::init_with_level;

#[derive(Serialize)]
struct MarkerReport {
    id: u32,
    rvec: [f64; 3],
    tvec: [f64; 3],
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(not(feature = "tracing"))]
    init_with_level(LevelFilter::Info)?;
    #[cfg(feature = "tracing")]
    init_tracing(false);

    let mut args = env::args().skip(1);
    let image_path = PathBuf::from(args.next().ok_or("usage: pose_from_image <image> [dict]")?);
    let dictionary = match args.next() {
        Some(path) => DictionarySpec::File(path.into()),
        None => DictionarySpec::Predefined("DEMO_4X4_9".into()),
    };

    let img = image::open(&image_path)?.to_rgb8();
    info!(
        "loaded {} ({}x{})",
        image_path.display(),
        img.width(),
        img.height()
    );

    let config = PipelineConfig {
        dictionary,
        draw_markers: true,
        ..PipelineConfig::default()
    };
    let mut outputs = Outputs {
        rvec: Box::new(RecordingPublisher::<PoseMessage>::new(&config.topics.rvec)),
        tvec: Box::new(RecordingPublisher::<PoseMessage>::new(&config.topics.tvec)),
        image: Box::new(RecordingPublisher::<ImageMessage>::new(&config.topics.output_image)),
    };
    let mut pipeline = build_pipeline(config)?;
    let frame = from_rgb_image(&img, Header::default());
    let report = pipeline.process(&frame, &mut outputs)?;

    info!(
        "{} markers, {} rejected candidates in {:.2?}",
        report.markers.len(),
        report.rejected,
        report.elapsed
    );
    let markers: Vec<MarkerReport> = report
        .markers
        .iter()
        .zip(&report.poses)
        .map(|(m, p)| MarkerReport {
            id: m.id,
            rvec: [p.rvec.x, p.rvec.y, p.rvec.z],
            tvec: [p.tvec.x, p.tvec.y, p.tvec.z],
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&markers)?);
    Ok(())
}
