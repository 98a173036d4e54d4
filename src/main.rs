//! Head pose tracker: real-time head pose estimation from a webcam or video file.

use anyhow::Result;
use clap::Parser;
use head_pose_tracker::{
    app::{AppConfig, HeadPoseApp, VideoSource},
    config::Config,
};
use log::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Camera index to use
    #[arg(long, default_value = "0")]
    cam: i32,

    /// Video file to process
    #[arg(short, long)]
    video: Option<String>,

    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long)]
    config: Option<String>,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Switch landmark stabilizer covariances by head motion
    #[arg(long)]
    adaptive: bool,

    /// Draw the annotation box from the smoothed pose
    #[arg(long)]
    smoothed_annotation: bool,

    /// Show optical flow around the outer left eye corner
    #[arg(long)]
    eye_flow: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    info!("Head Pose Tracker");

    let mut config = if let Some(config_path) = &args.config {
        info!("Loading configuration from: {config_path}");
        match Config::from_file(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                log::warn!("Failed to load config file: {e}. Using defaults.");
                Config::default()
            }
        }
    } else {
        Config::default()
    };

    if args.adaptive {
        config.adaptive.enabled = true;
    }
    if args.smoothed_annotation {
        config.display.annotate_with_smoothed_pose = true;
    }
    if args.eye_flow {
        config.display.show_eye_flow = true;
    }
    config.validate()?;
    config.validate_model_paths()?;

    let app_config = AppConfig {
        video_source: match args.video {
            Some(path) => VideoSource::File(path),
            None => VideoSource::Camera(args.cam),
        },
        config,
    };

    let mut app = HeadPoseApp::new(app_config)?;
    let summary = app.run()?;
    info!(
        "Done: {} frames, {} with a face, {} without a pose",
        summary.frames, summary.tracked_frames, summary.pose_failures
    );

    Ok(())
}
