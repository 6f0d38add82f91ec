use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};

use personcam::capture::camera::{Camera, Window};
use personcam::config::{self, Config, WINDOW_TITLE};
use personcam::vision::darknet::DarknetNet;
use personcam::vision::{Detector, ModelFormat, ModelPaths};
use personcam::{logging, start};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Darknet cfg + weights through OpenCV DNN
    Darknet,
    /// ONNX export through ONNX Runtime (needs the `onnx` feature)
    Onnx,
}

#[derive(Parser)]
#[command(name = "personcam")]
#[command(about = "Detect people on a webcam feed and label them horizontal or vertical")]
struct Cli {
    /// Directory holding the network, weights and class names
    #[arg(long, value_name = "DIR", default_value = config::MODEL_DIR)]
    model_dir: PathBuf,

    /// Camera device index
    #[arg(long, default_value_t = config::DEFAULT_CAMERA_INDEX)]
    camera: i32,

    /// Directory for app.log
    #[arg(long, value_name = "DIR", default_value = config::LOG_DIR)]
    log_dir: PathBuf,

    /// TrueType font for box labels
    #[arg(long, value_name = "FILE")]
    font: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Backend::Darknet)]
    backend: Backend,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            model_dir: self.model_dir.clone(),
            log_dir: self.log_dir.clone(),
            font_path: self.font.clone(),
            camera_index: self.camera,
            ..Config::default()
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let config = args.config();

    logging::init(&config).context("Failed to set up logging")?;

    let format = match args.backend {
        Backend::Darknet => ModelFormat::Darknet,
        Backend::Onnx => ModelFormat::Onnx,
    };

    let paths = ModelPaths::new(&config.model_dir, format);
    println!("Weight file path: {}", paths.weights.display());
    if let Some(cfg) = &paths.config {
        println!("Config file path: {}", cfg.display());
    }
    println!("Names file path: {}", paths.names.display());

    let reason = match args.backend {
        Backend::Darknet => run(&config, format, DarknetNet::open)?,
        #[cfg(feature = "onnx")]
        Backend::Onnx => run(&config, format, personcam::vision::onnx::OnnxNet::open)?,
        #[cfg(not(feature = "onnx"))]
        Backend::Onnx => anyhow::bail!("built without the `onnx` feature"),
    };

    tracing::debug!("Capture loop stopped: {:?}", reason);
    Ok(())
}

fn run<D: Detector>(
    config: &Config,
    format: ModelFormat,
    open_detector: fn(&ModelPaths) -> Result<D, personcam::vision::ModelLoadError>,
) -> anyhow::Result<personcam::StopReason> {
    let reason = start(config, format, open_detector, Camera::open, || Window::new(WINDOW_TITLE))
        .context("Startup failed")?;
    Ok(reason)
}
