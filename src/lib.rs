pub mod app;
pub mod capture;
pub mod config;
pub mod logging;
pub mod vision;

// 重新导出常用类型
pub use app::{StartupError, start};
pub use capture::{CaptureLoop, Display, FrameSource, LoopState, StopReason};
pub use config::{Config, DetectionConfig};
pub use vision::{
    Annotation, Detection, Detector, FrameProcessor, Labels, Orientation, PixelBox, load_model,
};
