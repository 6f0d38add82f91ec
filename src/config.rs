use std::path::PathBuf;

pub const MODEL_DIR: &str = "yolov3-coco";
pub const CONFIG_FILE: &str = "yolov3.cfg";
pub const WEIGHTS_FILE: &str = "yolov3.weights";
pub const NAMES_FILE: &str = "coco.names";
pub const ONNX_FILE: &str = "yolov3.onnx";

pub const LOG_DIR: &str = "logs";
pub const LOG_FILE: &str = "app.log";

pub const PERSON_CLASS_ID: usize = 0;

// 检测超参数
pub const DEFAULT_INPUT_WIDTH: usize = 416;
pub const DEFAULT_INPUT_HEIGHT: usize = 416;
pub const DEFAULT_PIXEL_SCALE: f32 = 1.0 / 255.0;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.4;
pub const DEFAULT_ASPECT_RATIO_THRESHOLD: f32 = 1.2;

// 采集与显示
pub const DEFAULT_CAMERA_INDEX: i32 = 0;
pub const WINDOW_TITLE: &str = "Frame";
pub const QUIT_KEY: char = 'q';
pub const KEY_POLL_MS: i32 = 1;

/// 运行配置，`Default` 取上面的常量，命令行可覆盖其中几项
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub model_dir: PathBuf,
    pub log_dir: PathBuf,
    pub font_path: Option<PathBuf>,
    pub camera_index: i32,
    pub detection: DetectionConfig,
}

/// 帧处理器使用的阈值与输入尺寸
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionConfig {
    pub input_width: usize,
    pub input_height: usize,
    pub pixel_scale: f32,
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    pub aspect_ratio_threshold: f32,
    pub target_class: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            input_width: DEFAULT_INPUT_WIDTH,
            input_height: DEFAULT_INPUT_HEIGHT,
            pixel_scale: DEFAULT_PIXEL_SCALE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            nms_threshold: DEFAULT_NMS_THRESHOLD,
            aspect_ratio_threshold: DEFAULT_ASPECT_RATIO_THRESHOLD,
            target_class: PERSON_CLASS_ID,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from(MODEL_DIR),
            log_dir: PathBuf::from(LOG_DIR),
            font_path: None,
            camera_index: DEFAULT_CAMERA_INDEX,
            detection: DetectionConfig::default(),
        }
    }
}

impl Config {
    /// 日志文件路径 `log_dir/app.log`
    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join(LOG_FILE)
    }
}
