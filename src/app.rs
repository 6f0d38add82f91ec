use thiserror::Error;
use tracing::info;

use crate::capture::{CaptureError, CaptureLoop, Display, FrameSource, StopReason};
use crate::config::Config;
use crate::vision::{Detector, FrameProcessor, ModelFormat, ModelLoadError, ModelPaths, load_font, load_model};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Model(#[from] ModelLoadError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// 启动应用
///
/// 先加载模型，再打开采集设备和显示窗口，最后运行采集循环直到结束。
/// 模型加载成功后才会打开设备，模型目录有问题时不会触碰摄像头。
///
/// # 参数
/// * `config` - 运行配置
/// * `format` - 模型文件布局
/// * `open_detector` - 推理后端构造函数
/// * `open_source` - 按摄像头索引打开帧来源
/// * `open_display` - 打开显示窗口
///
/// # 返回值
/// 返回采集循环的停止原因
pub fn start<D, S, W>(
    config: &Config,
    format: ModelFormat,
    open_detector: impl FnOnce(&ModelPaths) -> Result<D, ModelLoadError>,
    open_source: impl FnOnce(i32) -> Result<S, CaptureError>,
    open_display: impl FnOnce() -> Result<W, CaptureError>,
) -> Result<StopReason, StartupError>
where
    D: Detector,
    S: FrameSource,
    W: Display,
{
    let paths = ModelPaths::new(&config.model_dir, format);
    let model = load_model(paths, open_detector)?;
    let processor = FrameProcessor::new(model, config.detection)
        .with_font(load_font(config.font_path.as_deref()));

    info!("Starting video capture...");
    let mut source = open_source(config.camera_index)?;
    let display = match open_display() {
        Ok(display) => display,
        Err(e) => {
            source.release();
            return Err(e.into());
        }
    };

    Ok(CaptureLoop::new(source, processor, display).run())
}
