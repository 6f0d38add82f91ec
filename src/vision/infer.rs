use ndarray::{Array2, Array4};
use thiserror::Error;

/// 推理后端执行前向传播时的错误
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("no input blob set before forward")]
    MissingInput,
    #[error("unexpected output shape {0:?}")]
    OutputShape(Vec<usize>),
    #[error("backend error: {0}")]
    Backend(String),
}

/// 黑盒目标检测器
///
/// 与DNN引擎的调用方式一致：先设置输入blob，再前向运行到指定输出层。
/// 返回的每个张量每行一个检测结果，
/// `[center_x, center_y, width, height, objectness, class_scores...]`，
/// 坐标为相对帧尺寸的比例。
pub trait Detector {
    /// 输出检测张量的层名称
    fn output_layers(&self) -> Vec<String>;

    /// 设置下一次前向传播的输入
    fn set_input(&mut self, blob: Array4<f32>) -> Result<(), InferenceError>;

    fn forward(&mut self, layers: &[String]) -> Result<Vec<Array2<f32>>, InferenceError>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn output_layers(&self) -> Vec<String> {
        (**self).output_layers()
    }

    fn set_input(&mut self, blob: Array4<f32>) -> Result<(), InferenceError> {
        (**self).set_input(blob)
    }

    fn forward(&mut self, layers: &[String]) -> Result<Vec<Array2<f32>>, InferenceError> {
        (**self).forward(layers)
    }
}

/// 运行一次模型推理
///
/// 依次调用 `set_input` 与 `forward`。
///
/// # 参数
/// * `detector` - 推理后端
/// * `blob` - 输入张量，形状为(1, 3, height, width)
/// * `layers` - 需要收集输出的层
///
/// # 返回值
/// 返回每个输出层的检测张量
///
/// # 错误处理
/// 后端任一步骤失败时返回 [`InferenceError`]
pub fn run_inference<D: Detector + ?Sized>(
    detector: &mut D,
    blob: Array4<f32>,
    layers: &[String],
) -> Result<Vec<Array2<f32>>, InferenceError> {
    detector.set_input(blob)?;
    detector.forward(layers)
}
