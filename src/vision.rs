//! Vision模块 - 单帧行人检测
//!
//! 该模块提供逐帧处理的核心功能，包括：
//! - 模型加载（网络 + 类别标签）
//! - 帧预处理为输入blob
//! - 通过可替换的 [`Detector`] 执行推理
//! - 结果后处理：类别/置信度过滤与非极大值抑制
//! - 朝向判断与可视化绘制
//!
//! # 主要组件
//!
//! - [`FrameProcessor`]：持有已加载的模型，对帧进行检测与标注
//! - [`load_model`]：检查并加载模型目录
//! - [`Detector`]：推理后端约定（先 `set_input` 再 `forward`）
//!
//! 后端由cargo feature控制：`darknet`（feature `opencv`，OpenCV DNN）读取
//! `.cfg`/`.weights`；`onnx`（feature `onnx`）通过ONNX Runtime运行导出模型。
//!
//! # 工作流程
//!
//! 1. 为模型目录构建 [`ModelPaths`]
//! 2. 传入后端构造函数调用 [`load_model`]
//! 3. 用 [`FrameProcessor`] 包装模型
//! 4. 每帧调用一次 [`FrameProcessor::process`]

pub mod bounds;
pub mod detect;
pub mod infer;
pub mod model;
pub mod posts;
pub mod prevs;

#[cfg(feature = "opencv")]
pub mod darknet;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use bounds::{Annotation, Detection, Orientation, PixelBox};
pub use detect::{FrameProcessor, draw_detections, load_font, process_frame};
pub use infer::{Detector, InferenceError};
pub use model::{Labels, Model, ModelFormat, ModelLoadError, ModelPaths, load_model};
