use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use raqote::{DrawOptions, DrawTarget, LineJoin, PathBuilder, SolidSource, Source, StrokeStyle};
use tracing::{debug, info, warn};

use crate::config::DetectionConfig;
use crate::vision::bounds::{Annotation, Detection, Orientation};
use crate::vision::infer::{Detector, InferenceError, run_inference};
use crate::vision::model::{Labels, Model};
use crate::vision::posts::{apply_nms, process_detections};
use crate::vision::prevs::frame_to_blob;

const BOX_COLOR: [u8; 3] = [0, 255, 0];
const BOX_THICKNESS: f32 = 2.0;
const LABEL_OFFSET: i32 = 5;
const LABEL_SCALE: f32 = 14.0;

/// 未指定字体路径时依次尝试的系统字体
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// 逐帧行人检测器
///
/// 持有已加载的 [`Model`]，执行完整的单帧流程：预处理、推理、解码、
/// 非极大值抑制、朝向判断和绘制。
///
/// # 示例
///
/// ```no_run
/// use image::RgbImage;
/// use personcam::config::DetectionConfig;
/// use personcam::vision::detect::FrameProcessor;
/// # use personcam::vision::model::Model;
/// # fn run<D: personcam::vision::infer::Detector>(model: Model<D>) -> Result<(), Box<dyn std::error::Error>> {
///
/// let mut processor = FrameProcessor::new(model, DetectionConfig::default());
/// let mut frame = RgbImage::new(640, 480);
/// let annotations = processor.process(&mut frame)?;
/// println!("{} people", annotations.len());
/// # Ok(())
/// # }
/// ```
pub struct FrameProcessor<D> {
    model: Model<D>,
    config: DetectionConfig,
    font: Option<FontArc>,
}

impl<D: Detector> FrameProcessor<D> {
    pub fn new(model: Model<D>, config: DetectionConfig) -> Self {
        Self { model, config, font: None }
    }

    /// 设置标签字体，未设置时只绘制矩形框
    pub fn with_font(mut self, font: Option<FontArc>) -> Self {
        self.font = font;
        self
    }

    pub fn model(&self) -> &Model<D> {
        &self.model
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// 检测帧中的行人并在原帧上绘制结果
    ///
    /// # 返回值
    /// 返回绘制的标注；没有保留的检测结果时帧保持不变
    ///
    /// # 错误处理
    /// 推理后端失败时返回 [`InferenceError`]
    pub fn process(&mut self, frame: &mut RgbImage) -> Result<Vec<Annotation>, InferenceError> {
        let Model { detector, output_layers, labels, .. } = &mut self.model;
        process_frame(frame, detector, output_layers, labels, &self.config, self.font.as_ref())
    }
}

/// 对单帧执行检测流程
///
/// 每个保留的检测结果都会以info级别记录一行日志。
///
/// # 参数
/// * `frame` - 待检测的帧，结果直接绘制在其上
/// * `detector` - 执行前向传播的后端
/// * `output_layers` - 收集检测张量的输出层
/// * `labels` - 按类别ID索引的类别名称
/// * `config` - 输入尺寸与各项阈值
/// * `font` - 标签字体，`None` 时只绘制矩形框
///
/// # 返回值
/// 返回绘制的标注列表
///
/// # 错误处理
/// 推理失败时返回 [`InferenceError`]，此时帧不会被修改
pub fn process_frame<D: Detector + ?Sized>(
    frame: &mut RgbImage,
    detector: &mut D,
    output_layers: &[String],
    labels: &Labels,
    config: &DetectionConfig,
    font: Option<&FontArc>,
) -> Result<Vec<Annotation>, InferenceError> {
    let (width, height) = frame.dimensions();
    let blob = frame_to_blob(frame, config.input_height, config.input_width, config.pixel_scale);

    let start_time = Instant::now();
    let outputs = run_inference(detector, blob, output_layers)?;
    debug!("Inference took {:?}", start_time.elapsed());

    let candidates = process_detections(&outputs, width, height, config);
    let kept = apply_nms(&candidates, config.confidence_threshold, config.nms_threshold);

    let mut annotations = Vec::with_capacity(kept.len());
    for index in kept {
        let detection = candidates[index];
        let bbox = detection.bbox;
        let Some(orientation) = Orientation::classify(&bbox, config.aspect_ratio_threshold) else {
            warn!(
                "Skipping box without positive height at {}, {}, {}, {}",
                bbox.x, bbox.y, bbox.width, bbox.height
            );
            continue;
        };

        let class_name = labels.name(detection.class_id);
        let label = format_label(&class_name, detection.confidence, orientation);
        info!(
            "Detected {} {}: {} at {}, {}, {}, {}",
            orientation.as_str().to_lowercase(),
            class_name,
            label,
            bbox.x,
            bbox.y,
            bbox.width,
            bbox.height
        );

        annotations.push(Annotation { detection, orientation, label });
    }

    draw_detections(frame, &annotations, font);
    Ok(annotations)
}

/// 生成标签文本 `"<class>: <confidence> (<orientation>)"`，置信度保留两位小数
///
/// # 示例
///
/// ```
/// use personcam::vision::Orientation;
/// use personcam::vision::detect::format_label;
///
/// assert_eq!(format_label("person", 0.9, Orientation::Horizontal), "person: 0.90 (Horizontal)");
/// ```
pub fn format_label(class_name: &str, confidence: f32, orientation: Orientation) -> String {
    format!("{}: {:.2} ({})", class_name, confidence, orientation)
}

/// 在帧上绘制检测结果
///
/// 用raqote在帧的副本上描绘绿色矩形框，再用 `font` 在框上方绘制标签。
///
/// # 参数
/// * `frame` - 目标帧
/// * `annotations` - 需要绘制的标注，为空时帧保持不变
/// * `font` - 标签字体，`None` 时只绘制矩形框
pub fn draw_detections(frame: &mut RgbImage, annotations: &[Annotation], font: Option<&FontArc>) {
    if annotations.is_empty() {
        return;
    }

    let detections: Vec<Detection> = annotations.iter().map(|a| a.detection).collect();
    stroke_boxes(frame, &detections);

    if let Some(font) = font {
        let scale = PxScale::from(LABEL_SCALE);
        for annotation in annotations {
            let bbox = &annotation.detection.bbox;
            let (_, text_height) = text_size(scale, font, &annotation.label);
            let top = label_top(bbox.y, text_height);
            draw_text_mut(frame, Rgb(BOX_COLOR), bbox.x, top, scale, font, &annotation.label);
        }
    }
}

/// 标签顶部位置，使基线位于框上方 `LABEL_OFFSET` 像素处；在 `i32` 下限处饱和
fn label_top(box_top: i32, text_height: u32) -> i32 {
    let text_height = i32::try_from(text_height).unwrap_or(i32::MAX);
    box_top.saturating_sub(LABEL_OFFSET).saturating_sub(text_height)
}

fn stroke_boxes(frame: &mut RgbImage, detections: &[Detection]) {
    let (width, height) = frame.dimensions();
    let mut dt = DrawTarget::new(width as i32, height as i32);

    for (dst, pixel) in dt.get_data_mut().iter_mut().zip(frame.pixels()) {
        let [r, g, b] = pixel.0;
        *dst = u32::from_le_bytes([b, g, r, 0xFF]);
    }

    let [r, g, b] = BOX_COLOR;
    let source = Source::Solid(SolidSource { r, g, b, a: 0xFF });
    let style = StrokeStyle {
        join: LineJoin::Miter,
        width: BOX_THICKNESS,
        ..StrokeStyle::default()
    };

    for detection in detections {
        let bbox = &detection.bbox;
        let mut pb = PathBuilder::new();
        pb.rect(bbox.x as f32, bbox.y as f32, bbox.width as f32, bbox.height as f32);
        dt.stroke(&pb.finish(), &source, &style, &DrawOptions::new());
    }

    for (pixel, &argb) in frame.pixels_mut().zip(dt.get_data()) {
        let [b, g, r, _] = argb.to_le_bytes();
        *pixel = Rgb([r, g, b]);
    }
}

/// 加载标签字体
///
/// 指定 `path` 时只尝试该路径，否则依次尝试常见的系统字体位置。
///
/// # 返回值
/// 找不到可用字体时记录警告并返回 `None`
pub fn load_font(path: Option<&Path>) -> Option<FontArc> {
    let candidates: Vec<PathBuf> = match path {
        Some(path) => vec![path.to_path_buf()],
        None => SYSTEM_FONTS.iter().map(PathBuf::from).collect(),
    };

    for candidate in &candidates {
        let Ok(bytes) = fs::read(candidate) else {
            continue;
        };
        match FontArc::try_from_vec(bytes) {
            Ok(font) => {
                debug!("Using label font {}", candidate.display());
                return Some(font);
            }
            Err(e) => warn!("Unusable font {}: {}", candidate.display(), e),
        }
    }

    warn!("No label font found; boxes will be drawn without text");
    None
}
