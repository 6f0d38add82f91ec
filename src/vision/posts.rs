//! 检测器原始输出的后处理
//!
//! 将输出张量转换为像素坐标下的检测结果（类别过滤、置信度阈值、异常行检查），
//! 并对其执行贪心非极大值抑制。

use ndarray::{Array2, ArrayView1, Axis};
use tracing::warn;

use crate::config::DetectionConfig;
use crate::vision::bounds::{Detection, PixelBox};

/// 类别分数之前的列数：中心x/y、宽、高、objectness
pub const BOX_COLUMNS: usize = 5;

/// 处理模型输出，解码为检测结果
///
/// 最高分类别为 `config.target_class` 且分数严格大于
/// `config.confidence_threshold` 的行会被保留。含非有限值、列数不足、
/// 像素框超出 `i32` 范围或尺寸不为正的行会被丢弃并记录警告。
///
/// # 参数
/// * `outputs` - 每个输出层一个张量
/// * `frame_width` - 原始帧宽度
/// * `frame_height` - 原始帧高度
/// * `config` - 阈值与目标类别
///
/// # 返回值
/// 返回按解码顺序排列的检测结果列表
///
/// # 示例
///
/// ```
/// use ndarray::array;
/// use personcam::config::DetectionConfig;
/// use personcam::vision::posts::process_detections;
///
/// let output = array![[0.5f32, 0.5, 0.25, 0.5, 1.0, 0.9, 0.1]];
/// let detections = process_detections(&[output], 256, 256, &DetectionConfig::default());
/// assert_eq!(detections.len(), 1);
/// assert_eq!(detections[0].bbox.width, 64);
/// ```
pub fn process_detections(
    outputs: &[Array2<f32>],
    frame_width: u32,
    frame_height: u32,
    config: &DetectionConfig,
) -> Vec<Detection> {
    let mut detections = Vec::new();

    for output in outputs {
        for row in output.axis_iter(Axis(0)) {
            if let Some(detection) = decode_row(row, frame_width, frame_height, config) {
                detections.push(detection);
            }
        }
    }

    detections
}

fn decode_row(
    row: ArrayView1<'_, f32>,
    frame_width: u32,
    frame_height: u32,
    config: &DetectionConfig,
) -> Option<Detection> {
    if row.len() <= BOX_COLUMNS {
        warn!("Dropping detection row with {} columns", row.len());
        return None;
    }
    if row.iter().any(|v| !v.is_finite()) {
        warn!("Dropping detection row with non-finite values");
        return None;
    }

    let (class_id, confidence) = best_class(row.slice(ndarray::s![BOX_COLUMNS..]))?;
    if confidence <= config.confidence_threshold || class_id != config.target_class {
        return None;
    }

    let Some(bbox) = to_pixel_box(row, frame_width as f32, frame_height as f32) else {
        warn!(
            "Dropping detection row outside pixel range: {}, {}, {}, {}",
            row[0], row[1], row[2], row[3]
        );
        return None;
    };
    if !bbox.is_valid() {
        warn!(
            "Skipping degenerate box at {}, {}, {}, {}",
            bbox.x, bbox.y, bbox.width, bbox.height
        );
        return None;
    }

    Some(Detection::new(bbox, class_id, confidence))
}

/// 将中心点/尺寸比例换算为左上角像素框
///
/// 每一步都向零截断。坐标或边界（`x + width`、`y + height`）超出 `i32`
/// 时返回 `None`。
fn to_pixel_box(row: ArrayView1<'_, f32>, frame_width: f32, frame_height: f32) -> Option<PixelBox> {
    let center_x = (row[0] * frame_width).trunc();
    let center_y = (row[1] * frame_height).trunc();
    let w = (row[2] * frame_width).trunc();
    let h = (row[3] * frame_height).trunc();

    let bbox = PixelBox::new(
        to_pixel(center_x - w / 2.0)?,
        to_pixel(center_y - h / 2.0)?,
        to_pixel(w)?,
        to_pixel(h)?,
    );
    i32::try_from(bbox.right()).ok()?;
    i32::try_from(bbox.bottom()).ok()?;
    Some(bbox)
}

fn to_pixel(value: f32) -> Option<i32> {
    if !value.is_finite() {
        return None;
    }
    i32::try_from(value.trunc() as i64).ok()
}

/// 最高分的索引和值，并列时取第一个
fn best_class(scores: ArrayView1<'_, f32>) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &score) in scores.iter().enumerate() {
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((index, score)),
        }
    }
    best
}

/// 应用非极大值抑制(NMS)
///
/// 忽略置信度不高于 `score_threshold` 的候选框，其余按置信度降序遍历；
/// 置信度相同时保持原有顺序，先出现的框优先。与已保留框的IoU大于
/// `nms_threshold` 的框会被抑制。
///
/// # 参数
/// * `detections` - 候选检测结果
/// * `score_threshold` - 置信度阈值
/// * `nms_threshold` - IoU阈值
///
/// # 返回值
/// 返回保留的索引，按升序排列
///
/// # 示例
///
/// ```
/// use personcam::vision::{Detection, PixelBox};
/// use personcam::vision::posts::apply_nms;
///
/// let detections = vec![
///     Detection::new(PixelBox::new(0, 0, 100, 100), 0, 0.6),
///     Detection::new(PixelBox::new(5, 5, 100, 100), 0, 0.9),
/// ];
/// assert_eq!(apply_nms(&detections, 0.5, 0.4), vec![1]);
/// ```
pub fn apply_nms(detections: &[Detection], score_threshold: f32, nms_threshold: f32) -> Vec<usize> {
    let mut order: Vec<usize> = (0..detections.len())
        .filter(|&i| detections[i].confidence > score_threshold)
        .collect();
    // 稳定排序：同分保持解码顺序
    order.sort_by(|&a, &b| detections[b].confidence.total_cmp(&detections[a].confidence));

    let mut kept: Vec<usize> = Vec::with_capacity(order.len());
    for index in order {
        let candidate = &detections[index].bbox;
        if kept
            .iter()
            .all(|&k| detections[k].bbox.iou(candidate) <= nms_threshold)
        {
            kept.push(index);
        }
    }

    kept.sort_unstable();
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn row(bbox: PixelBox, frame: (u32, u32), scores: &[f32]) -> Vec<f32> {
        let (fw, fh) = (frame.0 as f32, frame.1 as f32);
        let mut row = vec![
            (bbox.x as f32 + bbox.width as f32 / 2.0) / fw,
            (bbox.y as f32 + bbox.height as f32 / 2.0) / fh,
            bbox.width as f32 / fw,
            bbox.height as f32 / fh,
            1.0,
        ];
        row.extend_from_slice(scores);
        row
    }

    fn tensor(rows: Vec<Vec<f32>>) -> Array2<f32> {
        let cols = rows[0].len();
        let flat: Vec<f32> = rows.into_iter().flatten().collect();
        Array2::from_shape_vec((flat.len() / cols, cols), flat).unwrap()
    }

    fn detection(x: i32, y: i32, w: i32, h: i32, confidence: f32) -> Detection {
        Detection::new(PixelBox::new(x, y, w, h), 0, confidence)
    }

    #[test]
    fn decodes_fractions_to_pixels() {
        let output = tensor(vec![row(PixelBox::new(10, 10, 50, 20), (256, 256), &[0.9, 0.1])]);
        let detections = process_detections(&[output], 256, 256, &DetectionConfig::default());

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].bbox, PixelBox::new(10, 10, 50, 20));
        assert_eq!(detections[0].class_id, 0);
        assert_eq!(detections[0].confidence, 0.9);
    }

    #[test]
    fn filters_by_class_and_confidence() {
        let frame = (256, 256);
        let bbox = PixelBox::new(64, 64, 32, 64);
        let output = tensor(vec![
            row(bbox, frame, &[0.9, 0.1]),  // 保留
            row(bbox, frame, &[0.5, 0.1]),  // 恰好等于阈值
            row(bbox, frame, &[0.3, 0.1]),  // 置信度过低
            row(bbox, frame, &[0.6, 0.95]), // 最高分类别不是目标类别
        ]);
        let detections = process_detections(&[output], 256, 256, &DetectionConfig::default());

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].confidence, 0.9);
    }

    #[test]
    fn reads_every_output_tensor() {
        let frame = (256, 256);
        let first = tensor(vec![row(PixelBox::new(0, 0, 16, 32), frame, &[0.8])]);
        let second = tensor(vec![row(PixelBox::new(128, 128, 16, 32), frame, &[0.7])]);
        let detections = process_detections(&[first, second], 256, 256, &DetectionConfig::default());
        assert_eq!(detections.len(), 2);
    }

    #[test]
    fn drops_non_finite_and_degenerate_rows() {
        let frame = (256, 256);
        let mut nan = row(PixelBox::new(0, 0, 16, 32), frame, &[0.9]);
        nan[5] = f32::NAN;
        let mut inf = row(PixelBox::new(0, 0, 16, 32), frame, &[0.9]);
        inf[0] = f32::INFINITY;
        let flat = row(PixelBox::new(0, 0, 16, 0), frame, &[0.9]);
        let short = tensor(vec![vec![0.5, 0.5, 0.1, 0.1, 1.0]]);

        let detections = process_detections(
            &[tensor(vec![nan, inf, flat]), short],
            256,
            256,
            &DetectionConfig::default(),
        );
        assert!(detections.is_empty());
    }

    #[test]
    fn drops_rows_that_overflow_pixel_space() {
        let frame = (640, 480);
        let huge = tensor(vec![
            vec![3.0e6, 0.5, 3.0e6, 0.1, 1.0, 0.9],
            vec![3.0e6, 0.5, 3.0e6, 0.1, 1.0, 0.8],
        ]);
        let mut wide = row(PixelBox::new(0, 0, 16, 32), frame, &[0.9]);
        wide[2] = 1.0e7;

        let detections = process_detections(
            &[huge, tensor(vec![wide])],
            frame.0,
            frame.1,
            &DetectionConfig::default(),
        );
        assert!(detections.is_empty());
        assert!(apply_nms(&detections, 0.5, 0.4).is_empty());
    }

    #[test]
    fn keeps_boxes_hanging_off_the_frame() {
        // 中心位于左边缘，x为负
        let output = tensor(vec![vec![0.0, 0.5, 0.25, 0.5, 1.0, 0.9]]);
        let detections = process_detections(&[output], 256, 256, &DetectionConfig::default());

        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].bbox, PixelBox::new(-32, 64, 64, 128));
    }

    #[test]
    fn nms_survives_boxes_near_the_i32_limit() {
        let detections = vec![
            detection(i32::MAX - 50, 0, 100, 100, 0.9),
            detection(i32::MAX - 40, 0, 90, 100, 0.8),
        ];
        assert_eq!(apply_nms(&detections, 0.5, 0.4), vec![0]);
    }

    #[test]
    fn nms_keeps_highest_of_overlapping_pair() {
        let detections = vec![
            detection(0, 0, 100, 100, 0.6),
            detection(5, 5, 100, 100, 0.9),
            detection(300, 300, 50, 50, 0.7),
        ];
        assert_eq!(apply_nms(&detections, 0.5, 0.4), vec![1, 2]);
    }

    #[test]
    fn nms_tie_goes_to_first_seen() {
        let detections = vec![
            detection(0, 0, 100, 100, 0.8),
            detection(2, 2, 100, 100, 0.8),
        ];
        assert_eq!(apply_nms(&detections, 0.5, 0.4), vec![0]);
    }

    #[test]
    fn nms_keeps_boxes_at_threshold() {
        // IoU = 50*100 / (2*100*100 - 50*100) = 1/3，低于0.4
        let detections = vec![
            detection(0, 0, 100, 100, 0.9),
            detection(50, 0, 100, 100, 0.8),
        ];
        assert_eq!(apply_nms(&detections, 0.5, 0.4), vec![0, 1]);
    }

    #[test]
    fn nms_ignores_weak_candidates() {
        let detections = vec![detection(0, 0, 10, 10, 0.5), detection(50, 50, 10, 10, 0.51)];
        assert_eq!(apply_nms(&detections, 0.5, 0.4), vec![1]);
    }

    #[test]
    fn nms_output_is_iou_disjoint() {
        let mut detections = Vec::new();
        for i in 0..40 {
            let offset = (i * 7) % 60;
            let confidence = 0.51 + (i % 9) as f32 * 0.05;
            detections.push(detection(offset, offset / 2, 40 + i % 5, 60, confidence));
        }

        let kept = apply_nms(&detections, 0.5, 0.4);
        assert!(!kept.is_empty());
        for (n, &a) in kept.iter().enumerate() {
            for &b in &kept[n + 1..] {
                assert!(detections[a].bbox.iou(&detections[b].bbox) <= 0.4);
            }
        }
    }
}
