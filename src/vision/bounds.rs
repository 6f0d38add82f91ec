use std::fmt;

/// 像素坐标下的边界框
///
/// `(x, y)` 为左上角。框超出帧边缘时坐标可以为负。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PixelBox {
    /// 左上角x坐标
    pub x: i32,
    /// 左上角y坐标
    pub y: i32,
    /// 宽度
    pub width: i32,
    /// 高度
    pub height: i32,
}

impl PixelBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// 右边界，使用i64计算以免 `x + width` 溢出
    pub fn right(&self) -> i64 {
        self.x as i64 + self.width as i64
    }

    pub fn bottom(&self) -> i64 {
        self.y as i64 + self.height as i64
    }

    /// 像素面积，退化框为0
    pub fn area(&self) -> i64 {
        if self.is_valid() {
            self.width as i64 * self.height as i64
        } else {
            0
        }
    }

    /// 宽和高均严格为正
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// 两个框的重叠面积
    pub fn intersection(&self, other: &PixelBox) -> i64 {
        let width = self.right().min(other.right()) - self.x.max(other.x) as i64;
        let height = self.bottom().min(other.bottom()) - self.y.max(other.y) as i64;

        if width <= 0 || height <= 0 {
            0
        } else {
            width * height
        }
    }

    /// 计算两个框的交并比(IoU)
    ///
    /// # 返回值
    /// 返回0到1之间的IoU值；两个空框的IoU为0
    ///
    /// # 示例
    ///
    /// ```
    /// use personcam::vision::PixelBox;
    ///
    /// let a = PixelBox::new(0, 0, 10, 10);
    /// let b = PixelBox::new(5, 0, 10, 10);
    /// assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    /// ```
    pub fn iou(&self, other: &PixelBox) -> f32 {
        let inter = self.intersection(other);
        let union = self.area() + other.area() - inter;
        if union <= 0 {
            0.0
        } else {
            inter as f32 / union as f32
        }
    }

    /// 宽高比 `width / height`，高度不为正时返回 `None`
    pub fn aspect_ratio(&self) -> Option<f32> {
        (self.height > 0).then(|| self.width as f32 / self.height as f32)
    }
}

/// 检测结果
///
/// 通过解码的候选框，包含边界框、类别和置信度。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    /// 目标的边界框
    pub bbox: PixelBox,
    /// 类别ID
    pub class_id: usize,
    /// 置信度
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: PixelBox, class_id: usize, confidence: f32) -> Self {
        Self { bbox, class_id, confidence }
    }
}

/// 仅根据框的形状判断的人体大致朝向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

impl Orientation {
    /// 判断框的朝向
    ///
    /// 宽度大于高度的 `threshold` 倍为水平，其余（包括相等）为竖直。
    ///
    /// # 参数
    /// * `bbox` - 边界框
    /// * `threshold` - 宽高比阈值
    ///
    /// # 返回值
    /// 高度不为正时返回 `None`
    pub fn classify(bbox: &PixelBox, threshold: f32) -> Option<Self> {
        let ratio = bbox.aspect_ratio()?;
        Some(if ratio > threshold {
            Orientation::Horizontal
        } else {
            Orientation::Vertical
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Horizontal => "Horizontal",
            Orientation::Vertical => "Vertical",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个保留检测结果的绘制内容
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub detection: Detection,
    pub orientation: Orientation,
    pub label: String,
}
