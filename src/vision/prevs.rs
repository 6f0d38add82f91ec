use image::{RgbImage, imageops::{self, FilterType}};
use ndarray::{Array, Array4};

/// 调整帧大小以适应网络输入
///
/// 使用双线性插值直接缩放到目标尺寸，不做letterbox也不裁剪，因此不保持宽高比。
///
/// # 参数
/// * `frame` - 原始帧
/// * `width` - 目标宽度
/// * `height` - 目标高度
///
/// # 返回值
/// 返回调整大小后的帧；尺寸已一致时返回副本
pub fn resize_frame(frame: &RgbImage, width: u32, height: u32) -> RgbImage {
    if frame.dimensions() == (width, height) {
        return frame.clone();
    }
    imageops::resize(frame, width, height, FilterType::Triangle)
}

/// 将帧转换为网络输入blob
///
/// 转换步骤包括：
/// 1. 缩放到输入尺寸
/// 2. 像素值乘以 `scale`
/// 3. 按RGB通道顺序排列为NCHW格式
///
/// # 参数
/// * `frame` - 原始帧（RGB）
/// * `input_height` - 网络输入高度
/// * `input_width` - 网络输入宽度
/// * `scale` - 像素缩放系数，通常为1/255
///
/// # 返回值
/// 返回形状为 `(1, 3, input_height, input_width)` 的张量
///
/// # 示例
///
/// ```
/// use image::RgbImage;
/// use personcam::vision::prevs::frame_to_blob;
///
/// let frame = RgbImage::new(640, 480);
/// let blob = frame_to_blob(&frame, 416, 416, 1.0 / 255.0);
/// assert_eq!(blob.shape(), &[1, 3, 416, 416]);
/// ```
pub fn frame_to_blob(frame: &RgbImage, input_height: usize, input_width: usize, scale: f32) -> Array4<f32> {
    let resized = resize_frame(frame, input_width as u32, input_height as u32);
    let mut tensor = Array::zeros((1, 3, input_height, input_width));

    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        let [r, g, b] = pixel.0;

        tensor[[0, 0, y, x]] = r as f32 * scale;
        tensor[[0, 1, y, x]] = g as f32 * scale;
        tensor[[0, 2, y, x]] = b as f32 * scale;
    }

    tensor
}
