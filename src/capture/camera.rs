//! OpenCV摄像头与HighGUI窗口

use image::RgbImage;
use opencv::{
    core::{self, Mat, Scalar},
    highgui, imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use tracing::{debug, warn};

use crate::capture::{CaptureError, Display, FrameSource};
use crate::config::KEY_POLL_MS;

fn device(e: opencv::Error) -> CaptureError {
    CaptureError::Device(e.to_string())
}

fn display(e: opencv::Error) -> CaptureError {
    CaptureError::Display(e.to_string())
}

/// 按设备索引打开的摄像头
pub struct Camera {
    capture: VideoCapture,
    index: i32,
}

impl Camera {
    pub fn open(index: i32) -> Result<Self, CaptureError> {
        let capture = VideoCapture::new(index, videoio::CAP_ANY).map_err(device)?;
        if !capture.is_opened().map_err(device)? {
            return Err(CaptureError::Open(index));
        }

        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or(0.0);
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0);
        debug!("Opened camera {} at {}x{}", index, width, height);

        Ok(Self { capture, index })
    }
}

impl FrameSource for Camera {
    fn read(&mut self) -> Result<Option<RgbImage>, CaptureError> {
        let mut frame = Mat::default();
        if !self.capture.read(&mut frame).map_err(device)? || frame.empty() {
            return Ok(None);
        }
        mat_to_rgb(&frame).map(Some)
    }

    fn release(&mut self) {
        if let Err(e) = self.capture.release() {
            warn!("Failed to release camera {}: {}", self.index, e);
        }
    }
}

/// 将8位BGR `Mat` 转换为RGB图像
pub fn mat_to_rgb(mat: &Mat) -> Result<RgbImage, CaptureError> {
    let mut rgb = Mat::default();
    imgproc::cvt_color(mat, &mut rgb, imgproc::COLOR_BGR2RGB, 0).map_err(device)?;

    let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
    let bytes = rgb.data_bytes().map_err(device)?.to_vec();
    RgbImage::from_raw(width, height, bytes)
        .ok_or_else(|| CaptureError::Device(format!("unexpected frame layout {}x{}", width, height)))
}

/// 将RGB图像转换为用于显示的8位BGR `Mat`
pub fn rgb_to_mat(frame: &RgbImage) -> Result<Mat, CaptureError> {
    let (width, height) = frame.dimensions();
    let mut rgb = Mat::new_rows_cols_with_default(height as i32, width as i32, core::CV_8UC3, Scalar::all(0.0))
        .map_err(display)?;
    rgb.data_bytes_mut().map_err(display)?.copy_from_slice(frame.as_raw());

    let mut bgr = Mat::default();
    imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0).map_err(display)?;
    Ok(bgr)
}

/// 带名称的HighGUI窗口
pub struct Window {
    title: String,
}

impl Window {
    pub fn new(title: &str) -> Result<Self, CaptureError> {
        highgui::named_window(title, highgui::WINDOW_AUTOSIZE).map_err(display)?;
        Ok(Self { title: title.to_string() })
    }
}

impl Display for Window {
    fn show(&mut self, frame: &RgbImage) -> Result<(), CaptureError> {
        let mat = rgb_to_mat(frame)?;
        highgui::imshow(&self.title, &mat).map_err(display)
    }

    fn poll_key(&mut self) -> Result<Option<char>, CaptureError> {
        let key = highgui::wait_key(KEY_POLL_MS).map_err(display)?;
        if key < 0 {
            return Ok(None);
        }
        Ok(char::from_u32((key & 0xFF) as u32))
    }

    fn close(&mut self) {
        if let Err(e) = highgui::destroy_all_windows() {
            warn!("Failed to close windows: {}", e);
        }
    }
}
