use std::collections::VecDeque;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use image::RgbImage;
use ndarray::{Array2, Array4};
use personcam::capture::{CaptureError, Display, FrameSource};
use personcam::logging::LineFormat;
use personcam::vision::{Detector, InferenceError, PixelBox};

/// 每次前向传播都返回相同输出张量的检测器
pub struct StubDetector {
    pub outputs: Vec<Array2<f32>>,
    pub layers: Vec<String>,
    pub inputs: Vec<Vec<usize>>,
    pub forwarded_layers: Vec<Vec<String>>,
    pub fail: bool,
}

impl StubDetector {
    pub fn new(outputs: Vec<Array2<f32>>) -> Self {
        Self {
            outputs,
            layers: vec!["yolo_82".into(), "yolo_94".into(), "yolo_106".into()],
            inputs: Vec::new(),
            forwarded_layers: Vec::new(),
            fail: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn failing() -> Self {
        Self { fail: true, ..Self::empty() }
    }
}

impl Detector for StubDetector {
    fn output_layers(&self) -> Vec<String> {
        self.layers.clone()
    }

    fn set_input(&mut self, blob: Array4<f32>) -> Result<(), InferenceError> {
        self.inputs.push(blob.shape().to_vec());
        Ok(())
    }

    fn forward(&mut self, layers: &[String]) -> Result<Vec<Array2<f32>>, InferenceError> {
        self.forwarded_layers.push(layers.to_vec());
        if self.fail {
            return Err(InferenceError::Backend("stub failure".into()));
        }
        Ok(self.outputs.clone())
    }
}

/// 为 `frame` 尺寸图像中的 `bbox` 构造darknet布局的一行
///
/// 帧尺寸取2的幂，使比例在 `f32` 下精确
pub fn row(bbox: PixelBox, frame: (u32, u32), scores: &[f32]) -> Vec<f32> {
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

pub fn tensor(rows: Vec<Vec<f32>>) -> Array2<f32> {
    let cols = rows[0].len();
    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((flat.len() / cols, cols), flat).unwrap()
}

/// 按固定列表回放读取结果的帧来源
pub struct ScriptedSource {
    pub reads: VecDeque<Result<Option<RgbImage>, CaptureError>>,
    pub released: Arc<Mutex<u32>>,
}

impl ScriptedSource {
    pub fn frames(count: usize) -> Self {
        let reads = (0..count)
            .map(|_| Ok(Some(RgbImage::new(64, 64))))
            .collect();
        Self { reads, released: Arc::new(Mutex::new(0)) }
    }
}

impl FrameSource for ScriptedSource {
    fn read(&mut self) -> Result<Option<RgbImage>, CaptureError> {
        self.reads.pop_front().unwrap_or(Ok(None))
    }

    fn release(&mut self) {
        *self.released.lock().unwrap() += 1;
    }
}

/// 记录显示次数并回放预设按键的窗口
#[derive(Default)]
pub struct RecordingDisplay {
    pub keys: VecDeque<Option<char>>,
    pub shown: Arc<Mutex<u32>>,
    pub closed: Arc<Mutex<u32>>,
    pub fail_show: bool,
}

impl Display for RecordingDisplay {
    fn show(&mut self, _frame: &RgbImage) -> Result<(), CaptureError> {
        if self.fail_show {
            return Err(CaptureError::Display("window gone".into()));
        }
        *self.shown.lock().unwrap() += 1;
        Ok(())
    }

    fn poll_key(&mut self) -> Result<Option<char>, CaptureError> {
        Ok(self.keys.pop_front().flatten())
    }

    fn close(&mut self) {
        *self.closed.lock().unwrap() += 1;
    }
}

/// subscriber与测试共享的内存日志
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    pub fn lines_containing(&self, needle: &str) -> Vec<String> {
        self.contents()
            .lines()
            .filter(|line| line.contains(needle))
            .map(str::to_string)
            .collect()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// 运行 `f`，并把所有日志事件收集到返回的缓冲区
pub fn capture_logs<T>(f: impl FnOnce() -> T) -> (T, LogBuffer) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .event_format(LineFormat)
        .with_writer(move || writer.clone())
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, buffer)
}

/// 写出只包含指定文件的darknet模型目录
pub fn model_dir(root: &Path, with_config: bool, with_weights: bool, names: Option<&str>) {
    if with_config {
        fs::write(root.join("yolov3.cfg"), "[net]\nwidth=416\nheight=416\n").unwrap();
    }
    if with_weights {
        fs::write(root.join("yolov3.weights"), [0u8; 16]).unwrap();
    }
    if let Some(names) = names {
        fs::write(root.join("coco.names"), names).unwrap();
    }
}
