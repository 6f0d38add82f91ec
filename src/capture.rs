//! 阻塞式的 采集 -> 处理 -> 显示 循环
//!
//! 循环是一个两状态的状态机：持续收到帧时保持 `Running`，在第一次读取失败、
//! 按下退出键或处理/显示出错时停止。不重试，也没有超时；摄像头或推理调用
//! 卡住时循环会一直阻塞到其返回。

use image::RgbImage;
use thiserror::Error;
use tracing::{error, info};

use crate::config::QUIT_KEY;
use crate::vision::{Annotation, Detector, FrameProcessor, InferenceError};

#[cfg(feature = "opencv")]
pub mod camera;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open capture device {0}")]
    Open(i32),
    #[error("device error: {0}")]
    Device(String),
    #[error("display error: {0}")]
    Display(String),
}

/// 逐帧读取的帧来源
pub trait FrameSource {
    /// 读取下一帧，设备没有产出时返回 `None`
    fn read(&mut self) -> Result<Option<RgbImage>, CaptureError>;

    /// 释放设备，循环停止时恰好调用一次
    fn release(&mut self);
}

/// 显示标注后的帧并上报按键
pub trait Display {
    fn show(&mut self, frame: &RgbImage) -> Result<(), CaptureError>;

    /// 上次轮询以来按下的键
    fn poll_key(&mut self) -> Result<Option<char>, CaptureError>;

    /// 关闭所有窗口，循环停止时恰好调用一次
    fn close(&mut self);
}

/// 在原帧上完成一次标注
///
/// 由 [`FrameProcessor`] 实现
pub trait ProcessFrame {
    fn process(&mut self, frame: &mut RgbImage) -> Result<Vec<Annotation>, InferenceError>;
}

impl<D: Detector> ProcessFrame for FrameProcessor<D> {
    fn process(&mut self, frame: &mut RgbImage) -> Result<Vec<Annotation>, InferenceError> {
        FrameProcessor::process(self, frame)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    ReadFailed,
    QuitRequested,
    InferenceFailed,
    DisplayFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Stopped(StopReason),
}

/// 驱动 [`FrameSource`]、帧处理器和 [`Display`] 的采集循环
pub struct CaptureLoop<S, P, W> {
    source: S,
    processor: P,
    display: W,
    state: LoopState,
    frames: u64,
}

impl<S, P, W> CaptureLoop<S, P, W>
where
    S: FrameSource,
    P: ProcessFrame,
    W: Display,
{
    pub fn new(source: S, processor: P, display: W) -> Self {
        Self {
            source,
            processor,
            display,
            state: LoopState::Running,
            frames: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// 已完成读取、处理和显示的帧数
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// 执行一次 读取/处理/显示，返回之后的状态
    ///
    /// 循环停止后调用不做任何事。
    pub fn step(&mut self) -> LoopState {
        if self.state == LoopState::Running {
            if let Some(reason) = self.cycle() {
                self.state = LoopState::Stopped(reason);
            } else {
                self.frames += 1;
            }
        }
        self.state
    }

    fn cycle(&mut self) -> Option<StopReason> {
        let mut frame = match self.source.read() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                error!("Failed to capture frame.");
                return Some(StopReason::ReadFailed);
            }
            Err(e) => {
                error!("Failed to capture frame: {}", e);
                return Some(StopReason::ReadFailed);
            }
        };

        if let Err(e) = self.processor.process(&mut frame) {
            error!("Detection failed: {}", e);
            return Some(StopReason::InferenceFailed);
        }

        let key = self
            .display
            .show(&frame)
            .and_then(|()| self.display.poll_key());
        match key {
            Ok(Some(QUIT_KEY)) => {
                info!("Quitting the application.");
                Some(StopReason::QuitRequested)
            }
            Ok(_) => None,
            Err(e) => {
                error!("Display failed: {}", e);
                Some(StopReason::DisplayFailed)
            }
        }
    }

    /// 运行到循环停止
    ///
    /// # 返回值
    /// 返回停止原因；无论何种原因都会释放设备并关闭窗口
    pub fn run(mut self) -> StopReason {
        let reason = loop {
            if let LoopState::Stopped(reason) = self.step() {
                break reason;
            }
        };

        self.source.release();
        self.display.close();
        info!("Video capture stopped and windows closed.");
        reason
    }
}
