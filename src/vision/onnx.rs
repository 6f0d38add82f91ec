//! ONNX Runtime后端
//!
//! 运行导出为ONNX的YOLO计算图，输出保持darknet的行布局
//! （`[cx, cy, w, h, objectness, scores...]`，坐标已归一化）。

use ndarray::{Array2, Array4};
use ort::{
    inputs,
    session::{Session, builder::GraphOptimizationLevel},
    value::Tensor,
};

use crate::vision::infer::{Detector, InferenceError};
use crate::vision::model::{ModelLoadError, ModelPaths};

pub struct OnnxNet {
    session: Session,
    input_name: String,
    output_layers: Vec<String>,
    pending: Option<Array4<f32>>,
}

impl OnnxNet {
    /// 以Level3图优化和4个intra-op线程加载模型
    pub fn open(paths: &ModelPaths) -> Result<Self, ModelLoadError> {
        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(4))
            .and_then(|b| b.commit_from_file(&paths.weights))
            .map_err(|e| ModelLoadError::Backend(e.to_string()))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| ModelLoadError::Malformed {
                path: paths.weights.clone(),
                reason: "graph has no inputs".into(),
            })?;
        let output_layers = session.outputs.iter().map(|output| output.name.clone()).collect();

        Ok(Self { session, input_name, output_layers, pending: None })
    }
}

fn backend(e: ort::Error) -> InferenceError {
    InferenceError::Backend(e.to_string())
}

impl Detector for OnnxNet {
    fn output_layers(&self) -> Vec<String> {
        self.output_layers.clone()
    }

    fn set_input(&mut self, blob: Array4<f32>) -> Result<(), InferenceError> {
        self.pending = Some(blob);
        Ok(())
    }

    fn forward(&mut self, layers: &[String]) -> Result<Vec<Array2<f32>>, InferenceError> {
        let blob = self.pending.take().ok_or(InferenceError::MissingInput)?;
        let shape: Vec<usize> = blob.shape().to_vec();
        let (data, _offset) = blob.as_standard_layout().to_owned().into_raw_vec_and_offset();
        let input_tensor = Tensor::from_array(([shape[0], shape[1], shape[2], shape[3]], data)).map_err(backend)?;

        let outputs = self
            .session
            .run(inputs![self.input_name.as_str() => input_tensor])
            .map_err(backend)?;

        let mut tensors = Vec::with_capacity(layers.len());
        for layer in layers {
            let (shape, data) = outputs[layer.as_str()].try_extract_tensor::<f32>().map_err(backend)?;
            let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();

            // [1, rows, cols] 或 [rows, cols]
            let (rows, cols) = match dims.as_slice() {
                [1, rows, cols] | [rows, cols] => (*rows, *cols),
                _ => return Err(InferenceError::OutputShape(dims.clone())),
            };
            let array = Array2::from_shape_vec((rows, cols), data.to_vec())
                .map_err(|_| InferenceError::OutputShape(dims.clone()))?;
            tensors.push(array);
        }

        Ok(tensors)
    }
}
