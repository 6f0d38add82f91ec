//! 基于OpenCV DNN模块的Darknet后端

use std::path::Path;

use ndarray::{Array2, Array4};
use opencv::{
    core::{self, Mat, Scalar, Vector},
    dnn::{self, Net},
    prelude::*,
};

use crate::vision::infer::{Detector, InferenceError};
use crate::vision::model::{ModelLoadError, ModelPaths};

/// 由darknet `.cfg` / `.weights` 文件对加载的YOLO网络
pub struct DarknetNet {
    net: Net,
    output_layers: Vec<String>,
}

impl DarknetNet {
    /// 读取网络并解析未连接的输出层
    ///
    /// # 错误处理
    /// 缺少配置文件、网络为空或路径不是合法UTF-8时返回
    /// [`ModelLoadError::Malformed`]；OpenCV报错时返回 [`ModelLoadError::Backend`]
    pub fn open(paths: &ModelPaths) -> Result<Self, ModelLoadError> {
        let config = paths.config.as_deref().ok_or_else(|| ModelLoadError::Malformed {
            path: paths.weights.clone(),
            reason: "darknet weights need a network configuration file".into(),
        })?;

        let net = dnn::read_net_from_darknet(path_str(config)?, path_str(&paths.weights)?)
            .map_err(|e| ModelLoadError::Backend(e.to_string()))?;
        if net.empty().map_err(|e| ModelLoadError::Backend(e.to_string()))? {
            return Err(ModelLoadError::Malformed {
                path: config.to_path_buf(),
                reason: "network has no layers".into(),
            });
        }

        let output_layers = net
            .get_unconnected_out_layers_names()
            .map_err(|e| ModelLoadError::Backend(e.to_string()))?
            .to_vec();

        Ok(Self { net, output_layers })
    }
}

fn path_str(path: &Path) -> Result<&str, ModelLoadError> {
    path.to_str().ok_or_else(|| ModelLoadError::Malformed {
        path: path.to_path_buf(),
        reason: "path is not valid UTF-8".into(),
    })
}

fn backend(e: opencv::Error) -> InferenceError {
    InferenceError::Backend(e.to_string())
}

impl Detector for DarknetNet {
    fn output_layers(&self) -> Vec<String> {
        self.output_layers.clone()
    }

    fn set_input(&mut self, blob: Array4<f32>) -> Result<(), InferenceError> {
        let dims: Vec<i32> = blob.shape().iter().map(|&d| d as i32).collect();
        let mut mat = Mat::new_nd_with_default(&dims, core::CV_32F, Scalar::all(0.0)).map_err(backend)?;

        let (data, _offset) = blob.as_standard_layout().to_owned().into_raw_vec_and_offset();
        mat.data_typed_mut::<f32>().map_err(backend)?.copy_from_slice(&data);

        self.net
            .set_input(&mat, "", 1.0, Scalar::default())
            .map_err(backend)
    }

    fn forward(&mut self, layers: &[String]) -> Result<Vec<Array2<f32>>, InferenceError> {
        let names: Vector<String> = layers.iter().cloned().collect();
        let mut outs: Vector<Mat> = Vector::new();
        self.net.forward(&mut outs, &names).map_err(backend)?;

        outs.iter()
            .map(|mat| {
                let (rows, cols) = (mat.rows(), mat.cols());
                if mat.dims() != 2 || rows < 0 || cols < 0 {
                    return Err(InferenceError::OutputShape(vec![rows.max(0) as usize, cols.max(0) as usize]));
                }
                let data = mat.data_typed::<f32>().map_err(backend)?;
                Array2::from_shape_vec((rows as usize, cols as usize), data.to_vec())
                    .map_err(|_| InferenceError::OutputShape(vec![rows as usize, cols as usize]))
            })
            .collect()
    }
}
