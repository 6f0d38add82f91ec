use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::config::{CONFIG_FILE, NAMES_FILE, ONNX_FILE, WEIGHTS_FILE};
use crate::vision::infer::Detector;

/// 加载网络或类别标签时的启动错误
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model file not found: {0}")]
    Missing(PathBuf),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed model file {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error("detector backend failed to load: {0}")]
    Backend(String),
}

/// 模型目录的文件布局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelFormat {
    /// Darknet `.cfg` + `.weights` 文件对
    #[default]
    Darknet,
    /// 单个ONNX计算图
    Onnx,
}

/// 模型各文件的路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    /// 网络配置文件，ONNX布局下为 `None`
    pub config: Option<PathBuf>,
    /// 权重文件（ONNX布局下为 `.onnx` 文件）
    pub weights: PathBuf,
    /// 类别名称文件
    pub names: PathBuf,
}

impl ModelPaths {
    /// 按目录和文件布局拼出各文件路径
    ///
    /// # 示例
    ///
    /// ```
    /// use personcam::vision::model::{ModelFormat, ModelPaths};
    ///
    /// let paths = ModelPaths::new("yolov3-coco", ModelFormat::Darknet);
    /// assert!(paths.weights.ends_with("yolov3.weights"));
    /// ```
    pub fn new(dir: impl AsRef<Path>, format: ModelFormat) -> Self {
        let dir = dir.as_ref();
        match format {
            ModelFormat::Darknet => Self {
                config: Some(dir.join(CONFIG_FILE)),
                weights: dir.join(WEIGHTS_FILE),
                names: dir.join(NAMES_FILE),
            },
            ModelFormat::Onnx => Self {
                config: None,
                weights: dir.join(ONNX_FILE),
                names: dir.join(NAMES_FILE),
            },
        }
    }

    /// 模型所需的全部文件，按检查顺序排列
    pub fn required(&self) -> impl Iterator<Item = &Path> {
        self.config
            .as_deref()
            .into_iter()
            .chain([self.weights.as_path(), self.names.as_path()])
    }

    fn ensure_present(&self) -> Result<(), ModelLoadError> {
        match self.required().find(|path| !path.is_file()) {
            Some(missing) => Err(ModelLoadError::Missing(missing.to_path_buf())),
            None => Ok(()),
        }
    }
}

/// 按类别ID索引的类别名称，加载后不可变
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Labels(Vec<String>);

impl Labels {
    /// 解析按行分隔的类别列表
    ///
    /// 每行去除首尾空白；末尾的空行会被忽略，因此结尾换行不会多出一个类别。
    pub fn parse(text: &str) -> Self {
        let mut names: Vec<String> = text.lines().map(|line| line.trim().to_string()).collect();
        while names.last().is_some_and(|name| name.is_empty()) {
            names.pop();
        }
        Self(names)
    }

    /// 从文件读取类别列表
    ///
    /// # 错误处理
    /// 文件无法读取时返回 [`ModelLoadError::Io`]，内容为空时返回
    /// [`ModelLoadError::Malformed`]
    pub fn load(path: &Path) -> Result<Self, ModelLoadError> {
        let text = fs::read_to_string(path).map_err(|source| ModelLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let labels = Self::parse(&text);
        if labels.is_empty() {
            return Err(ModelLoadError::Malformed {
                path: path.to_path_buf(),
                reason: "no class names".into(),
            });
        }
        Ok(labels)
    }

    pub fn get(&self, class_id: usize) -> Option<&str> {
        self.0.get(class_id).map(String::as_str)
    }

    /// 类别ID对应的名称，未知ID时返回ID本身
    pub fn name(&self, class_id: usize) -> Cow<'_, str> {
        match self.get(class_id) {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(class_id.to_string()),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<String>> for Labels {
    fn from(names: Vec<String>) -> Self {
        Self(names)
    }
}

/// 已加载的检测器及逐帧运行所需的全部信息
pub struct Model<D> {
    /// 推理后端
    pub detector: D,
    /// 加载时解析一次，之后每次前向传播复用
    pub output_layers: Vec<String>,
    /// 类别名称
    pub labels: Labels,
    /// 加载所用的文件路径
    pub paths: ModelPaths,
}

impl<D: Detector> Model<D> {
    /// 由已构建的检测器组装模型
    pub fn new(detector: D, labels: Labels, paths: ModelPaths) -> Self {
        let output_layers = detector.output_layers();
        Self { detector, output_layers, labels, paths }
    }
}

/// 加载模型
///
/// 解析任何文件之前先检查所有必需文件是否存在；随后由 `open` 根据路径构建
/// 推理后端，最后读取类别标签。任何失败都会终止启动，不做重试。
///
/// # 参数
/// * `paths` - 模型文件路径
/// * `open` - 后端构造函数
///
/// # 返回值
/// 返回可直接用于逐帧推理的 [`Model`]
///
/// # 错误处理
/// 文件缺失返回 [`ModelLoadError::Missing`]；后端或标签加载失败时返回对应错误
///
/// # 示例
///
/// ```no_run
/// use personcam::vision::model::{ModelFormat, ModelPaths, load_model};
/// # use personcam::vision::infer::{Detector, InferenceError};
/// # use ndarray::{Array2, Array4};
/// # struct Null;
/// # impl Detector for Null {
/// #     fn output_layers(&self) -> Vec<String> { vec![] }
/// #     fn set_input(&mut self, _: Array4<f32>) -> Result<(), InferenceError> { Ok(()) }
/// #     fn forward(&mut self, _: &[String]) -> Result<Vec<Array2<f32>>, InferenceError> { Ok(vec![]) }
/// # }
///
/// let paths = ModelPaths::new("yolov3-coco", ModelFormat::Darknet);
/// let model = load_model(paths, |_| Ok(Null))?;
/// # Ok::<(), personcam::vision::model::ModelLoadError>(())
/// ```
pub fn load_model<D, F>(paths: ModelPaths, open: F) -> Result<Model<D>, ModelLoadError>
where
    D: Detector,
    F: FnOnce(&ModelPaths) -> Result<D, ModelLoadError>,
{
    paths.ensure_present()?;

    info!("Loading YOLO model...");
    let detector = open(&paths)?;

    info!("Loading class labels...");
    let labels = Labels::load(&paths.names)?;

    let model = Model::new(detector, labels, paths);
    info!(
        "Model ready: {} classes, output layers {:?}",
        model.labels.len(),
        model.output_layers
    );
    Ok(model)
}
