// 该文件是 Shouyu （手语） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 推理后端
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::TensorRef,
};
use tracing::{debug, info};
use url::Url;

use super::{ClassScores, Classifier, ClassifierError, ModelInfo, ModelMetadata, probe_output_width};
use crate::{FromUrl, FromUrlWithScheme, frame::RgbNhwcTensor};

pub struct OnnxClassifier {
  // ort 的 run 需要独占会话
  session: Mutex<Session>,
  input_name: String,
  output_name: String,
  info: ModelInfo,
  logits: bool,
}

pub struct OnnxClassifierBuilder {
  model_path: PathBuf,
  labels_path: Option<PathBuf>,
  intra_threads: Option<usize>,
}

impl FromUrlWithScheme for OnnxClassifierBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxClassifierBuilder {
  type Error = ClassifierError;

  /// `onnx:///models/asl_cnn_model.onnx?labels=/models/labels.json&threads=4`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ClassifierError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let mut builder = OnnxClassifierBuilder::new(url.path());
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "labels" => builder = builder.labels(value.as_ref()),
        "threads" => {
          let threads = value.parse::<usize>().map_err(|_| {
            ClassifierError::ModelPathError(format!("线程数无效: {}", value))
          })?;
          builder = builder.intra_threads(threads);
        }
        other => debug!("忽略未知的模型参数: {}", other),
      }
    }
    Ok(builder)
  }
}

impl OnnxClassifierBuilder {
  pub fn new(model_path: impl AsRef<Path>) -> Self {
    Self {
      model_path: model_path.as_ref().to_path_buf(),
      labels_path: None,
      intra_threads: None,
    }
  }

  pub fn labels(mut self, path: impl AsRef<Path>) -> Self {
    self.labels_path = Some(path.as_ref().to_path_buf());
    self
  }

  pub fn intra_threads(mut self, threads: usize) -> Self {
    self.intra_threads = Some(threads);
    self
  }

  pub fn build(self) -> Result<OnnxClassifier, ClassifierError> {
    info!("加载模型文件: {}", self.model_path.display());
    if !self.model_path.is_file() {
      return Err(ClassifierError::load(format!(
        "模型文件不存在: {}",
        self.model_path.display()
      )));
    }

    let metadata = ModelMetadata::resolve(&self.model_path, self.labels_path.as_deref())?;

    let mut builder = Session::builder()
      .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
      .map_err(|e| ClassifierError::load(format!("无法创建 ONNX 会话: {}", e)))?;
    if let Some(threads) = self.intra_threads {
      builder = builder
        .with_intra_threads(threads)
        .map_err(|e| ClassifierError::load(format!("无法设置线程数: {}", e)))?;
    }
    let mut session = builder
      .commit_from_file(&self.model_path)
      .map_err(|e| ClassifierError::load(format!("模型文件无效: {}", e)))?;

    let input_name = session
      .inputs
      .first()
      .map(|input| input.name.clone())
      .ok_or_else(|| ClassifierError::load("模型没有输入"))?;
    let output_name = session
      .outputs
      .first()
      .map(|output| output.name.clone())
      .ok_or_else(|| ClassifierError::load("模型没有输出"))?;
    debug!("模型输入: {}, 模型输出: {}", input_name, output_name);

    let (height, width) = metadata.input_size();
    let (height, width) = (height as usize, width as usize);
    let output_width = probe_output_width(height, width, |probe| {
      run_session(&mut session, &input_name, &output_name, probe)
    })?;

    let name = self
      .model_path
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| "onnx".to_string());
    let info =
      ModelInfo::new(name, height, width, output_width).with_labels(metadata.labels.clone());
    info!(
      "模型加载完成: 输入 {:?}, 输出宽度 {}",
      info.input_shape, info.output_width
    );

    Ok(OnnxClassifier {
      session: Mutex::new(session),
      input_name,
      output_name,
      info,
      logits: metadata.logits,
    })
  }
}

fn run_session(
  session: &mut Session,
  input_name: &str,
  output_name: &str,
  input: &RgbNhwcTensor,
) -> Result<Vec<f32>, ort::Error> {
  let tensor = TensorRef::from_array_view(input.view())?;
  let outputs = session.run(ort::inputs![input_name => tensor])?;
  let (_, data) = outputs[output_name].try_extract_tensor::<f32>()?;
  Ok(data.to_vec())
}

impl Classifier for OnnxClassifier {
  fn info(&self) -> &ModelInfo {
    &self.info
  }

  fn predict(&self, input: &RgbNhwcTensor) -> Result<ClassScores, ClassifierError> {
    self.info.check_input(input)?;

    let scores = {
      let mut session = self
        .session
        .lock()
        .map_err(|_| ClassifierError::inference("无法获取会话锁"))?;
      run_session(&mut session, &self.input_name, &self.output_name, input)
        .map_err(ClassifierError::inference)?
    };

    if scores.len() != self.info.output_width {
      return Err(ClassifierError::inference(format!(
        "输出宽度 {} 与加载时记录的 {} 不一致",
        scores.len(),
        self.info.output_width
      )));
    }

    let scores = ClassScores::from(scores);
    Ok(if self.logits { scores.softmax() } else { scores })
  }
}
