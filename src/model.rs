// 该文件是 Shouyu （手语） 项目的一部分。
// src/model.rs - 分类模型
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

use thiserror::Error;
use url::Url;

use crate::{
  FromUrl,
  frame::{BATCH_SIZE, RGB_CHANNELS, RgbNhwcTensor},
  label::{LabelError, LabelMap},
};

mod metadata;
pub use self::metadata::ModelMetadata;

#[cfg(feature = "model_onnx")]
mod onnx;
#[cfg(feature = "model_onnx")]
pub use self::onnx::{OnnxClassifier, OnnxClassifierBuilder};

#[cfg(feature = "model_rknn")]
mod rknn;
#[cfg(feature = "model_rknn")]
pub use self::rknn::{RknnClassifier, RknnClassifierBuilder};

#[derive(Error, Debug)]
pub enum ClassifierError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(String),
  #[error("输入形状不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  ShapeMismatchError {
    expected: [usize; 4],
    actual: [usize; 4],
  },
  #[error("推理错误: {0}")]
  InferenceError(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

impl ClassifierError {
  pub fn load(msg: impl std::fmt::Display) -> Self {
    ClassifierError::ModelLoadError(msg.to_string())
  }

  pub fn inference(msg: impl std::fmt::Display) -> Self {
    ClassifierError::InferenceError(msg.to_string())
  }
}

/// 模型加载时记录的输入输出信息
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
  pub name: String,
  /// [1, H, W, 3]
  pub input_shape: [usize; 4],
  pub output_width: usize,
  /// 与模型一同保存的标签，缺省时按输出宽度推导
  pub labels: Option<Vec<String>>,
}

impl ModelInfo {
  pub fn new(name: impl Into<String>, height: usize, width: usize, output_width: usize) -> Self {
    Self {
      name: name.into(),
      input_shape: [BATCH_SIZE, height, width, RGB_CHANNELS],
      output_width,
      labels: None,
    }
  }

  pub fn with_labels(mut self, labels: Option<Vec<String>>) -> Self {
    self.labels = labels;
    self
  }

  pub fn input_height(&self) -> usize {
    self.input_shape[1]
  }

  pub fn input_width(&self) -> usize {
    self.input_shape[2]
  }

  pub fn check_input(&self, input: &RgbNhwcTensor) -> Result<(), ClassifierError> {
    if input.shape() != self.input_shape {
      return Err(ClassifierError::ShapeMismatchError {
        expected: self.input_shape,
        actual: input.shape(),
      });
    }
    Ok(())
  }

  pub fn label_map(&self) -> Result<LabelMap, LabelError> {
    match &self.labels {
      Some(labels) => LabelMap::from_labels(labels.iter().cloned()),
      None => LabelMap::for_output_width(self.output_width),
    }
  }
}

/// 单次推理得到的各类别分数
#[derive(Debug, Clone, PartialEq)]
pub struct ClassScores {
  scores: Box<[f32]>,
}

impl From<Vec<f32>> for ClassScores {
  fn from(scores: Vec<f32>) -> Self {
    Self {
      scores: scores.into_boxed_slice(),
    }
  }
}

impl ClassScores {
  pub fn len(&self) -> usize {
    self.scores.len()
  }

  pub fn is_empty(&self) -> bool {
    self.scores.is_empty()
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.scores
  }

  pub fn get(&self, index: usize) -> Option<f32> {
    self.scores.get(index).copied()
  }

  /// 最大分数的索引；并列时取最小索引，NaN 不参与比较
  pub fn argmax(&self) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &score) in self.scores.iter().enumerate() {
      if score.is_nan() {
        continue;
      }
      match best {
        Some((_, max)) if score <= max => {}
        _ => best = Some((index, score)),
      }
    }
    best
  }

  pub fn softmax(self) -> Self {
    let max = self
      .scores
      .iter()
      .copied()
      .fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = self.scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect::<Vec<_>>().into()
  }
}

/// 图像分类模型，加载后只读，可在多个线程间共享
pub trait Classifier: Send + Sync {
  fn info(&self) -> &ModelInfo;

  fn predict(&self, input: &RgbNhwcTensor) -> Result<ClassScores, ClassifierError>;
}

impl<C: Classifier + ?Sized> Classifier for std::sync::Arc<C> {
  fn info(&self) -> &ModelInfo {
    (**self).info()
  }

  fn predict(&self, input: &RgbNhwcTensor) -> Result<ClassScores, ClassifierError> {
    (**self).predict(input)
  }
}

impl<C: Classifier + ?Sized> Classifier for Box<C> {
  fn info(&self) -> &ModelInfo {
    (**self).info()
  }

  fn predict(&self, input: &RgbNhwcTensor) -> Result<ClassScores, ClassifierError> {
    (**self).predict(input)
  }
}

#[cfg(not(any(feature = "model_onnx", feature = "model_rknn")))]
compile_error!("至少需要启用一个推理后端: model_onnx 或 model_rknn");

/// 按 URL 方案选择推理后端
pub enum ClassifierWrapper {
  #[cfg(feature = "model_onnx")]
  Onnx(OnnxClassifier),
  #[cfg(feature = "model_rknn")]
  Rknn(RknnClassifier),
}

impl FromUrl for ClassifierWrapper {
  type Error = ClassifierError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "model_onnx")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == OnnxClassifierBuilder::SCHEME {
        let model = OnnxClassifierBuilder::from_url(url)?.build()?;
        return Ok(ClassifierWrapper::Onnx(model));
      }
    }
    #[cfg(feature = "model_rknn")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == RknnClassifierBuilder::SCHEME {
        let model = RknnClassifierBuilder::from_url(url)?.build()?;
        return Ok(ClassifierWrapper::Rknn(model));
      }
    }
    Err(ClassifierError::ModelPathError(format!(
      "不支持的模型方案: {}",
      url.scheme()
    )))
  }
}

impl Classifier for ClassifierWrapper {
  fn info(&self) -> &ModelInfo {
    match self {
      #[cfg(feature = "model_onnx")]
      ClassifierWrapper::Onnx(model) => model.info(),
      #[cfg(feature = "model_rknn")]
      ClassifierWrapper::Rknn(model) => model.info(),
    }
  }

  fn predict(&self, input: &RgbNhwcTensor) -> Result<ClassScores, ClassifierError> {
    match self {
      #[cfg(feature = "model_onnx")]
      ClassifierWrapper::Onnx(model) => model.predict(input),
      #[cfg(feature = "model_rknn")]
      ClassifierWrapper::Rknn(model) => model.predict(input),
    }
  }
}

/// 用全零张量试跑一次，确认模型接受该输入形状并得到输出宽度
fn probe_output_width<E: std::fmt::Display>(
  height: usize,
  width: usize,
  run: impl FnOnce(&RgbNhwcTensor) -> Result<Vec<f32>, E>,
) -> Result<usize, ClassifierError> {
  let probe = RgbNhwcTensor::with_shape(height, width);
  let scores = run(&probe).map_err(|e| {
    ClassifierError::load(format!(
      "模型与输入形状 [1, {}, {}, 3] 不兼容: {}",
      height, width, e
    ))
  })?;
  if scores.is_empty() {
    return Err(ClassifierError::load("模型输出为空"));
  }
  Ok(scores.len())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn argmax_prefers_lowest_index_on_ties() {
    let scores = ClassScores::from(vec![0.1, 0.4, 0.4, 0.1]);
    assert_eq!(scores.argmax(), Some((1, 0.4)));
  }

  #[test]
  fn argmax_skips_nan_and_handles_empty() {
    let scores = ClassScores::from(vec![f32::NAN, 0.2, 0.7, f32::NAN]);
    assert_eq!(scores.argmax(), Some((2, 0.7)));
    assert_eq!(ClassScores::from(Vec::new()).argmax(), None);
    assert_eq!(ClassScores::from(vec![f32::NAN]).argmax(), None);
  }

  #[test]
  fn softmax_gives_a_distribution() {
    let scores = ClassScores::from(vec![1.0, 2.0, 3.0]).softmax();
    let sum: f32 = scores.as_slice().iter().sum();
    assert!((sum - 1.0).abs() < 1e-5);
    assert_eq!(scores.argmax().map(|(i, _)| i), Some(2));
    assert!(scores.as_slice().iter().all(|s| (0.0..=1.0).contains(s)));
  }

  #[test]
  fn input_shape_is_checked() {
    let info = ModelInfo::new("test", 224, 224, 26);
    assert!(info.check_input(&RgbNhwcTensor::with_shape(224, 224)).is_ok());
    assert!(matches!(
      info.check_input(&RgbNhwcTensor::with_shape(128, 224)),
      Err(ClassifierError::ShapeMismatchError {
        expected: [1, 224, 224, 3],
        actual: [1, 128, 224, 3],
      })
    ));
  }

  #[test]
  fn label_map_prefers_stored_labels() {
    let info = ModelInfo::new("test", 8, 8, 2)
      .with_labels(Some(vec!["yes".to_string(), "no".to_string()]));
    assert_eq!(info.label_map().unwrap().index_to_label(1).unwrap(), "no");

    let info = ModelInfo::new("test", 8, 8, 29);
    assert_eq!(info.label_map().unwrap().len(), 29);
  }

  #[test]
  fn probe_reports_incompatible_models() {
    let width = probe_output_width(4, 4, |t| {
      assert_eq!(t.shape(), [1, 4, 4, 3]);
      Ok::<_, String>(vec![0.0; 29])
    });
    assert_eq!(width.unwrap(), 29);

    let failed = probe_output_width(4, 4, |_| Err::<Vec<f32>, _>("bad shape"));
    assert!(matches!(failed, Err(ClassifierError::ModelLoadError(_))));

    let empty = probe_output_width(4, 4, |_| Ok::<_, String>(Vec::new()));
    assert!(matches!(empty, Err(ClassifierError::ModelLoadError(_))));
  }

  #[test]
  fn wrapper_rejects_unknown_backend_scheme() {
    let url = Url::parse("tflite:///models/asl.tflite").unwrap();
    assert!(matches!(
      ClassifierWrapper::from_url(&url),
      Err(ClassifierError::ModelPathError(_))
    ));
  }
}
