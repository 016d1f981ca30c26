// 该文件是 Shouyu （手语） 项目的一部分。
// src/service.rs - 预测服务
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

//! 预处理 → 分类 → 取最大分数 → 标签映射 → 置信度判定。
//!
//! 摄像头轮询（data URL）与图片上传（原始字节）共用同一条流水线和同一个
//! [`ConfidencePolicy`]。

use std::time::Instant;

use image::DynamicImage;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  frame::RgbNhwcTensor,
  input::decode_data_url,
  label::{LabelError, LabelMap},
  model::{Classifier, ClassifierError},
  preprocess::{PreprocessError, Preprocessor, decode_image},
};

/// 置信度不足时对外展示的标签
pub const UNCERTAIN_LABEL: &str = "?";

#[derive(Error, Debug)]
pub enum PredictError {
  #[error(transparent)]
  InvalidImageError(#[from] PreprocessError),
  #[error(transparent)]
  ClassifierError(#[from] ClassifierError),
  #[error(transparent)]
  LabelError(#[from] LabelError),
  #[error("模型输出为空")]
  EmptyScores,
}

impl PredictError {
  /// 由请求内容导致的错误
  pub fn is_client_error(&self) -> bool {
    matches!(self, PredictError::InvalidImageError(_))
  }
}

/// 置信度门限；默认不设门限，总是返回最佳猜测
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConfidencePolicy {
  threshold: Option<f32>,
}

impl ConfidencePolicy {
  pub fn always() -> Self {
    Self { threshold: None }
  }

  /// 非有限值（NaN、无穷）视为不设门限
  pub fn with_threshold(threshold: f32) -> Self {
    if !threshold.is_finite() {
      warn!("置信度阈值无效: {}，忽略", threshold);
      return Self::always();
    }
    Self {
      threshold: Some(threshold.clamp(0.0, 1.0)),
    }
  }

  pub fn threshold(&self) -> Option<f32> {
    self.threshold
  }

  pub fn accepts(&self, confidence: f32) -> bool {
    self.threshold.map(|t| confidence >= t).unwrap_or(true)
  }
}

/// 标签数量与模型输出宽度不一致时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelCheck {
  /// 构建服务时直接报错
  #[default]
  Strict,
  /// 仅告警，超出标签范围的预测在请求时报 UnknownIndexError
  Lenient,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
  pub index: usize,
  pub letter: String,
  pub confidence: f32,
  /// 是否通过置信度门限
  pub confident: bool,
}

impl PredictionResult {
  pub fn display_label(&self) -> &str {
    if self.confident {
      &self.letter
    } else {
      UNCERTAIN_LABEL
    }
  }
}

pub struct PredictionService<C> {
  classifier: C,
  labels: LabelMap,
  preprocessor: Preprocessor,
  policy: ConfidencePolicy,
}

impl<C: Classifier> PredictionService<C> {
  pub fn new(
    classifier: C,
    labels: LabelMap,
    policy: ConfidencePolicy,
    check: LabelCheck,
  ) -> Result<Self, LabelError> {
    let info = classifier.info();
    match (labels.validate_width(info.output_width), check) {
      (Ok(()), _) => {}
      (Err(e), LabelCheck::Strict) => return Err(e),
      (Err(e), LabelCheck::Lenient) => warn!("{}", e),
    }

    let preprocessor = Preprocessor::new(info.input_height() as u32, info.input_width() as u32);
    Ok(Self {
      classifier,
      labels,
      preprocessor,
      policy,
    })
  }

  /// 使用模型自带（或按输出宽度推导）的标签
  pub fn from_classifier(
    classifier: C,
    policy: ConfidencePolicy,
    check: LabelCheck,
  ) -> Result<Self, LabelError> {
    let labels = classifier.info().label_map()?;
    Self::new(classifier, labels, policy, check)
  }

  pub fn classifier(&self) -> &C {
    &self.classifier
  }

  pub fn labels(&self) -> &LabelMap {
    &self.labels
  }

  pub fn preprocessor(&self) -> &Preprocessor {
    &self.preprocessor
  }

  pub fn policy(&self) -> ConfidencePolicy {
    self.policy
  }

  pub fn predict_tensor(&self, tensor: &RgbNhwcTensor) -> Result<PredictionResult, PredictError> {
    let now = Instant::now();
    let scores = self.classifier.predict(tensor)?;
    debug!("推理完成，耗时: {:.2?}", now.elapsed());

    let (index, confidence) = scores.argmax().ok_or(PredictError::EmptyScores)?;
    let letter = self.labels.index_to_label(index)?.to_string();
    let confident = self.policy.accepts(confidence);
    debug!(
      "预测结果: {} (索引 {}, 置信度 {:.4})",
      letter, index, confidence
    );

    Ok(PredictionResult {
      index,
      letter,
      confidence,
      confident,
    })
  }

  pub fn predict_image(&self, image: &DynamicImage) -> Result<PredictionResult, PredictError> {
    let tensor = self.preprocessor.preprocess(image)?;
    self.predict_tensor(&tensor)
  }

  /// 上传路径：编码后的图像文件内容
  pub fn predict_bytes(&self, bytes: &[u8]) -> Result<PredictionResult, PredictError> {
    let image = decode_image(bytes)?;
    self.predict_image(&image)
  }

  /// 摄像头轮询路径：`data:image/...;base64,...`
  pub fn predict_data_url(&self, data_url: &str) -> Result<PredictionResult, PredictError> {
    let bytes = decode_data_url(data_url)?;
    self.predict_bytes(&bytes)
  }
}
