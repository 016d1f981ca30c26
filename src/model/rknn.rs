// 该文件是 Shouyu （手语） 项目的一部分。
// src/model/rknn.rs - RKNPU 推理后端
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;
use std::sync::Mutex;

use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use tracing::{debug, error, info};
use url::Url;

use super::{ClassScores, Classifier, ClassifierError, ModelInfo, ModelMetadata, probe_output_width};
use crate::{FromUrl, FromUrlWithScheme, frame::RgbNhwcTensor};

const RKNN_NUM_INPUTS: u32 = 1;

/// RKNN 模型在转换时已内置 /255 归一化，输入为 UInt8 NHWC
pub struct RknnClassifier {
  context: Mutex<Context>,
  info: ModelInfo,
  logits: bool,
}

pub struct RknnClassifierBuilder {
  model_path: String,
  labels_path: Option<PathBuf>,
  flags: InitFlags,
}

impl FromUrlWithScheme for RknnClassifierBuilder {
  const SCHEME: &'static str = "rknn";
}

impl FromUrl for RknnClassifierBuilder {
  type Error = ClassifierError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ClassifierError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let labels_path = url
      .query_pairs()
      .find(|(k, _)| k == "labels")
      .map(|(_, v)| PathBuf::from(v.as_ref()));

    Ok(RknnClassifierBuilder {
      model_path: url.path().to_string(),
      labels_path,
      flags: InitFlags::default(),
    })
  }
}

impl RknnClassifierBuilder {
  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn build(self) -> Result<RknnClassifier, ClassifierError> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)
      .map_err(|e| ClassifierError::load(format!("无法读取 {}: {}", self.model_path, e)))?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    let metadata = ModelMetadata::resolve(
      std::path::Path::new(&self.model_path),
      self.labels_path.as_deref(),
    )?;

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, self.flags)
      .map_err(|e| ClassifierError::load(format!("RKNN 上下文创建失败: {}", e)))?;

    match context.sdk_version() {
      Ok(version) => {
        if let Ok(api_ver) = version.api_version() {
          debug!("模型 API 版本: {}", api_ver);
        }
        if let Ok(drv_ver) = version.driver_version() {
          debug!("模型驱动版本: {}", drv_ver);
        }
      }
      Err(e) => {
        error!("查询 SDK 版本失败: {}", e);
        return Err(ClassifierError::load(format!("无法查询 SDK 版本: {}", e)));
      }
    }

    let num_inputs = context
      .num_inputs()
      .map_err(|e| ClassifierError::load(format!("无法获取输入数量: {}", e)))?;
    if num_inputs != RKNN_NUM_INPUTS {
      error!(
        "预期模型输入数量为 {}, 实际为 {}",
        RKNN_NUM_INPUTS, num_inputs
      );
      return Err(ClassifierError::load(format!(
        "预期模型输入数量为 {}, 实际为 {}",
        RKNN_NUM_INPUTS, num_inputs
      )));
    }

    let (height, width) = metadata.input_size();
    let (height, width) = (height as usize, width as usize);
    let output_width =
      probe_output_width(height, width, |probe| run_context(&context, probe))?;

    let name = std::path::Path::new(&self.model_path)
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| "rknn".to_string());
    let info =
      ModelInfo::new(name, height, width, output_width).with_labels(metadata.labels.clone());
    info!("模型加载完成, 输出宽度 {}", output_width);

    Ok(RknnClassifier {
      context: Mutex::new(context),
      info,
      logits: metadata.logits,
    })
  }
}

fn run_context(context: &Context, input: &RgbNhwcTensor) -> Result<Vec<f32>, rknpu::Error> {
  debug!("设置模型输入");
  context.set_input(
    0,
    &input.to_nhwc_bytes(),
    TensorFormat::NHWC,
    TensorType::UInt8,
  )?;

  debug!("执行模型推理");
  context.run()?;

  let output = context.get_outputs()?;
  let scores = output.get_f32(0)?;
  Ok(scores.to_vec())
}

impl Classifier for RknnClassifier {
  fn info(&self) -> &ModelInfo {
    &self.info
  }

  fn predict(&self, input: &RgbNhwcTensor) -> Result<ClassScores, ClassifierError> {
    self.info.check_input(input)?;

    let scores = {
      let context = self
        .context
        .lock()
        .map_err(|_| ClassifierError::inference("无法获取 NPU 上下文锁"))?;
      run_context(&context, input).map_err(ClassifierError::inference)?
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
