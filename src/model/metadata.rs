// 该文件是 Shouyu （手语） 项目的一部分。
// src/model/metadata.rs - 与模型文件配套保存的元数据
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

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::ClassifierError;
use crate::preprocess::DEFAULT_INPUT_SIZE;

const SIDECAR_EXTENSION: &str = "labels.json";

/// 模型旁的 `<模型名>.labels.json`，记录训练时的类别顺序
///
/// ```json
/// { "labels": ["A", "B", "..."], "input_size": [224, 224], "logits": false }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelMetadata {
  pub labels: Option<Vec<String>>,
  /// [H, W]
  pub input_size: Option<[u32; 2]>,
  /// 模型输出未经 softmax
  pub logits: bool,
}

impl ModelMetadata {
  pub fn sidecar_path(model_path: &Path) -> PathBuf {
    model_path.with_extension(SIDECAR_EXTENSION)
  }

  pub fn from_json(json: &str) -> Result<Self, ClassifierError> {
    serde_json::from_str(json)
      .map_err(|e| ClassifierError::load(format!("元数据格式错误: {}", e)))
  }

  pub fn load(path: &Path) -> Result<Self, ClassifierError> {
    let json = std::fs::read_to_string(path).map_err(|e| {
      ClassifierError::load(format!("无法读取元数据 {}: {}", path.display(), e))
    })?;
    let metadata = Self::from_json(&json)?;
    info!("已加载模型元数据: {}", path.display());
    Ok(metadata)
  }

  /// 显式指定的元数据必须存在；否则尝试模型旁的配套文件，缺失时使用默认值
  pub fn resolve(model_path: &Path, explicit: Option<&Path>) -> Result<Self, ClassifierError> {
    if let Some(path) = explicit {
      return Self::load(path);
    }

    let sidecar = Self::sidecar_path(model_path);
    if sidecar.is_file() {
      Self::load(&sidecar)
    } else {
      warn!(
        "未找到模型元数据 {}，将按输出宽度推导字母表标签",
        sidecar.display()
      );
      Ok(Self::default())
    }
  }

  /// (H, W)
  pub fn input_size(&self) -> (u32, u32) {
    match self.input_size {
      Some([h, w]) => (h, w),
      None => DEFAULT_INPUT_SIZE,
    }
  }
}
