// 该文件是 Shouyu （手语） 项目的一部分。
// src/output/json_lines.rs - JSON Lines 记录输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::{
  FromUrl, FromUrlWithScheme, input::InputFrame, output::Render, service::PredictionResult,
};

#[derive(Error, Debug)]
pub enum JsonLinesOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  SerializeError(#[from] serde_json::Error),
  #[error("输出文件锁异常")]
  Poisoned,
}

/// 每行一条预测记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
  pub time: DateTime<Utc>,
  pub source: String,
  pub index: usize,
  pub letter: String,
  pub confidence: f32,
  pub confident: bool,
}

/// `jsonl:///path/to/predictions.jsonl`，加 `?append` 时追加写入
pub struct JsonLinesOutput {
  path: PathBuf,
  file: Mutex<File>,
}

impl FromUrlWithScheme for JsonLinesOutput {
  const SCHEME: &'static str = "jsonl";
}

impl FromUrl for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(JsonLinesOutputError::SchemeMismatch);
    }

    let append = url.query_pairs().any(|(k, _)| k == "append");
    Self::create(Path::new(url.path()), append)
  }
}

impl JsonLinesOutput {
  pub fn create(path: &Path, append: bool) -> Result<Self, JsonLinesOutputError> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
      .create(true)
      .write(true)
      .append(append)
      .truncate(!append)
      .open(path)?;
    info!("预测记录写入: {}", path.display());

    Ok(JsonLinesOutput {
      path: path.to_path_buf(),
      file: Mutex::new(file),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Render<InputFrame, PredictionResult> for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn render_result(
    &self,
    frame: &InputFrame,
    result: &PredictionResult,
  ) -> Result<(), Self::Error> {
    let record = PredictionRecord {
      time: Utc::now(),
      source: frame.name.clone(),
      index: result.index,
      letter: result.letter.clone(),
      confidence: result.confidence,
      confident: result.confident,
    };
    let line = serde_json::to_string(&record)?;

    let mut file = self
      .file
      .lock()
      .map_err(|_| JsonLinesOutputError::Poisoned)?;
    writeln!(file, "{}", line)?;
    Ok(())
  }
}
