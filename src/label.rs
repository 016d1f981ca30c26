// 该文件是 Shouyu （手语） 项目的一部分。
// src/label.rs - 类别索引与字母的映射
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

use std::collections::HashSet;

use thiserror::Error;

pub const ALPHABET_SIZE: usize = 26;

/// 29 类数据集在字母之后的附加类别，顺序与训练时目录的字典序一致
pub const AUXILIARY_LABELS: [&str; 3] = ["del", "nothing", "space"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LabelError {
  #[error("未知类别索引: {index}, 标签数量为 {len}")]
  UnknownIndexError { index: usize, len: usize },
  #[error("标签数量 {labels} 与模型输出宽度 {outputs} 不一致")]
  WidthMismatch { labels: usize, outputs: usize },
  #[error("标签重复: {0}")]
  DuplicateLabel(String),
  #[error("标签列表为空或包含空标签")]
  EmptyLabels,
  #[error("无法为输出宽度 {0} 推导字母表标签")]
  UnsupportedWidth(usize),
}

/// 不可变的索引到标签映射，进程启动时构建
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
  labels: Box<[String]>,
}

impl LabelMap {
  /// A 到 Z 的 26 个字母
  pub fn alphabet() -> Self {
    Self {
      labels: ('A'..='Z').map(|c| c.to_string()).collect(),
    }
  }

  /// 按模型输出宽度推导训练时的类别顺序：26 为纯字母，29 追加 del / nothing / space
  pub fn for_output_width(width: usize) -> Result<Self, LabelError> {
    match width {
      ALPHABET_SIZE => Ok(Self::alphabet()),
      w if w == ALPHABET_SIZE + AUXILIARY_LABELS.len() => {
        let labels = ('A'..='Z')
          .map(|c| c.to_string())
          .chain(AUXILIARY_LABELS.iter().map(|s| s.to_string()))
          .collect();
        Ok(Self { labels })
      }
      other => Err(LabelError::UnsupportedWidth(other)),
    }
  }

  pub fn from_labels<I, S>(labels: I) -> Result<Self, LabelError>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let labels: Box<[String]> = labels.into_iter().map(Into::into).collect();
    if labels.is_empty() || labels.iter().any(|l| l.trim().is_empty()) {
      return Err(LabelError::EmptyLabels);
    }

    let mut seen = HashSet::with_capacity(labels.len());
    for label in labels.iter() {
      if !seen.insert(label.as_str()) {
        return Err(LabelError::DuplicateLabel(label.clone()));
      }
    }

    Ok(Self { labels })
  }

  pub fn len(&self) -> usize {
    self.labels.len()
  }

  pub fn is_empty(&self) -> bool {
    self.labels.is_empty()
  }

  pub fn labels(&self) -> &[String] {
    &self.labels
  }

  pub fn index_to_label(&self, index: usize) -> Result<&str, LabelError> {
    self
      .labels
      .get(index)
      .map(String::as_str)
      .ok_or(LabelError::UnknownIndexError {
        index,
        len: self.labels.len(),
      })
  }

  pub fn label_to_index(&self, label: &str) -> Option<usize> {
    self.labels.iter().position(|l| l == label)
  }

  pub fn validate_width(&self, outputs: usize) -> Result<(), LabelError> {
    if self.labels.len() != outputs {
      return Err(LabelError::WidthMismatch {
        labels: self.labels.len(),
        outputs,
      });
    }
    Ok(())
  }
}
