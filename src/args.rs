// 该文件是 Shouyu （手语） 项目的一部分。
// src/args.rs - 服务参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::net::SocketAddr;

use clap::Parser;
use url::Url;

use shouyu::service::{ConfidencePolicy, LabelCheck};

/// Shouyu 手语字母识别服务
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址
  /// 支持格式:
  /// - onnx:///path/to/model.onnx?labels=/path/to/labels.json&threads=4
  /// - rknn:///path/to/model.rknn?labels=/path/to/labels.json
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 监听地址
  #[arg(long, default_value = "127.0.0.1:5000", value_name = "ADDR")]
  pub listen: SocketAddr,

  /// 置信度阈值 (0.0 - 1.0)，低于阈值时返回 "?"，不设置则总是返回最高分类别
  #[arg(long, value_name = "THRESHOLD", value_parser = parse_threshold)]
  pub threshold: Option<f32>,

  /// 标签数与模型输出宽度不一致时只警告，不拒绝启动
  #[arg(long)]
  pub lenient_labels: bool,

  /// 请求体大小上限 (MiB)
  #[arg(long, default_value = "16", value_name = "MIB")]
  pub body_limit_mb: usize,
}

fn parse_threshold(value: &str) -> Result<f32, String> {
  let threshold: f32 = value
    .parse()
    .map_err(|e| format!("无法解析阈值 {}: {}", value, e))?;
  if !(0.0..=1.0).contains(&threshold) {
    return Err(format!("阈值必须在 0.0 到 1.0 之间: {}", value));
  }
  Ok(threshold)
}

impl Args {
  pub fn policy(&self) -> ConfidencePolicy {
    match self.threshold {
      Some(threshold) => ConfidencePolicy::with_threshold(threshold),
      None => ConfidencePolicy::always(),
    }
  }

  pub fn label_check(&self) -> LabelCheck {
    if self.lenient_labels {
      LabelCheck::Lenient
    } else {
      LabelCheck::Strict
    }
  }

  pub fn body_limit(&self) -> usize {
    self.body_limit_mb.max(1) * 1024 * 1024
  }
}
