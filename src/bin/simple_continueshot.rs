// 该文件是 Shouyu （手语） 项目的一部分。
// src/bin/simple_continueshot.rs - 批量图像识别
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use anyhow::Result;
use clap::Parser;
use url::Url;

use shouyu::{
  FromUrl,
  input::InputWrapper,
  model::ClassifierWrapper,
  output::OutputWrapper,
  service::{ConfidencePolicy, LabelCheck, PredictionService},
  task::{ContinuousTask, Task},
};
use tracing::info;

/// Shouyu 批量图像识别
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源，例如 folder:///data/asl?recursive
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径，例如 jsonl:///tmp/predictions.jsonl
  #[arg(long, value_name = "OUTPUT", default_value = "log://")]
  pub output: Url,
  /// 置信度阈值
  #[arg(long, value_name = "THRESHOLD")]
  pub threshold: Option<f32>,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型地址: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = InputWrapper::from_url(&args.input)?;
  let model = ClassifierWrapper::from_url(&args.model)?;
  let output = OutputWrapper::from_url(&args.output)?;
  let policy = args
    .threshold
    .map(ConfidencePolicy::with_threshold)
    .unwrap_or_default();
  let service = PredictionService::from_classifier(model, policy, LabelCheck::Strict)?;

  ContinuousTask::default()
    .with_frame_number(args.frame_number)
    .run_task(input, &service, output)?;

  Ok(())
}
