// 该文件是 Shouyu （手语） 项目的一部分。
// src/output/log_output.rs - 日志输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::convert::Infallible;

use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, input::InputFrame, output::Render, service::PredictionResult,
};

/// 把预测结果写到日志，`log://`
pub struct LogOutput;

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = Infallible;

  fn from_url(_url: &Url) -> Result<Self, Self::Error> {
    Ok(LogOutput)
  }
}

impl Render<InputFrame, PredictionResult> for LogOutput {
  type Error = Infallible;

  fn render_result(
    &self,
    frame: &InputFrame,
    result: &PredictionResult,
  ) -> Result<(), Self::Error> {
    info!(
      "{}: {} ({:.2}%){}",
      frame.name,
      result.letter,
      result.confidence * 100.0,
      if result.confident { "" } else { " 置信度不足" }
    );
    Ok(())
  }
}
