// 该文件是 Shouyu （手语） 项目的一部分。
// src/main.rs - 识别服务主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use shouyu::{
  FromUrl,
  model::{Classifier, ClassifierWrapper},
  server,
  service::PredictionService,
};

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("模型地址: {}", args.model);
  info!("监听地址: {}", args.listen);
  info!("置信度阈值: {:?}", args.threshold);

  info!("正在加载模型...");
  let model = ClassifierWrapper::from_url(&args.model)?;
  let model_info = model.info();
  info!(
    "模型加载完成: {} 输入 {:?} 输出 {} 类",
    model_info.name, model_info.input_shape, model_info.output_width
  );

  let service = PredictionService::from_classifier(model, args.policy(), args.label_check())?;
  info!("标签: {}", service.labels().labels().join(", "));

  let app = server::router_with_limit(Arc::new(service), args.body_limit());
  let listener = TcpListener::bind(args.listen).await?;
  server::serve(listener, app, server::shutdown_signal()).await?;

  Ok(())
}
