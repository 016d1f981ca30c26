// 该文件是 Shouyu （手语） 项目的一部分。
// src/server.rs - HTTP 预测服务
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

//! # HTTP 接口
//!
//! 两个预测入口共用 [`PredictionService`]：
//!
//! - `POST /predict`：摄像头轮询，请求体为 JSON，`image` 字段是 data URL
//! - `POST /classify_image`：图片上传，multipart 表单字段 `image`
//! - `GET /health`：模型信息
//!
//! ## 示例
//!
//! ```text
//! curl -X POST http://127.0.0.1:5000/predict \
//!      -H 'Content-Type: application/json' \
//!      -d '{"image": "data:image/jpeg;base64,/9j/4AAQ..."}'
//! {"prediction":"A","confidence":0.97}
//!
//! curl -X POST http://127.0.0.1:5000/classify_image -F image=@sign.jpg
//! {"prediction":"B","confidence":0.88}
//! ```
//!
//! 出错时返回 `{"error": "..."}`：无法解码的图像、缺少 `image` 字段或
//! 格式错误的请求体为 400，模型或配置问题为 500。
//!
//! 推理在阻塞线程池中执行，各请求相互独立。

use std::sync::Arc;

use axum::{
  Json, Router,
  extract::{
    DefaultBodyLimit, Multipart, State,
    multipart::{MultipartError, MultipartRejection},
    rejection::JsonRejection,
  },
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::{get, post},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::{
  model::Classifier,
  service::{PredictError, PredictionResult, PredictionService},
};

pub const DEFAULT_BODY_LIMIT: usize = 16 * 1024 * 1024;
const IMAGE_FIELD: &str = "image";

#[derive(Error, Debug)]
pub enum ApiError {
  #[error("No image provided")]
  MissingImage,
  #[error("请求体不是有效的 JSON: {0}")]
  BadJson(#[from] JsonRejection),
  #[error("请求不是有效的 multipart 表单: {0}")]
  BadMultipart(#[from] MultipartRejection),
  #[error("表单解析错误: {0}")]
  Multipart(#[from] MultipartError),
  #[error(transparent)]
  Predict(#[from] PredictError),
  #[error("推理任务异常: {0}")]
  Join(#[from] tokio::task::JoinError),
}

impl ApiError {
  fn status(&self) -> StatusCode {
    match self {
      ApiError::MissingImage | ApiError::BadJson(_) | ApiError::BadMultipart(_) => {
        StatusCode::BAD_REQUEST
      }
      ApiError::Multipart(e) => e.status(),
      ApiError::Predict(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
      ApiError::Predict(_) | ApiError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
  pub error: String,
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!("请求处理失败: {}", self);
    } else {
      warn!("请求无效: {}", self);
    }
    (
      status,
      Json(ErrorResponse {
        error: self.to_string(),
      }),
    )
      .into_response()
  }
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
  pub image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct PredictionResponse {
  pub prediction: String,
  pub confidence: f32,
}

impl From<PredictionResult> for PredictionResponse {
  fn from(result: PredictionResult) -> Self {
    Self {
      prediction: result.display_label().to_string(),
      confidence: result.confidence,
    }
  }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
  pub status: String,
  pub model: String,
  pub input_shape: [usize; 4],
  pub classes: usize,
  pub labels: Vec<String>,
  pub threshold: Option<f32>,
}

pub fn router<C: Classifier + 'static>(service: Arc<PredictionService<C>>) -> Router {
  router_with_limit(service, DEFAULT_BODY_LIMIT)
}

pub fn router_with_limit<C: Classifier + 'static>(
  service: Arc<PredictionService<C>>,
  body_limit: usize,
) -> Router {
  Router::new()
    .route("/predict", post(predict::<C>))
    .route("/classify_image", post(classify_image::<C>))
    .route("/health", get(health::<C>))
    .layer(DefaultBodyLimit::max(body_limit))
    .with_state(service)
}

async fn predict<C: Classifier + 'static>(
  State(service): State<Arc<PredictionService<C>>>,
  body: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
  let Json(body) = body?;
  let image = body.image.ok_or(ApiError::MissingImage)?;
  let result =
    tokio::task::spawn_blocking(move || service.predict_data_url(&image)).await??;
  Ok(Json(result.into()))
}

async fn classify_image<C: Classifier + 'static>(
  State(service): State<Arc<PredictionService<C>>>,
  multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
  let mut multipart = multipart?;
  let mut bytes = None;
  while let Some(field) = multipart.next_field().await? {
    if field.name() == Some(IMAGE_FIELD) {
      bytes = Some(field.bytes().await?);
      break;
    }
  }
  let bytes = bytes.ok_or(ApiError::MissingImage)?;
  let result = tokio::task::spawn_blocking(move || service.predict_bytes(&bytes)).await??;
  Ok(Json(result.into()))
}

async fn health<C: Classifier + 'static>(
  State(service): State<Arc<PredictionService<C>>>,
) -> Json<HealthResponse> {
  let info = service.classifier().info();
  Json(HealthResponse {
    status: "ok".to_string(),
    model: info.name.clone(),
    input_shape: info.input_shape,
    classes: info.output_width,
    labels: service.labels().labels().to_vec(),
    threshold: service.policy().threshold(),
  })
}

/// 在给定监听器上运行服务，直到 `shutdown` 完成
pub async fn serve(
  listener: TcpListener,
  app: Router,
  shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
  if let Ok(addr) = listener.local_addr() {
    info!("HTTP 服务已启动: http://{}", addr);
  }
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown)
    .await?;
  info!("HTTP 服务已停止");
  Ok(())
}

/// 等待 Ctrl-C
pub async fn shutdown_signal() {
  match tokio::signal::ctrl_c().await {
    Ok(()) => info!("收到中断信号，准备退出..."),
    Err(e) => error!("无法监听中断信号: {}", e),
  }
}
