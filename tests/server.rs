// 该文件是 Shouyu （手语） 项目的一部分。
// tests/server.rs - HTTP 接口测试
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

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use http_body_util::BodyExt;
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use tower::ServiceExt;

use shouyu::{
  frame::RgbNhwcTensor,
  model::{ClassScores, Classifier, ClassifierError, ModelInfo},
  server::router,
  service::{ConfidencePolicy, LabelCheck, PredictionService},
};

const BOUNDARY: &str = "shouyu-test-boundary";

/// 总是以 0.9 的分数选中 `peak`
struct FixedClassifier {
  info: ModelInfo,
  peak: usize,
}

impl Classifier for FixedClassifier {
  fn info(&self) -> &ModelInfo {
    &self.info
  }

  fn predict(&self, input: &RgbNhwcTensor) -> Result<ClassScores, ClassifierError> {
    self.info.check_input(input)?;
    let width = self.info.output_width;
    let mut scores = vec![0.1 / (width - 1) as f32; width];
    scores[self.peak] = 0.9;
    Ok(scores.into())
  }
}

/// 模型运行期故障
struct BrokenClassifier {
  info: ModelInfo,
}

impl Classifier for BrokenClassifier {
  fn info(&self) -> &ModelInfo {
    &self.info
  }

  fn predict(&self, _input: &RgbNhwcTensor) -> Result<ClassScores, ClassifierError> {
    Err(ClassifierError::inference("device lost"))
  }
}

/// 按左上角像素的红色通道选类别；红色为 255 时模拟故障，254 时模拟慢推理
struct ColourClassifier {
  info: ModelInfo,
}

impl Classifier for ColourClassifier {
  fn info(&self) -> &ModelInfo {
    &self.info
  }

  fn predict(&self, input: &RgbNhwcTensor) -> Result<ClassScores, ClassifierError> {
    self.info.check_input(input)?;
    let red = (input.as_array()[[0, 0, 0, 0]] * 255.0).round() as usize;
    match red {
      255 => return Err(ClassifierError::inference("device lost")),
      254 => std::thread::sleep(Duration::from_millis(300)),
      _ => {}
    }
    let width = self.info.output_width;
    let mut scores = vec![0.1 / (width - 1) as f32; width];
    scores[red % width] = 0.9;
    Ok(scores.into())
  }
}

fn app_with(peak: usize, policy: ConfidencePolicy) -> Router {
  let classifier = FixedClassifier {
    info: ModelInfo::new("fixed", 64, 64, 26),
    peak,
  };
  let service = PredictionService::from_classifier(classifier, policy, LabelCheck::Strict).unwrap();
  router(Arc::new(service))
}

fn app() -> Router {
  app_with(1, ConfidencePolicy::always())
}

fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
  let image = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
  let mut buf = Vec::new();
  image
    .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
    .unwrap();
  buf
}

fn png_bytes(red: u8) -> Vec<u8> {
  let image = RgbImage::from_pixel(48, 48, Rgb([red, 0, 0]));
  let mut buf = Vec::new();
  image
    .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
    .unwrap();
  buf
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
  Request::builder()
    .method("POST")
    .uri(uri)
    .header(header::CONTENT_TYPE, "application/json")
    .body(Body::from(body.to_string()))
    .unwrap()
}

fn multipart_request(field: &str, filename: &str, content: &[u8]) -> Request<Body> {
  let mut body = Vec::new();
  body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
  body.extend_from_slice(
    format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n")
      .as_bytes(),
  );
  body.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
  body.extend_from_slice(content);
  body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

  Request::builder()
    .method("POST")
    .uri("/classify_image")
    .header(
      header::CONTENT_TYPE,
      format!("multipart/form-data; boundary={BOUNDARY}"),
    )
    .body(Body::from(body))
    .unwrap()
}

fn raw_request(uri: &str, content_type: Option<&str>, body: &str) -> Request<Body> {
  let mut builder = Request::builder().method("POST").uri(uri);
  if let Some(content_type) = content_type {
    builder = builder.header(header::CONTENT_TYPE, content_type);
  }
  builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
  let response = app.oneshot(request).await.unwrap();
  let status = response.status();
  let bytes = response.into_body().collect().await.unwrap().to_bytes();
  (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn predict_accepts_camera_frame_data_url() {
  let data_url = format!(
    "data:image/jpeg;base64,{}",
    STANDARD.encode(jpeg_bytes(640, 480))
  );
  let (status, body) = send(app(), json_request("/predict", serde_json::json!({ "image": data_url }))).await;

  assert_eq!(status, StatusCode::OK);
  let prediction = body["prediction"].as_str().unwrap();
  assert_eq!(prediction, "B");
  assert!(prediction.chars().all(|c| c.is_ascii_uppercase()));
  let confidence = body["confidence"].as_f64().unwrap();
  assert!((confidence - 0.9).abs() < 1e-6);
}

#[tokio::test]
async fn predict_without_image_is_bad_request() {
  let (status, body) = send(app(), json_request("/predict", serde_json::json!({}))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"], "No image provided");
}

#[tokio::test]
async fn predict_with_garbage_payload_is_bad_request() {
  let request = json_request(
    "/predict",
    serde_json::json!({ "image": "data:image/png;base64,bm90IGFuIGltYWdl" }),
  );
  let (status, body) = send(app(), request).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].is_string());
}

#[tokio::test]
async fn classify_image_accepts_upload() {
  let request = multipart_request("image", "sign.jpg", &jpeg_bytes(200, 200));
  let (status, body) = send(app_with(25, ConfidencePolicy::always()), request).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["prediction"], "Z");
}

#[tokio::test]
async fn classify_image_rejects_empty_upload() {
  let request = multipart_request("image", "empty.jpg", &[]);
  let (status, body) = send(app(), request).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(body["error"].is_string());
}

#[tokio::test]
async fn classify_image_without_image_field_is_bad_request() {
  let request = multipart_request("file", "sign.jpg", &jpeg_bytes(32, 32));
  let (status, body) = send(app(), request).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"], "No image provided");
}

#[tokio::test]
async fn low_confidence_is_reported_as_uncertain() {
  let request = multipart_request("image", "sign.jpg", &jpeg_bytes(64, 64));
  let (status, body) = send(app_with(0, ConfidencePolicy::with_threshold(0.95)), request).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["prediction"], "?");
  assert!((body["confidence"].as_f64().unwrap() - 0.9).abs() < 1e-6);
}

#[tokio::test]
async fn model_failure_is_internal_error() {
  let classifier = BrokenClassifier {
    info: ModelInfo::new("broken", 64, 64, 26),
  };
  let service =
    PredictionService::from_classifier(classifier, ConfidencePolicy::always(), LabelCheck::Strict)
      .unwrap();
  let request = multipart_request("image", "sign.jpg", &jpeg_bytes(64, 64));
  let (status, body) = send(router(Arc::new(service)), request).await;
  assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
  assert!(body["error"].as_str().unwrap().contains("device lost"));
}

#[tokio::test]
async fn health_reports_model_shape_and_labels() {
  let request = Request::builder()
    .uri("/health")
    .body(Body::empty())
    .unwrap();
  let (status, body) = send(app_with(0, ConfidencePolicy::with_threshold(0.5)), request).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "ok");
  assert_eq!(body["classes"], 26);
  assert_eq!(body["input_shape"], serde_json::json!([1, 64, 64, 3]));
  assert_eq!(body["labels"][0], "A");
  assert_eq!(body["labels"][25], "Z");
  assert!((body["threshold"].as_f64().unwrap() - 0.5).abs() < 1e-6);
}

#[tokio::test]
async fn malformed_requests_get_json_bad_request() {
  let cases = [
    raw_request("/predict", Some("application/json"), "{not json"),
    raw_request("/predict", None, r#"{"image": "data:image/png;base64,AAAA"}"#),
    raw_request("/predict", Some("application/json"), r#"{"image": 5}"#),
    raw_request("/classify_image", Some("application/json"), r#"{"image": "x"}"#),
    raw_request("/classify_image", None, "image=x"),
  ];
  for request in cases {
    let uri = request.uri().to_string();
    let (status, body) = send(app(), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
    assert!(body["error"].is_string(), "{}: {}", uri, body);
  }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_are_independent() {
  let classifier = ColourClassifier {
    info: ModelInfo::new("colour", 32, 32, 26),
  };
  let service =
    PredictionService::from_classifier(classifier, ConfidencePolicy::always(), LabelCheck::Strict)
      .unwrap();
  let app = router(Arc::new(service));

  let mut handles = Vec::new();
  for red in [255u8, 254, 0, 1, 2, 3, 4, 5, 6, 7] {
    let bytes = png_bytes(red);
    let request = if red % 2 == 0 {
      let data_url = format!("data:image/png;base64,{}", STANDARD.encode(&bytes));
      json_request("/predict", serde_json::json!({ "image": data_url }))
    } else {
      multipart_request("image", "sign.png", &bytes)
    };
    let app = app.clone();
    handles.push((red, tokio::spawn(send(app, request))));
  }

  for (red, handle) in handles {
    let (status, body) = handle.await.unwrap();
    match red {
      255 => {
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"].as_str().unwrap().contains("device lost"));
      }
      _ => {
        assert_eq!(status, StatusCode::OK, "red {}: {}", red, body);
        let expected = ((b'A' + (red as usize % 26) as u8) as char).to_string();
        assert_eq!(body["prediction"], expected.as_str(), "red {}", red);
      }
    }
  }
}
