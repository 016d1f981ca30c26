// 该文件是 Shouyu （手语） 项目的一部分。
// src/preprocess.rs - 图像预处理
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

use image::{DynamicImage, RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::debug;

use crate::frame::RgbNhwcTensor;

pub const DEFAULT_INPUT_SIZE: (u32, u32) = (224, 224);

#[derive(Error, Debug)]
pub enum PreprocessError {
  #[error("无效图像: {0}")]
  InvalidImageError(String),
}

impl From<image::ImageError> for PreprocessError {
  fn from(err: image::ImageError) -> Self {
    PreprocessError::InvalidImageError(err.to_string())
  }
}

impl PreprocessError {
  pub fn invalid(msg: impl Into<String>) -> Self {
    PreprocessError::InvalidImageError(msg.into())
  }
}

/// 从内存中的编码数据（JPEG、PNG 等）解码图像
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, PreprocessError> {
  if bytes.is_empty() {
    return Err(PreprocessError::invalid("图像数据为空"));
  }
  let image = image::load_from_memory(bytes)?;
  debug!("解码图像: {}x{}", image.width(), image.height());
  Ok(image)
}

/// 把 8 位 RGB 图像逐像素除以 255，得到 (1, H, W, 3) 张量
pub fn normalize(image: &RgbImage) -> RgbNhwcTensor {
  RgbNhwcTensor::from(image)
}

/// 帧预处理器：直接缩放到目标尺寸（不保持宽高比），再归一化
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preprocessor {
  width: u32,
  height: u32,
  filter: FilterType,
}

impl Default for Preprocessor {
  fn default() -> Self {
    let (height, width) = DEFAULT_INPUT_SIZE;
    Self::new(height, width)
  }
}

impl Preprocessor {
  pub fn new(height: u32, width: u32) -> Self {
    Self {
      width,
      height,
      filter: FilterType::Triangle,
    }
  }

  pub fn target_size(&self) -> (u32, u32) {
    (self.height, self.width)
  }

  pub fn resize(&self, image: &DynamicImage) -> Result<RgbImage, PreprocessError> {
    if image.width() == 0 || image.height() == 0 {
      return Err(PreprocessError::invalid(format!(
        "图像尺寸无效: {}x{}",
        image.width(),
        image.height()
      )));
    }
    let rgb = image.to_rgb8();
    Ok(image::imageops::resize(
      &rgb,
      self.width,
      self.height,
      self.filter,
    ))
  }

  pub fn preprocess(&self, image: &DynamicImage) -> Result<RgbNhwcTensor, PreprocessError> {
    let resized = self.resize(image)?;
    Ok(normalize(&resized))
  }

  pub fn preprocess_bytes(&self, bytes: &[u8]) -> Result<RgbNhwcTensor, PreprocessError> {
    let image = decode_image(bytes)?;
    self.preprocess(&image)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{ImageFormat, Rgb};
  use std::io::Cursor;

  fn gradient(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
      Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }))
  }

  fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).unwrap();
    buf.into_inner()
  }

  #[test]
  fn output_has_fixed_shape_and_unit_range() {
    let preprocessor = Preprocessor::default();
    for (w, h) in [(640, 480), (100, 300), (1, 1), (224, 224)] {
      let tensor = preprocessor.preprocess(&gradient(w, h)).unwrap();
      assert_eq!(tensor.shape(), [1, 224, 224, 3]);
      assert!(tensor.as_array().iter().all(|v| (0.0..=1.0).contains(v)));
    }
  }

  #[test]
  fn resize_happens_before_normalization() {
    let preprocessor = Preprocessor::default();
    let image = gradient(320, 240);
    let expected = normalize(&preprocessor.resize(&image).unwrap());
    let actual = preprocessor.preprocess(&image).unwrap();
    assert_eq!(actual, expected);
    assert_eq!(preprocessor.preprocess(&image).unwrap(), actual);
  }

  #[test]
  fn grayscale_and_alpha_images_become_rgb() {
    let preprocessor = Preprocessor::new(32, 48);
    let gray = DynamicImage::new_luma8(10, 10);
    let rgba = DynamicImage::new_rgba8(10, 20);
    assert_eq!(preprocessor.preprocess(&gray).unwrap().shape(), [1, 32, 48, 3]);
    assert_eq!(preprocessor.preprocess(&rgba).unwrap().shape(), [1, 32, 48, 3]);
  }

  #[test]
  fn decodes_jpeg_and_png_bytes() {
    let image = gradient(640, 480);
    let preprocessor = Preprocessor::default();
    for format in [ImageFormat::Jpeg, ImageFormat::Png] {
      let tensor = preprocessor.preprocess_bytes(&encode(&image, format)).unwrap();
      assert_eq!(tensor.shape(), [1, 224, 224, 3]);
    }
  }

  #[test]
  fn rejects_empty_and_corrupt_payloads() {
    let preprocessor = Preprocessor::default();
    assert!(matches!(
      preprocessor.preprocess_bytes(&[]),
      Err(PreprocessError::InvalidImageError(_))
    ));
    assert!(matches!(
      preprocessor.preprocess_bytes(b"definitely not an image"),
      Err(PreprocessError::InvalidImageError(_))
    ));

    let mut truncated = encode(&gradient(64, 64), ImageFormat::Png);
    truncated.truncate(truncated.len() / 2);
    assert!(preprocessor.preprocess_bytes(&truncated).is_err());
  }

  #[test]
  fn rejects_zero_sized_images() {
    let preprocessor = Preprocessor::default();
    let empty = DynamicImage::new_rgb8(0, 10);
    assert!(matches!(
      preprocessor.preprocess(&empty),
      Err(PreprocessError::InvalidImageError(_))
    ));
  }
}
