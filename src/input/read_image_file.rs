// 该文件是 Shouyu （手语） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::error;
use url::Url;

use super::InputFrame;
use crate::{
  FromUrl, FromUrlWithScheme,
  preprocess::{PreprocessError, decode_image},
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(PreprocessError),
}

impl From<std::io::Error> for ImageFileInputError {
  fn from(err: std::io::Error) -> Self {
    ImageFileInputError::IoError(err)
  }
}

impl From<PreprocessError> for ImageFileInputError {
  fn from(err: PreprocessError) -> Self {
    ImageFileInputError::ImageLoadError(err)
  }
}

/// 单张图像文件，`image:///path/to/sign.jpg`
pub struct ImageFileInput {
  path: Option<PathBuf>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let path = PathBuf::from(url.path());
    if !path.is_file() {
      return Err(ImageFileInputError::IoError(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("{} 不是文件", path.display()),
      )));
    }

    Ok(ImageFileInput { path: Some(path) })
  }
}

pub(crate) fn read_frame(path: &Path) -> Result<InputFrame, ImageFileInputError> {
  let bytes = std::fs::read(path)?;
  let image = decode_image(&bytes)?;
  Ok(InputFrame {
    name: path.display().to_string(),
    image,
  })
}

impl Iterator for ImageFileInput {
  type Item = Result<InputFrame, ImageFileInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    self.path.take().map(|path| read_frame(&path))
  }
}
