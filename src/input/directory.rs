// 该文件是 Shouyu （手语） 项目的一部分。
// src/input/directory.rs - 目录图像输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use super::InputFrame;
use super::read_image_file::{ImageFileInputError, read_frame};
use crate::{FromUrl, FromUrlWithScheme};

const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

#[derive(Error, Debug)]
pub enum DirectoryInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("{path}: {source}")]
  FrameError {
    path: String,
    source: ImageFileInputError,
  },
}

/// 按文件名顺序逐张读取目录中的图像，`folder:///path/to/dir?recursive`
pub struct DirectoryInput {
  pending: VecDeque<PathBuf>,
}

impl FromUrlWithScheme for DirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryInput {
  type Error = DirectoryInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(DirectoryInputError::SchemeMismatch);
    }

    let recursive = url.query_pairs().any(|(k, _)| k == "recursive");
    Self::open(Path::new(url.path()), recursive)
  }
}

impl DirectoryInput {
  pub fn open(directory: &Path, recursive: bool) -> Result<Self, DirectoryInputError> {
    let mut files = Vec::new();
    collect_images(directory, recursive, &mut files)?;
    files.sort();
    info!("目录 {} 中共有 {} 张图像", directory.display(), files.len());

    Ok(DirectoryInput {
      pending: files.into(),
    })
  }

  pub fn remaining(&self) -> usize {
    self.pending.len()
  }
}

fn is_image(path: &Path) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
    .unwrap_or(false)
}

fn collect_images(
  directory: &Path,
  recursive: bool,
  files: &mut Vec<PathBuf>,
) -> Result<(), DirectoryInputError> {
  for entry in std::fs::read_dir(directory)? {
    let path = entry?.path();
    if path.is_dir() {
      if recursive {
        collect_images(&path, recursive, files)?;
      }
    } else if is_image(&path) {
      files.push(path);
    } else {
      debug!("跳过非图像文件: {}", path.display());
    }
  }
  Ok(())
}

impl Iterator for DirectoryInput {
  type Item = Result<InputFrame, DirectoryInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.pending.pop_front()?;
    Some(
      read_frame(&path).map_err(|source| DirectoryInputError::FrameError {
        path: path.display().to_string(),
        source,
      }),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  #[test]
  fn lists_images_in_order_and_reports_bad_files() {
    let dir = tempfile::tempdir().unwrap();
    RgbImage::new(4, 4).save(dir.path().join("b.png")).unwrap();
    RgbImage::new(6, 6).save(dir.path().join("a.png")).unwrap();
    std::fs::write(dir.path().join("c.jpg"), b"broken").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"skip me").unwrap();

    let nested = dir.path().join("nested");
    std::fs::create_dir(&nested).unwrap();
    RgbImage::new(2, 2).save(nested.join("d.png")).unwrap();

    let input = DirectoryInput::open(dir.path(), false).unwrap();
    assert_eq!(input.remaining(), 3);

    let frames: Vec<_> = input.collect();
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].as_ref().unwrap().image.width(), 6);
    assert_eq!(frames[1].as_ref().unwrap().image.width(), 4);
    assert!(matches!(
      frames[2],
      Err(DirectoryInputError::FrameError { .. })
    ));

    let recursive = DirectoryInput::open(dir.path(), true).unwrap();
    assert_eq!(recursive.remaining(), 4);
  }

  #[test]
  fn every_listed_extension_decodes() {
    let dir = tempfile::tempdir().unwrap();
    for ext in IMAGE_EXTENSIONS {
      RgbImage::from_pixel(3, 5, image::Rgb([10, 20, 30]))
        .save(dir.path().join(format!("sign.{}", ext)))
        .unwrap();
    }

    let input = DirectoryInput::open(dir.path(), false).unwrap();
    assert_eq!(input.remaining(), IMAGE_EXTENSIONS.len());
    for frame in input {
      let frame = frame.unwrap();
      assert_eq!((frame.image.width(), frame.image.height()), (3, 5));
    }
  }

  #[test]
  fn url_selects_recursion() {
    let url = Url::parse("folder:///definitely/missing/dir").unwrap();
    assert!(matches!(
      DirectoryInput::from_url(&url),
      Err(DirectoryInputError::IoError(_))
    ));
    let url = Url::parse("image:///tmp").unwrap();
    assert!(matches!(
      DirectoryInput::from_url(&url),
      Err(DirectoryInputError::SchemeMismatch)
    ));
  }
}
