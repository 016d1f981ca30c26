// 该文件是 Shouyu （手语） 项目的一部分。
// src/frame.rs - NHWC 张量定义
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

use image::RgbImage;
use ndarray::{Array4, ArrayView4};

pub const RGB_CHANNELS: usize = 3;
pub const BATCH_SIZE: usize = 1;

/// 归一化后的单张 RGB 图像，形状为 (1, H, W, 3)，取值范围 [0, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct RgbNhwcTensor {
  data: Array4<f32>,
}

impl RgbNhwcTensor {
  pub fn with_shape(height: usize, width: usize) -> Self {
    Self {
      data: Array4::zeros((BATCH_SIZE, height, width, RGB_CHANNELS)),
    }
  }

  pub fn height(&self) -> usize {
    self.data.shape()[1]
  }

  pub fn width(&self) -> usize {
    self.data.shape()[2]
  }

  pub fn channels(&self) -> usize {
    self.data.shape()[3]
  }

  /// 张量形状 [N, H, W, C]
  pub fn shape(&self) -> [usize; 4] {
    let s = self.data.shape();
    [s[0], s[1], s[2], s[3]]
  }

  pub fn view(&self) -> ArrayView4<'_, f32> {
    self.data.view()
  }

  pub fn as_array(&self) -> &Array4<f32> {
    &self.data
  }

  /// 还原为 0-255 的字节数据（NHWC），供只接受 UInt8 输入的后端使用
  pub fn to_nhwc_bytes(&self) -> Vec<u8> {
    self
      .data
      .iter()
      .map(|v| (v * 255.0).round().clamp(0.0, 255.0) as u8)
      .collect()
  }
}

impl From<Array4<f32>> for RgbNhwcTensor {
  fn from(data: Array4<f32>) -> Self {
    Self { data }
  }
}

impl From<&RgbImage> for RgbNhwcTensor {
  fn from(image: &RgbImage) -> Self {
    let mut tensor = {
      let (width, height) = image.dimensions();
      RgbNhwcTensor::with_shape(height as usize, width as usize)
    };

    for (x, y, pixel) in image.enumerate_pixels() {
      let [r, g, b] = pixel.0;
      let (h, w) = (y as usize, x as usize);
      tensor.data[[0, h, w, 0]] = r as f32 / 255.0;
      tensor.data[[0, h, w, 1]] = g as f32 / 255.0;
      tensor.data[[0, h, w, 2]] = b as f32 / 255.0;
    }
    tensor
  }
}
