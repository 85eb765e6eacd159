// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - NHWC 帧定义
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

use image::{ImageBuffer, Rgb, RgbImage};

const RGB_CHANNELS: usize = 3;

/// 原始分辨率的 RGB 图像帧，按 NHWC（批大小为 1）排布。
///
/// 所有像素坐标计算都以此帧的 `(height, width)` 为基准。
#[derive(Debug, Clone)]
pub struct RgbNhwcFrame {
  height: usize,
  width: usize,
  data: Box<[u8]>,
}

impl RgbNhwcFrame {
  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  /// `(height, width)`，掩码重投影的目标尺寸
  pub fn image_size(&self) -> (u32, u32) {
    (self.height as u32, self.width as u32)
  }

  /// 请求体中的 `instances` 张量：`[1, H, W, 3]`
  pub fn to_instances(&self) -> Vec<Vec<Vec<[u8; 3]>>> {
    let row_len = self.width * RGB_CHANNELS;
    let image = self
      .data
      .chunks_exact(row_len.max(1))
      .take(self.height)
      .map(|row| {
        row
          .chunks_exact(RGB_CHANNELS)
          .map(|px| [px[0], px[1], px[2]])
          .collect()
      })
      .collect();
    vec![image]
  }

  pub fn to_rgb_image(&self) -> RgbImage {
    let width = self.width as u32;
    let height = self.height as u32;
    let data = &self.data;

    ImageBuffer::from_fn(width, height, |x, y| {
      let idx = (y as usize * self.width + x as usize) * RGB_CHANNELS;
      Rgb([data[idx], data[idx + 1], data[idx + 2]])
    })
  }
}

impl From<RgbImage> for RgbNhwcFrame {
  fn from(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    // RgbImage 的底层存储本身就是 HWC 排布
    Self {
      height: height as usize,
      width: width as usize,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}
