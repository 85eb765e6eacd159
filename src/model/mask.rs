// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/mask.rs - 实例掩码重投影
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

//! 将检测框内的低分辨率软掩码重投影为整幅图像大小的二值掩码。
//!
//! 软掩码是 m×m 的概率网格，坐标相对于检测框；边界框为归一化的
//! `[y_min, x_min, y_max, x_max]`。每个检测的计算互不依赖，可以任意顺序执行。
//!
//! ```
//! use shanan_client::model::mask::{reproject_masks, SoftMask};
//!
//! let soft = SoftMask::from_pixel(2, 2, image::Luma([1.0]));
//! let full = reproject_masks(&[soft], &[[0.1, 0.2, 0.5, 0.6]], 1, (100, 100)).unwrap();
//! assert_eq!(full[0].dimensions(), (100, 100));
//! assert_eq!(full[0].get_pixel(20, 10)[0], 1);
//! assert_eq!(full[0].get_pixel(60, 10)[0], 0);
//! ```

use image::{
  GrayImage, ImageBuffer, Luma,
  imageops::{self, FilterType},
};
use thiserror::Error;
use tracing::debug;

/// 检测框内的软掩码，像素值为 [0, 1] 内的概率
pub type SoftMask = ImageBuffer<Luma<f32>, Vec<f32>>;

/// 与原图对齐的二值掩码，像素值为 0 或 1
pub type FullMask = GrayImage;

const MASK_THRESHOLD: f32 = 0.5;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MaskError {
  #[error("检测数量 {requested} 超出可用数据: 掩码 {masks} 个, 边界框 {boxes} 个")]
  IndexOutOfRange {
    requested: usize,
    masks: usize,
    boxes: usize,
  },
  #[error("软掩码第 {row} 行长度为 {actual}, 期望 {expected}")]
  RaggedSoftMask {
    row: usize,
    expected: usize,
    actual: usize,
  },
}

/// 由 JSON 中的嵌套数组（行优先）构造软掩码，数值收窄为 `f32`
pub fn soft_mask_from_rows(rows: &[Vec<f64>]) -> Result<SoftMask, MaskError> {
  let height = rows.len();
  let width = rows.first().map(Vec::len).unwrap_or(0);

  let mut data = Vec::with_capacity(width * height);
  for (row, values) in rows.iter().enumerate() {
    if values.len() != width {
      return Err(MaskError::RaggedSoftMask {
        row,
        expected: width,
        actual: values.len(),
      });
    }
    data.extend(values.iter().map(|&v| v as f32));
  }

  Ok(
    SoftMask::from_raw(width as u32, height as u32, data)
      .unwrap_or_else(|| SoftMask::new(0, 0)),
  )
}

/// 归一化区间在 `size` 像素上的跨度，四舍五入；区间为空或反向时为 0
fn box_extent(lo: f32, hi: f32, size: u32) -> u32 {
  let extent = ((hi - lo) * size as f32).round();
  if extent.is_nan() || extent <= 0.0 {
    0
  } else {
    extent as u32
  }
}

/// 归一化坐标对应的左上角像素，向下取整
fn box_anchor(lo: f32, size: u32) -> i64 {
  (lo * size as f32).floor() as i64
}

/// 将软掩码缩放到 `(width, height)` 并以 0.5 为阈值二值化
fn resample_and_threshold(mask: &SoftMask, resize_target_wh: (u32, u32)) -> GrayImage {
  let (box_width, box_height) = resize_target_wh;
  if box_width == 0 || box_height == 0 || mask.width() == 0 || mask.height() == 0 {
    return GrayImage::new(box_width, box_height);
  }

  let resized = imageops::resize(mask, box_width, box_height, FilterType::Lanczos3);
  GrayImage::from_fn(box_width, box_height, |x, y| {
    Luma([u8::from(resized.get_pixel(x, y)[0] >= MASK_THRESHOLD)])
  })
}

/// 对单个检测执行重投影，`image_size` 为 `(height, width)`
pub fn reproject_mask(mask: &SoftMask, bbox: &[f32; 4], image_size: (u32, u32)) -> FullMask {
  let (height, width) = image_size;
  let [y_min, x_min, y_max, x_max] = *bbox;

  // 缩放目标按 (宽, 高) 排列，画布按 (高, 宽) 排列，两者不可混用
  let resize_target_wh = (
    box_extent(x_min, x_max, width),
    box_extent(y_min, y_max, height),
  );
  let canvas_shape_hw = (height, width);

  let box_mask = resample_and_threshold(mask, resize_target_wh);
  let mut full = GrayImage::new(canvas_shape_hw.1, canvas_shape_hw.0);

  let x0 = box_anchor(x_min, width);
  let y0 = box_anchor(y_min, height);
  let d_x = box_extent(x_min, x_max, width);
  let d_y = box_extent(y_min, y_max, height);

  // 取整误差导致的越界像素直接丢弃
  for y in 0..d_y.min(box_mask.height()) {
    let canvas_y = y0 + y as i64;
    if canvas_y < 0 || canvas_y >= height as i64 {
      continue;
    }
    for x in 0..d_x.min(box_mask.width()) {
      let canvas_x = x0 + x as i64;
      if canvas_x < 0 || canvas_x >= width as i64 {
        continue;
      }
      let value = box_mask.get_pixel(x, y)[0];
      if value != 0 {
        full.put_pixel(canvas_x as u32, canvas_y as u32, Luma([value]));
      }
    }
  }

  full
}

/// 将前 `n` 个检测的软掩码重投影为原图大小的二值掩码。
///
/// `n` 超过 `masks` 或 `boxes` 的长度时直接返回错误，不会产生部分结果。
pub fn reproject_masks(
  masks: &[SoftMask],
  boxes: &[[f32; 4]],
  n: usize,
  image_size: (u32, u32),
) -> Result<Vec<FullMask>, MaskError> {
  if n > masks.len() || n > boxes.len() {
    return Err(MaskError::IndexOutOfRange {
      requested: n,
      masks: masks.len(),
      boxes: boxes.len(),
    });
  }

  debug!(
    "重投影 {} 个掩码到 {}x{}",
    n, image_size.1, image_size.0
  );

  Ok(reproject_all(&masks[..n], &boxes[..n], image_size))
}

#[cfg(not(feature = "parallel"))]
fn reproject_all(masks: &[SoftMask], boxes: &[[f32; 4]], image_size: (u32, u32)) -> Vec<FullMask> {
  masks
    .iter()
    .zip(boxes)
    .map(|(mask, bbox)| reproject_mask(mask, bbox, image_size))
    .collect()
}

#[cfg(feature = "parallel")]
fn reproject_all(masks: &[SoftMask], boxes: &[[f32; 4]], image_size: (u32, u32)) -> Vec<FullMask> {
  use rayon::prelude::*;

  masks
    .par_iter()
    .zip(boxes.par_iter())
    .map(|(mask, bbox)| reproject_mask(mask, bbox, image_size))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn count_ones(mask: &FullMask) -> usize {
    mask.pixels().filter(|p| p[0] == 1).count()
  }

  #[test]
  fn solid_mask_fills_box_rectangle() {
    let soft = SoftMask::from_pixel(2, 2, Luma([1.0]));
    let full = reproject_masks(&[soft], &[[0.1, 0.2, 0.5, 0.6]], 1, (100, 100)).unwrap();

    assert_eq!(full.len(), 1);
    let mask = &full[0];
    assert_eq!(mask.dimensions(), (100, 100));
    for (x, y, p) in mask.enumerate_pixels() {
      let inside = (20..60).contains(&x) && (10..50).contains(&y);
      assert_eq!(p[0], u8::from(inside), "pixel ({x}, {y})");
    }
    assert_eq!(count_ones(mask), 40 * 40);
  }

  #[test]
  fn empty_soft_mask_gives_empty_full_mask() {
    let soft = SoftMask::from_pixel(2, 2, Luma([0.0]));
    let full = reproject_masks(&[soft], &[[0.1, 0.2, 0.5, 0.6]], 1, (100, 100)).unwrap();
    assert_eq!(count_ones(&full[0]), 0);
  }

  #[test]
  fn checkerboard_keeps_quadrant_pattern() {
    let soft = soft_mask_from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
    let full = reproject_masks(&[soft], &[[0.0, 0.0, 1.0, 1.0]], 1, (10, 10)).unwrap();
    let mask = &full[0];

    assert_eq!(mask.get_pixel(2, 2)[0], 1);
    assert_eq!(mask.get_pixel(7, 7)[0], 1);
    assert_eq!(mask.get_pixel(7, 2)[0], 0);
    assert_eq!(mask.get_pixel(2, 7)[0], 0);
  }

  #[test]
  fn degenerate_boxes_are_all_zero() {
    let soft = SoftMask::from_pixel(3, 3, Luma([1.0]));
    let boxes = [
      [0.2, 0.3, 0.2, 0.8],
      [0.2, 0.3, 0.9, 0.3],
      [0.9, 0.8, 0.1, 0.2],
    ];
    let masks = vec![soft; 3];
    let full = reproject_masks(&masks, &boxes, 3, (50, 40)).unwrap();

    for mask in &full {
      assert_eq!(mask.dimensions(), (40, 50));
      assert_eq!(count_ones(mask), 0);
    }
  }

  #[test]
  fn too_many_detections_is_an_error() {
    let soft = SoftMask::from_pixel(2, 2, Luma([1.0]));
    let err = reproject_masks(&[soft], &[[0.0, 0.0, 1.0, 1.0]], 2, (8, 8)).unwrap_err();
    assert_eq!(
      err,
      MaskError::IndexOutOfRange {
        requested: 2,
        masks: 1,
        boxes: 1
      }
    );
  }

  #[test]
  fn out_of_range_probabilities_are_thresholded() {
    let soft = soft_mask_from_rows(&[vec![7.5, 7.5], vec![-3.0, -3.0]]).unwrap();
    let full = reproject_masks(&[soft], &[[0.0, 0.0, 1.0, 1.0]], 1, (8, 8)).unwrap();
    assert_eq!(full[0].get_pixel(4, 0)[0], 1);
    assert_eq!(full[0].get_pixel(4, 7)[0], 0);
  }

  #[test]
  fn ragged_rows_are_rejected() {
    let err = soft_mask_from_rows(&[vec![0.1, 0.2], vec![0.3]]).unwrap_err();
    assert_eq!(
      err,
      MaskError::RaggedSoftMask {
        row: 1,
        expected: 2,
        actual: 1
      }
    );
  }

  #[test]
  fn box_extent_rounds_to_nearest() {
    assert_eq!(box_extent(0.2, 0.6, 100), 40);
    assert_eq!(box_extent(0.1, 0.5, 100), 40);
    assert_eq!(box_extent(0.5, 0.1, 100), 0);
    assert_eq!(box_anchor(0.2, 100), 20);
    assert_eq!(box_anchor(0.1, 100), 10);
  }
}
