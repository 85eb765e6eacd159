// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::debug;

use crate::{
  label_map::CategoryIndex,
  model::{DetectItem, DetectResult, InstanceMask, mask::FullMask},
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const LABEL_TEXT_COLOR: [u8; 3] = [0, 0, 0];
const LINE_THICKNESS: i32 = 2;
const MASK_ALPHA: f32 = 0.4;
const PALETTE_SIZE: usize = 64;

pub const DEFAULT_MIN_SCORE: f32 = 0.5;
pub const DEFAULT_MAX_BOXES: usize = 20;

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

pub struct Draw<'a> {
  category_index: &'a CategoryIndex,
  font: Option<FontArc>,
  font_size: f32,
  min_score: f32,
  max_boxes: usize,
  colors: Vec<Rgb<u8>>,
}

impl<'a> Draw<'a> {
  pub fn new(category_index: &'a CategoryIndex) -> Self {
    // 按色相均匀取色，类别编号对调色板取模
    let colors = (0..PALETTE_SIZE)
      .map(|i| {
        let hue = (i as f32 / PALETTE_SIZE as f32) * 360.0;
        hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();

    Self {
      category_index,
      font: None,
      font_size: LABEL_FONT_SIZE,
      min_score: DEFAULT_MIN_SCORE,
      max_boxes: DEFAULT_MAX_BOXES,
      colors,
    }
  }

  /// 加载标签字体，未加载字体时只绘制边框与掩码
  pub fn with_font_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, DrawError> {
    let data = std::fs::read(path)?;
    self.font = Some(FontArc::try_from_vec(data)?);
    Ok(self)
  }

  pub fn with_min_score(mut self, min_score: f32) -> Self {
    self.min_score = min_score;
    self
  }

  pub fn with_max_boxes(mut self, max_boxes: usize) -> Self {
    self.max_boxes = max_boxes;
    self
  }

  fn color_of(&self, class_id: u32) -> Rgb<u8> {
    self.colors[class_id as usize % self.colors.len()]
  }

  /// 参与绘制的检测：前 `max_boxes` 个中得分高于阈值的
  pub fn visible<'r>(&self, result: &'r DetectResult) -> impl Iterator<Item = &'r DetectItem> {
    let min_score = self.min_score;
    result
      .items
      .iter()
      .take(self.max_boxes)
      .filter(move |item| item.score > min_score)
  }

  pub fn draw_detections_on_image(&self, image: &mut RgbImage, result: &DetectResult) {
    let visible: Vec<&DetectItem> = self.visible(result).collect();
    debug!("绘制 {}/{} 个检测", visible.len(), result.len());

    // 先画掩码，避免覆盖边框与标签
    for item in &visible {
      if let Some(InstanceMask::Full(mask)) = &item.mask {
        draw_mask_on_image(image, mask, self.color_of(item.class_id), MASK_ALPHA);
      }
    }
    for item in &visible {
      self.draw_bbox_with_label(image, item);
    }
  }

  // bbox 为归一化坐标 [y_min, x_min, y_max, x_max]
  fn draw_bbox_with_label(&self, image: &mut RgbImage, item: &DetectItem) {
    let (w, h) = (image.width() as f32, image.height() as f32);
    if w < 1.0 || h < 1.0 {
      return;
    }
    let [y_min, x_min, y_max, x_max] = item.bbox;

    let left = ((x_min * w).floor() as i32).clamp(0, w as i32 - 1);
    let top = ((y_min * h).floor() as i32).clamp(0, h as i32 - 1);
    let right = ((x_max * w).ceil() as i32).clamp(0, w as i32 - 1);
    let bottom = ((y_max * h).ceil() as i32).clamp(0, h as i32 - 1);

    if left >= right || top >= bottom {
      return;
    }

    let color = self.color_of(item.class_id);
    for thickness in 0..LINE_THICKNESS {
      let width = right - left - 2 * thickness;
      let height = bottom - top - 2 * thickness;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(left + thickness, top + thickness).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let Some(font) = &self.font else {
      return;
    };

    let label = format!(
      "{}: {}%",
      self.category_index.label(item.class_id),
      (item.score * 100.0) as i32
    );
    let scale = PxScale::from(self.font_size);
    let (text_width, text_height) = text_size(scale, font, &label);
    let label_height = text_height as i32 + 2 * LABEL_TEXT_VERTICAL_PADDING;

    // 标签放在边框上方，空间不足时放在框内
    let label_y = if top >= label_height {
      top - label_height
    } else {
      top
    };
    let label_width = (text_width as i32 + 2 * LABEL_TEXT_VERTICAL_PADDING).min(w as i32 - left);
    if label_width <= 0 {
      return;
    }

    let rect = Rect::at(left, label_y).of_size(label_width as u32, label_height as u32);
    draw_filled_rect_mut(image, rect, color);
    draw_text_mut(
      image,
      Rgb(LABEL_TEXT_COLOR),
      left + LABEL_TEXT_VERTICAL_PADDING,
      label_y + LABEL_TEXT_VERTICAL_PADDING,
      scale,
      font,
      &label,
    );
  }
}

/// 按透明度将二值掩码叠加到图像上，尺寸不一致时跳过
pub fn draw_mask_on_image(image: &mut RgbImage, mask: &FullMask, color: Rgb<u8>, alpha: f32) {
  if image.dimensions() != mask.dimensions() {
    debug!(
      "掩码尺寸 {:?} 与图像尺寸 {:?} 不一致, 跳过",
      mask.dimensions(),
      image.dimensions()
    );
    return;
  }

  for (pixel, value) in image.pixels_mut().zip(mask.pixels()) {
    if value[0] == 0 {
      continue;
    }
    for c in 0..3 {
      let blended = (1.0 - alpha) * pixel[c] as f32 + alpha * color[c] as f32;
      pixel[c] = blended.round().clamp(0.0, 255.0) as u8;
    }
  }
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{GrayImage, Luma};

  fn item(score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id: 1,
      score,
      bbox,
      mask: None,
    }
  }

  #[test]
  fn only_confident_leading_detections_are_visible() {
    let index = CategoryIndex::default();
    let result = DetectResult {
      items: vec![
        item(0.9, [0.0; 4]),
        item(0.5, [0.0; 4]),
        item(0.7, [0.0; 4]),
        item(0.95, [0.0; 4]),
      ]
      .into_boxed_slice(),
    };
    let draw = Draw::new(&index).with_max_boxes(3);
    let scores: Vec<f32> = draw.visible(&result).map(|i| i.score).collect();
    assert_eq!(scores, vec![0.9, 0.7]);
  }

  #[test]
  fn mask_blends_only_set_pixels() {
    let mut image = RgbImage::from_pixel(4, 4, Rgb([0, 0, 0]));
    let mut mask = GrayImage::new(4, 4);
    mask.put_pixel(1, 2, Luma([1]));

    draw_mask_on_image(&mut image, &mask, Rgb([250, 100, 0]), 0.4);
    assert_eq!(*image.get_pixel(1, 2), Rgb([100, 40, 0]));
    assert_eq!(*image.get_pixel(0, 0), Rgb([0, 0, 0]));
  }

  #[test]
  fn box_outline_is_drawn_inside_image() {
    let index = CategoryIndex::default();
    let result = DetectResult {
      items: vec![item(0.9, [0.25, 0.25, 0.75, 0.75])].into_boxed_slice(),
    };
    let mut image = RgbImage::new(20, 20);
    Draw::new(&index).draw_detections_on_image(&mut image, &result);

    assert_ne!(*image.get_pixel(5, 10), Rgb([0, 0, 0]));
    assert_eq!(*image.get_pixel(10, 10), Rgb([0, 0, 0]));
    assert_eq!(*image.get_pixel(0, 0), Rgb([0, 0, 0]));
  }
}
