// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::{
  client::InferResult,
  frame::RgbNhwcFrame,
  model::PredictionError,
  output::{Render, draw::Draw},
};

const IMAGE_EXTENSION: &str = "jpeg";

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("掩码重投影错误: {0}")]
  ReframeError(#[from] PredictionError),
}

/// 由 JSON 输出路径推导标注图像路径：文件名截断到第一个 `.`，扩展名改为 `.jpeg`
pub fn image_path_for(json_path: &Path) -> PathBuf {
  let file_name = json_path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_default();
  let stem = file_name.split('.').next().unwrap_or_default();
  json_path.with_file_name(format!("{stem}.{IMAGE_EXTENSION}"))
}

pub struct SaveImageFileOutput<'a> {
  path: PathBuf,
  draw: Draw<'a>,
}

impl<'a> SaveImageFileOutput<'a> {
  pub fn new(path: impl Into<PathBuf>, draw: Draw<'a>) -> Self {
    Self {
      path: path.into(),
      draw,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&self, image: image::RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;

    warn!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl Render<RgbNhwcFrame, InferResult> for SaveImageFileOutput<'_> {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &RgbNhwcFrame, result: &InferResult) -> Result<(), Self::Error> {
    info!("构建输出图像");
    let mut detections = result.detections.clone();
    detections.reframe_masks(frame.image_size())?;

    let mut image = frame.to_rgb_image();
    self.draw.draw_detections_on_image(&mut image, &detections);
    self.save_image(image)
  }
}
