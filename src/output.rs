// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output.rs - 输出定义
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;

use crate::{client::InferResult, frame::RgbNhwcFrame};

pub trait Render<Frame, Output>: Sized {
  type Error;
  fn render_result(&self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;
}

pub mod draw;

mod json_record;
pub use self::json_record::{JsonRecordOutput, JsonRecordOutputError};

mod save_image_file;
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput, image_path_for};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("JSON 记录输出错误: {0}")]
  JsonRecordOutputError(#[from] JsonRecordOutputError),
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
}

/// 先写 JSON 记录，再按需保存标注图像
pub struct OutputChain<'a> {
  record: JsonRecordOutput,
  image: Option<SaveImageFileOutput<'a>>,
}

impl<'a> OutputChain<'a> {
  pub fn new(record: JsonRecordOutput) -> Self {
    Self {
      record,
      image: None,
    }
  }

  pub fn with_image(mut self, image: SaveImageFileOutput<'a>) -> Self {
    self.image = Some(image);
    self
  }
}

impl Render<RgbNhwcFrame, InferResult> for OutputChain<'_> {
  type Error = OutputError;

  fn render_result(&self, frame: &RgbNhwcFrame, result: &InferResult) -> Result<(), Self::Error> {
    self.record.render_result(frame, result)?;
    if let Some(image) = &self.image {
      image.render_result(frame, result)?;
    }
    Ok(())
  }
}
