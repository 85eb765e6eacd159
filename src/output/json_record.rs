// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/json_record.rs - 预测结果 JSON 记录
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{
  fs::File,
  io::{BufWriter, Write},
  path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::info;

use crate::{client::InferResult, output::Render};

#[derive(Error, Debug)]
pub enum JsonRecordOutputError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 将后处理后的预测原样写入 JSON 文件
pub struct JsonRecordOutput {
  path: PathBuf,
}

impl JsonRecordOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl<F> Render<F, InferResult> for JsonRecordOutput {
  type Error = JsonRecordOutputError;

  fn render_result(&self, _frame: &F, result: &InferResult) -> Result<(), Self::Error> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(File::create(&self.path)?);
    serde_json::to_writer(&mut writer, &result.data)?;
    writer.flush()?;

    info!("输出已保存: {}", self.path.display());
    Ok(())
  }
}
