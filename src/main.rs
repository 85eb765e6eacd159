// 该文件是 Shanan （山南西风） 项目的一部分。
// src/main.rs - 项目主程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

mod args;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use shanan_client::{
  FromUrl,
  client::ServingClientBuilder,
  input::ImageFileInput,
  label_map::CategoryIndex,
  output::{JsonRecordOutput, OutputChain, SaveImageFileOutput, draw::Draw, image_path_for},
  task::{OneShotTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("预测服务地址: {}", args.server_url);
  info!("输入图像: {}", args.image_path.display());

  let input = ImageFileInput::open(&args.image_path)?;
  let client = ServingClientBuilder::from_url(&args.server_url)?
    .timeout(Duration::from_secs(args.timeout_secs))
    .signature_name(args.signature_name.as_str())
    .build();

  // 标签映射只在生成图像时需要，加载一次后以引用传递
  let category_index = if args.save_output_image {
    CategoryIndex::load(&args.label_map, args.max_classes)?
  } else {
    CategoryIndex::default()
  };

  let record = JsonRecordOutput::new(&args.output_json);
  info!("JSON 输出: {}", record.path().display());
  let mut output = OutputChain::new(record);
  if args.save_output_image {
    let mut draw = Draw::new(&category_index)
      .with_min_score(args.min_score)
      .with_max_boxes(args.max_boxes);
    if let Some(font) = &args.font {
      draw = draw.with_font_file(font)?;
    }
    let image = SaveImageFileOutput::new(image_path_for(&args.output_json), draw);
    info!("标注图像输出: {}", image.path().display());
    output = output.with_image(image);
  }

  OneShotTask.run_task(input.into_nhwc(), client, output)?;

  info!("处理完成");
  Ok(())
}
