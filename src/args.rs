// 该文件是 Shanan （山南西风） 项目的一部分。
// src/args.rs - 项目参数配置
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use shanan_client::output::draw::{DEFAULT_MAX_BOXES, DEFAULT_MIN_SCORE};

/// 向预测服务发送单张图像并保存检测结果
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 预测服务地址
  /// 例如 http://localhost:8501/v1/models/omr_500:predict
  #[arg(long, value_name = "URL")]
  pub server_url: Url,

  /// 输入图像路径
  #[arg(long, value_name = "FILE")]
  pub image_path: PathBuf,

  /// 预测结果 JSON 输出路径
  #[arg(long, default_value = "tf_output.json", value_name = "FILE")]
  pub output_json: PathBuf,

  /// 是否根据预测结果生成标注图像（与 JSON 同名, 扩展名为 .jpeg）
  #[arg(long)]
  pub save_output_image: bool,

  /// 标签映射文件（pbtxt 或 JSON 格式）
  #[arg(long, default_value = "mapping_all_classes.txt", value_name = "FILE")]
  pub label_map: PathBuf,

  /// 标签映射中保留的最大类别编号
  #[arg(long, default_value = "99999", value_name = "COUNT")]
  pub max_classes: u32,

  /// 绘制检测的最低置信度 (0.0 - 1.0)
  #[arg(long, default_value_t = DEFAULT_MIN_SCORE, value_name = "THRESHOLD")]
  pub min_score: f32,

  /// 最多绘制的检测数量
  #[arg(long, default_value_t = DEFAULT_MAX_BOXES, value_name = "COUNT")]
  pub max_boxes: usize,

  /// 标签字体文件（TTF/OTF）
  /// 默认不绘制 "类别: 置信度%" 标签文字，只有指定字体时才绘制；边界框与掩码始终绘制
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 请求超时（秒）
  #[arg(long, default_value = "60", value_name = "SECONDS")]
  pub timeout_secs: u64,

  /// 服务签名名称
  #[arg(long, default_value = "serving_default", value_name = "NAME")]
  pub signature_name: String,
}
