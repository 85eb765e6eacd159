// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

pub mod mask;

use self::mask::{FullMask, MaskError, SoftMask, reproject_masks, soft_mask_from_rows};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

#[derive(Error, Debug)]
pub enum PredictionError {
  #[error("服务端返回错误: {0}")]
  Server(String),
  #[error("响应中没有预测结果")]
  EmptyPredictions,
  #[error("num_detections 无效: {0}")]
  InvalidCount(f64),
  #[error("{field} 长度为 {actual}, 少于检测数量 {expected}")]
  Shape {
    field: &'static str,
    expected: usize,
    actual: usize,
  },
  #[error("部分检测缺少掩码: {with_mask}/{total}")]
  PartialMasks { with_mask: usize, total: usize },
  #[error("掩码错误: {0}")]
  Mask(#[from] MaskError),
  #[error("JSON 解析错误: {0}")]
  Json(#[from] serde_json::Error),
}

/// 预测服务响应体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictResponse {
  #[serde(default)]
  pub predictions: Vec<Prediction>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl PredictResponse {
  /// 取出单张图像对应的第一个预测
  pub fn into_first(self) -> Result<Prediction, PredictionError> {
    if let Some(message) = self.error {
      return Err(PredictionError::Server(message));
    }
    self
      .predictions
      .into_iter()
      .next()
      .ok_or(PredictionError::EmptyPredictions)
  }
}

/// `predictions` 中的单个元素，数值均以浮点数形式给出
///
/// 以 `f64` 保存，写盘时保留服务端给出的精度
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
  pub num_detections: f64,
  pub detection_classes: Vec<f64>,
  pub detection_scores: Vec<f64>,
  pub detection_boxes: Vec<[f64; 4]>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub detection_masks: Option<Vec<Vec<Vec<f64>>>>,
  /// 其余输出原样保留
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// 写入磁盘的后处理结果：检测数量与类别转为整数，其余保持不变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostProcessed {
  pub num_detections: usize,
  pub detection_classes: Vec<u32>,
  pub detection_scores: Vec<f64>,
  pub detection_boxes: Vec<[f64; 4]>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub detection_masks: Option<Vec<Vec<Vec<f64>>>>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl TryFrom<Prediction> for PostProcessed {
  type Error = PredictionError;

  fn try_from(prediction: Prediction) -> Result<Self, Self::Error> {
    let count = prediction.num_detections;
    if !count.is_finite() || count < 0.0 {
      return Err(PredictionError::InvalidCount(count));
    }

    Ok(PostProcessed {
      num_detections: count as usize,
      detection_classes: prediction
        .detection_classes
        .iter()
        .map(|&c| c as u32)
        .collect(),
      detection_scores: prediction.detection_scores,
      detection_boxes: prediction.detection_boxes,
      detection_masks: prediction.detection_masks,
      extra: prediction.extra,
    })
  }
}

#[derive(Debug, Clone)]
pub enum InstanceMask {
  /// 服务端返回的框内概率网格
  Soft(SoftMask),
  /// 重投影后的整图二值掩码
  Full(FullMask),
}

#[derive(Debug, Clone)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [y_min, x_min, y_max, x_max]
  pub mask: Option<InstanceMask>,
}

#[derive(Debug, Clone)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

fn check_len(field: &'static str, actual: usize, expected: usize) -> Result<(), PredictionError> {
  if actual < expected {
    return Err(PredictionError::Shape {
      field,
      expected,
      actual,
    });
  }
  Ok(())
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  /// 按 `num_detections` 截取各并行数组的前 N 项，数值在此收窄为 `f32`
  pub fn from_post_processed(data: &PostProcessed) -> Result<Self, PredictionError> {
    let n = data.num_detections;
    check_len("detection_classes", data.detection_classes.len(), n)?;
    check_len("detection_scores", data.detection_scores.len(), n)?;
    check_len("detection_boxes", data.detection_boxes.len(), n)?;

    let masks = match &data.detection_masks {
      Some(masks) => {
        check_len("detection_masks", masks.len(), n)?;
        masks[..n]
          .iter()
          .map(|rows| soft_mask_from_rows(rows).map(InstanceMask::Soft).map(Some))
          .collect::<Result<Vec<_>, _>>()?
      }
      None => vec![None; n],
    };

    let items = masks
      .into_iter()
      .enumerate()
      .map(|(i, mask)| DetectItem {
        class_id: data.detection_classes[i],
        score: data.detection_scores[i] as f32,
        bbox: data.detection_boxes[i].map(|v| v as f32),
        mask,
      })
      .collect();

    debug!("解析得到 {} 个检测", n);
    Ok(DetectResult { items })
  }

  /// 将所有软掩码重投影为 `(height, width)` 大小的二值掩码并原位替换
  pub fn reframe_masks(&mut self, image_size: (u32, u32)) -> Result<(), PredictionError> {
    let soft: Vec<SoftMask> = self
      .items
      .iter()
      .filter_map(|item| match &item.mask {
        Some(InstanceMask::Soft(mask)) => Some(mask.clone()),
        _ => None,
      })
      .collect();

    if soft.is_empty() {
      return Ok(());
    }
    if soft.len() != self.items.len() {
      return Err(PredictionError::PartialMasks {
        with_mask: soft.len(),
        total: self.items.len(),
      });
    }

    let boxes: Vec<[f32; 4]> = self.items.iter().map(|item| item.bbox).collect();
    let full = reproject_masks(&soft, &boxes, self.items.len(), image_size)?;
    for (item, mask) in self.items.iter_mut().zip(full) {
      item.mask = Some(InstanceMask::Full(mask));
    }
    Ok(())
  }
}
