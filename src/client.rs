// 该文件是 Shanan （山南西风） 项目的一部分。
// src/client.rs - 预测服务 HTTP 客户端
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! TensorFlow Serving REST 接口（`:predict`）客户端。
//!
//! 请求体为 `{"signature_name": ..., "instances": [H×W×3 图像]}`，
//! 响应体为 `{"predictions": [...]}`，只使用第一个预测。

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl,
  frame::RgbNhwcFrame,
  model::{DetectResult, Model, PostProcessed, PredictResponse, PredictionError},
};

const DEFAULT_SIGNATURE_NAME: &str = "serving_default";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum ClientError {
  #[error("服务地址必须使用 http 或 https 方案, 实际为 '{0}'")]
  SchemeMismatch(String),
  #[error("请求失败: {0}")]
  Transport(#[from] Box<ureq::Error>),
  #[error("服务端返回 HTTP {status}: {message}")]
  Server { status: u16, message: String },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  Json(#[from] serde_json::Error),
  #[error("预测结果错误: {0}")]
  Prediction(#[from] PredictionError),
}

#[derive(Serialize)]
struct PredictRequest<'a> {
  signature_name: &'a str,
  instances: Vec<Vec<Vec<[u8; 3]>>>,
}

pub struct ServingClientBuilder {
  url: Url,
  timeout: Duration,
  signature_name: String,
}

impl FromUrl for ServingClientBuilder {
  type Error = ClientError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      "http" | "https" => Ok(ServingClientBuilder {
        url: url.clone(),
        timeout: DEFAULT_TIMEOUT,
        signature_name: DEFAULT_SIGNATURE_NAME.to_string(),
      }),
      scheme => {
        error!("服务地址方案不匹配: {}", scheme);
        Err(ClientError::SchemeMismatch(scheme.to_string()))
      }
    }
  }
}

impl ServingClientBuilder {
  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn signature_name(mut self, signature_name: impl Into<String>) -> Self {
    self.signature_name = signature_name.into();
    self
  }

  pub fn build(self) -> ServingClient {
    info!("预测服务地址: {}", self.url);
    let agent = ureq::AgentBuilder::new().timeout(self.timeout).build();
    ServingClient {
      url: self.url,
      agent,
      signature_name: self.signature_name,
    }
  }
}

pub struct ServingClient {
  url: Url,
  agent: ureq::Agent,
  signature_name: String,
}

/// 一次推理的结果：写盘用的后处理数据与解码后的检测集合
#[derive(Debug, Clone)]
pub struct InferResult {
  pub data: PostProcessed,
  pub detections: DetectResult,
}

impl ServingClient {
  /// 发送单张图像，返回未经后处理的预测
  pub fn predict(&self, frame: &RgbNhwcFrame) -> Result<PredictResponse, ClientError> {
    let request = PredictRequest {
      signature_name: &self.signature_name,
      instances: frame.to_instances(),
    };
    debug!("请求图像尺寸: {}x{}", frame.width(), frame.height());
    let payload = serde_json::to_string(&request)?;
    debug!("请求体大小: {:.2} MB", payload.len() as f64 / (1024.0 * 1024.0));

    let response = match self
      .agent
      .post(self.url.as_str())
      .set("content-type", "application/json")
      .send_string(&payload)
    {
      Ok(response) => response,
      Err(ureq::Error::Status(status, response)) => {
        let message = serde_json::from_reader::<_, PredictResponse>(response.into_reader())
          .ok()
          .and_then(|body| body.error)
          .unwrap_or_else(|| "未知错误".to_string());
        error!("预测服务返回错误 {}: {}", status, message);
        return Err(ClientError::Server { status, message });
      }
      Err(err) => return Err(ClientError::Transport(Box::new(err))),
    };

    let body = serde_json::from_reader(response.into_reader())?;
    Ok(body)
  }
}

impl Model for ServingClient {
  type Input = RgbNhwcFrame;
  type Output = InferResult;
  type Error = ClientError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let prediction = self.predict(input)?.into_first()?;
    let data = PostProcessed::try_from(prediction)?;
    let detections = DetectResult::from_post_processed(&data)?;
    info!("检测到 {} 个对象", detections.len());
    Ok(InferResult { data, detections })
  }
}
