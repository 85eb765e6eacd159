// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/client_roundtrip.rs - 客户端端到端测试
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

use std::{
  io::{BufRead, BufReader, Read, Write},
  net::TcpListener,
  path::PathBuf,
  thread::{self, JoinHandle},
};

use image::{Rgb, RgbImage};
use serde_json::Value;
use url::Url;

use shanan_client::{
  FromUrl,
  client::{ClientError, ServingClientBuilder},
  input::ImageFileInput,
  label_map::CategoryIndex,
  model::{InstanceMask, Model},
  output::{JsonRecordOutput, OutputChain, SaveImageFileOutput, draw::Draw, image_path_for},
  task::{OneShotTask, Task},
};

const PREDICTION: &str = r#"{
  "predictions": [{
    "num_detections": 2.0,
    "detection_classes": [4.0, 2.0, 1.0],
    "detection_scores": [0.92, 0.71, 0.05],
    "detection_boxes": [[0.25, 0.25, 0.75, 0.75], [0.0, 0.5, 0.5, 1.0], [0.0, 0.0, 0.1, 0.1]],
    "detection_masks": [
      [[1.0, 1.0], [1.0, 1.0]],
      [[0.9, 0.1], [0.1, 0.9]],
      [[0.0, 0.0], [0.0, 0.0]]
    ]
  }]
}"#;

/// 只处理一次请求的本地桩服务，返回服务地址与收到的请求体
fn serve_once(status_line: &'static str, body: &'static str) -> (Url, JoinHandle<String>) {
  let listener = TcpListener::bind("127.0.0.1:0").unwrap();
  let addr = listener.local_addr().unwrap();

  let handle = thread::spawn(move || {
    let (mut stream, _) = listener.accept().unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());

    let mut content_length = 0usize;
    loop {
      let mut line = String::new();
      reader.read_line(&mut line).unwrap();
      if line == "\r\n" || line.is_empty() {
        break;
      }
      let lower = line.to_ascii_lowercase();
      if let Some(value) = lower.strip_prefix("content-length:") {
        content_length = value.trim().parse().unwrap();
      }
    }

    let mut request = vec![0u8; content_length];
    reader.read_exact(&mut request).unwrap();

    write!(
      stream,
      "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
      body.len()
    )
    .unwrap();
    stream.flush().unwrap();

    String::from_utf8(request).unwrap()
  });

  let url = Url::parse(&format!("http://{addr}/v1/models/omr:predict")).unwrap();
  (url, handle)
}

fn scratch_dir(name: &str) -> PathBuf {
  let dir = std::env::temp_dir().join(format!("shanan-client-{}-{}", name, std::process::id()));
  let _ = std::fs::remove_dir_all(&dir);
  std::fs::create_dir_all(&dir).unwrap();
  dir
}

fn test_image() -> RgbImage {
  RgbImage::from_fn(8, 6, |x, y| Rgb([x as u8 * 10, y as u8 * 10, 128]))
}

#[test]
fn infer_posts_image_and_decodes_detections() {
  let (url, server) = serve_once("200 OK", PREDICTION);
  let client = ServingClientBuilder::from_url(&url).unwrap().build();

  let frame = ImageFileInput::from_image(test_image())
    .into_nhwc()
    .next()
    .unwrap();
  let result = client.infer(&frame).unwrap();

  let request: Value = serde_json::from_str(&server.join().unwrap()).unwrap();
  assert_eq!(request["signature_name"], "serving_default");
  let instances = request["instances"].as_array().unwrap();
  assert_eq!(instances.len(), 1);
  assert_eq!(instances[0].as_array().unwrap().len(), 6);
  assert_eq!(instances[0][0].as_array().unwrap().len(), 8);
  assert_eq!(instances[0][2][3], serde_json::json!([30, 20, 128]));

  assert_eq!(result.data.num_detections, 2);
  assert_eq!(result.data.detection_classes, vec![4, 2, 1]);
  assert_eq!(result.detections.len(), 2);
  assert_eq!(result.detections.items[1].class_id, 2);
  assert!(matches!(
    result.detections.items[0].mask,
    Some(InstanceMask::Soft(_))
  ));
}

#[test]
fn server_error_body_is_reported() {
  let (url, server) = serve_once(
    "400 Bad Request",
    r#"{"error": "Serving signature name: \"serving_default\" not found"}"#,
  );
  let client = ServingClientBuilder::from_url(&url).unwrap().build();
  let frame = ImageFileInput::from_image(test_image())
    .into_nhwc()
    .next()
    .unwrap();

  let err = client.infer(&frame).unwrap_err();
  server.join().unwrap();
  match err {
    ClientError::Server { status, message } => {
      assert_eq!(status, 400);
      assert!(message.contains("not found"));
    }
    other => panic!("unexpected error: {other}"),
  }
}

#[test]
fn one_shot_task_writes_json_and_annotated_image() {
  let (url, server) = serve_once("200 OK", PREDICTION);
  let dir = scratch_dir("one-shot");
  let json_path = dir.join("tf_output.json");

  let index = CategoryIndex::parse("item { id: 4 name: 'note' }", 99999).unwrap();
  let draw = Draw::new(&index);
  let record = JsonRecordOutput::new(&json_path);
  let image = SaveImageFileOutput::new(image_path_for(&json_path), draw);
  let record_path = record.path().to_path_buf();
  let image_path = image.path().to_path_buf();
  assert_eq!(record_path, json_path);
  assert_eq!(image_path, dir.join("tf_output.jpeg"));
  let output = OutputChain::new(record).with_image(image);
  let client = ServingClientBuilder::from_url(&url).unwrap().build();
  let input = ImageFileInput::from_image(test_image()).into_nhwc();

  OneShotTask.run_task(input, client, output).unwrap();
  server.join().unwrap();

  let saved: Value =
    serde_json::from_str(&std::fs::read_to_string(&record_path).unwrap()).unwrap();
  assert_eq!(saved["num_detections"], 2);
  assert_eq!(saved["detection_classes"], serde_json::json!([4, 2, 1]));
  assert_eq!(saved["detection_masks"].as_array().unwrap().len(), 3);

  let annotated = image::open(&image_path).unwrap();
  assert_eq!((annotated.width(), annotated.height()), (8, 6));

  let _ = std::fs::remove_dir_all(&dir);
}
