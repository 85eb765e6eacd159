// 该文件是 Shanan （山南西风） 项目的一部分。
// src/label_map.rs - 类别标签映射
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

//! 类别索引，在程序启动时加载一次并以只读引用传递。
//!
//! 支持两种文件格式：
//! - 目标检测常用的 pbtxt 格式：`item { id: 1 name: 'cat' display_name: 'Cat' }`
//! - JSON 对象，键为类别名，值为类别编号：`{"cat": 1, "dog": 2}`

use std::{collections::BTreeMap, path::Path};

use thiserror::Error;
use tracing::{debug, info, warn};

const UNKNOWN_LABEL: &str = "N/A";

#[derive(Error, Debug)]
pub enum LabelMapError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 标签映射解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("标签映射语法错误 (第 {line} 行): {message}")]
  Syntax { line: usize, message: String },
  #[error("类别编号无效: {0}")]
  InvalidId(i64),
  #[error("类别 {0} 缺少 id")]
  MissingId(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
  pub id: u32,
  pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct CategoryIndex {
  categories: BTreeMap<u32, Category>,
}

impl CategoryIndex {
  pub fn load<P: AsRef<Path>>(path: P, max_num_classes: u32) -> Result<Self, LabelMapError> {
    let path = path.as_ref();
    info!("加载标签映射: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    let index = Self::parse(&text, max_num_classes)?;
    info!("共加载 {} 个类别", index.len());
    Ok(index)
  }

  pub fn parse(text: &str, max_num_classes: u32) -> Result<Self, LabelMapError> {
    let items = if text.trim_start().starts_with('{') {
      parse_json(text)?
    } else {
      parse_pbtxt(text)?
    };

    let mut categories = BTreeMap::new();
    for (id, name) in items {
      if id < 0 {
        return Err(LabelMapError::InvalidId(id));
      }
      if id == 0 || id > max_num_classes as i64 {
        warn!("忽略类别 {} ({}): 超出标签范围", id, name);
        continue;
      }
      let id = id as u32;
      if categories.contains_key(&id) {
        debug!("类别 {} 重复定义, 保留第一次出现的名称", id);
        continue;
      }
      categories.insert(id, Category { id, name });
    }

    Ok(CategoryIndex { categories })
  }

  pub fn len(&self) -> usize {
    self.categories.len()
  }

  pub fn is_empty(&self) -> bool {
    self.categories.is_empty()
  }

  pub fn get(&self, id: u32) -> Option<&Category> {
    self.categories.get(&id)
  }

  /// 类别名称，未知类别返回 `N/A`
  pub fn label(&self, id: u32) -> &str {
    self
      .categories
      .get(&id)
      .map(|c| c.name.as_str())
      .unwrap_or(UNKNOWN_LABEL)
  }
}

fn parse_json(text: &str) -> Result<Vec<(i64, String)>, LabelMapError> {
  let map: BTreeMap<String, i64> = serde_json::from_str(text)?;
  let mut items: Vec<(i64, String)> = map.into_iter().map(|(name, id)| (id, name)).collect();
  items.sort_by_key(|(id, _)| *id);
  Ok(items)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
  Word(String),
  Str(String),
  Colon,
  Open,
  Close,
}

fn tokenize(text: &str) -> Result<Vec<(usize, Token)>, LabelMapError> {
  let mut tokens = Vec::new();

  for (lineno, line) in text.lines().enumerate() {
    let line_no = lineno + 1;
    let mut chars = line.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
      match c {
        '#' => break,
        c if c.is_whitespace() || c == ',' || c == ';' => {}
        ':' => tokens.push((line_no, Token::Colon)),
        '{' => tokens.push((line_no, Token::Open)),
        '}' => tokens.push((line_no, Token::Close)),
        '\'' | '"' => {
          let quote = c;
          let mut value = String::new();
          let mut closed = false;
          while let Some((_, c)) = chars.next() {
            match c {
              '\\' => {
                if let Some((_, escaped)) = chars.next() {
                  value.push(escaped);
                }
              }
              c if c == quote => {
                closed = true;
                break;
              }
              c => value.push(c),
            }
          }
          if !closed {
            return Err(LabelMapError::Syntax {
              line: line_no,
              message: "字符串未闭合".to_string(),
            });
          }
          tokens.push((line_no, Token::Str(value)));
        }
        _ => {
          let mut end = start + c.len_utf8();
          while let Some(&(i, c)) = chars.peek() {
            if c.is_whitespace() || matches!(c, ':' | '{' | '}' | '#' | ',' | ';' | '\'' | '"') {
              break;
            }
            end = i + c.len_utf8();
            chars.next();
          }
          tokens.push((line_no, Token::Word(line[start..end].to_string())));
        }
      }
    }
  }

  Ok(tokens)
}

#[derive(Default)]
struct PendingItem {
  id: Option<i64>,
  name: Option<String>,
  display_name: Option<String>,
}

fn syntax(line: usize, message: impl Into<String>) -> LabelMapError {
  LabelMapError::Syntax {
    line,
    message: message.into(),
  }
}

fn parse_pbtxt(text: &str) -> Result<Vec<(i64, String)>, LabelMapError> {
  let tokens = tokenize(text)?;
  let mut iter = tokens.into_iter().peekable();
  let mut items = Vec::new();

  while let Some((line, token)) = iter.next() {
    match token {
      Token::Word(word) if word == "item" => {
        if matches!(iter.peek(), Some((_, Token::Colon))) {
          iter.next();
        }
        match iter.next() {
          Some((_, Token::Open)) => {}
          _ => return Err(syntax(line, "item 之后应为 '{'")),
        }
        let item = parse_item(&mut iter, line)?;
        let name = item
          .display_name
          .or(item.name)
          .unwrap_or_else(|| item.id.map(|id| format!("category_{id}")).unwrap_or_default());
        let id = item.id.ok_or_else(|| LabelMapError::MissingId(name.clone()))?;
        items.push((id, name));
      }
      _ => return Err(syntax(line, "顶层只允许 item 块")),
    }
  }

  Ok(items)
}

fn parse_item<I>(iter: &mut std::iter::Peekable<I>, open_line: usize) -> Result<PendingItem, LabelMapError>
where
  I: Iterator<Item = (usize, Token)>,
{
  let mut item = PendingItem::default();

  loop {
    let (line, token) = iter
      .next()
      .ok_or_else(|| syntax(open_line, "item 块未闭合"))?;
    let key = match token {
      Token::Close => return Ok(item),
      Token::Word(key) => key,
      _ => return Err(syntax(line, "应为字段名")),
    };

    if matches!(iter.peek(), Some((_, Token::Colon))) {
      iter.next();
    }

    match iter.next() {
      Some((_, Token::Open)) => skip_block(iter, line)?,
      Some((line, Token::Word(value))) => match key.as_str() {
        "id" => {
          let id = value
            .parse::<i64>()
            .map_err(|_| syntax(line, format!("id 不是整数: {value}")))?;
          item.id = Some(id);
        }
        "name" => item.name = Some(value),
        "display_name" => item.display_name = Some(value),
        _ => {}
      },
      Some((_, Token::Str(value))) => match key.as_str() {
        "name" => item.name = Some(value),
        "display_name" => item.display_name = Some(value),
        _ => {}
      },
      _ => return Err(syntax(line, format!("字段 {key} 缺少值"))),
    }
  }
}

fn skip_block<I>(iter: &mut I, open_line: usize) -> Result<(), LabelMapError>
where
  I: Iterator<Item = (usize, Token)>,
{
  let mut depth = 1usize;
  for (_, token) in iter.by_ref() {
    match token {
      Token::Open => depth += 1,
      Token::Close => {
        depth -= 1;
        if depth == 0 {
          return Ok(());
        }
      }
      _ => {}
    }
  }
  Err(syntax(open_line, "嵌套块未闭合"))
}
