// 该文件是 Shibie （识别） 项目的一部分。
// src/labels.rs - 类别标签表
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

use std::{borrow::Cow, path::Path};

use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("无法读取类别文件 '{path}': {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("类别文件 '{0}' 为空")]
  Empty(String),
}

/// 与模型输出顺序一一对应的类别名称表，加载后不可变
#[derive(Debug, Clone, Default)]
pub struct ClassLabels {
  names: Box<[String]>,
}

impl ClassLabels {
  /// 从文本文件加载，每行一个类别
  pub fn load(path: &Path) -> Result<Self, LabelError> {
    let content = std::fs::read_to_string(path).map_err(|source| LabelError::Read {
      path: path.display().to_string(),
      source,
    })?;
    let labels = Self::from_lines(&content);
    if labels.is_empty() {
      return Err(LabelError::Empty(path.display().to_string()));
    }
    info!("{} 个类别", labels.len());
    Ok(labels)
  }

  pub fn from_lines(content: &str) -> Self {
    let names = content
      .lines()
      .map(|line| line.trim_end_matches('\r').to_string())
      .collect();
    Self { names }
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&str> {
    self.names.get(index).map(String::as_str)
  }

  /// 标签名称；越界时返回 `#<index>`
  pub fn name(&self, index: usize) -> Cow<'_, str> {
    match self.get(index) {
      Some(name) => Cow::Borrowed(name),
      None => Cow::Owned(format!("#{}", index)),
    }
  }
}

impl<S: Into<String>> FromIterator<S> for ClassLabels {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    Self {
      names: iter.into_iter().map(Into::into).collect(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;
  use tempfile::NamedTempFile;

  #[test]
  fn load_reads_one_label_per_line() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "tench, Tinca tinca\r\ngoldfish\ngreat white shark\n").unwrap();

    let labels = ClassLabels::load(file.path()).unwrap();
    assert_eq!(labels.len(), 3);
    assert_eq!(labels.get(0), Some("tench, Tinca tinca"));
    assert_eq!(labels.get(2), Some("great white shark"));
    assert_eq!(labels.get(3), None);
  }

  #[test]
  fn load_rejects_empty_file() {
    let file = NamedTempFile::new().unwrap();
    assert!(matches!(
      ClassLabels::load(file.path()),
      Err(LabelError::Empty(_))
    ));
  }

  #[test]
  fn load_reports_missing_file() {
    let result = ClassLabels::load(Path::new("/nonexistent/imagenet_classes.txt"));
    assert!(matches!(result, Err(LabelError::Read { .. })));
  }

  #[test]
  fn name_falls_back_to_index() {
    let labels: ClassLabels = ["cat", "dog"].into_iter().collect();
    assert_eq!(labels.name(1), "dog");
    assert_eq!(labels.name(7), "#7");
  }
}
