// 该文件是 Shibie （识别） 项目的一部分。
// src/output/directory_record.rs - 按日期目录记录识别结果
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
  path::{Path, PathBuf},
  sync::atomic::{AtomicU16, Ordering},
};

use chrono::{DateTime, Datelike, Local};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme, decode_url_path,
  frame::RgbaFrame,
  output::{Classification, Render},
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// `folder:///dir[?always]`
///
/// 默认只在信息文本更新时保存；带 `always` 时每帧都保存。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  frame_counter: AtomicU16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");
    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(decode_url_path(uri)),
      frame_counter: AtomicU16::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl AsRef<Path>, always: bool) -> Self {
    Self {
      directory: directory.as_ref().to_path_buf(),
      frame_counter: AtomicU16::new(0),
      always,
    }
  }

  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  /// `dir/YYYY/MM/DD/HH-MM-SS-XXXX.png`
  fn frame_path(&self, now: DateTime<Local>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl<'a, const W: u32, const H: u32> Render<RgbaFrame<W, H>, Classification<'a>>
  for DirectoryRecordOutput
{
  type Error = DirectoryRecordOutputError;

  fn render_result(
    &self,
    frame: &RgbaFrame<W, H>,
    result: &Classification<'a>,
  ) -> Result<(), Self::Error> {
    if !self.always && !result.updated {
      return Ok(());
    }

    let now = Local::now();
    let path = self.frame_path(now)?;
    frame.to_rgb_image().save(&path)?;

    let classes: Vec<_> = result
      .ranked
      .iter()
      .map(|class| {
        json!({
          "index": class.index,
          "label": class.label,
          "score": class.weight,
        })
      })
      .collect();
    let record = json!({
      "time": now.to_rfc3339(),
      "updated": result.updated,
      "classes": classes,
    });
    std::fs::write(
      path.with_extension("json"),
      serde_json::to_string_pretty(&record)?,
    )?;
    debug!("记录 {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ranking::RankedClass;
  use tempfile::TempDir;

  fn files_with_extension(dir: &Path, ext: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
      for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          stack.push(path);
        } else if path.extension().is_some_and(|e| e == ext) {
          found.push(path);
        }
      }
    }
    found
  }

  fn ranked() -> Vec<RankedClass> {
    vec![
      RankedClass {
        index: 285,
        label: "Egyptian cat".to_string(),
        weight: 4.5,
      },
      RankedClass {
        index: 281,
        label: "tabby, tabby cat".to_string(),
        weight: 9.0,
      },
    ]
  }

  #[test]
  fn saves_png_and_json_when_updated() {
    let dir = TempDir::new().unwrap();
    let output = DirectoryRecordOutput::new(dir.path(), false);
    let frame = RgbaFrame::<4, 4>::default();
    let ranked = ranked();

    output
      .render_result(&frame, &Classification {
        ranked: &ranked,
        updated: true,
      })
      .unwrap();

    let pngs = files_with_extension(dir.path(), "png");
    assert_eq!(pngs.len(), 1);
    assert!(pngs[0].file_name().unwrap().to_string_lossy().ends_with("-0001.png"));

    let jsons = files_with_extension(dir.path(), "json");
    let record: serde_json::Value =
      serde_json::from_str(&std::fs::read_to_string(&jsons[0]).unwrap()).unwrap();
    assert_eq!(record["classes"][1]["index"], 281);
    assert_eq!(record["classes"][0]["label"], "Egyptian cat");
    assert_eq!(record["updated"], true);
  }

  #[test]
  fn skips_unchanged_frames_unless_always() {
    let dir = TempDir::new().unwrap();
    let frame = RgbaFrame::<4, 4>::default();
    let unchanged = Classification {
      ranked: &[],
      updated: false,
    };

    DirectoryRecordOutput::new(dir.path(), false)
      .render_result(&frame, &unchanged)
      .unwrap();
    assert!(files_with_extension(dir.path(), "png").is_empty());

    DirectoryRecordOutput::new(dir.path(), true)
      .render_result(&frame, &unchanged)
      .unwrap();
    assert_eq!(files_with_extension(dir.path(), "png").len(), 1);
  }

  #[test]
  fn url_selects_directory_and_mode() {
    let url = url::Url::parse("folder:///var/lib/shibie/records?always").unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    assert_eq!(output.directory, PathBuf::from("/var/lib/shibie/records"));
    assert!(output.always);

    let url = url::Url::parse("file:///tmp").unwrap();
    assert!(matches!(
      DirectoryRecordOutput::from_url(&url),
      Err(DirectoryRecordOutputError::SchemeMismatch)
    ));
  }
}
