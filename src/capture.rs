// 该文件是 Shibie （识别） 项目的一部分。
// src/capture.rs - 摄像头/图像采集源
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

use std::str::FromStr;

use thiserror::Error;
use tracing::info;

use crate::{FromUrl, frame::YuvFrame};

mod v4l_capture;
pub use self::v4l_capture::{V4lCapture, V4lCaptureError};

#[cfg(feature = "read_image_file")]
mod image_capture;
#[cfg(feature = "read_image_file")]
pub use self::image_capture::{ImageCapture, ImageCaptureError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_capture;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_capture::{
  GStreamerCapture, GStreamerCaptureError, GStreamerCapturePipelineBuilder,
};

#[derive(Error, Debug)]
pub enum CaptureError {
  #[error("V4L 采集错误: {0}")]
  V4lError(#[from] V4lCaptureError),
  #[cfg(feature = "read_image_file")]
  #[error("图像采集错误: {0}")]
  ImageError(#[from] ImageCaptureError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer 采集错误: {0}")]
  GStreamerError(#[from] GStreamerCaptureError),
  #[error("无效的查询参数 {key}={value}")]
  InvalidQuery { key: String, value: String },
  #[error("未知的翻转方式: {0}")]
  UnknownFlip(String),
  #[error("URI scheme 不匹配: {0}")]
  SchemeMismatch(String),
}

/// 图像翻转方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flip {
  None,
  Horizontal,
  #[default]
  Vertical,
  Both,
}

impl Flip {
  /// (水平, 垂直)
  pub fn axes(self) -> (bool, bool) {
    match self {
      Flip::None => (false, false),
      Flip::Horizontal => (true, false),
      Flip::Vertical => (false, true),
      Flip::Both => (true, true),
    }
  }
}

impl FromStr for Flip {
  type Err = CaptureError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "none" | "0" => Ok(Flip::None),
      "horizontal" | "h" => Ok(Flip::Horizontal),
      "vertical" | "v" => Ok(Flip::Vertical),
      "both" | "180" => Ok(Flip::Both),
      _ => Err(CaptureError::UnknownFlip(s.to_string())),
    }
  }
}

/// 采集参数，URL 查询参数可以覆盖
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
  pub width: u32,
  pub height: u32,
  pub fps: u32,
  pub flip: Flip,
}

impl Default for CaptureSettings {
  fn default() -> Self {
    Self {
      width: 1280,
      height: 720,
      fps: 30,
      flip: Flip::Vertical,
    }
  }
}

impl CaptureSettings {
  /// 应用 `width`、`height`、`fps`、`flip` 查询参数
  pub fn apply_query(&mut self, url: &url::Url) -> Result<(), CaptureError> {
    for (key, value) in url.query_pairs() {
      let invalid = || CaptureError::InvalidQuery {
        key: key.to_string(),
        value: value.to_string(),
      };
      match key.as_ref() {
        "width" => self.width = value.parse().map_err(|_| invalid())?,
        "height" => self.height = value.parse().map_err(|_| invalid())?,
        "fps" => self.fps = value.parse().map_err(|_| invalid())?,
        "flip" => self.flip = value.parse()?,
        _ => {}
      }
    }
    Ok(())
  }
}

/// 预览模式的采集源
///
/// `update_preview` 不阻塞：有新帧时写入 `frame` 并返回 `true`，
/// 否则保持 `frame` 不变并返回 `false`。
pub trait CaptureSource {
  fn type_name(&self) -> &'static str;
  fn name(&self) -> &str;
  fn width(&self) -> u32;
  fn height(&self) -> u32;
  fn begin_preview(&mut self) -> Result<(), CaptureError>;
  fn update_preview(&mut self, frame: &mut YuvFrame) -> Result<bool, CaptureError>;
  fn end_preview(&mut self) -> Result<(), CaptureError>;
}

pub enum CaptureWrapper {
  V4l(V4lCapture),
  #[cfg(feature = "read_image_file")]
  Image(ImageCapture),
  #[cfg(feature = "gstreamer_input")]
  GStreamer(GStreamerCapture),
}

impl CaptureWrapper {
  pub fn open(url: &url::Url, settings: &CaptureSettings) -> Result<Self, CaptureError> {
    use crate::FromUrlWithScheme;

    let capture = if url.scheme() == V4lCapture::SCHEME {
      let mut settings = settings.clone();
      settings.apply_query(url)?;
      CaptureWrapper::V4l(V4lCapture::open(url, &settings)?)
    } else {
      Self::open_feature(url, settings)?
    };

    info!(
      "{} {} ({}x{})",
      capture.type_name(),
      capture.name(),
      capture.width(),
      capture.height()
    );
    Ok(capture)
  }

  #[allow(unused_variables)]
  fn open_feature(url: &url::Url, settings: &CaptureSettings) -> Result<Self, CaptureError> {
    #[cfg(feature = "gstreamer_input")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == GStreamerCapturePipelineBuilder::SCHEME {
        let mut settings = settings.clone();
        settings.apply_query(url)?;
        let capture = GStreamerCapturePipelineBuilder::from_url(url)?
          .settings(&settings)
          .build()?;
        return Ok(CaptureWrapper::GStreamer(capture));
      }
    }
    #[cfg(feature = "read_image_file")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ImageCapture::SCHEME {
        // 静态图像默认不翻转
        let mut settings = CaptureSettings {
          flip: Flip::None,
          ..settings.clone()
        };
        settings.apply_query(url)?;
        return Ok(CaptureWrapper::Image(ImageCapture::open(url, &settings)?));
      }
    }
    Err(CaptureError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl FromUrl for CaptureWrapper {
  type Error = CaptureError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    Self::open(url, &CaptureSettings::default())
  }
}

macro_rules! dispatch {
  ($self:ident, $capture:ident => $body:expr) => {
    match $self {
      CaptureWrapper::V4l($capture) => $body,
      #[cfg(feature = "read_image_file")]
      CaptureWrapper::Image($capture) => $body,
      #[cfg(feature = "gstreamer_input")]
      CaptureWrapper::GStreamer($capture) => $body,
    }
  };
}

impl CaptureSource for CaptureWrapper {
  fn type_name(&self) -> &'static str {
    dispatch!(self, capture => capture.type_name())
  }

  fn name(&self) -> &str {
    dispatch!(self, capture => capture.name())
  }

  fn width(&self) -> u32 {
    dispatch!(self, capture => capture.width())
  }

  fn height(&self) -> u32 {
    dispatch!(self, capture => capture.height())
  }

  fn begin_preview(&mut self) -> Result<(), CaptureError> {
    dispatch!(self, capture => capture.begin_preview())
  }

  fn update_preview(&mut self, frame: &mut YuvFrame) -> Result<bool, CaptureError> {
    dispatch!(self, capture => capture.update_preview(frame))
  }

  fn end_preview(&mut self) -> Result<(), CaptureError> {
    dispatch!(self, capture => capture.end_preview())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  #[test]
  fn default_settings_flip_vertically() {
    let settings = CaptureSettings::default();
    assert_eq!((settings.width, settings.height, settings.fps), (1280, 720, 30));
    assert_eq!(settings.flip.axes(), (false, true));
  }

  #[test]
  fn query_overrides_settings() {
    let url = Url::parse("v4l:///dev/video2?width=640&height=480&fps=15&flip=none").unwrap();
    let mut settings = CaptureSettings::default();
    settings.apply_query(&url).unwrap();
    assert_eq!(
      settings,
      CaptureSettings {
        width: 640,
        height: 480,
        fps: 15,
        flip: Flip::None,
      }
    );
  }

  #[test]
  fn bad_query_is_rejected() {
    let url = Url::parse("v4l:///dev/video0?width=wide").unwrap();
    let result = CaptureSettings::default().apply_query(&url);
    assert!(matches!(result, Err(CaptureError::InvalidQuery { .. })));

    let url = Url::parse("v4l:///dev/video0?flip=diagonal").unwrap();
    let result = CaptureSettings::default().apply_query(&url);
    assert!(matches!(result, Err(CaptureError::UnknownFlip(_))));
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    let url = Url::parse("rtmp://example.com/live").unwrap();
    let result = CaptureWrapper::open(&url, &CaptureSettings::default());
    assert!(matches!(result, Err(CaptureError::SchemeMismatch(s)) if s == "rtmp"));
  }
}
