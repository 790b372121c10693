// 该文件是 Shibie （识别） 项目的一部分。
// src/capture/image_capture.rs - 静态图像采集
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

use image::ImageReader;
use thiserror::Error;
use tracing::error;
use url::Url;

use super::{CaptureError, CaptureSettings, CaptureSource, Flip};
use crate::{FromUrl, FromUrlWithScheme, decode_url_path, frame::YuvFrame};

#[derive(Error, Debug)]
pub enum ImageCaptureError {
  #[error("URI scheme 不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("图像过小: {0}x{1}")]
  TooSmall(u32, u32),
}

/// 把一张图片当作只产生一帧的采集源
pub struct ImageCapture {
  path: String,
  frame: YuvFrame,
  delivered: bool,
}

impl FromUrl for ImageCapture {
  type Error = ImageCaptureError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let settings = CaptureSettings {
      flip: Flip::None,
      ..CaptureSettings::default()
    };
    Self::open(url, &settings)
  }
}

impl FromUrlWithScheme for ImageCapture {
  const SCHEME: &'static str = "image";
}

impl ImageCapture {
  pub fn open(url: &Url, settings: &CaptureSettings) -> Result<Self, ImageCaptureError> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme 不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageCaptureError::SchemeMismatch);
    }

    let path = decode_url_path(url);
    let image = ImageReader::open(&path)?.decode()?.to_rgb8();
    if image.width() < 2 || image.height() < 2 {
      return Err(ImageCaptureError::TooSmall(image.width(), image.height()));
    }

    let mut frame = YuvFrame::from_rgb_image(&image);
    let (horizontal, vertical) = settings.flip.axes();
    frame.flip(horizontal, vertical);

    Ok(Self {
      path,
      frame,
      delivered: false,
    })
  }
}

impl CaptureSource for ImageCapture {
  fn type_name(&self) -> &'static str {
    "Image"
  }

  fn name(&self) -> &str {
    &self.path
  }

  fn width(&self) -> u32 {
    self.frame.width()
  }

  fn height(&self) -> u32 {
    self.frame.height()
  }

  fn begin_preview(&mut self) -> Result<(), CaptureError> {
    self.delivered = false;
    Ok(())
  }

  fn update_preview(&mut self, frame: &mut YuvFrame) -> Result<bool, CaptureError> {
    if self.delivered {
      return Ok(false);
    }
    frame.clone_from(&self.frame);
    self.delivered = true;
    Ok(true)
  }

  fn end_preview(&mut self) -> Result<(), CaptureError> {
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};
  use tempfile::TempDir;

  fn write_image(dir: &TempDir, name: &str) -> Url {
    let path = dir.path().join(name);
    let image = RgbImage::from_fn(8, 4, |_, y| {
      if y == 0 {
        Rgb([255, 255, 255])
      } else {
        Rgb([0, 0, 0])
      }
    });
    image.save(&path).unwrap();
    Url::parse(&format!("image://{}", path.display())).unwrap()
  }

  #[test]
  fn first_poll_delivers_then_stays_idle() {
    let dir = TempDir::new().unwrap();
    let url = write_image(&dir, "still.png");
    let mut capture = ImageCapture::from_url(&url).unwrap();
    assert_eq!((capture.width(), capture.height()), (8, 4));

    let mut frame = YuvFrame::default();
    capture.begin_preview().unwrap();
    assert!(capture.update_preview(&mut frame).unwrap());
    assert_eq!(frame.width(), 8);
    assert!(!capture.update_preview(&mut frame).unwrap());
    capture.end_preview().unwrap();

    // 重新开始预览会再交付一次
    capture.begin_preview().unwrap();
    assert!(capture.update_preview(&mut frame).unwrap());
  }

  #[test]
  fn flip_query_is_applied() {
    let dir = TempDir::new().unwrap();
    let url = write_image(&dir, "flip.png");

    let plain = ImageCapture::from_url(&url).unwrap();
    assert_eq!(plain.frame.luma()[0], 255);

    let mut settings = CaptureSettings {
      flip: Flip::None,
      ..CaptureSettings::default()
    };
    settings.apply_query(&Url::parse(&format!("{}?flip=vertical", url)).unwrap()).unwrap();
    let flipped = ImageCapture::open(&url, &settings).unwrap();
    assert_eq!(flipped.frame.luma()[0], 0);
    assert_eq!(flipped.frame.luma()[3 * 8], 255);
  }

  #[test]
  fn missing_file_is_reported() {
    let url = Url::parse("image:///nonexistent/cat.png").unwrap();
    assert!(matches!(
      ImageCapture::from_url(&url),
      Err(ImageCaptureError::IoError(_))
    ));
  }
}
