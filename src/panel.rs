// 该文件是 Shibie （识别） 项目的一部分。
// src/panel.rs - 预览面板
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

//! 面板坐标系以窗口高度为 900 个单位，预览纹理与文字都在该坐标系中布局，
//! 再按 `窗口高度 / 900` 缩放到像素。

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage, imageops};
use imageproc::drawing::{draw_text_mut, text_size};
use thiserror::Error;
use tracing::{info, warn};

use crate::frame::RgbaFrame;

pub const PANEL_HEIGHT: f32 = 900.0;
pub const INFO_FONT_SIZE: f32 = 24.0;
const TEXT_MARGIN: f32 = 16.0;
const BACKGROUND: Rgb<u8> = Rgb([24, 24, 28]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Error, Debug)]
pub enum PanelError {
  #[error("无法读取字体文件 '{path}': {source}")]
  FontRead {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("字体文件 '{0}' 无效")]
  InvalidFont(String),
}

/// 预览正方形边长（面板单位）：`min(floor(900 × W / H), 900)`
pub fn preview_side(width: u32, height: u32) -> f32 {
  if height == 0 {
    return 0.0;
  }
  (PANEL_HEIGHT * width as f32 / height as f32)
    .floor()
    .min(PANEL_HEIGHT)
}

/// 面板单位到像素的比例
pub fn panel_scale(height: u32) -> f32 {
  height as f32 / PANEL_HEIGHT
}

pub struct Panel {
  font: Option<FontArc>,
  title: String,
  info: String,
  canvas: RgbImage,
}

impl Panel {
  pub fn new(font: Option<FontArc>, title: impl Into<String>) -> Self {
    Self {
      font,
      title: title.into(),
      info: String::new(),
      canvas: RgbImage::new(0, 0),
    }
  }

  /// 加载字体；文件不存在时面板只显示预览
  pub fn load(font_path: &Path, title: impl Into<String>) -> Result<Self, PanelError> {
    let font = match std::fs::read(font_path) {
      Ok(data) => Some(
        FontArc::try_from_vec(data)
          .map_err(|_| PanelError::InvalidFont(font_path.display().to_string()))?,
      ),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        warn!("字体文件 {} 不存在，信息文本将输出到日志", font_path.display());
        None
      }
      Err(source) => {
        return Err(PanelError::FontRead {
          path: font_path.display().to_string(),
          source,
        });
      }
    };
    Ok(Self::new(font, title))
  }

  pub fn has_font(&self) -> bool {
    self.font.is_some()
  }

  pub fn info(&self) -> &str {
    &self.info
  }

  pub fn set_info(&mut self, info: &str) {
    if self.info == info {
      return;
    }
    self.info = info.to_string();
    if self.font.is_none() {
      info!("{}", info.trim_start());
    }
  }

  pub fn canvas(&self) -> &RgbImage {
    &self.canvas
  }

  /// 按窗口尺寸合成一帧：背景、居中的预览纹理、左上角的信息文本
  pub fn render<const W: u32, const H: u32>(
    &mut self,
    width: u32,
    height: u32,
    texture: &RgbaFrame<W, H>,
  ) -> &RgbImage {
    if self.canvas.dimensions() != (width, height) {
      self.canvas = RgbImage::new(width, height);
    }
    for pixel in self.canvas.pixels_mut() {
      *pixel = BACKGROUND;
    }
    if width == 0 || height == 0 {
      return &self.canvas;
    }

    let scale = panel_scale(height);
    let side = ((preview_side(width, height) * scale).round() as u32).min(width.min(height));
    if side > 0 {
      let preview = imageops::resize(
        &texture.to_rgb_image(),
        side,
        side,
        imageops::FilterType::Triangle,
      );
      let x = i64::from((width - side) / 2);
      let y = i64::from((height - side) / 2);
      imageops::overlay(&mut self.canvas, &preview, x, y);
    }

    self.draw_text(scale);
    &self.canvas
  }

  fn draw_text(&mut self, scale: f32) {
    let Some(font) = &self.font else {
      return;
    };
    let px = PxScale::from(INFO_FONT_SIZE * scale);
    let margin = (TEXT_MARGIN * scale).round() as i32;
    let line_height = (INFO_FONT_SIZE * scale * 1.25).round() as i32;

    let text = format!("{}{}", self.title, self.info);
    let lines: Vec<&str> = text.split('\n').collect();
    let box_width = lines
      .iter()
      .map(|line| text_size(px, font, line).0)
      .max()
      .unwrap_or(0) as i32
      + margin * 2;
    let box_height = line_height * lines.len() as i32 + margin;

    // 半透明底色
    let (cw, ch) = self.canvas.dimensions();
    for y in 0..(box_height.max(0) as u32).min(ch) {
      for x in 0..(box_width.max(0) as u32).min(cw) {
        let pixel = self.canvas.get_pixel_mut(x, y);
        pixel.0 = pixel.0.map(|c| c / 2);
      }
    }

    for (i, line) in lines.iter().enumerate() {
      draw_text_mut(
        &mut self.canvas,
        TEXT_COLOR,
        margin,
        margin / 2 + line_height * i as i32,
        px,
        font,
        line,
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;
  use tempfile::NamedTempFile;

  fn red_texture() -> RgbaFrame<4, 4> {
    let mut texture = RgbaFrame::<4, 4>::default();
    for pixel in texture.as_mut().chunks_exact_mut(4) {
      pixel.copy_from_slice(&[200, 10, 10, 255]);
    }
    texture
  }

  #[test]
  fn preview_side_is_limited_by_height() {
    assert_eq!(preview_side(1600, 900), 900.0);
    assert_eq!(preview_side(600, 900), 600.0);
    assert_eq!(preview_side(1000, 1000), 900.0);
    assert_eq!(preview_side(1001, 1500), 600.0);
    assert_eq!(preview_side(100, 0), 0.0);
  }

  #[test]
  fn preview_is_centered_in_canvas() {
    let mut panel = Panel::new(None, "shibie");
    let canvas = panel.render(160, 90, &red_texture());
    assert_eq!(canvas.dimensions(), (160, 90));
    assert_eq!(canvas.get_pixel(80, 45).0, [200, 10, 10]);
    // 预览两侧保留背景
    assert_eq!(*canvas.get_pixel(2, 45), BACKGROUND);
    assert_eq!(*canvas.get_pixel(157, 45), BACKGROUND);
  }

  #[test]
  fn narrow_window_shrinks_preview() {
    let mut panel = Panel::new(None, "shibie");
    let canvas = panel.render(60, 90, &red_texture());
    // 边长 = floor(900 × 60 / 90) × 90 / 900 = 60
    assert_eq!(canvas.get_pixel(0, 45).0, [200, 10, 10]);
    assert_eq!(*canvas.get_pixel(30, 2), BACKGROUND);
  }

  #[test]
  fn zero_sized_window_is_ignored() {
    let mut panel = Panel::new(None, "shibie");
    assert_eq!(panel.render(0, 0, &red_texture()).dimensions(), (0, 0));
  }

  #[test]
  fn missing_font_is_optional() {
    let panel = Panel::load(Path::new("/nonexistent/font.ttf"), "shibie").unwrap();
    assert!(!panel.has_font());
  }

  #[test]
  fn invalid_font_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"not a font").unwrap();
    assert!(matches!(
      Panel::load(file.path(), "shibie"),
      Err(PanelError::InvalidFont(_))
    ));
  }

  #[test]
  fn set_info_keeps_latest_text() {
    let mut panel = Panel::new(None, "shibie");
    panel.set_info("\ncat (3.0)");
    assert_eq!(panel.info(), "\ncat (3.0)");
  }
}
