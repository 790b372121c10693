// 该文件是 Shibie （识别） 项目的一部分。
// src/display.rs - 预览窗口
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

use image::RgbImage;
use minifb::{Key, Window, WindowOptions};
use thiserror::Error;
use tracing::info;

const TARGET_FPS: usize = 60;

#[derive(Error, Debug)]
pub enum DisplayError {
  #[error("窗口错误: {0}")]
  WindowError(#[from] minifb::Error),
}

pub struct PreviewWindow {
  window: Window,
  buffer: Vec<u32>,
}

/// RGB8 → minifb 的 0RGB 像素
fn pack_rgb(image: &RgbImage, buffer: &mut Vec<u32>) {
  buffer.clear();
  buffer.extend(
    image
      .pixels()
      .map(|p| (u32::from(p[0]) << 16) | (u32::from(p[1]) << 8) | u32::from(p[2])),
  );
}

impl PreviewWindow {
  pub fn open(title: &str, width: usize, height: usize) -> Result<Self, DisplayError> {
    let mut window = Window::new(
      title,
      width,
      height,
      WindowOptions {
        resize: true,
        ..WindowOptions::default()
      },
    )?;
    window.set_target_fps(TARGET_FPS);
    info!("打开窗口 {} ({}x{})", title, width, height);
    Ok(Self {
      window,
      buffer: Vec::with_capacity(width * height),
    })
  }

  /// 窗口关闭或按下 Escape 后返回 false
  pub fn is_running(&self) -> bool {
    self.window.is_open() && !self.window.is_key_down(Key::Escape)
  }

  pub fn size(&self) -> (u32, u32) {
    let (width, height) = self.window.get_size();
    (width as u32, height as u32)
  }

  pub fn present(&mut self, canvas: &RgbImage) -> Result<(), DisplayError> {
    if canvas.width() == 0 || canvas.height() == 0 {
      self.window.update();
      return Ok(());
    }
    pack_rgb(canvas, &mut self.buffer);
    self.window.update_with_buffer(
      &self.buffer,
      canvas.width() as usize,
      canvas.height() as usize,
    )?;
    Ok(())
  }
}
