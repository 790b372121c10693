// 该文件是 Shibie （识别） 项目的一部分。
// src/frame.rs - 亮度/色度帧与 RGBA 纹理定义
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

use image::{ImageBuffer, Rgb, RgbImage};
use thiserror::Error;

const RGBA_CHANNELS: usize = 4;
const CHROMA_CHANNELS: usize = 2;
const CHROMA_NEUTRAL: u8 = 128;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("{plane} 平面长度不匹配: 期望长度 {expected}, 实际长度 {actual}")]
  PlaneSizeMismatch {
    plane: &'static str,
    expected: usize,
    actual: usize,
  },
}

/// 摄像头原生分辨率的亮度/色度帧
///
/// 亮度平面为 `width × height` 字节，色度平面为 `(width/2) × (height/2)`
/// 个交错的 UV 字节对（与 NV12 的第二个平面一致）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YuvFrame {
  width: u32,
  height: u32,
  luma: Box<[u8]>,
  chroma: Box<[u8]>,
}

impl Default for YuvFrame {
  fn default() -> Self {
    Self::new(0, 0)
  }
}

impl YuvFrame {
  /// 创建黑色帧
  pub fn new(width: u32, height: u32) -> Self {
    let luma = vec![0u8; width as usize * height as usize].into_boxed_slice();
    let chroma_len = (width / 2) as usize * (height / 2) as usize * CHROMA_CHANNELS;
    let chroma = vec![CHROMA_NEUTRAL; chroma_len].into_boxed_slice();
    Self {
      width,
      height,
      luma,
      chroma,
    }
  }

  pub fn from_planes(
    width: u32,
    height: u32,
    luma: Vec<u8>,
    chroma: Vec<u8>,
  ) -> Result<Self, FrameError> {
    let luma_len = width as usize * height as usize;
    if luma.len() != luma_len {
      return Err(FrameError::PlaneSizeMismatch {
        plane: "luma",
        expected: luma_len,
        actual: luma.len(),
      });
    }
    let chroma_len = (width / 2) as usize * (height / 2) as usize * CHROMA_CHANNELS;
    if chroma.len() != chroma_len {
      return Err(FrameError::PlaneSizeMismatch {
        plane: "chroma",
        expected: chroma_len,
        actual: chroma.len(),
      });
    }

    Ok(Self {
      width,
      height,
      luma: luma.into_boxed_slice(),
      chroma: chroma.into_boxed_slice(),
    })
  }

  /// 将 RGB 图像转换为亮度/色度帧（BT.601 全范围，色度按 2×2 平均）
  pub fn from_rgb_image(image: &RgbImage) -> Self {
    let (width, height) = image.dimensions();
    let mut frame = Self::new(width, height);
    let w = width as usize;

    for (x, y, pixel) in image.enumerate_pixels() {
      let [r, g, b] = pixel.0.map(f32::from);
      let luma = 0.299 * r + 0.587 * g + 0.114 * b;
      frame.luma[y as usize * w + x as usize] = luma.round().clamp(0.0, 255.0) as u8;
    }

    let (cw, ch) = (frame.chroma_width() as usize, frame.chroma_height() as usize);
    for cy in 0..ch {
      for cx in 0..cw {
        let (mut u, mut v) = (0.0f32, 0.0f32);
        for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
          let [r, g, b] = image
            .get_pixel((cx * 2 + dx) as u32, (cy * 2 + dy) as u32)
            .0
            .map(f32::from);
          u += -0.168_736 * r - 0.331_264 * g + 0.5 * b;
          v += 0.5 * r - 0.418_688 * g - 0.081_312 * b;
        }
        let idx = (cy * cw + cx) * CHROMA_CHANNELS;
        frame.chroma[idx] = (u / 4.0 + 128.0).round().clamp(0.0, 255.0) as u8;
        frame.chroma[idx + 1] = (v / 4.0 + 128.0).round().clamp(0.0, 255.0) as u8;
      }
    }

    frame
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn chroma_width(&self) -> u32 {
    self.width / 2
  }

  pub fn chroma_height(&self) -> u32 {
    self.height / 2
  }

  pub fn is_empty(&self) -> bool {
    self.width == 0 || self.height == 0
  }

  pub fn luma(&self) -> &[u8] {
    &self.luma
  }

  pub fn chroma(&self) -> &[u8] {
    &self.chroma
  }

  pub fn luma_mut(&mut self) -> &mut [u8] {
    &mut self.luma
  }

  pub fn chroma_mut(&mut self) -> &mut [u8] {
    &mut self.chroma
  }

  /// 原地翻转两个平面
  ///
  /// 亮度平面只翻转与色度对齐的 `2 × (w/2)` 列、`2 × (h/2)` 行，
  /// 奇数尺寸时最后一行（列）保持原位。
  pub fn flip(&mut self, horizontal: bool, vertical: bool) {
    let (cw, ch) = (self.chroma_width() as usize, self.chroma_height() as usize);
    let luma = PlaneSpan {
      stride: self.width as usize,
      rows: ch * 2,
      cols: cw * 2,
      channels: 1,
    };
    let chroma = PlaneSpan {
      stride: cw * CHROMA_CHANNELS,
      rows: ch,
      cols: cw,
      channels: CHROMA_CHANNELS,
    };
    luma.flip(&mut self.luma, horizontal, vertical);
    chroma.flip(&mut self.chroma, horizontal, vertical);
  }
}

/// 平面中参与翻转的区域
struct PlaneSpan {
  stride: usize,
  rows: usize,
  cols: usize,
  channels: usize,
}

impl PlaneSpan {
  fn flip(&self, plane: &mut [u8], horizontal: bool, vertical: bool) {
    let Self {
      stride,
      rows,
      cols,
      channels,
    } = *self;
    if stride == 0 {
      return;
    }
    if vertical {
      for y in 0..rows / 2 {
        let (top, bottom) = plane.split_at_mut((rows - 1 - y) * stride);
        top[y * stride..(y + 1) * stride].swap_with_slice(&mut bottom[..stride]);
      }
    }
    if horizontal {
      for row in plane.chunks_exact_mut(stride) {
        for x in 0..cols / 2 {
          for c in 0..channels {
            row.swap(x * channels + c, (cols - 1 - x) * channels + c);
          }
        }
      }
    }
  }
}

/// 固定尺寸的 RGBA8 纹理（模型输入分辨率）
#[derive(Debug, Clone)]
pub struct RgbaFrame<const W: u32, const H: u32> {
  data: Box<[u8]>,
}

impl<const W: u32, const H: u32> TryFrom<Vec<u8>> for RgbaFrame<W, H> {
  type Error = FrameError;

  fn try_from(data: Vec<u8>) -> Result<Self, Self::Error> {
    let expected = RGBA_CHANNELS * W as usize * H as usize;
    if data.len() != expected {
      return Err(FrameError::PlaneSizeMismatch {
        plane: "rgba",
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      data: data.into_boxed_slice(),
    })
  }
}

impl<const W: u32, const H: u32> Default for RgbaFrame<W, H> {
  fn default() -> Self {
    let size = RGBA_CHANNELS * (W as usize) * (H as usize);
    let data = vec![0u8; size].into_boxed_slice();
    Self { data }
  }
}

impl<const W: u32, const H: u32> RgbaFrame<W, H> {
  pub fn height(&self) -> usize {
    H as usize
  }

  pub fn width(&self) -> usize {
    W as usize
  }

  pub fn channels(&self) -> usize {
    RGBA_CHANNELS
  }

  pub fn as_rgba(&self) -> &[u8] {
    &self.data
  }

  pub fn pixel(&self, x: usize, y: usize) -> [u8; 4] {
    let idx = (y * W as usize + x) * RGBA_CHANNELS;
    [
      self.data[idx],
      self.data[idx + 1],
      self.data[idx + 2],
      self.data[idx + 3],
    ]
  }

  pub fn to_rgb_image(&self) -> RgbImage {
    ImageBuffer::from_fn(W, H, |x, y| {
      let [r, g, b, _] = self.pixel(x as usize, y as usize);
      Rgb([r, g, b])
    })
  }
}

impl<const W: u32, const H: u32> AsMut<[u8]> for RgbaFrame<W, H> {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}
