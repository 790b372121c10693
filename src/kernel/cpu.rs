// 该文件是 Shibie （识别） 项目的一部分。
// src/kernel/cpu.rs - CPU 颜色转换内核
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

use super::{ConvertKernel, CropRegion, KernelError, yuv_to_rgb};
use crate::frame::{RgbaFrame, YuvFrame};

/// 在 CPU 上执行与计算着色器相同的采样与转换
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuKernel;

/// 线性过滤、边缘钳制的单通道采样，返回 [0, 1]
fn sample_bilinear(
  plane: &[u8],
  width: usize,
  height: usize,
  channels: usize,
  channel: usize,
  u: f32,
  v: f32,
) -> f32 {
  let x = (u * width as f32 - 0.5).clamp(0.0, (width - 1) as f32);
  let y = (v * height as f32 - 0.5).clamp(0.0, (height - 1) as f32);
  let (x0, y0) = (x.floor() as usize, y.floor() as usize);
  let (x1, y1) = ((x0 + 1).min(width - 1), (y0 + 1).min(height - 1));
  let (fx, fy) = (x - x0 as f32, y - y0 as f32);

  let at = |px: usize, py: usize| f32::from(plane[(py * width + px) * channels + channel]);
  let top = at(x0, y0) * (1.0 - fx) + at(x1, y0) * fx;
  let bottom = at(x0, y1) * (1.0 - fx) + at(x1, y1) * fx;
  (top * (1.0 - fy) + bottom * fy) / 255.0
}

impl<const W: u32, const H: u32> ConvertKernel<W, H> for CpuKernel {
  fn name(&self) -> &'static str {
    "cpu"
  }

  fn dispatch(
    &mut self,
    frame: &YuvFrame,
    target: &mut RgbaFrame<W, H>,
  ) -> Result<(), KernelError> {
    if frame.is_empty() || frame.chroma_width() == 0 || frame.chroma_height() == 0 {
      return Err(KernelError::EmptyFrame);
    }

    let crop = CropRegion::center_square(frame.width(), frame.height());
    let (lw, lh) = (frame.width() as usize, frame.height() as usize);
    let (cw, ch) = (
      frame.chroma_width() as usize,
      frame.chroma_height() as usize,
    );
    let (luma, chroma) = (frame.luma(), frame.chroma());

    for (i, pixel) in target.as_mut().chunks_exact_mut(4).enumerate() {
      let (x, y) = (i as u32 % W, i as u32 / W);
      let [u, v] = crop.texcoord(x, y, W, H);
      let luma_value = sample_bilinear(luma, lw, lh, 1, 0, u, v);
      let cb = sample_bilinear(chroma, cw, ch, 2, 0, u, v);
      let cr = sample_bilinear(chroma, cw, ch, 2, 1, u, v);
      let rgb = yuv_to_rgb(luma_value, cb, cr);
      for (dst, value) in pixel.iter_mut().zip(rgb) {
        *dst = (value * 255.0).round() as u8;
      }
      pixel[3] = u8::MAX;
    }

    Ok(())
  }
}
