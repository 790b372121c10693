// 该文件是 Shibie （识别） 项目的一部分。
// src/tensor.rs - 纹理到张量的归一化
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

use half::f16;
use thiserror::Error;

use crate::frame::RgbaFrame;

const RGB_CHANNELS: usize = 3;

#[derive(Error, Debug)]
pub enum TensorError {
  #[error("张量形状不匹配: 张量 {tensor:?}, 纹理 {texture:?}")]
  ShapeMismatch {
    tensor: (usize, usize),
    texture: (usize, usize),
  },
  #[error("未知的张量布局: {0}")]
  UnknownLayout(String),
}

/// 张量内存布局
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TensorLayout {
  #[default]
  Nchw,
  Nhwc,
}

impl FromStr for TensorLayout {
  type Err = TensorError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "nchw" => Ok(TensorLayout::Nchw),
      "nhwc" => Ok(TensorLayout::Nhwc),
      _ => Err(TensorError::UnknownLayout(s.to_string())),
    }
  }
}

/// 逐通道的缩放与偏置：`value = pixel / 255 * scale + bias`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleBias {
  pub scale: [f32; RGB_CHANNELS],
  pub bias: [f32; RGB_CHANNELS],
}

impl Default for ScaleBias {
  fn default() -> Self {
    Self::uniform(1.0 / 0.229, -0.485 / 0.229)
  }
}

impl ScaleBias {
  pub fn uniform(scale: f32, bias: f32) -> Self {
    Self {
      scale: [scale; RGB_CHANNELS],
      bias: [bias; RGB_CHANNELS],
    }
  }

  /// 由均值和标准差构造
  pub fn from_mean_std(mean: [f32; RGB_CHANNELS], std: [f32; RGB_CHANNELS]) -> Self {
    Self {
      scale: std.map(|s| 1.0 / s),
      bias: [0, 1, 2].map(|c| -mean[c] / std[c]),
    }
  }
}

/// 半精度输入张量，batch 固定为 1
#[derive(Debug, Clone)]
pub struct InputTensor {
  layout: TensorLayout,
  width: usize,
  height: usize,
  data: Box<[f16]>,
}

impl InputTensor {
  pub fn new(width: usize, height: usize, layout: TensorLayout) -> Self {
    let data = vec![f16::ZERO; width * height * RGB_CHANNELS].into_boxed_slice();
    Self {
      layout,
      width,
      height,
      data,
    }
  }

  pub fn layout(&self) -> TensorLayout {
    self.layout
  }

  pub fn shape(&self) -> [usize; 4] {
    match self.layout {
      TensorLayout::Nchw => [1, RGB_CHANNELS, self.height, self.width],
      TensorLayout::Nhwc => [1, self.height, self.width, RGB_CHANNELS],
    }
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn as_slice(&self) -> &[f16] {
    &self.data
  }

  fn offset(&self, x: usize, y: usize, c: usize) -> usize {
    match self.layout {
      TensorLayout::Nchw => c * self.height * self.width + y * self.width + x,
      TensorLayout::Nhwc => (y * self.width + x) * RGB_CHANNELS + c,
    }
  }

  pub fn get(&self, x: usize, y: usize, c: usize) -> f16 {
    self.data[self.offset(x, y, c)]
  }
}

/// 把 RGBA 纹理写入归一化张量
#[derive(Debug, Clone, Copy, Default)]
pub struct TensorGraph {
  scale_bias: ScaleBias,
}

impl TensorGraph {
  pub fn new(scale_bias: ScaleBias) -> Self {
    Self { scale_bias }
  }

  pub fn scale_bias(&self) -> &ScaleBias {
    &self.scale_bias
  }

  pub fn dispatch<const W: u32, const H: u32>(
    &self,
    tensor: &mut InputTensor,
    texture: &RgbaFrame<W, H>,
  ) -> Result<(), TensorError> {
    if tensor.width != texture.width() || tensor.height != texture.height() {
      return Err(TensorError::ShapeMismatch {
        tensor: (tensor.width, tensor.height),
        texture: (texture.width(), texture.height()),
      });
    }

    let ScaleBias { scale, bias } = self.scale_bias;
    let pixels = texture.as_rgba().chunks_exact(texture.channels());
    for (i, pixel) in pixels.enumerate() {
      let (x, y) = (i % tensor.width, i / tensor.width);
      for c in 0..RGB_CHANNELS {
        let value = f32::from(pixel[c]) / 255.0 * scale[c] + bias[c];
        let offset = tensor.offset(x, y, c);
        tensor.data[offset] = f16::from_f32(value);
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn texture_with(pixels: &[[u8; 4]]) -> RgbaFrame<2, 2> {
    let mut texture = RgbaFrame::<2, 2>::default();
    texture.as_mut().copy_from_slice(pixels.concat().as_slice());
    texture
  }

  #[test]
  fn default_normalization_matches_imagenet_red_channel() {
    let texture = texture_with(&[[255, 255, 255, 255], [0, 0, 0, 255], [124, 0, 0, 255], [0; 4]]);
    let mut tensor = InputTensor::new(2, 2, TensorLayout::Nchw);
    TensorGraph::default().dispatch(&mut tensor, &texture).unwrap();

    let white = tensor.get(0, 0, 1).to_f32();
    assert!((white - (1.0 - 0.485) / 0.229).abs() < 1e-2);
    let black = tensor.get(1, 0, 2).to_f32();
    assert!((black + 0.485 / 0.229).abs() < 1e-2);
    let mid = tensor.get(0, 1, 0).to_f32();
    assert!(mid.abs() < 1e-2);
  }

  #[test]
  fn nchw_and_nhwc_place_channels_differently() {
    let texture = texture_with(&[[255, 0, 0, 255], [0, 255, 0, 255], [0, 0, 255, 255], [0; 4]]);
    let graph = TensorGraph::new(ScaleBias::uniform(1.0, 0.0));

    let mut nchw = InputTensor::new(2, 2, TensorLayout::Nchw);
    graph.dispatch(&mut nchw, &texture).unwrap();
    assert_eq!(nchw.shape(), [1, 3, 2, 2]);
    // 通道平面依次排列
    assert_eq!(nchw.as_slice()[0].to_f32(), 1.0);
    assert_eq!(nchw.as_slice()[4 + 1].to_f32(), 1.0);
    assert_eq!(nchw.as_slice()[8 + 2].to_f32(), 1.0);

    let mut nhwc = InputTensor::new(2, 2, TensorLayout::Nhwc);
    graph.dispatch(&mut nhwc, &texture).unwrap();
    assert_eq!(nhwc.shape(), [1, 2, 2, 3]);
    assert_eq!(nhwc.as_slice()[0].to_f32(), 1.0);
    assert_eq!(nhwc.as_slice()[3 + 1].to_f32(), 1.0);
    assert_eq!(nhwc.as_slice()[6 + 2].to_f32(), 1.0);
    assert_eq!(nhwc.get(1, 0, 1), nchw.get(1, 0, 1));
  }

  #[test]
  fn mean_std_builds_per_channel_scale_bias() {
    let sb = ScaleBias::from_mean_std([0.485, 0.456, 0.406], [0.229, 0.224, 0.225]);
    assert!((sb.scale[1] - 1.0 / 0.224).abs() < 1e-6);
    assert!((sb.bias[2] + 0.406 / 0.225).abs() < 1e-6);
    assert_eq!(ScaleBias::default().scale, [1.0 / 0.229; 3]);
  }

  #[test]
  fn shape_mismatch_is_rejected() {
    let texture = RgbaFrame::<2, 2>::default();
    let mut tensor = InputTensor::new(3, 2, TensorLayout::Nchw);
    assert!(matches!(
      TensorGraph::default().dispatch(&mut tensor, &texture),
      Err(TensorError::ShapeMismatch { .. })
    ));
  }

  #[test]
  fn layout_parses_case_insensitive() {
    assert_eq!("NHWC".parse::<TensorLayout>().unwrap(), TensorLayout::Nhwc);
    assert!("chw".parse::<TensorLayout>().is_err());
  }
}
