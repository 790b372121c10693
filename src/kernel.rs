// 该文件是 Shibie （识别） 项目的一部分。
// src/kernel.rs - 颜色转换内核
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

use crate::frame::{RgbaFrame, YuvFrame};

mod cpu;
pub use self::cpu::CpuKernel;

#[cfg(feature = "wgpu")]
mod gpu;
#[cfg(feature = "wgpu")]
pub use self::gpu::WgpuKernel;

#[derive(Error, Debug)]
pub enum KernelError {
  #[error("输入帧为空")]
  EmptyFrame,
  #[error("未知的内核类型: {0}")]
  UnknownKind(String),
  #[error("内核类型 {0} 未启用")]
  Disabled(&'static str),
  #[error("无法读取着色器文件 '{path}': {source}")]
  ShaderSource {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[cfg(feature = "wgpu")]
  #[error("没有可用的 GPU 适配器")]
  NoAdapter,
  #[cfg(feature = "wgpu")]
  #[error("GPU 设备错误: {0}")]
  RequestDevice(#[from] wgpu::RequestDeviceError),
  #[cfg(feature = "wgpu")]
  #[error("GPU 读回错误: {0}")]
  BufferAsync(#[from] wgpu::BufferAsyncError),
  #[cfg(feature = "wgpu")]
  #[error("GPU 读回通道已关闭")]
  ReadbackChannel,
}

/// 内核实现类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KernelKind {
  #[default]
  Cpu,
  Wgpu,
}

impl FromStr for KernelKind {
  type Err = KernelError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "cpu" => Ok(KernelKind::Cpu),
      "wgpu" | "gpu" => Ok(KernelKind::Wgpu),
      _ => Err(KernelError::UnknownKind(s.to_string())),
    }
  }
}

/// 亮度/色度帧 → 模型分辨率 RGBA 纹理
pub trait ConvertKernel<const W: u32, const H: u32> {
  fn name(&self) -> &'static str;
  fn dispatch(&mut self, frame: &YuvFrame, target: &mut RgbaFrame<W, H>)
  -> Result<(), KernelError>;
}

/// 居中正方形裁剪在归一化纹理坐标中的位置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRegion {
  pub offset: [f32; 2],
  pub scale: [f32; 2],
}

impl CropRegion {
  pub fn center_square(width: u32, height: u32) -> Self {
    let side = width.min(height) as f32;
    let scale = [side / width as f32, side / height as f32];
    Self {
      offset: [(1.0 - scale[0]) * 0.5, (1.0 - scale[1]) * 0.5],
      scale,
    }
  }

  /// 目标像素中心对应的源纹理坐标
  pub fn texcoord(&self, x: u32, y: u32, width: u32, height: u32) -> [f32; 2] {
    [
      self.offset[0] + (x as f32 + 0.5) / width as f32 * self.scale[0],
      self.offset[1] + (y as f32 + 0.5) / height as f32 * self.scale[1],
    ]
  }
}

/// 8 位色度零点在归一化纹理中的值
pub const CHROMA_ZERO: f32 = 128.0 / 255.0;

/// BT.601 全范围 YUV → RGB，输入输出均为 [0, 1]
pub fn yuv_to_rgb(y: f32, u: f32, v: f32) -> [f32; 3] {
  let (u, v) = (u - CHROMA_ZERO, v - CHROMA_ZERO);
  [
    (y + 1.402 * v).clamp(0.0, 1.0),
    (y - 0.344 * u - 0.714 * v).clamp(0.0, 1.0),
    (y + 1.772 * u).clamp(0.0, 1.0),
  ]
}

pub enum KernelWrapper {
  Cpu(CpuKernel),
  #[cfg(feature = "wgpu")]
  Wgpu(Box<WgpuKernel>),
}

impl KernelWrapper {
  /// 按类型创建内核，GPU 内核在此编译着色器
  #[cfg_attr(not(feature = "wgpu"), allow(unused_variables))]
  pub fn create(kind: KernelKind, shader: &std::path::Path) -> Result<Self, KernelError> {
    match kind {
      KernelKind::Cpu => Ok(KernelWrapper::Cpu(CpuKernel)),
      #[cfg(feature = "wgpu")]
      KernelKind::Wgpu => Ok(KernelWrapper::Wgpu(Box::new(WgpuKernel::create(shader)?))),
      #[cfg(not(feature = "wgpu"))]
      KernelKind::Wgpu => Err(KernelError::Disabled("wgpu")),
    }
  }
}

impl<const W: u32, const H: u32> ConvertKernel<W, H> for KernelWrapper {
  fn name(&self) -> &'static str {
    match self {
      KernelWrapper::Cpu(kernel) => ConvertKernel::<W, H>::name(kernel),
      #[cfg(feature = "wgpu")]
      KernelWrapper::Wgpu(kernel) => ConvertKernel::<W, H>::name(kernel.as_ref()),
    }
  }

  fn dispatch(
    &mut self,
    frame: &YuvFrame,
    target: &mut RgbaFrame<W, H>,
  ) -> Result<(), KernelError> {
    match self {
      KernelWrapper::Cpu(kernel) => kernel.dispatch(frame, target),
      #[cfg(feature = "wgpu")]
      KernelWrapper::Wgpu(kernel) => kernel.dispatch(frame, target),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn crop_of_landscape_frame_is_centered() {
    let crop = CropRegion::center_square(1280, 720);
    assert!((crop.scale[0] - 0.5625).abs() < 1e-6);
    assert_eq!(crop.scale[1], 1.0);
    assert!((crop.offset[0] - 0.21875).abs() < 1e-6);
    assert_eq!(crop.offset[1], 0.0);

    let [u, v] = crop.texcoord(0, 0, 224, 224);
    assert!(u > 0.21875 && u < 0.22);
    assert!(v > 0.0 && v < 0.01);
  }

  #[test]
  fn neutral_chroma_is_gray() {
    let [r, g, b] = yuv_to_rgb(0.5, CHROMA_ZERO, CHROMA_ZERO);
    assert_eq!([r, g, b], [0.5, 0.5, 0.5]);
    assert_eq!(yuv_to_rgb(1.0, 1.0, 1.0)[0], 1.0);
  }

  #[test]
  fn kind_parses() {
    assert_eq!("CPU".parse::<KernelKind>().unwrap(), KernelKind::Cpu);
    assert_eq!("wgpu".parse::<KernelKind>().unwrap(), KernelKind::Wgpu);
    assert!("metal".parse::<KernelKind>().is_err());
  }

  #[cfg(not(feature = "wgpu"))]
  #[test]
  fn wgpu_kind_requires_feature() {
    let result = KernelWrapper::create(KernelKind::Wgpu, std::path::Path::new("data/main.wgsl"));
    assert!(matches!(result, Err(KernelError::Disabled("wgpu"))));
  }
}
