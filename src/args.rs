// 该文件是 Shibie （识别） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use crate::{
  capture::Flip,
  kernel::KernelKind,
  model::{DEFAULT_NUM_CLASSES, DEFAULT_SCRATCH_BYTES},
  pipeline::PipelineConfig,
  tensor::{ScaleBias, TensorLayout},
};

/// Shibie 项目参数配置，所有参数都有默认值
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 采集来源
  /// 支持格式:
  /// - V4L2: v4l:///dev/video0?width=1280&height=720&fps=30&flip=vertical
  /// - 图片: image:///path/to/image.png
  /// - GStreamer: gst://camera/dev/video0, gst://file/path/to/video.mp4, gst://test
  #[arg(long, default_value = "v4l:///dev/video0", value_name = "SOURCE")]
  pub capture: String,

  /// 数据文件目录（模型、类别标签、字体、着色器）
  #[arg(long, default_value = "data", value_name = "DIR")]
  pub data_dir: PathBuf,

  /// ONNX 模型文件，默认 <DATA_DIR>/model.onnx
  #[arg(long, value_name = "FILE")]
  pub model: Option<PathBuf>,

  /// 类别标签文件，默认 <DATA_DIR>/imagenet_classes.txt
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,

  /// 信息文本字体，默认 <DATA_DIR>/font.ttf
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 颜色转换着色器，默认 <DATA_DIR>/main.wgsl
  #[arg(long, value_name = "FILE")]
  pub shader: Option<PathBuf>,

  /// 采集宽度
  #[arg(long, default_value_t = 1280)]
  pub width: u32,

  /// 采集高度
  #[arg(long, default_value_t = 720)]
  pub height: u32,

  /// 采集帧率
  #[arg(long, default_value_t = 30)]
  pub fps: u32,

  /// 翻转方式: none, horizontal, vertical, both
  #[arg(long, default_value = "vertical")]
  pub flip: Flip,

  /// 颜色转换内核: cpu, wgpu
  #[arg(long, default_value = "cpu")]
  pub kernel: KernelKind,

  /// 模型输入布局: nchw, nhwc
  #[arg(long, default_value = "nchw")]
  pub layout: TensorLayout,

  /// 归一化缩放，与 --bias 一起使用时覆盖 ImageNet 默认值
  #[arg(long, requires = "bias", allow_hyphen_values = true)]
  pub scale: Option<f32>,

  /// 归一化偏置
  #[arg(long, requires = "scale", allow_hyphen_values = true)]
  pub bias: Option<f32>,

  /// 窗口宽度
  #[arg(long, default_value_t = 1600)]
  pub window_width: usize,

  /// 窗口高度
  #[arg(long, default_value_t = 900)]
  pub window_height: usize,

  /// 记录输出，例如 folder:///path/to/records?always
  #[arg(long, value_name = "OUTPUT")]
  pub record: Option<Url>,

  /// 推理输入暂存区大小（字节）
  #[arg(long, default_value_t = DEFAULT_SCRATCH_BYTES)]
  pub scratch_bytes: usize,

  /// 模型输出类别数
  #[arg(long, default_value_t = DEFAULT_NUM_CLASSES)]
  pub num_classes: usize,

  /// 推理线程数
  #[arg(long, default_value_t = 1)]
  pub threads: usize,
}

impl Args {
  pub fn font_path(&self) -> PathBuf {
    self
      .font
      .clone()
      .unwrap_or_else(|| self.data_dir.join("font.ttf"))
  }

  pub fn pipeline_config(&self) -> PipelineConfig {
    let mut config = PipelineConfig::with_data_dir(&self.data_dir);
    config.capture_url = self.capture.clone();
    config.capture.width = self.width;
    config.capture.height = self.height;
    config.capture.fps = self.fps;
    config.capture.flip = self.flip;
    config.kernel = self.kernel;
    config.layout = self.layout;
    if let (Some(scale), Some(bias)) = (self.scale, self.bias) {
      config.scale_bias = ScaleBias::uniform(scale, bias);
    }
    if let Some(model) = &self.model {
      config.model_path = model.clone();
    }
    if let Some(labels) = &self.labels {
      config.labels_path = labels.clone();
    }
    if let Some(shader) = &self.shader {
      config.shader_path = shader.clone();
    }
    config.scratch_bytes = self.scratch_bytes;
    config.num_classes = self.num_classes;
    config.threads = self.threads;
    config
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_need_no_arguments() {
    let args = Args::try_parse_from(["shibie"]).unwrap();
    let config = args.pipeline_config();
    assert_eq!(config, PipelineConfig::default());
    assert_eq!(args.font_path(), PathBuf::from("data/font.ttf"));
    assert!(args.record.is_none());
  }

  #[test]
  fn overrides_reach_pipeline_config() {
    let args = Args::try_parse_from([
      "shibie",
      "--capture",
      "image:///tmp/cat.png",
      "--data-dir",
      "/opt/shibie",
      "--labels",
      "/tmp/labels.txt",
      "--flip",
      "none",
      "--layout",
      "nhwc",
      "--scale",
      "2",
      "--bias",
      "-1",
    ])
    .unwrap();
    let config = args.pipeline_config();
    assert_eq!(config.capture_url, "image:///tmp/cat.png");
    assert_eq!(config.model_path, PathBuf::from("/opt/shibie/model.onnx"));
    assert_eq!(config.labels_path, PathBuf::from("/tmp/labels.txt"));
    assert_eq!(config.capture.flip, Flip::None);
    assert_eq!(config.layout, TensorLayout::Nhwc);
    assert_eq!(config.scale_bias, ScaleBias::uniform(2.0, -1.0));
  }

  #[test]
  fn invalid_kernel_is_rejected() {
    assert!(Args::try_parse_from(["shibie", "--kernel", "fpga"]).is_err());
  }
}
