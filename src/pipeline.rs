// 该文件是 Shibie （识别） 项目的一部分。
// src/pipeline.rs - 逐帧处理管线
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

//! 每个 tick：采集 → 颜色转换（仅在有新帧时）→ 归一化 → 推理 → 排行。
//!
//! 没有新帧时沿用上一帧的 RGB 纹理，归一化和推理照常执行。

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  capture::{CaptureError, CaptureSettings, CaptureSource, CaptureWrapper},
  frame::{RgbaFrame, YuvFrame},
  kernel::{ConvertKernel, KernelError, KernelKind, KernelWrapper},
  labels::{ClassLabels, LabelError},
  model::{Model, OnnxClassifier, OnnxClassifierBuilder, ScoreBuffer},
  ranking::{InfoText, Top4},
  tensor::{InputTensor, ScaleBias, TensorError, TensorGraph, TensorLayout},
};

/// 模型输入边长
pub const MODEL_INPUT_SIZE: u32 = 224;

pub type ModelTexture = RgbaFrame<MODEL_INPUT_SIZE, MODEL_INPUT_SIZE>;

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("无效的采集 URL '{url}': {source}")]
  CaptureUrl {
    url: String,
    #[source]
    source: url::ParseError,
  },
  #[error("采集错误: {0}")]
  Capture(#[from] CaptureError),
  #[error("内核错误: {0}")]
  Kernel(#[from] KernelError),
  #[error("张量错误: {0}")]
  Tensor(#[from] TensorError),
  #[error("类别标签错误: {0}")]
  Labels(#[from] LabelError),
  #[error("模型错误: {0}")]
  Model(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// 管线配置，所有字段都有默认值
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
  pub capture_url: String,
  pub capture: CaptureSettings,
  pub kernel: KernelKind,
  pub shader_path: PathBuf,
  pub model_path: PathBuf,
  pub labels_path: PathBuf,
  pub layout: TensorLayout,
  pub scale_bias: ScaleBias,
  pub scratch_bytes: usize,
  pub num_classes: usize,
  pub threads: usize,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self::with_data_dir("data")
  }
}

impl PipelineConfig {
  /// 以 `data_dir` 为数据文件目录的默认配置
  pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
    let data_dir = data_dir.as_ref();
    Self {
      capture_url: "v4l:///dev/video0".to_string(),
      capture: CaptureSettings::default(),
      kernel: KernelKind::default(),
      shader_path: data_dir.join("main.wgsl"),
      model_path: data_dir.join("model.onnx"),
      labels_path: data_dir.join("imagenet_classes.txt"),
      layout: TensorLayout::default(),
      scale_bias: ScaleBias::default(),
      scratch_bytes: crate::model::DEFAULT_SCRATCH_BYTES,
      num_classes: crate::model::DEFAULT_NUM_CLASSES,
      threads: 1,
    }
  }
}

/// 一个 tick 的结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
  /// 本 tick 是否收到新的采集帧
  pub new_frame: bool,
  /// 信息文本是否被替换
  pub updated: bool,
  pub leaderboard: Top4,
}

pub struct FramePipeline<C, K, M> {
  capture: C,
  kernel: K,
  graph: TensorGraph,
  model: M,
  labels: ClassLabels,
  frame: YuvFrame,
  texture: ModelTexture,
  tensor: InputTensor,
  scores: ScoreBuffer,
  info: InfoText,
}

impl FramePipeline<CaptureWrapper, KernelWrapper, OnnxClassifier> {
  /// 按配置打开所有服务，任一失败立即返回
  pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
    let labels = ClassLabels::load(&config.labels_path)?;
    if labels.len() != config.num_classes {
      warn!(
        "类别数 {} 与模型输出数 {} 不一致",
        labels.len(),
        config.num_classes
      );
    }

    let url = Url::parse(&config.capture_url).map_err(|source| PipelineError::CaptureUrl {
      url: config.capture_url.clone(),
      source,
    })?;
    let capture = CaptureWrapper::open(&url, &config.capture)?;

    let kernel = KernelWrapper::create(config.kernel, &config.shader_path)?;
    info!(
      "颜色转换内核: {}",
      ConvertKernel::<MODEL_INPUT_SIZE, MODEL_INPUT_SIZE>::name(&kernel)
    );

    let model = OnnxClassifierBuilder::new(&config.model_path)
      .threads(config.threads)
      .scratch_bytes(config.scratch_bytes)
      .num_classes(config.num_classes)
      .build()
      .map_err(|e| PipelineError::Model(Box::new(e)))?;

    Ok(
      Self::new(capture, kernel, TensorGraph::new(config.scale_bias), model, labels)
        .with_layout(config.layout)
        .with_num_classes(config.num_classes),
    )
  }
}

impl<C, K, M> FramePipeline<C, K, M>
where
  C: CaptureSource,
  K: ConvertKernel<MODEL_INPUT_SIZE, MODEL_INPUT_SIZE>,
  M: Model<Input = InputTensor, Output = ScoreBuffer>,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  pub fn new(capture: C, kernel: K, graph: TensorGraph, model: M, labels: ClassLabels) -> Self {
    let side = MODEL_INPUT_SIZE as usize;
    let num_classes = labels.len();
    Self {
      capture,
      kernel,
      graph,
      model,
      labels,
      frame: YuvFrame::default(),
      texture: ModelTexture::default(),
      tensor: InputTensor::new(side, side, TensorLayout::default()),
      scores: ScoreBuffer::new(num_classes),
      info: InfoText::default(),
    }
  }

  pub fn with_layout(mut self, layout: TensorLayout) -> Self {
    let side = MODEL_INPUT_SIZE as usize;
    self.tensor = InputTensor::new(side, side, layout);
    self
  }

  pub fn with_num_classes(mut self, num_classes: usize) -> Self {
    self.scores = ScoreBuffer::new(num_classes);
    self
  }

  pub fn begin(&mut self) -> Result<(), PipelineError> {
    self.capture.begin_preview()?;
    Ok(())
  }

  pub fn end(&mut self) -> Result<(), PipelineError> {
    self.capture.end_preview()?;
    Ok(())
  }

  pub fn step(&mut self) -> Result<FrameReport, PipelineError> {
    let new_frame = self.capture.update_preview(&mut self.frame)?;
    if new_frame {
      self.kernel.dispatch(&self.frame, &mut self.texture)?;
    }

    self.graph.dispatch(&mut self.tensor, &self.texture)?;
    self
      .model
      .infer(&self.tensor, &mut self.scores)
      .map_err(|e| PipelineError::Model(Box::new(e)))?;

    let leaderboard = Top4::scan(self.scores.iter_f32());
    let updated = self.info.update(&leaderboard, &self.labels);
    Ok(FrameReport {
      new_frame,
      updated,
      leaderboard,
    })
  }
}

impl<C, K, M> FramePipeline<C, K, M> {
  pub fn info(&self) -> &str {
    self.info.as_str()
  }

  pub fn texture(&self) -> &ModelTexture {
    &self.texture
  }

  pub fn labels(&self) -> &ClassLabels {
    &self.labels
  }

  pub fn scores(&self) -> &ScoreBuffer {
    &self.scores
  }

  pub fn capture(&self) -> &C {
    &self.capture
  }
}
