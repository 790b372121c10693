// 该文件是 Shibie （识别） 项目的一部分。
// src/model/onnx.rs - ONNX 分类模型
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

use std::path::{Path, PathBuf};

use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::TensorRef,
};
use thiserror::Error;
use tracing::{debug, info};

use super::{Model, ScoreBuffer};
use crate::tensor::InputTensor;

#[derive(Error, Debug)]
pub enum OnnxError {
  #[error("无法读取模型文件 '{path}': {source}")]
  ModelRead {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("创建推理会话失败: {0}")]
  Session(String),
  #[error("ONNX Runtime 错误: {0}")]
  Ort(#[from] ort::Error),
  #[error("模型没有{0}")]
  MissingTensor(&'static str),
  #[error("暂存缓冲区过小: 需要 {required} 字节, 容量 {capacity} 字节")]
  ScratchTooSmall { required: usize, capacity: usize },
  #[error("模型输出长度不匹配: 期望 {expected}, 实际 {actual}")]
  OutputSize { expected: usize, actual: usize },
}

impl OnnxError {
  fn session(err: impl std::fmt::Display) -> Self {
    OnnxError::Session(err.to_string())
  }
}

/// 默认暂存缓冲区大小 (8 MiB)
pub const DEFAULT_SCRATCH_BYTES: usize = 8 * 1024 * 1024;
pub const DEFAULT_NUM_CLASSES: usize = 1000;

pub struct OnnxClassifierBuilder {
  model_path: PathBuf,
  threads: usize,
  scratch_bytes: usize,
  num_classes: usize,
}

impl OnnxClassifierBuilder {
  pub fn new(model_path: impl AsRef<Path>) -> Self {
    Self {
      model_path: model_path.as_ref().to_path_buf(),
      threads: 1,
      scratch_bytes: DEFAULT_SCRATCH_BYTES,
      num_classes: DEFAULT_NUM_CLASSES,
    }
  }

  pub fn threads(mut self, threads: usize) -> Self {
    self.threads = threads.max(1);
    self
  }

  pub fn scratch_bytes(mut self, scratch_bytes: usize) -> Self {
    self.scratch_bytes = scratch_bytes;
    self
  }

  pub fn num_classes(mut self, num_classes: usize) -> Self {
    self.num_classes = num_classes;
    self
  }

  pub fn build(self) -> Result<OnnxClassifier, OnnxError> {
    info!("加载模型文件: {}", self.model_path.display());
    let metadata = std::fs::metadata(&self.model_path).map_err(|source| OnnxError::ModelRead {
      path: self.model_path.display().to_string(),
      source,
    })?;
    debug!(
      "模型文件大小: {:.2} MB",
      metadata.len() as f64 / (1024.0 * 1024.0)
    );

    let session = Session::builder()
      .map_err(OnnxError::session)?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(OnnxError::session)?
      .with_intra_threads(self.threads)
      .map_err(OnnxError::session)?
      .commit_from_file(&self.model_path)
      .map_err(OnnxError::session)?;

    let input_name = session
      .inputs
      .first()
      .map(|input| input.name.clone())
      .ok_or(OnnxError::MissingTensor("输入"))?;
    let output_name = session
      .outputs
      .first()
      .map(|output| output.name.clone())
      .ok_or(OnnxError::MissingTensor("输出"))?;
    info!("模型输入: {}, 输出: {}", input_name, output_name);

    Ok(OnnxClassifier {
      session,
      input_name,
      output_name,
      scratch: Vec::with_capacity(self.scratch_bytes / std::mem::size_of::<f32>()),
      scratch_bytes: self.scratch_bytes,
      num_classes: self.num_classes,
    })
  }
}

/// ImageNet 风格的单输入单输出分类模型
pub struct OnnxClassifier {
  session: Session,
  input_name: String,
  output_name: String,
  scratch: Vec<f32>,
  scratch_bytes: usize,
  num_classes: usize,
}

impl OnnxClassifier {
  pub fn input_name(&self) -> &str {
    &self.input_name
  }

  pub fn output_name(&self) -> &str {
    &self.output_name
  }

  pub fn num_classes(&self) -> usize {
    self.num_classes
  }
}

/// 把半精度张量展开到 f32 暂存区
pub(crate) fn stage_input(
  scratch: &mut Vec<f32>,
  capacity_bytes: usize,
  input: &InputTensor,
) -> Result<(), OnnxError> {
  let required = input.len() * std::mem::size_of::<f32>();
  if required > capacity_bytes {
    return Err(OnnxError::ScratchTooSmall {
      required,
      capacity: capacity_bytes,
    });
  }
  scratch.clear();
  scratch.extend(input.as_slice().iter().map(|value| value.to_f32()));
  Ok(())
}

impl Model for OnnxClassifier {
  type Input = InputTensor;
  type Output = ScoreBuffer;
  type Error = OnnxError;

  fn infer(&mut self, input: &Self::Input, output: &mut Self::Output) -> Result<(), Self::Error> {
    stage_input(&mut self.scratch, self.scratch_bytes, input)?;

    let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
    let tensor = TensorRef::from_array_view((shape, self.scratch.as_slice()))?;
    let outputs = self
      .session
      .run(ort::inputs![self.input_name.as_str() => tensor])?;

    let (_, scores) = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;
    if scores.len() != self.num_classes {
      return Err(OnnxError::OutputSize {
        expected: self.num_classes,
        actual: scores.len(),
      });
    }
    if output.len() != scores.len() {
      *output = ScoreBuffer::new(scores.len());
    }
    output.fill_from_f32(scores);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tensor::TensorLayout;

  #[test]
  fn staging_expands_half_precision() {
    let input = InputTensor::new(4, 4, TensorLayout::Nchw);
    let mut scratch = Vec::new();
    stage_input(&mut scratch, DEFAULT_SCRATCH_BYTES, &input).unwrap();
    assert_eq!(scratch.len(), 4 * 4 * 3);
    assert!(scratch.iter().all(|&v| v == 0.0));
  }

  #[test]
  fn staging_rejects_small_scratch() {
    let input = InputTensor::new(224, 224, TensorLayout::Nchw);
    let mut scratch = Vec::new();
    let result = stage_input(&mut scratch, 1024, &input);
    assert!(matches!(
      result,
      Err(OnnxError::ScratchTooSmall {
        required: 602_112,
        capacity: 1024
      })
    ));
  }

  #[test]
  fn missing_model_file_is_reported() {
    let result = OnnxClassifierBuilder::new("/nonexistent/model.onnx").build();
    assert!(matches!(result, Err(OnnxError::ModelRead { .. })));
  }
}
