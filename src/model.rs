// 该文件是 Shibie （识别） 项目的一部分。
// src/model.rs - 模型
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

use half::f16;

/// 对预分配的输入/输出执行一次推理
pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&mut self, input: &Self::Input, output: &mut Self::Output) -> Result<(), Self::Error>;
}

/// 半精度类别分数，顺序与类别标签表一致
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreBuffer {
  scores: Box<[f16]>,
}

impl ScoreBuffer {
  pub fn new(num_classes: usize) -> Self {
    Self {
      scores: vec![f16::ZERO; num_classes].into_boxed_slice(),
    }
  }

  pub fn len(&self) -> usize {
    self.scores.len()
  }

  pub fn is_empty(&self) -> bool {
    self.scores.is_empty()
  }

  pub fn as_slice(&self) -> &[f16] {
    &self.scores
  }

  pub fn as_mut_slice(&mut self) -> &mut [f16] {
    &mut self.scores
  }

  /// 以 f32 读取全部分数
  pub fn iter_f32(&self) -> impl Iterator<Item = f32> + '_ {
    self.scores.iter().map(|score| score.to_f32())
  }

  pub fn fill_from_f32(&mut self, values: &[f32]) {
    for (dst, &value) in self.scores.iter_mut().zip(values) {
      *dst = f16::from_f32(value);
    }
  }
}

impl From<Vec<f32>> for ScoreBuffer {
  fn from(values: Vec<f32>) -> Self {
    let mut buffer = Self::new(values.len());
    buffer.fill_from_f32(&values);
    buffer
  }
}

mod onnx;
pub use self::onnx::{
  DEFAULT_NUM_CLASSES, DEFAULT_SCRATCH_BYTES, OnnxClassifier, OnnxClassifierBuilder, OnnxError,
};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scores_round_trip_through_half_precision() {
    let buffer = ScoreBuffer::from(vec![0.5, 12.25, -3.0]);
    assert_eq!(buffer.len(), 3);
    assert_eq!(buffer.iter_f32().collect::<Vec<_>>(), vec![0.5, 12.25, -3.0]);
  }

  #[test]
  fn new_buffer_is_zeroed() {
    let buffer = ScoreBuffer::new(1000);
    assert_eq!(buffer.len(), 1000);
    assert!(buffer.iter_f32().all(|s| s == 0.0));
  }
}
