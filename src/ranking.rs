// 该文件是 Shibie （识别） 项目的一部分。
// src/ranking.rs - Top-K 类别排行
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

//! 单趟扫描的固定槽位 Top-K 选择。
//!
//! 排行榜按权重**升序**保存：槽位 0 是保留下来的最弱分数，槽位 `K-1`
//! 是最强分数。新分数只有严格大于槽位 0 时才会进入排行榜，因此相同的
//! 分数不会互相替换，先出现的索引排在更高的槽位。

use std::fmt::Write;

use crate::labels::ClassLabels;

/// 界面显示的类别数
pub const DISPLAY_CLASSES: usize = 4;

pub type Top4 = Leaderboard<DISPLAY_CLASSES>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leaderboard<const K: usize> {
  indices: [u32; K],
  weights: [f32; K],
}

impl<const K: usize> Default for Leaderboard<K> {
  fn default() -> Self {
    Self::new()
  }
}

impl<const K: usize> Leaderboard<K> {
  pub fn new() -> Self {
    const { assert!(K > 0, "排行榜至少需要一个槽位") };
    Self {
      indices: [0; K],
      weights: [0.0; K],
    }
  }

  /// 扫描一帧的全部分数
  pub fn scan<I: IntoIterator<Item = f32>>(scores: I) -> Self {
    let mut board = Self::new();
    for (index, score) in scores.into_iter().enumerate() {
      board.offer(index as u32, score);
    }
    board
  }

  fn offer(&mut self, index: u32, score: f32) {
    if score.is_nan() || score <= self.weights[0] {
      return;
    }

    // 淘汰槽位 0，把严格小于新分数的条目依次下移
    let mut slot = 0;
    while slot + 1 < K && self.weights[slot + 1] < score {
      self.weights[slot] = self.weights[slot + 1];
      self.indices[slot] = self.indices[slot + 1];
      slot += 1;
    }
    self.weights[slot] = score;
    self.indices[slot] = index;
  }

  pub fn indices(&self) -> &[u32; K] {
    &self.indices
  }

  pub fn weights(&self) -> &[f32; K] {
    &self.weights
  }

  /// 最弱槽位为正时才更新显示
  pub fn is_displayable(&self) -> bool {
    self.weights[0] > 0.0
  }

  /// 按槽位顺序（最弱在前）生成显示文本，每个条目以换行开头
  pub fn format_info(&self, labels: &ClassLabels) -> String {
    let mut info = String::new();
    for (&index, &weight) in self.indices.iter().zip(self.weights.iter()) {
      let _ = write!(info, "\n{} ({:.1})", labels.name(index as usize), weight);
    }
    info
  }

  pub fn ranked(&self, labels: &ClassLabels) -> Vec<RankedClass> {
    self
      .indices
      .iter()
      .zip(self.weights.iter())
      .map(|(&index, &weight)| RankedClass {
        index,
        label: labels.name(index as usize).into_owned(),
        weight,
      })
      .collect()
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedClass {
  pub index: u32,
  pub label: String,
  pub weight: f32,
}

/// 面板上显示的信息文本
#[derive(Debug, Clone, Default)]
pub struct InfoText {
  text: String,
}

impl InfoText {
  /// 排行榜可显示时替换文本，否则保留上一帧的内容
  pub fn update<const K: usize>(&mut self, board: &Leaderboard<K>, labels: &ClassLabels) -> bool {
    if !board.is_displayable() {
      return false;
    }
    self.text = board.format_info(labels);
    true
  }

  pub fn as_str(&self) -> &str {
    &self.text
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn scores_with_prefix(prefix: &[f32], len: usize) -> Vec<f32> {
    let mut scores = vec![0.0; len];
    scores[..prefix.len()].copy_from_slice(prefix);
    scores
  }

  fn labels(count: usize) -> ClassLabels {
    (0..count).map(|i| format!("class{}", i)).collect()
  }

  #[test]
  fn keeps_top_four_ascending() {
    let scores = scores_with_prefix(&[0.1, 0.9, 0.05, 0.7, 0.3], 1000);
    let board = Top4::scan(scores);
    assert_eq!(board.weights(), &[0.1, 0.3, 0.7, 0.9]);
    assert_eq!(board.indices(), &[0, 4, 3, 1]);
  }

  #[test]
  fn equal_score_does_not_evict() {
    let board = Top4::scan([0.5, 0.5, 0.5, 0.5, 0.5]);
    assert_eq!(board.weights(), &[0.5; 4]);
    assert_eq!(board.indices(), &[3, 2, 1, 0]);
  }

  #[test]
  fn empty_input_is_all_zero() {
    let board = Top4::scan(std::iter::empty());
    assert_eq!(board.weights(), &[0.0; 4]);
    assert_eq!(board.indices(), &[0; 4]);
    assert!(!board.is_displayable());
  }

  #[test]
  fn non_positive_scores_are_ignored() {
    let board = Top4::scan([-1.0, 0.0, -0.5, 0.0]);
    assert_eq!(board.weights(), &[0.0; 4]);
    assert!(!board.is_displayable());
  }

  #[test]
  fn nan_is_never_inserted() {
    let board = Top4::scan([0.2, f32::NAN, 0.4, 0.3, 0.1]);
    assert_eq!(board.weights(), &[0.1, 0.2, 0.3, 0.4]);
    assert_eq!(board.indices(), &[4, 0, 3, 2]);
  }

  #[test]
  fn strongest_slot_dominates_every_score() {
    // 确定性的伪随机序列
    let mut state = 0x2545_f491_u32;
    let scores: Vec<f32> = (0..1000)
      .map(|_| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        (state % 10_000) as f32 / 100.0
      })
      .collect();

    let board = Top4::scan(scores.iter().copied());
    let weights = board.weights();
    assert!(weights.windows(2).all(|w| w[0] <= w[1]));
    assert!(scores.iter().all(|&s| s <= weights[3]));

    let mut sorted = scores.clone();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let mut expected: Vec<f32> = sorted[..4].to_vec();
    expected.reverse();
    assert_eq!(weights.to_vec(), expected);
    for (&index, &weight) in board.indices().iter().zip(weights.iter()) {
      assert_eq!(scores[index as usize], weight);
    }

    assert_eq!(Top4::scan(scores.iter().copied()), board);
  }

  #[test]
  fn format_info_lists_slots_in_order() {
    let board = Top4::scan([0.1, 0.9, 0.05, 0.7, 0.3]);
    let info = board.format_info(&labels(5));
    assert_eq!(
      info,
      "\nclass0 (0.1)\nclass4 (0.3)\nclass3 (0.7)\nclass1 (0.9)"
    );
  }

  #[test]
  fn format_rounds_to_one_decimal() {
    let board = Leaderboard::<1>::scan([12.345]);
    assert_eq!(board.format_info(&labels(1)), "\nclass0 (12.3)");
  }

  #[test]
  fn info_text_unchanged_without_positive_board() {
    let labels = labels(1000);
    let mut info = InfoText::default();

    let first = Top4::scan([3.0, 4.0, 5.0, 6.0]);
    assert!(info.update(&first, &labels));
    let shown = info.as_str().to_string();

    let zeros = Top4::scan(vec![0.0; 1000]);
    assert!(!info.update(&zeros, &labels));
    assert_eq!(info.as_str(), shown);
  }

  #[test]
  fn ranked_entries_carry_labels() {
    let board = Leaderboard::<2>::scan([0.2, 0.8]);
    let ranked = board.ranked(&labels(2));
    assert_eq!(ranked[0].label, "class0");
    assert_eq!(ranked[1].index, 1);
    assert_eq!(ranked[1].weight, 0.8);
  }
}
