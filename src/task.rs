// 该文件是 Shibie （识别） 项目的一部分。
// src/task.rs - 任务执行
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

use std::{
  path::PathBuf,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
  capture::CaptureSource,
  display::PreviewWindow,
  kernel::ConvertKernel,
  model::{Model, ScoreBuffer},
  output::{Classification, Render},
  panel::Panel,
  pipeline::{FramePipeline, FrameReport, MODEL_INPUT_SIZE, ModelTexture},
  tensor::InputTensor,
};

pub trait Task<P, O>: Sized {
  type Error;
  fn run_task(self, pipeline: P, output: O) -> Result<(), Self::Error>;
}

/// 先启动采集，执行 `body`，无论成败都结束采集，返回最先出现的错误
fn with_preview<C, K, M, T>(
  pipeline: &mut FramePipeline<C, K, M>,
  body: impl FnOnce(&mut FramePipeline<C, K, M>) -> anyhow::Result<T>,
) -> anyhow::Result<T>
where
  C: CaptureSource,
  K: ConvertKernel<MODEL_INPUT_SIZE, MODEL_INPUT_SIZE>,
  M: Model<Input = InputTensor, Output = ScoreBuffer>,
  M::Error: std::error::Error + Send + Sync + 'static,
{
  pipeline.begin()?;
  let result = body(pipeline);
  let ended = pipeline.end();
  let value = result?;
  ended?;
  Ok(value)
}

fn record<C, K, M, O, E>(
  pipeline: &FramePipeline<C, K, M>,
  report: &FrameReport,
  output: &O,
) -> anyhow::Result<()>
where
  O: for<'a> Render<ModelTexture, Classification<'a>, Error = E>,
  E: std::error::Error + Send + Sync + 'static,
{
  let ranked = report.leaderboard.ranked(pipeline.labels());
  output.render_result(
    pipeline.texture(),
    &Classification {
      ranked: &ranked,
      updated: report.updated,
    },
  )?;
  Ok(())
}

/// 交互预览：窗口关闭、按下 Escape 或收到中断信号时退出
#[derive(Debug, Clone)]
pub struct PreviewTask {
  title: String,
  width: usize,
  height: usize,
  font: PathBuf,
}

impl PreviewTask {
  pub fn new(
    title: impl Into<String>,
    width: usize,
    height: usize,
    font: impl Into<PathBuf>,
  ) -> Self {
    Self {
      title: title.into(),
      width,
      height,
      font: font.into(),
    }
  }
}

impl<C, K, M, O, E> Task<FramePipeline<C, K, M>, O> for PreviewTask
where
  C: CaptureSource,
  K: ConvertKernel<MODEL_INPUT_SIZE, MODEL_INPUT_SIZE>,
  M: Model<Input = InputTensor, Output = ScoreBuffer>,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: for<'a> Render<ModelTexture, Classification<'a>, Error = E>,
  E: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, mut pipeline: FramePipeline<C, K, M>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let mut panel = Panel::load(&self.font, self.title.as_str())?;
    let mut window = PreviewWindow::open(&self.title, self.width, self.height)?;

    let interrupted = Arc::new(AtomicBool::new(false));
    {
      let interrupted = interrupted.clone();
      ctrlc::set_handler(move || {
        info!("收到中断信号，准备退出...");
        interrupted.store(true, Ordering::SeqCst);
      })?;
    }

    let frames = with_preview(&mut pipeline, |pipeline| {
      let mut frames = 0usize;
      while window.is_running() {
        if interrupted.load(Ordering::SeqCst) {
          warn!("中断信号接收，退出任务循环");
          break;
        }

        let report = pipeline.step()?;
        if report.new_frame {
          frames += 1;
        }
        panel.set_info(pipeline.info());
        let (width, height) = window.size();
        window.present(panel.render(width, height, pipeline.texture()))?;
        record(pipeline, &report, &output)?;
      }
      Ok(frames)
    })?;

    info!("任务完成，共处理 {} 帧，退出", frames);
    Ok(())
  }
}

/// 无窗口地连续执行若干 tick 并统计耗时
#[derive(Debug, Clone, Copy)]
pub struct BenchmarkTask {
  ticks: usize,
}

/// 前两个 tick 含预热开销，不计入平均值
const WARMUP_TICKS: usize = 2;

impl BenchmarkTask {
  pub fn new(ticks: usize) -> Self {
    Self { ticks }
  }
}

fn average_after_warmup(times: &[Duration]) -> Option<Duration> {
  let measured = times.get(WARMUP_TICKS..)?;
  if measured.is_empty() {
    return None;
  }
  Some(measured.iter().sum::<Duration>() / measured.len() as u32)
}

impl<C, K, M, O, E> Task<FramePipeline<C, K, M>, O> for BenchmarkTask
where
  C: CaptureSource,
  K: ConvertKernel<MODEL_INPUT_SIZE, MODEL_INPUT_SIZE>,
  M: Model<Input = InputTensor, Output = ScoreBuffer>,
  M::Error: std::error::Error + Send + Sync + 'static,
  O: for<'a> Render<ModelTexture, Classification<'a>, Error = E>,
  E: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, mut pipeline: FramePipeline<C, K, M>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let times = with_preview(&mut pipeline, |pipeline| {
      let mut times = Vec::with_capacity(self.ticks);
      for i in 0..self.ticks {
        let now = Instant::now();
        let report = pipeline.step()?;
        let elapsed = now.elapsed();
        debug!("({}) 新帧: {}，耗时: {:.2?}", i, report.new_frame, elapsed);
        record(pipeline, &report, &output)?;
        times.push(elapsed);
      }
      Ok(times)
    })?;

    match average_after_warmup(&times) {
      Some(average) => warn!("平均每帧耗时: {:.2?}", average),
      None => warn!("帧数不足 {}，不统计平均耗时", WARMUP_TICKS + 1),
    }
    info!("最终结果:{}", pipeline.info());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn average_skips_warmup_ticks() {
    let times = [100, 50, 10, 20, 30].map(Duration::from_millis);
    assert_eq!(average_after_warmup(&times), Some(Duration::from_millis(20)));
  }

  #[test]
  fn average_needs_measured_ticks() {
    assert_eq!(average_after_warmup(&[]), None);
    let times = [100, 50].map(Duration::from_millis);
    assert_eq!(average_after_warmup(&times), None);
  }
}
