// 该文件是 Shibie （识别） 项目的一部分。
// src/bin/benchmark.rs - 无窗口的逐帧耗时统计
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

use anyhow::Result;
use clap::Parser;
use tracing::info;

use shibie::{
  FromUrl,
  args::Args,
  output::OutputWrapper,
  pipeline::FramePipeline,
  task::{BenchmarkTask, Task},
};

/// Shibie 耗时统计参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct BenchmarkArgs {
  #[command(flatten)]
  pub common: Args,
  /// 执行的 tick 数
  #[arg(long, default_value_t = 1000)]
  pub ticks: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = BenchmarkArgs::parse();

  info!("采集来源: {}", args.common.capture);
  info!("tick 数: {}", args.ticks);

  let pipeline = FramePipeline::from_config(&args.common.pipeline_config())?;
  let output = match &args.common.record {
    Some(url) => OutputWrapper::from_url(url)?,
    None => OutputWrapper::Discard,
  };

  BenchmarkTask::new(args.ticks).run_task(pipeline, output)?;

  Ok(())
}
