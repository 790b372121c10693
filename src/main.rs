// 该文件是 Shibie （识别） 项目的一部分。
// src/main.rs - 项目主程序
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
  task::{PreviewTask, Task},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("采集来源: {}", args.capture);
  info!("数据目录: {}", args.data_dir.display());

  let config = args.pipeline_config();
  info!("模型文件路径: {}", config.model_path.display());
  let pipeline = FramePipeline::from_config(&config)?;
  let output = match &args.record {
    Some(url) => {
      info!("记录输出: {}", url);
      OutputWrapper::from_url(url)?
    }
    None => OutputWrapper::Discard,
  };

  PreviewTask::new(
    "识别",
    args.window_width,
    args.window_height,
    args.font_path(),
  )
  .run_task(pipeline, output)?;

  Ok(())
}
