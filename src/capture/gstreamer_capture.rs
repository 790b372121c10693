// 该文件是 Shibie （识别） 项目的一部分。
// src/capture/gstreamer_capture.rs - GStreamer 采集
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

//! GStreamer 采集源。
//!
//! 管道最后统一转换为 NV12 并送入 `appsink`，NV12 的两个平面与
//! [`YuvFrame`] 的亮度/色度平面一一对应。
//!
//! ## URL 格式
//!
//! - `gst://camera/dev/video0?width=1280&height=720&fps=30` - V4L2 摄像头
//! - `gst://file/path/to/video.mp4` - 视频文件
//! - `gst://test` - 测试图案
//!
//! 所有形式都接受 `flip=none|horizontal|vertical|both`。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video::{self as gst_video, VideoFrameExt};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use super::{CaptureError, CaptureSettings, CaptureSource, Flip};
use crate::{FromUrl, FromUrlWithScheme, decode_url_path, frame::YuvFrame};

#[derive(Error, Debug)]
pub enum GStreamerCaptureError {
  #[error("URI scheme 不匹配")]
  SchemeMismatch,
  #[error("未知的 GStreamer 源: {0}")]
  UnknownSource(String),
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer 布尔操作错误: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("无法获取 appsink 元素")]
  AppSinkNotFound,
  #[error("无法转换元素为 appsink")]
  AppSinkConversionFailed,
  #[error("无法从 caps 获取视频信息")]
  VideoInfoError,
  #[error("不支持的视频格式: {0}")]
  UnsupportedFormat(String),
  #[error("管道错误: {0}")]
  PipelineError(String),
  #[error("视频流已结束")]
  EndOfStream,
  #[error("状态改变错误: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

pub enum GStreamerCaptureBuilderItem {
  CameraSource {
    device: String,
    width: u32,
    height: u32,
    fps: u32,
  },
  FileSource(String),
  TestSource {
    width: u32,
    height: u32,
    fps: u32,
  },
  VideoFlip {
    method: u32,
  },
  TargetFormat {
    format: &'static str,
  },
}

/// gst-launch 语法中的双引号字符串
fn quote_property(value: &str) -> String {
  let mut quoted = String::with_capacity(value.len() + 2);
  quoted.push('"');
  for c in value.chars() {
    if matches!(c, '"' | '\\') {
      quoted.push('\\');
    }
    quoted.push(c);
  }
  quoted.push('"');
  quoted
}

impl GStreamerCaptureBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      GStreamerCaptureBuilderItem::CameraSource {
        device,
        width,
        height,
        fps,
      } => format!(
        "v4l2src device={} ! video/x-raw,width={},height={},framerate={}/1",
        device, width, height, fps
      ),
      GStreamerCaptureBuilderItem::FileSource(path) => {
        format!("filesrc location={} ! decodebin", quote_property(path))
      }
      GStreamerCaptureBuilderItem::TestSource { width, height, fps } => format!(
        "videotestsrc is-live=true ! video/x-raw,width={},height={},framerate={}/1",
        width, height, fps
      ),
      GStreamerCaptureBuilderItem::VideoFlip { method } => {
        format!("videoflip method={}", method)
      }
      GStreamerCaptureBuilderItem::TargetFormat { format } => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
    }
  }
}

enum GStreamerSource {
  Camera(String),
  File(String),
  Test,
}

/// GStreamer 采集管道构建器
pub struct GStreamerCapturePipelineBuilder {
  source: GStreamerSource,
  settings: CaptureSettings,
}

impl FromUrlWithScheme for GStreamerCapturePipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerCapturePipelineBuilder {
  type Error = GStreamerCaptureError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerCaptureError::SchemeMismatch);
    }

    let source = match url.host_str() {
      Some("camera") => {
        let path = decode_url_path(url);
        if path.is_empty() || path == "/" {
          GStreamerSource::Camera("/dev/video0".to_string())
        } else {
          GStreamerSource::Camera(path)
        }
      }
      Some("file") => GStreamerSource::File(decode_url_path(url)),
      Some("test") => GStreamerSource::Test,
      other => {
        return Err(GStreamerCaptureError::UnknownSource(
          other.unwrap_or_default().to_string(),
        ));
      }
    };

    Ok(Self {
      source,
      settings: CaptureSettings::default(),
    })
  }
}

impl GStreamerCapturePipelineBuilder {
  pub fn settings(mut self, settings: &CaptureSettings) -> Self {
    self.settings = settings.clone();
    self
  }

  fn items(&self) -> Vec<GStreamerCaptureBuilderItem> {
    let CaptureSettings {
      width,
      height,
      fps,
      flip,
    } = self.settings;

    let mut items = vec![match &self.source {
      GStreamerSource::Camera(device) => GStreamerCaptureBuilderItem::CameraSource {
        device: device.clone(),
        width,
        height,
        fps,
      },
      GStreamerSource::File(path) => GStreamerCaptureBuilderItem::FileSource(path.clone()),
      GStreamerSource::Test => GStreamerCaptureBuilderItem::TestSource { width, height, fps },
    }];

    // videoflip: 2 = rotate-180, 4 = horizontal-flip, 5 = vertical-flip
    let method = match flip {
      Flip::None => None,
      Flip::Horizontal => Some(4),
      Flip::Vertical => Some(5),
      Flip::Both => Some(2),
    };
    if let Some(method) = method {
      items.push(GStreamerCaptureBuilderItem::VideoFlip { method });
    }

    items.push(GStreamerCaptureBuilderItem::TargetFormat { format: "NV12" });
    items
  }

  pub fn pipeline_description(&self) -> String {
    let basic_pipeline = self
      .items()
      .iter()
      .map(GStreamerCaptureBuilderItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    format!(
      "{} ! appsink max-buffers=2 drop=true name=sink",
      basic_pipeline
    )
  }

  pub fn build(self) -> Result<GStreamerCapture, GStreamerCaptureError> {
    gst::init()?;

    let description = self.pipeline_description();
    info!("GStreamer 管道: {}", description);

    let pipeline = gst::parse::launch(&description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerCaptureError::PipelineError("无法创建管道".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerCaptureError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerCaptureError::AppSinkConversionFailed)?;

    let name = match &self.source {
      GStreamerSource::Camera(device) => device.clone(),
      GStreamerSource::File(path) => path.clone(),
      GStreamerSource::Test => "videotestsrc".to_string(),
    };

    Ok(GStreamerCapture {
      name,
      pipeline,
      appsink,
      width: self.settings.width,
      height: self.settings.height,
    })
  }
}

pub struct GStreamerCapture {
  name: String,
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  width: u32,
  height: u32,
}

impl Drop for GStreamerCapture {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("无法停止 GStreamer 管道: {}", e);
    }
  }
}

/// 按行拷贝带 stride 的平面
fn copy_plane(dst: &mut [u8], row_bytes: usize, src: &[u8], stride: usize) {
  for (dst_row, src_row) in dst.chunks_exact_mut(row_bytes).zip(src.chunks(stride)) {
    dst_row.copy_from_slice(&src_row[..row_bytes]);
  }
}

impl GStreamerCapture {
  fn read_sample(
    &mut self,
    sample: &gst::Sample,
    frame: &mut YuvFrame,
  ) -> Result<(), GStreamerCaptureError> {
    let buffer = sample
      .buffer()
      .ok_or_else(|| GStreamerCaptureError::PipelineError("样本中没有缓冲区".to_string()))?;
    let caps = sample
      .caps()
      .ok_or_else(|| GStreamerCaptureError::PipelineError("样本中没有 caps".to_string()))?;
    let video_info =
      gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerCaptureError::VideoInfoError)?;
    if video_info.format() != gst_video::VideoFormat::Nv12 {
      return Err(GStreamerCaptureError::UnsupportedFormat(
        video_info.format().to_str().to_string(),
      ));
    }

    let video = gst_video::VideoFrameRef::from_buffer_ref_readable(buffer, &video_info)
      .map_err(|_| GStreamerCaptureError::PipelineError("无法映射视频帧".to_string()))?;

    let (width, height) = (video_info.width(), video_info.height());
    if (frame.width(), frame.height()) != (width, height) {
      *frame = YuvFrame::new(width, height);
    }
    self.width = width;
    self.height = height;

    let strides = video.plane_stride();
    let chroma_row = frame.chroma_width() as usize * 2;
    copy_plane(
      frame.luma_mut(),
      width as usize,
      video.plane_data(0)?,
      strides[0] as usize,
    );
    copy_plane(
      frame.chroma_mut(),
      chroma_row,
      video.plane_data(1)?,
      strides[1] as usize,
    );
    Ok(())
  }
}

impl CaptureSource for GStreamerCapture {
  fn type_name(&self) -> &'static str {
    "GStreamer"
  }

  fn name(&self) -> &str {
    &self.name
  }

  fn width(&self) -> u32 {
    self.width
  }

  fn height(&self) -> u32 {
    self.height
  }

  fn begin_preview(&mut self) -> Result<(), CaptureError> {
    self
      .pipeline
      .set_state(gst::State::Playing)
      .map_err(GStreamerCaptureError::from)?;
    Ok(())
  }

  fn update_preview(&mut self, frame: &mut YuvFrame) -> Result<bool, CaptureError> {
    if self.appsink.is_eos() {
      return Err(GStreamerCaptureError::EndOfStream.into());
    }
    let Some(sample) = self.appsink.try_pull_sample(gst::ClockTime::ZERO) else {
      return Ok(false);
    };
    self.read_sample(&sample, frame)?;
    Ok(true)
  }

  fn end_preview(&mut self) -> Result<(), CaptureError> {
    self
      .pipeline
      .set_state(gst::State::Null)
      .map_err(GStreamerCaptureError::from)?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn builder(url: &str) -> GStreamerCapturePipelineBuilder {
    GStreamerCapturePipelineBuilder::from_url(&Url::parse(url).unwrap()).unwrap()
  }

  #[test]
  fn camera_pipeline_flips_vertically_by_default() {
    let description = builder("gst://camera/dev/video1").pipeline_description();
    assert_eq!(
      description,
      "v4l2src device=/dev/video1 ! video/x-raw,width=1280,height=720,framerate=30/1 \
       ! videoflip method=5 ! videoconvert ! video/x-raw,format=NV12 \
       ! appsink max-buffers=2 drop=true name=sink"
    );
  }

  #[test]
  fn file_pipeline_without_flip() {
    let settings = CaptureSettings {
      flip: Flip::None,
      ..CaptureSettings::default()
    };
    let description = builder("gst://file/videos/cat%20walk.mp4")
      .settings(&settings)
      .pipeline_description();
    assert_eq!(
      description,
      "filesrc location=\"/videos/cat walk.mp4\" ! decodebin ! videoconvert \
       ! video/x-raw,format=NV12 ! appsink max-buffers=2 drop=true name=sink"
    );
  }

  #[test]
  fn quoted_location_escapes_quotes() {
    assert_eq!(quote_property(r#"/tmp/a "b"\c.mp4"#), r#""/tmp/a \"b\"\\c.mp4""#);
  }

  #[test]
  fn test_source_uses_settings() {
    let settings = CaptureSettings {
      width: 320,
      height: 240,
      fps: 10,
      flip: Flip::Both,
    };
    let description = builder("gst://test").settings(&settings).pipeline_description();
    assert!(description.starts_with(
      "videotestsrc is-live=true ! video/x-raw,width=320,height=240,framerate=10/1 \
       ! videoflip method=2"
    ));
  }

  #[test]
  fn unknown_host_is_rejected() {
    let result = GStreamerCapturePipelineBuilder::from_url(&Url::parse("gst://rtsp/x").unwrap());
    assert!(matches!(result, Err(GStreamerCaptureError::UnknownSource(s)) if s == "rtsp"));
  }

  #[test]
  fn strided_plane_is_compacted() {
    let src = [1, 2, 0, 0, 3, 4, 0, 0];
    let mut dst = [0u8; 4];
    copy_plane(&mut dst, 2, &src, 4);
    assert_eq!(dst, [1, 2, 3, 4]);
  }
}
