// 该文件是 Shibie （识别） 项目的一部分。
// src/capture/v4l_capture.rs - V4L2 摄像头采集
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
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
    mpsc::{Receiver, SyncSender, TryRecvError, TrySendError, sync_channel},
  },
  thread::JoinHandle,
};

use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;
use v4l::{
  FourCC,
  io::traits::CaptureStream,
  video::{Capture, capture::Parameters},
};

use super::{CaptureError, CaptureSettings, CaptureSource, Flip};
use crate::{FromUrl, FromUrlWithScheme, decode_url_path, frame::YuvFrame};

#[derive(Error, Debug)]
pub enum V4lCaptureError {
  #[error("URI scheme 不匹配")]
  SchemeMismatch,
  #[error("V4L 设备 '{path}' 错误: {source}")]
  Device {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error("设备不支持 YUYV，实际格式 {0}")]
  UnsupportedPixelFormat(String),
  #[error("YUYV 缓冲区过短: 期望 {expected} 字节, 实际 {actual} 字节")]
  BufferTooShort { expected: usize, actual: usize },
  #[error("尚未开始预览")]
  NotStarted,
  #[error("采集线程已退出")]
  StreamClosed,
  #[error("无法启动采集线程: {0}")]
  Spawn(std::io::Error),
}

const DEFAULT_DEVICE: &str = "/dev/video0";
const STREAM_BUFFERS: u32 = 4;

/// 后台采集线程
struct Worker {
  running: Arc<AtomicBool>,
  frames: Receiver<YuvFrame>,
  handle: JoinHandle<()>,
}

pub struct V4lCapture {
  path: String,
  settings: CaptureSettings,
  stride: u32,
  device: Option<v4l::Device>,
  worker: Option<Worker>,
}

impl FromUrl for V4lCapture {
  type Error = V4lCaptureError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    Self::open(url, &CaptureSettings::default())
  }
}

impl FromUrlWithScheme for V4lCapture {
  const SCHEME: &'static str = "v4l";
}

/// `v4l:///dev/video0` → `/dev/video0`
fn device_path(url: &Url) -> String {
  let path = decode_url_path(url);
  if path.is_empty() || path == "/" {
    DEFAULT_DEVICE.to_string()
  } else {
    path
  }
}

impl V4lCapture {
  pub fn open(url: &Url, settings: &CaptureSettings) -> Result<Self, V4lCaptureError> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme 不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(V4lCaptureError::SchemeMismatch);
    }

    let path = device_path(url);
    let (device, settings, stride) = configure_device(&path, settings)?;
    Ok(Self {
      path,
      settings,
      stride,
      device: Some(device),
      worker: None,
    })
  }
}

/// 打开设备并设置 YUYV 格式、分辨率和帧率，返回驱动实际接受的参数
fn configure_device(
  path: &str,
  settings: &CaptureSettings,
) -> Result<(v4l::Device, CaptureSettings, u32), V4lCaptureError> {
  let device_error = |source| V4lCaptureError::Device {
    path: path.to_string(),
    source,
  };
  let device = v4l::Device::with_path(path).map_err(device_error)?;

  let mut format = device.format().map_err(device_error)?;
  format.width = settings.width;
  format.height = settings.height;
  format.fourcc = FourCC::new(b"YUYV");
  let format = device.set_format(&format).map_err(device_error)?;
  let (negotiated, stride) = negotiated_settings(settings, &format)?;

  if let Err(e) = device.set_params(&Parameters::with_fps(settings.fps)) {
    warn!("无法设置帧率 {}: {}", settings.fps, e);
  }
  info!(
    "V4L 设备 {}: {}x{} YUYV, stride {}",
    path, negotiated.width, negotiated.height, stride
  );
  Ok((device, negotiated, stride))
}

/// 以驱动返回的格式修正请求的参数
fn negotiated_settings(
  requested: &CaptureSettings,
  format: &v4l::Format,
) -> Result<(CaptureSettings, u32), V4lCaptureError> {
  if format.fourcc != FourCC::new(b"YUYV") {
    return Err(V4lCaptureError::UnsupportedPixelFormat(format.fourcc.to_string()));
  }
  let settings = CaptureSettings {
    width: format.width,
    height: format.height,
    ..requested.clone()
  };
  Ok((settings, format.stride.max(format.width * 2)))
}

/// 把 YUYV 打包数据拆成亮度平面和半分辨率的交错色度平面
pub(crate) fn yuyv_to_frame(
  data: &[u8],
  width: u32,
  height: u32,
  stride: u32,
) -> Result<YuvFrame, V4lCaptureError> {
  let (w, h) = (width as usize, height as usize);
  let stride = (stride as usize).max(w * 2);
  let expected = stride * (h.max(1) - 1) + w * 2;
  if data.len() < expected {
    return Err(V4lCaptureError::BufferTooShort {
      expected,
      actual: data.len(),
    });
  }

  let mut frame = YuvFrame::new(width, height);
  let cw = frame.chroma_width() as usize;

  for (y, row) in data.chunks(stride).take(h).enumerate() {
    let luma = &mut frame.luma_mut()[y * w..(y + 1) * w];
    for (x, value) in luma.iter_mut().enumerate() {
      *value = row[x * 2];
    }
  }

  for cy in 0..frame.chroma_height() as usize {
    let (top, bottom) = (&data[cy * 2 * stride..], &data[(cy * 2 + 1) * stride..]);
    let chroma = &mut frame.chroma_mut()[cy * cw * 2..(cy + 1) * cw * 2];
    for (cx, uv) in chroma.chunks_exact_mut(2).enumerate() {
      // 每 4 字节 Y0 U Y1 V 共享一对色度
      let base = cx * 4;
      uv[0] = ((u16::from(top[base + 1]) + u16::from(bottom[base + 1]) + 1) / 2) as u8;
      uv[1] = ((u16::from(top[base + 3]) + u16::from(bottom[base + 3]) + 1) / 2) as u8;
    }
  }

  Ok(frame)
}

fn capture_loop(
  device: v4l::Device,
  settings: CaptureSettings,
  stride: u32,
  running: Arc<AtomicBool>,
  frames: SyncSender<YuvFrame>,
) {
  let mut stream = match v4l::io::mmap::Stream::with_buffers(
    &device,
    v4l::buffer::Type::VideoCapture,
    STREAM_BUFFERS,
  ) {
    Ok(stream) => stream,
    Err(e) => {
      error!("无法创建 V4L 流: {}", e);
      return;
    }
  };

  let (horizontal, vertical) = settings.flip.axes();
  while running.load(Ordering::Acquire) {
    let (data, meta) = match stream.next() {
      Ok(buffer) => buffer,
      Err(e) => {
        error!("V4L 采集失败: {}", e);
        return;
      }
    };

    let mut frame = match yuyv_to_frame(data, settings.width, settings.height, stride) {
      Ok(frame) => frame,
      Err(e) => {
        warn!("丢弃第 {} 帧: {}", meta.sequence, e);
        continue;
      }
    };
    if settings.flip != Flip::None {
      frame.flip(horizontal, vertical);
    }

    match frames.try_send(frame) {
      Ok(()) => {}
      Err(TrySendError::Full(_)) => debug!("消费者未取走上一帧，丢弃第 {} 帧", meta.sequence),
      Err(TrySendError::Disconnected(_)) => return,
    }
  }
}

impl CaptureSource for V4lCapture {
  fn type_name(&self) -> &'static str {
    "V4L2"
  }

  fn name(&self) -> &str {
    &self.path
  }

  fn width(&self) -> u32 {
    self.settings.width
  }

  fn height(&self) -> u32 {
    self.settings.height
  }

  fn begin_preview(&mut self) -> Result<(), CaptureError> {
    if self.worker.is_some() {
      return Ok(());
    }
    let device = match self.device.take() {
      Some(device) => device,
      None => {
        // 结束预览后重新打开，格式需要重新设置
        let (device, settings, stride) = configure_device(&self.path, &self.settings)?;
        self.settings = settings;
        self.stride = stride;
        device
      }
    };

    let running = Arc::new(AtomicBool::new(true));
    let (sender, frames) = sync_channel(1);
    let handle = std::thread::Builder::new()
      .name("v4l-capture".to_string())
      .spawn({
        let settings = self.settings.clone();
        let stride = self.stride;
        let running = running.clone();
        move || capture_loop(device, settings, stride, running, sender)
      })
      .map_err(V4lCaptureError::Spawn)?;

    self.worker = Some(Worker {
      running,
      frames,
      handle,
    });
    Ok(())
  }

  fn update_preview(&mut self, frame: &mut YuvFrame) -> Result<bool, CaptureError> {
    let worker = self.worker.as_ref().ok_or(V4lCaptureError::NotStarted)?;
    match worker.frames.try_recv() {
      Ok(next) => {
        *frame = next;
        Ok(true)
      }
      Err(TryRecvError::Empty) => Ok(false),
      Err(TryRecvError::Disconnected) => Err(V4lCaptureError::StreamClosed.into()),
    }
  }

  fn end_preview(&mut self) -> Result<(), CaptureError> {
    if let Some(Worker {
      running,
      frames,
      handle,
    }) = self.worker.take()
    {
      running.store(false, Ordering::Release);
      drop(frames);
      if handle.join().is_err() {
        error!("采集线程异常退出");
      }
    }
    Ok(())
  }
}

impl Drop for V4lCapture {
  fn drop(&mut self) {
    if let Err(e) = self.end_preview() {
      warn!("停止 V4L 采集失败: {}", e);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn yuyv(width: usize, height: usize, pixel: impl Fn(usize, usize) -> [u8; 4]) -> Vec<u8> {
    let mut data = Vec::with_capacity(width * height * 2);
    for y in 0..height {
      for x in 0..width / 2 {
        data.extend_from_slice(&pixel(x, y));
      }
    }
    data
  }

  #[test]
  fn device_path_defaults_to_video0() {
    assert_eq!(device_path(&Url::parse("v4l:///dev/video2").unwrap()), "/dev/video2");
    assert_eq!(device_path(&Url::parse("v4l:///").unwrap()), "/dev/video0");
  }

  #[test]
  fn yuyv_splits_luma_and_chroma() {
    let data = yuyv(4, 2, |x, y| {
      let luma = (y * 4 + x * 2) as u8;
      [luma, 100 + x as u8, luma + 1, 200 - y as u8]
    });
    let frame = yuyv_to_frame(&data, 4, 2, 8).unwrap();
    assert_eq!(frame.luma(), &[0, 1, 2, 3, 4, 5, 6, 7]);
    // 两行的色度取平均
    assert_eq!(frame.chroma(), &[100, 200, 101, 200]);
  }

  #[test]
  fn yuyv_honours_padded_stride() {
    let mut data = Vec::new();
    for y in 0..2u8 {
      data.extend_from_slice(&[10 * y, 128, 10 * y + 1, 128]);
      data.extend_from_slice(&[0xEE; 4]);
    }
    let frame = yuyv_to_frame(&data, 2, 2, 8).unwrap();
    assert_eq!(frame.luma(), &[0, 1, 10, 11]);
    assert_eq!(frame.chroma(), &[128, 128]);
  }

  #[test]
  fn short_buffer_is_rejected() {
    let result = yuyv_to_frame(&[0; 10], 4, 2, 8);
    assert!(matches!(
      result,
      Err(V4lCaptureError::BufferTooShort {
        expected: 16,
        actual: 10
      })
    ));
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("image:///tmp/cat.png").unwrap();
    assert!(matches!(
      V4lCapture::from_url(&url),
      Err(V4lCaptureError::SchemeMismatch)
    ));
  }

  #[test]
  fn negotiated_settings_follow_driver_format() {
    let requested = CaptureSettings {
      flip: Flip::Both,
      ..CaptureSettings::default()
    };
    let mut format = v4l::Format::new(640, 480, FourCC::new(b"YUYV"));
    format.stride = 1344;
    let (settings, stride) = negotiated_settings(&requested, &format).unwrap();
    assert_eq!((settings.width, settings.height), (640, 480));
    assert_eq!(settings.fps, requested.fps);
    assert_eq!(settings.flip, Flip::Both);
    assert_eq!(stride, 1344);

    format.stride = 0;
    assert_eq!(negotiated_settings(&requested, &format).unwrap().1, 1280);
  }

  #[test]
  fn non_yuyv_format_is_rejected() {
    let format = v4l::Format::new(1280, 720, FourCC::new(b"MJPG"));
    assert!(matches!(
      negotiated_settings(&CaptureSettings::default(), &format),
      Err(V4lCaptureError::UnsupportedPixelFormat(_))
    ));
  }
}
