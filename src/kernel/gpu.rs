// 该文件是 Shibie （识别） 项目的一部分。
// src/kernel/gpu.rs - wgpu 计算着色器内核
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

use std::path::Path;

use tracing::{debug, info};

use super::{ConvertKernel, CropRegion, KernelError};
use crate::frame::{RgbaFrame, YuvFrame};

const WORKGROUP_SIZE: u32 = 8;
const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// 随相机分辨率重建的输入纹理
struct SourceTextures {
  size: (u32, u32),
  luma: wgpu::Texture,
  chroma: wgpu::Texture,
}

/// 随模型分辨率重建的输出纹理与读回缓冲
struct TargetTextures {
  size: (u32, u32),
  output: wgpu::Texture,
  readback: wgpu::Buffer,
  padded_row: u32,
}

pub struct WgpuKernel {
  device: wgpu::Device,
  queue: wgpu::Queue,
  pipeline: wgpu::ComputePipeline,
  layout: wgpu::BindGroupLayout,
  sampler: wgpu::Sampler,
  crop: wgpu::Buffer,
  source: Option<SourceTextures>,
  target: Option<TargetTextures>,
  bind_group: Option<wgpu::BindGroup>,
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
  wgpu::BindGroupLayoutEntry {
    binding,
    visibility: wgpu::ShaderStages::COMPUTE,
    ty: wgpu::BindingType::Texture {
      sample_type: wgpu::TextureSampleType::Float { filterable: true },
      view_dimension: wgpu::TextureViewDimension::D2,
      multisampled: false,
    },
    count: None,
  }
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
  wgpu::Extent3d {
    width,
    height,
    depth_or_array_layers: 1,
  }
}

impl WgpuKernel {
  /// 选择适配器、编译着色器并创建计算管线
  pub fn create(shader_path: &Path) -> Result<Self, KernelError> {
    let source =
      std::fs::read_to_string(shader_path).map_err(|source| KernelError::ShaderSource {
        path: shader_path.display().to_string(),
        source,
      })?;

    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
      power_preference: wgpu::PowerPreference::HighPerformance,
      compatible_surface: None,
      force_fallback_adapter: false,
    }))
    .ok_or(KernelError::NoAdapter)?;
    info!("GPU 适配器: {}", adapter.get_info().name);

    let (device, queue) = pollster::block_on(adapter.request_device(
      &wgpu::DeviceDescriptor {
        label: Some("shibie"),
        required_features: wgpu::Features::empty(),
        required_limits: wgpu::Limits::default(),
        memory_hints: wgpu::MemoryHints::Performance,
      },
      None,
    ))?;

    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
      label: Some("yuv_crop"),
      source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
      label: Some("yuv_crop"),
      entries: &[
        wgpu::BindGroupLayoutEntry {
          binding: 0,
          visibility: wgpu::ShaderStages::COMPUTE,
          ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
          count: None,
        },
        texture_entry(1),
        texture_entry(2),
        wgpu::BindGroupLayoutEntry {
          binding: 3,
          visibility: wgpu::ShaderStages::COMPUTE,
          ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: OUTPUT_FORMAT,
            view_dimension: wgpu::TextureViewDimension::D2,
          },
          count: None,
        },
        wgpu::BindGroupLayoutEntry {
          binding: 4,
          visibility: wgpu::ShaderStages::COMPUTE,
          ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
          },
          count: None,
        },
      ],
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
      label: Some("yuv_crop"),
      bind_group_layouts: &[&layout],
      push_constant_ranges: &[],
    });

    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
      label: Some("yuv_crop"),
      layout: Some(&pipeline_layout),
      module: &module,
      entry_point: "main",
      compilation_options: Default::default(),
      cache: None,
    });

    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
      label: Some("yuv_crop"),
      address_mode_u: wgpu::AddressMode::ClampToEdge,
      address_mode_v: wgpu::AddressMode::ClampToEdge,
      mag_filter: wgpu::FilterMode::Linear,
      min_filter: wgpu::FilterMode::Linear,
      mipmap_filter: wgpu::FilterMode::Nearest,
      ..Default::default()
    });

    let crop = device.create_buffer(&wgpu::BufferDescriptor {
      label: Some("crop"),
      size: 16,
      usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
      mapped_at_creation: false,
    });

    Ok(Self {
      device,
      queue,
      pipeline,
      layout,
      sampler,
      crop,
      source: None,
      target: None,
      bind_group: None,
    })
  }

  fn ensure_source(&mut self, width: u32, height: u32) {
    if self.source.as_ref().is_some_and(|s| s.size == (width, height)) {
      return;
    }
    debug!("重建输入纹理 {}x{}", width, height);

    let make = |label: &'static str, size: wgpu::Extent3d, format: wgpu::TextureFormat| {
      self.device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
      })
    };
    let luma = make("luma", extent(width, height), wgpu::TextureFormat::R8Unorm);
    let chroma = make(
      "chroma",
      extent(width / 2, height / 2),
      wgpu::TextureFormat::Rg8Unorm,
    );

    self.source = Some(SourceTextures {
      size: (width, height),
      luma,
      chroma,
    });
    self.bind_group = None;
  }

  fn ensure_target(&mut self, width: u32, height: u32) {
    if self.target.as_ref().is_some_and(|t| t.size == (width, height)) {
      return;
    }

    let output = self.device.create_texture(&wgpu::TextureDescriptor {
      label: Some("rgb"),
      size: extent(width, height),
      mip_level_count: 1,
      sample_count: 1,
      dimension: wgpu::TextureDimension::D2,
      format: OUTPUT_FORMAT,
      usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::COPY_SRC,
      view_formats: &[],
    });

    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    let padded_row = (width * 4).div_ceil(align) * align;
    let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
      label: Some("rgb_readback"),
      size: u64::from(padded_row) * u64::from(height),
      usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
      mapped_at_creation: false,
    });

    self.target = Some(TargetTextures {
      size: (width, height),
      output,
      readback,
      padded_row,
    });
    self.bind_group = None;
  }

  fn upload(&self, frame: &YuvFrame) {
    let Some(source) = &self.source else {
      return;
    };
    let write = |texture: &wgpu::Texture, data: &[u8], row: u32, size: wgpu::Extent3d| {
      self.queue.write_texture(
        wgpu::ImageCopyTexture {
          texture,
          mip_level: 0,
          origin: wgpu::Origin3d::ZERO,
          aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::ImageDataLayout {
          offset: 0,
          bytes_per_row: Some(row),
          rows_per_image: None,
        },
        size,
      );
    };
    write(
      &source.luma,
      frame.luma(),
      frame.width(),
      extent(frame.width(), frame.height()),
    );
    write(
      &source.chroma,
      frame.chroma(),
      frame.chroma_width() * 2,
      extent(frame.chroma_width(), frame.chroma_height()),
    );

    let crop = CropRegion::center_square(frame.width(), frame.height());
    let mut uniform = [0u8; 16];
    for (chunk, value) in uniform
      .chunks_exact_mut(4)
      .zip(crop.offset.iter().chain(crop.scale.iter()))
    {
      chunk.copy_from_slice(&value.to_le_bytes());
    }
    self.queue.write_buffer(&self.crop, 0, &uniform);
  }

  fn ensure_bind_group(&mut self) {
    if self.bind_group.is_some() {
      return;
    }
    if let (Some(source), Some(target)) = (&self.source, &self.target) {
      let view = |texture: &wgpu::Texture| texture.create_view(&Default::default());
      let (luma, chroma, output) = (
        view(&source.luma),
        view(&source.chroma),
        view(&target.output),
      );
      self.bind_group = Some(self.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("yuv_crop"),
        layout: &self.layout,
        entries: &[
          wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Sampler(&self.sampler),
          },
          wgpu::BindGroupEntry {
            binding: 1,
            resource: wgpu::BindingResource::TextureView(&luma),
          },
          wgpu::BindGroupEntry {
            binding: 2,
            resource: wgpu::BindingResource::TextureView(&chroma),
          },
          wgpu::BindGroupEntry {
            binding: 3,
            resource: wgpu::BindingResource::TextureView(&output),
          },
          wgpu::BindGroupEntry {
            binding: 4,
            resource: self.crop.as_entire_binding(),
          },
        ],
      }));
    }
  }
}

impl<const W: u32, const H: u32> ConvertKernel<W, H> for WgpuKernel {
  fn name(&self) -> &'static str {
    "wgpu"
  }

  fn dispatch(
    &mut self,
    frame: &YuvFrame,
    target: &mut RgbaFrame<W, H>,
  ) -> Result<(), KernelError> {
    if frame.is_empty() || frame.chroma_width() == 0 || frame.chroma_height() == 0 {
      return Err(KernelError::EmptyFrame);
    }

    self.ensure_source(frame.width(), frame.height());
    self.ensure_target(W, H);
    self.upload(frame);
    self.ensure_bind_group();

    let mut encoder = self
      .device
      .create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("yuv_crop"),
      });
    {
      let Some(bind_group) = &self.bind_group else {
        return Err(KernelError::EmptyFrame);
      };
      let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some("yuv_crop"),
        timestamp_writes: None,
      });
      pass.set_pipeline(&self.pipeline);
      pass.set_bind_group(0, bind_group, &[]);
      pass.dispatch_workgroups(W.div_ceil(WORKGROUP_SIZE), H.div_ceil(WORKGROUP_SIZE), 1);
    }

    let Some(textures) = &self.target else {
      return Err(KernelError::EmptyFrame);
    };
    encoder.copy_texture_to_buffer(
      wgpu::ImageCopyTexture {
        texture: &textures.output,
        mip_level: 0,
        origin: wgpu::Origin3d::ZERO,
        aspect: wgpu::TextureAspect::All,
      },
      wgpu::ImageCopyBuffer {
        buffer: &textures.readback,
        layout: wgpu::ImageDataLayout {
          offset: 0,
          bytes_per_row: Some(textures.padded_row),
          rows_per_image: Some(H),
        },
      },
      extent(W, H),
    );
    self.queue.submit(Some(encoder.finish()));

    // 同步等待 GPU 完成后读回
    let slice = textures.readback.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
      let _ = tx.send(result);
    });
    let _ = self.device.poll(wgpu::Maintain::Wait);
    rx.recv().map_err(|_| KernelError::ReadbackChannel)??;

    {
      let mapped = slice.get_mapped_range();
      let row = (W * 4) as usize;
      for (dst, src) in target
        .as_mut()
        .chunks_exact_mut(row)
        .zip(mapped.chunks(textures.padded_row as usize))
      {
        dst.copy_from_slice(&src[..row]);
      }
    }
    textures.readback.unmap();

    Ok(())
  }
}
