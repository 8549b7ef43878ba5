//! Headless GPU context.
//!
//! Owns the wgpu device and queue used by both pipelines. No surface is
//! created: presenting frames belongs to the caller's render loop.

use instant::Duration;

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    pub async fn new_headless() -> Result<Self> {
        Self::with_limits(wgpu::Limits::default()).await
    }

    /// Requests a device capped at `required_limits`.
    pub async fn with_limits(required_limits: wgpu::Limits) -> Result<Self> {
        log::info!("WGPU setup");
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..wgpu::InstanceDescriptor::new_without_display_handle()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| Error::NoAdapter(e.to_string()))?;
        log::info!("adapter: {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("pbr-scene device"),
                required_features: wgpu::Features::empty(),
                required_limits,
                ..Default::default()
            })
            .await
            .map_err(|e| Error::Device(e.to_string()))?;

        Ok(Self { device, queue })
    }

    /// Synchronous variant of [`new_headless`](Self::new_headless).
    pub fn blocking() -> Result<Self> {
        futures::executor::block_on(Self::new_headless())
    }

    /// Copies one array layer and mip level of `texture` back to the CPU.
    ///
    /// Rows are returned tightly packed (the 256-byte copy alignment is
    /// stripped). `bytes_per_texel` must match the texture's format.
    pub fn read_texture(
        &self,
        texture: &wgpu::Texture,
        layer: u32,
        mip_level: u32,
        bytes_per_texel: u32,
    ) -> Result<Vec<u8>> {
        let width = (texture.width() >> mip_level).max(1);
        let height = (texture.height() >> mip_level).max(1);
        let unpadded_row = width * bytes_per_texel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_row = unpadded_row.div_ceil(align) * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: (padded_row * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture,
                mip_level,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: layer,
                },
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            tx.send(result).ok();
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: Some(Duration::from_secs(10)),
            })
            .map_err(|e| Error::Device(e.to_string()))?;
        futures::executor::block_on(rx.receive())
            .ok_or_else(|| Error::Device("readback channel closed".into()))?
            .map_err(|e| Error::Device(e.to_string()))?;

        let data = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded_row * height) as usize);
        for row in data.chunks(padded_row as usize) {
            pixels.extend_from_slice(&row[..unpadded_row as usize]);
        }
        drop(data);
        buffer.unmap();
        Ok(pixels)
    }
}
