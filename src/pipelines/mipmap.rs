//! Mip chain generation.
//!
//! wgpu has no equivalent of `glGenerateMipmap`, so each level is rendered
//! from the one above it with a linear-filtered blit, once per array layer.

use std::collections::HashMap;

use crate::{
    data_structures::texture::{CubemapTexture, Texture},
    error::Result,
    pipelines::basic::{TargetDesc, mk_render_pipeline, mk_shader_module},
};

pub struct MipmapGenerator {
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
}

impl MipmapGenerator {
    /// Formats the generator can downsample: material textures and HDR cubes.
    pub const FORMATS: [wgpu::TextureFormat; 2] =
        [Texture::MATERIAL_FORMAT, CubemapTexture::FORMAT];

    pub fn new(device: &wgpu::Device) -> Result<Self> {
        let shader = mk_shader_module(device, "Mipmap Blit Shader", include_str!("blit.wgsl"))?;

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mipmap_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mipmap Pipeline Layout"),
            bind_group_layouts: &[Some(&layout)],
            immediate_size: 0,
        });

        let pipelines = Self::FORMATS
            .into_iter()
            .map(|format| {
                let pipeline = mk_render_pipeline(
                    device,
                    &format!("Mipmap Pipeline {format:?}"),
                    &pipeline_layout,
                    TargetDesc {
                        color_format: format,
                        blend: None,
                        depth_format: None,
                        cull_mode: None,
                    },
                    &[],
                    &shader,
                )?;
                Ok((format, pipeline))
            })
            .collect::<Result<HashMap<_, _>>>()?;

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("mipmap sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Ok(Self {
            layout,
            sampler,
            pipelines,
        })
    }

    /// Records passes filling levels `1..mip_level_count` of every layer of
    /// `texture` from level 0. The texture needs `RENDER_ATTACHMENT` and
    /// `TEXTURE_BINDING` usage.
    pub fn generate(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        texture: &wgpu::Texture,
    ) {
        let Some(pipeline) = self.pipelines.get(&texture.format()) else {
            log::warn!(
                "no mipmap pipeline for {:?}, leaving mip chain empty",
                texture.format()
            );
            return;
        };

        for layer in 0..texture.depth_or_array_layers() {
            for level in 1..texture.mip_level_count() {
                let src = layer_view(texture, layer, level - 1);
                let dst = layer_view(texture, layer, level);
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("mipmap_bind_group"),
                    layout: &self.layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&src),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(&self.sampler),
                        },
                    ],
                });

                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Mipmap Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &dst,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })],
                    depth_stencil_attachment: None,
                    occlusion_query_set: None,
                    timestamp_writes: None,
                    multiview_mask: None,
                });
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.draw(0..3, 0..1);
            }
        }
    }
}

fn layer_view(texture: &wgpu::Texture, layer: u32, level: u32) -> wgpu::TextureView {
    texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some("mipmap level view"),
        dimension: Some(wgpu::TextureViewDimension::D2),
        base_mip_level: level,
        mip_level_count: Some(1),
        base_array_layer: layer,
        array_layer_count: Some(1),
        ..Default::default()
    })
}
