//! The render-time shading program.
//!
//! Bind groups follow the shading contract: group 0 holds the per-draw
//! `frame` uniform, group 1 the three IBL products and group 2 one mesh's
//! material textures.

use cgmath::{Matrix4, SquareMatrix};
use wgpu::util::DeviceExt;

use crate::{
    camera::Camera,
    data_structures::{
        model::{Vertex, material_layout},
        scene_graph::normal_matrix,
        texture::Texture,
    },
    error::Result,
    ibl::IblMaps,
    pipelines::basic::{TargetDesc, mk_render_pipeline, mk_shader_module},
};

pub const FRAME_GROUP: u32 = 0;
pub const IBL_GROUP: u32 = 1;
pub const MATERIAL_GROUP: u32 = 2;

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShadingUniform {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    /// `mat3x3` columns are 16-byte aligned in WGSL.
    pub normal_matrix: [[f32; 4]; 3],
    pub cam_pos: [f32; 3],
    _padding: f32,
}

impl ShadingUniform {
    pub fn new(model: Matrix4<f32>, camera: &Camera) -> Self {
        let normal = normal_matrix(&model);
        Self {
            model: model.into(),
            view: camera.view_matrix().into(),
            projection: camera.projection_matrix().into(),
            normal_matrix: [
                normal.x.extend(0.0).into(),
                normal.y.extend(0.0).into(),
                normal.z.extend(0.0).into(),
            ],
            cam_pos: camera.position.into(),
            _padding: 0.0,
        }
    }

    /// Imported vertices are already in world space.
    pub fn world(camera: &Camera) -> Self {
        Self::new(Matrix4::identity(), camera)
    }
}

pub struct ShadingProgram {
    pub pipeline: wgpu::RenderPipeline,
    pub frame_layout: wgpu::BindGroupLayout,
    pub ibl_layout: wgpu::BindGroupLayout,
    pub material_layout: wgpu::BindGroupLayout,
    pub material_group: u32,
}

impl ShadingProgram {
    pub fn new(device: &wgpu::Device, color_format: wgpu::TextureFormat) -> Result<Self> {
        let shader = mk_shader_module(device, "PBR Shader", include_str!("pbr.wgsl"))?;

        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
            label: Some("frame_bind_group_layout"),
        });
        let ibl_layout = ibl_layout(device);
        let material_layout = material_layout(device);

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("PBR Pipeline Layout"),
            bind_group_layouts: &[Some(&frame_layout), Some(&ibl_layout), Some(&material_layout)],
            immediate_size: 0,
        });
        let pipeline = mk_render_pipeline(
            device,
            "PBR Pipeline",
            &layout,
            TargetDesc {
                color_format,
                blend: Some(wgpu::BlendState::REPLACE),
                depth_format: Some(Texture::DEPTH_FORMAT),
                cull_mode: Some(wgpu::Face::Back),
            },
            &[Vertex::desc()],
            &shader,
        )?;

        Ok(Self {
            pipeline,
            frame_layout,
            ibl_layout,
            material_layout,
            material_group: MATERIAL_GROUP,
        })
    }

    pub fn uniform_buffer(&self, device: &wgpu::Device, uniform: &ShadingUniform) -> wgpu::Buffer {
        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Frame Buffer"),
            contents: bytemuck::cast_slice(&[*uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        })
    }

    pub fn frame_bind_group(&self, device: &wgpu::Device, buffer: &wgpu::Buffer) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.frame_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some("frame_bind_group"),
        })
    }

    /// Binds the irradiance cube, the pre-filtered cube and the BRDF LUT.
    pub fn ibl_bind_group(&self, device: &wgpu::Device, maps: &IblMaps) -> wgpu::BindGroup {
        let lut_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("brdf lut sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &self.ibl_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&maps.irradiance.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&maps.prefilter.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&maps.brdf_lut.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&maps.prefilter.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&lut_sampler),
                },
            ],
            label: Some("ibl_bind_group"),
        })
    }
}

fn ibl_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let texture = |binding, view_dimension| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension,
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
        },
        count: None,
    };
    let sampler = |binding| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    };
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &[
            texture(0, wgpu::TextureViewDimension::Cube),
            texture(1, wgpu::TextureViewDimension::Cube),
            texture(2, wgpu::TextureViewDimension::D2),
            sampler(3),
            sampler(4),
        ],
        label: Some("ibl_bind_group_layout"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Projection;
    use cgmath::{Deg, Point3, Vector3};

    #[test]
    fn uniform_matches_wgsl_layout() {
        assert_eq!(std::mem::size_of::<ShadingUniform>(), 256);
    }

    #[test]
    fn normal_matrix_is_inverse_transpose_of_model() {
        let camera = Camera::new(
            Point3::new(0.0, 0.0, 3.0),
            Vector3::new(0.0, 0.0, -1.0),
            Vector3::new(0.0, 1.0, 0.0),
            Projection::Perspective {
                fovy: Deg(45.0).into(),
                aspect: 1.0,
                znear: 0.1,
                zfar: 100.0,
            },
        );
        let uniform = ShadingUniform::new(Matrix4::from_nonuniform_scale(2.0, 1.0, 1.0), &camera);
        assert_eq!(uniform.normal_matrix[0], [0.5, 0.0, 0.0, 0.0]);
        assert_eq!(uniform.normal_matrix[1], [0.0, 1.0, 0.0, 0.0]);
        assert_eq!(uniform.cam_pos, [0.0, 0.0, 3.0]);
    }
}
