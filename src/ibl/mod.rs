//! Image-based lighting precomputation.
//!
//! [`IblPrecomputer`] turns an equirectangular HDR panorama into the three
//! products the shading pass binds: a diffuse irradiance cube, a specular
//! cube pre-filtered over a roughness mip chain, and the split-sum BRDF
//! lookup table. The four stages run strictly in order; each later stage
//! samples what an earlier one wrote.

pub mod capture;

use instant::Instant;
use wgpu::util::DeviceExt;

use crate::{
    data_structures::texture::{CubemapTexture, Texture, mip_level_count},
    error::{Error, Result},
    ibl::capture::{CaptureRig, CubeFace, cube_vertex_layout},
    pipelines::{
        basic::{TargetDesc, mk_render_pipeline, mk_shader_module},
        mipmap::MipmapGenerator,
    },
    resources::hdr::HdrPanorama,
};

/// Upper bound on prefilter levels; matches the parameter array in the shaders.
pub const MAX_PREFILTER_MIPS: u32 = 16;

pub const BRDF_LUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rg16Float;

/// Resolutions and sample counts of the IBL passes.
#[derive(Clone, Debug, PartialEq)]
pub struct IblConfig {
    pub environment_size: u32,
    pub irradiance_size: u32,
    pub prefilter_size: u32,
    pub prefilter_mip_levels: u32,
    pub brdf_lut_size: u32,
    /// Angular step, in radians, of the irradiance integration grid.
    pub irradiance_sample_delta: f32,
    pub prefilter_sample_count: u32,
    pub brdf_sample_count: u32,
}

impl Default for IblConfig {
    fn default() -> Self {
        Self {
            environment_size: 512,
            irradiance_size: 32,
            prefilter_size: 128,
            prefilter_mip_levels: 5,
            brdf_lut_size: 512,
            irradiance_sample_delta: 0.025,
            prefilter_sample_count: 1024,
            brdf_sample_count: 1024,
        }
    }
}

impl IblConfig {
    pub fn with_environment_size(mut self, size: u32) -> Self {
        self.environment_size = size;
        self
    }

    pub fn with_irradiance_size(mut self, size: u32) -> Self {
        self.irradiance_size = size;
        self
    }

    pub fn with_prefilter(mut self, size: u32, mip_levels: u32) -> Self {
        self.prefilter_size = size;
        self.prefilter_mip_levels = mip_levels;
        self
    }

    pub fn with_brdf_lut_size(mut self, size: u32) -> Self {
        self.brdf_lut_size = size;
        self
    }

    pub fn with_sample_counts(mut self, prefilter: u32, brdf: u32) -> Self {
        self.prefilter_sample_count = prefilter;
        self.brdf_sample_count = brdf;
        self
    }

    pub fn with_irradiance_sample_delta(mut self, delta: f32) -> Self {
        self.irradiance_sample_delta = delta;
        self
    }

    /// Clamps values the passes cannot honour; `max_dimension` is the
    /// device's largest 2D texture edge.
    fn validated(mut self, max_dimension: u32) -> Self {
        for (name, size) in [
            ("environment", &mut self.environment_size),
            ("irradiance", &mut self.irradiance_size),
            ("prefilter", &mut self.prefilter_size),
            ("brdf lut", &mut self.brdf_lut_size),
        ] {
            if *size > max_dimension {
                log::warn!("{name} size {size} exceeds the device limit, clamping to {max_dimension}");
            }
            *size = (*size).clamp(1, max_dimension.max(1));
        }
        let max_mips = mip_level_count(self.prefilter_size, self.prefilter_size).min(MAX_PREFILTER_MIPS);
        if !(1..=max_mips).contains(&self.prefilter_mip_levels) {
            log::warn!(
                "{} prefilter mip levels requested, clamping to 1..={max_mips}",
                self.prefilter_mip_levels
            );
            self.prefilter_mip_levels = self.prefilter_mip_levels.clamp(1, max_mips);
        }
        if self.irradiance_sample_delta.is_nan() || self.irradiance_sample_delta <= 0.0 {
            self.irradiance_sample_delta = IblConfig::default().irradiance_sample_delta;
        }
        self.prefilter_sample_count = self.prefilter_sample_count.max(1);
        self.brdf_sample_count = self.brdf_sample_count.max(1);
        self
    }
}

/// Roughness assigned to prefilter level `mip` of `mip_levels`: level 0 is
/// mirror-like, the last level fully rough.
pub fn prefilter_roughness(mip: u32, mip_levels: u32) -> f32 {
    if mip_levels <= 1 {
        return 0.0;
    }
    mip as f32 / (mip_levels - 1) as f32
}

/// Edge length of level `mip` of a `base`-sized chain, never below one texel.
pub fn mip_size(base: u32, mip: u32) -> u32 {
    (base >> mip).max(1)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Projection,
    Irradiance,
    Prefilter,
    BrdfIntegration,
    Done,
}

impl Stage {
    pub fn next(self) -> Stage {
        match self {
            Stage::Projection => Stage::Irradiance,
            Stage::Irradiance => Stage::Prefilter,
            Stage::Prefilter => Stage::BrdfIntegration,
            Stage::BrdfIntegration | Stage::Done => Stage::Done,
        }
    }

    /// Fails unless `requested` is the stage that runs next.
    pub fn require(self, requested: Stage) -> Result<()> {
        if self == requested {
            Ok(())
        } else {
            Err(Error::StageOrder {
                expected: self,
                requested,
            })
        }
    }
}

/// The products the shading pass samples.
pub struct IblMaps {
    pub irradiance: CubemapTexture,
    pub prefilter: CubemapTexture,
    pub brdf_lut: Texture,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct CaptureParams {
    mips: [[f32; 4]; MAX_PREFILTER_MIPS as usize],
    settings: [f32; 4],
}

impl CaptureParams {
    fn new(config: &IblConfig) -> Self {
        let mut mips = [[0.0; 4]; MAX_PREFILTER_MIPS as usize];
        for (mip, params) in mips.iter_mut().enumerate().take(config.prefilter_mip_levels as usize) {
            params[0] = prefilter_roughness(mip as u32, config.prefilter_mip_levels);
        }
        Self {
            mips,
            settings: [
                config.irradiance_sample_delta,
                config.prefilter_sample_count as f32,
                config.brdf_sample_count as f32,
                config.environment_size as f32,
            ],
        }
    }
}

struct CapturePipelines {
    capture_layout: wgpu::BindGroupLayout,
    panorama_layout: wgpu::BindGroupLayout,
    environment_layout: wgpu::BindGroupLayout,
    equirect: wgpu::RenderPipeline,
    irradiance: wgpu::RenderPipeline,
    prefilter: wgpu::RenderPipeline,
    brdf: wgpu::RenderPipeline,
}

impl CapturePipelines {
    fn new(device: &wgpu::Device) -> Result<Self> {
        let uniform = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let capture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("capture_bind_group_layout"),
            entries: &[uniform(0), uniform(1)],
        });
        let source_layout = |label: &str, view_dimension, filterable: bool| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            multisampled: false,
                            view_dimension,
                            sample_type: wgpu::TextureSampleType::Float { filterable },
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(if filterable {
                            wgpu::SamplerBindingType::Filtering
                        } else {
                            wgpu::SamplerBindingType::NonFiltering
                        }),
                        count: None,
                    },
                ],
            })
        };
        // RGBA32F is not filterable without an optional feature.
        let panorama_layout = source_layout("panorama_bind_group_layout", wgpu::TextureViewDimension::D2, false);
        let environment_layout =
            source_layout("environment_bind_group_layout", wgpu::TextureViewDimension::Cube, true);

        let cube_pass = |label: &str, source: &wgpu::BindGroupLayout, body: &str| -> Result<wgpu::RenderPipeline> {
            let code = [include_str!("capture.wgsl"), include_str!("cube.wgsl"), body].concat();
            let shader = mk_shader_module(device, &format!("{label} Shader"), &code)?;
            let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("{label} Pipeline Layout")),
                bind_group_layouts: &[Some(&capture_layout), Some(source)],
                immediate_size: 0,
            });
            mk_render_pipeline(
                device,
                &format!("{label} Pipeline"),
                &layout,
                TargetDesc {
                    color_format: CubemapTexture::FORMAT,
                    blend: None,
                    depth_format: Some(Texture::DEPTH_FORMAT),
                    cull_mode: None,
                },
                &[cube_vertex_layout()],
                &shader,
            )
        };
        let equirect = cube_pass("Equirect", &panorama_layout, include_str!("equirect.wgsl"))?;
        let irradiance = cube_pass("Irradiance", &environment_layout, include_str!("irradiance.wgsl"))?;
        let prefilter = cube_pass("Prefilter", &environment_layout, include_str!("prefilter.wgsl"))?;

        let brdf_source = [include_str!("capture.wgsl"), include_str!("brdf.wgsl")].concat();
        let brdf_shader = mk_shader_module(device, "BRDF Shader", &brdf_source)?;
        let brdf_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("BRDF Pipeline Layout"),
            bind_group_layouts: &[Some(&capture_layout)],
            immediate_size: 0,
        });
        let brdf = mk_render_pipeline(
            device,
            "BRDF Pipeline",
            &brdf_layout,
            TargetDesc {
                color_format: BRDF_LUT_FORMAT,
                blend: None,
                depth_format: Some(Texture::DEPTH_FORMAT),
                cull_mode: None,
            },
            &[],
            &brdf_shader,
        )?;

        Ok(Self {
            capture_layout,
            panorama_layout,
            environment_layout,
            equirect,
            irradiance,
            prefilter,
            brdf,
        })
    }
}

/// Runs the four IBL stages against one panorama.
///
/// Each stage method records and submits its passes before returning.
/// Calling a stage out of order fails with [`Error::StageOrder`] and leaves
/// the precomputer unchanged.
pub struct IblPrecomputer {
    config: IblConfig,
    stage: Stage,
    pipelines: CapturePipelines,
    mipmaps: MipmapGenerator,
    rig: CaptureRig,
    params: wgpu::Buffer,
    capture_bind_group: wgpu::BindGroup,
    environment: Option<CubemapTexture>,
    irradiance: Option<CubemapTexture>,
    prefilter: Option<CubemapTexture>,
    brdf_lut: Option<Texture>,
}

impl IblPrecomputer {
    pub fn new(device: &wgpu::Device, config: IblConfig) -> Result<Self> {
        let config = config.validated(device.limits().max_texture_dimension_2d);
        let pipelines = CapturePipelines::new(device)?;
        let mipmaps = MipmapGenerator::new(device)?;
        let rig = CaptureRig::new(device);
        let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Capture Params Buffer"),
            contents: bytemuck::cast_slice(&[CaptureParams::new(&config)]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let capture_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("capture_bind_group"),
            layout: &pipelines.capture_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: rig.views_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: params.as_entire_binding(),
                },
            ],
        });

        Ok(Self {
            config,
            stage: Stage::Projection,
            pipelines,
            mipmaps,
            rig,
            params,
            capture_bind_group,
            environment: None,
            irradiance: None,
            prefilter: None,
            brdf_lut: None,
        })
    }

    pub fn config(&self) -> &IblConfig {
        &self.config
    }

    /// The stage the next call must run.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The environment cube, available once projection ran and until
    /// [`finish`](Self::finish).
    pub fn environment(&self) -> Option<&CubemapTexture> {
        self.environment.as_ref()
    }

    fn source_bind_group(
        &self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        view: &wgpu::TextureView,
        sampler: &wgpu::Sampler,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("capture_source_bind_group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }

    /// Stage 1: projects `panorama` onto the six faces of the environment
    /// cube and fills its mip chain.
    pub fn project(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, panorama: &Texture) -> Result<()> {
        self.stage.require(Stage::Projection)?;
        let start = Instant::now();
        let size = self.config.environment_size;
        let environment = CubemapTexture::new(device, size, mip_level_count(size, size), "environment cube");

        let nearest;
        let sampler = match &panorama.sampler {
            Some(sampler) => sampler,
            None => {
                nearest = device.create_sampler(&wgpu::SamplerDescriptor::default());
                &nearest
            }
        };
        let source = self.source_bind_group(device, &self.pipelines.panorama_layout, &panorama.view, sampler);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Projection Encoder"),
        });
        self.rig.begin_capture(device, size, size);
        for face in CubeFace::ALL {
            let mut pass = self.rig.capture_face(&mut encoder, &environment, face, 0);
            pass.set_pipeline(&self.pipelines.equirect);
            pass.set_bind_group(0, &self.capture_bind_group, &[]);
            pass.set_bind_group(1, &source, &[]);
            self.rig.draw_cube(&mut pass, face.layer());
        }
        self.mipmaps.generate(device, &mut encoder, &environment.texture);
        queue.submit(Some(encoder.finish()));

        log::info!("IBL projection: {size}x{size} per face in {:?}", start.elapsed());
        self.environment = Some(environment);
        self.stage = self.stage.next();
        Ok(())
    }

    fn environment_source(&self, device: &wgpu::Device) -> Result<wgpu::BindGroup> {
        let environment = self.environment.as_ref().ok_or(Error::StageOrder {
            expected: Stage::Projection,
            requested: self.stage,
        })?;
        Ok(self.source_bind_group(
            device,
            &self.pipelines.environment_layout,
            &environment.view,
            &environment.sampler,
        ))
    }

    /// Stage 2: integrates the environment over the hemisphere around each
    /// texel of the irradiance cube.
    pub fn convolve_irradiance(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<()> {
        self.stage.require(Stage::Irradiance)?;
        let start = Instant::now();
        let size = self.config.irradiance_size;
        let irradiance = CubemapTexture::new(device, size, 1, "irradiance cube");
        let source = self.environment_source(device)?;

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Irradiance Encoder"),
        });
        self.rig.begin_capture(device, size, size);
        for face in CubeFace::ALL {
            let mut pass = self.rig.capture_face(&mut encoder, &irradiance, face, 0);
            pass.set_pipeline(&self.pipelines.irradiance);
            pass.set_bind_group(0, &self.capture_bind_group, &[]);
            pass.set_bind_group(1, &source, &[]);
            self.rig.draw_cube(&mut pass, face.layer());
        }
        queue.submit(Some(encoder.finish()));

        log::info!("IBL irradiance: {size}x{size} per face in {:?}", start.elapsed());
        self.irradiance = Some(irradiance);
        self.stage = self.stage.next();
        Ok(())
    }

    /// Stage 3: fills each prefilter level with the environment convolved
    /// at that level's roughness. The capture rig is resized per level.
    pub fn prefilter(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<()> {
        self.stage.require(Stage::Prefilter)?;
        let start = Instant::now();
        let base = self.config.prefilter_size;
        let mip_levels = self.config.prefilter_mip_levels;
        let prefilter = CubemapTexture::new(device, base, mip_levels, "prefilter cube");
        let source = self.environment_source(device)?;

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Prefilter Encoder"),
        });
        for mip in 0..mip_levels {
            let size = mip_size(base, mip);
            self.rig.begin_capture(device, size, size);
            log::debug!(
                "prefilter level {mip}: {size}x{size}, roughness {}",
                prefilter_roughness(mip, mip_levels)
            );
            for face in CubeFace::ALL {
                let mut pass = self.rig.capture_face(&mut encoder, &prefilter, face, mip);
                pass.set_pipeline(&self.pipelines.prefilter);
                pass.set_bind_group(0, &self.capture_bind_group, &[]);
                pass.set_bind_group(1, &source, &[]);
                self.rig.draw_cube(&mut pass, face.layer() + CubeFace::ALL.len() as u32 * mip);
            }
        }
        queue.submit(Some(encoder.finish()));

        log::info!(
            "IBL prefilter: {base}x{base} base, {mip_levels} levels in {:?}",
            start.elapsed()
        );
        self.prefilter = Some(prefilter);
        self.stage = self.stage.next();
        Ok(())
    }

    /// Stage 4: integrates the split-sum BRDF into a 2D lookup table.
    pub fn integrate_brdf(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<()> {
        self.stage.require(Stage::BrdfIntegration)?;
        let start = Instant::now();
        let size = self.config.brdf_lut_size;
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("brdf lut"),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: BRDF_LUT_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("BRDF Encoder"),
        });
        self.rig.begin_capture(device, size, size);
        {
            let mut pass = self.rig.capture_view(&mut encoder, &view);
            pass.set_pipeline(&self.pipelines.brdf);
            pass.set_bind_group(0, &self.capture_bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        queue.submit(Some(encoder.finish()));

        log::info!("IBL BRDF LUT: {size}x{size} in {:?}", start.elapsed());
        self.brdf_lut = Some(Texture {
            texture,
            view,
            sampler: None,
        });
        self.stage = self.stage.next();
        Ok(())
    }

    /// Hands over the three products. The environment cube, the capture
    /// rig and the pass pipelines are released.
    pub fn finish(mut self) -> Result<IblMaps> {
        self.stage.require(Stage::Done)?;
        match (self.irradiance.take(), self.prefilter.take(), self.brdf_lut.take()) {
            (Some(irradiance), Some(prefilter), Some(brdf_lut)) => Ok(IblMaps {
                irradiance,
                prefilter,
                brdf_lut,
            }),
            _ => Err(Error::StageOrder {
                expected: Stage::Projection,
                requested: Stage::Done,
            }),
        }
    }

    /// Runs every stage on `panorama` and returns the products.
    pub fn run(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        panorama: &HdrPanorama,
        config: IblConfig,
    ) -> Result<IblMaps> {
        let start = Instant::now();
        let mut precomputer = Self::new(device, config)?;
        let panorama = panorama.upload(device, queue);
        precomputer.project(device, queue, &panorama)?;
        precomputer.convolve_irradiance(device, queue)?;
        precomputer.prefilter(device, queue)?;
        precomputer.integrate_brdf(device, queue)?;
        let maps = precomputer.finish()?;
        panorama.texture.destroy();
        log::info!("IBL precomputation finished in {:?}", start.elapsed());
        Ok(maps)
    }
}

impl Drop for IblPrecomputer {
    fn drop(&mut self) {
        self.params.destroy();
        if let Some(environment) = self.environment.take() {
            environment.texture.destroy();
        }
    }
}
