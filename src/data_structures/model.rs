//! Meshes, texture references and the imported model.
//!
//! A [`Model`] is the result of importing one scene file: a flat list of
//! [`MeshUnit`]s in traversal order plus the [`TextureCache`] that owns every
//! texture those meshes sample.

use std::{fmt, ops::Range, path::Path, str::FromStr};

use wgpu::util::DeviceExt;

use crate::{
    data_structures::scene_graph::MeshData,
    error::{Error, Result},
    pipelines::pbr::ShadingProgram,
    resources::{self, ImportOptions, texture::TextureCache},
};

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tex_coords: [f32; 2],
}

impl Vertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 6]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// Semantic role of a material texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureRole {
    Albedo,
    Specular,
    Normal,
    Metallic,
    Roughness,
    Ao,
    Displacement,
    Emissive,
}

/// Role to shader name prefix. The order defines each role's binding block.
const ROLE_TABLE: [(TextureRole, &str); 8] = [
    (TextureRole::Albedo, "albedo"),
    (TextureRole::Specular, "specular"),
    (TextureRole::Normal, "normal"),
    (TextureRole::Metallic, "metallic"),
    (TextureRole::Roughness, "roughness"),
    (TextureRole::Ao, "ao"),
    (TextureRole::Displacement, "displacement"),
    (TextureRole::Emissive, "emissive"),
];

/// How many textures of one role a mesh can bind (`<role>Map1..=N`).
pub const MAPS_PER_ROLE: u32 = 1;

/// First texture unit available to materials; 0..=2 hold the IBL maps.
pub const MATERIAL_BASE_UNIT: u32 = 3;

/// Binding index of the shared sampler in the material group.
pub const MATERIAL_SAMPLER_BINDING: u32 = ROLE_TABLE.len() as u32 * MAPS_PER_ROLE;

impl TextureRole {
    pub const ALL: [TextureRole; 8] = [
        TextureRole::Albedo,
        TextureRole::Specular,
        TextureRole::Normal,
        TextureRole::Metallic,
        TextureRole::Roughness,
        TextureRole::Ao,
        TextureRole::Displacement,
        TextureRole::Emissive,
    ];

    pub fn index(self) -> u32 {
        match self {
            TextureRole::Albedo => 0,
            TextureRole::Specular => 1,
            TextureRole::Normal => 2,
            TextureRole::Metallic => 3,
            TextureRole::Roughness => 4,
            TextureRole::Ao => 5,
            TextureRole::Displacement => 6,
            TextureRole::Emissive => 7,
        }
    }

    pub fn uniform_prefix(self) -> &'static str {
        ROLE_TABLE[self.index() as usize].1
    }

    /// Shader-side name of the `instance`-th (1-based) texture of this role.
    pub fn uniform_name(self, instance: u32) -> String {
        format!("{}Map{}", self.uniform_prefix(), instance)
    }

    /// Texel bound when a mesh has no texture for this role.
    pub fn default_rgba(self) -> [u8; 4] {
        match self {
            TextureRole::Albedo | TextureRole::Ao => [255, 255, 255, 255],
            // Tangent-space +Z
            TextureRole::Normal => [128, 128, 255, 255],
            // glTF packs roughness in G and metallic in B.
            TextureRole::Metallic | TextureRole::Roughness => [0, 255, 0, 255],
            TextureRole::Specular | TextureRole::Displacement | TextureRole::Emissive => {
                [0, 0, 0, 255]
            }
        }
    }
}

impl FromStr for TextureRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ROLE_TABLE
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(role, _)| *role)
            .ok_or_else(|| Error::UnsupportedRole(s.to_string()))
    }
}

impl fmt::Display for TextureRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.uniform_prefix())
    }
}

/// Opaque id of a texture owned by a [`TextureCache`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub(crate) u32);

impl TextureHandle {
    pub fn id(self) -> u32 {
        self.0
    }
}

/// A cached texture as used by one material slot.
///
/// The role is call-site metadata: the same handle can appear under several
/// roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureRef {
    pub handle: TextureHandle,
    pub role: TextureRole,
}

/// Where a [`TextureRef`] ends up when its mesh is drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TextureSlot {
    pub texture: TextureRef,
    /// 1-based occurrence of this role within the mesh.
    pub instance: u32,
    pub unit: u32,
}

impl TextureSlot {
    pub fn uniform_name(&self) -> String {
        self.texture.role.uniform_name(self.instance)
    }

    /// Binding index in the material group, or `None` when the role already
    /// has [`MAPS_PER_ROLE`] textures bound.
    pub fn binding(&self) -> Option<u32> {
        (self.instance <= MAPS_PER_ROLE).then(|| self.unit - MATERIAL_BASE_UNIT)
    }
}

/// Assigns texture units, unique within one mesh.
///
/// Each role owns a block of [`MAPS_PER_ROLE`] units; the n-th texture of a
/// role lands n-1 units into its block. Textures past the block are numbered
/// in order after the last block and never get a binding.
pub fn assign_slots(textures: &[TextureRef]) -> Vec<TextureSlot> {
    let mut counters = [0u32; ROLE_TABLE.len()];
    let mut overflow = MATERIAL_BASE_UNIT + MATERIAL_SAMPLER_BINDING;
    textures
        .iter()
        .map(|texture| {
            let counter = &mut counters[texture.role.index() as usize];
            *counter += 1;
            let unit = if *counter <= MAPS_PER_ROLE {
                MATERIAL_BASE_UNIT + texture.role.index() * MAPS_PER_ROLE + (*counter - 1)
            } else {
                overflow += 1;
                overflow - 1
            };
            TextureSlot {
                texture: *texture,
                instance: *counter,
                unit,
            }
        })
        .collect()
}

/// Layout of the per-mesh material group: one texture per role slot and a
/// shared sampler.
pub fn material_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let mut entries: Vec<wgpu::BindGroupLayoutEntry> = (0..MATERIAL_SAMPLER_BINDING)
        .map(|binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension: wgpu::TextureViewDimension::D2,
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
            },
            count: None,
        })
        .collect();
    entries.push(wgpu::BindGroupLayoutEntry {
        binding: MATERIAL_SAMPLER_BINDING,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    });
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        entries: &entries,
        label: Some("material_bind_group_layout"),
    })
}

/// The draw calls a mesh needs. Implemented for [`wgpu::RenderPass`]; the
/// seam also lets tests count what a draw issues.
pub trait MeshPass {
    fn use_program(&mut self, program: &ShadingProgram);
    fn bind_material(&mut self, group: u32, bind_group: &wgpu::BindGroup);
    fn bind_geometry(&mut self, vertices: &wgpu::Buffer, indices: &wgpu::Buffer);
    fn draw_triangles(&mut self, indices: Range<u32>);
}

impl MeshPass for wgpu::RenderPass<'_> {
    fn use_program(&mut self, program: &ShadingProgram) {
        self.set_pipeline(&program.pipeline);
    }

    fn bind_material(&mut self, group: u32, bind_group: &wgpu::BindGroup) {
        self.set_bind_group(group, bind_group, &[]);
    }

    fn bind_geometry(&mut self, vertices: &wgpu::Buffer, indices: &wgpu::Buffer) {
        self.set_vertex_buffer(0, vertices.slice(..));
        self.set_index_buffer(indices.slice(..), wgpu::IndexFormat::Uint32);
    }

    fn draw_triangles(&mut self, indices: Range<u32>) {
        self.draw_indexed(indices, 0, 0..1);
    }
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl Drop for GpuMesh {
    fn drop(&mut self) {
        self.vertex_buffer.destroy();
        self.index_buffer.destroy();
    }
}

/// One drawable piece of geometry with the textures it samples.
pub struct MeshUnit {
    name: String,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    textures: Vec<TextureRef>,
    slots: Vec<TextureSlot>,
    gpu: Option<GpuMesh>,
}

impl MeshUnit {
    pub fn new(data: MeshData, textures: Vec<TextureRef>) -> Self {
        let slots = assign_slots(&textures);
        Self {
            name: data.name,
            vertices: data.vertices,
            indices: data.indices,
            textures,
            slots,
            gpu: None,
        }
    }

    /// Creates the vertex/index buffers and the material bind group. Slots a
    /// mesh leaves empty are filled with the cache's per-role defaults.
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, cache: &mut TextureCache) {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{:?} Vertex Buffer", self.name)),
            contents: bytemuck::cast_slice(&self.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{:?} Index Buffer", self.name)),
            contents: bytemuck::cast_slice(&self.indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let mut bound: Vec<Option<TextureRef>> = vec![None; MATERIAL_SAMPLER_BINDING as usize];
        for slot in &self.slots {
            match slot.binding() {
                Some(binding) => bound[binding as usize] = Some(slot.texture),
                None => log::warn!(
                    "mesh '{}': {} exceeds the {} {} map(s) a material can bind, skipping",
                    self.name,
                    slot.uniform_name(),
                    MAPS_PER_ROLE,
                    slot.texture.role
                ),
            }
        }

        cache.ensure_defaults(device, queue);
        let cache = &*cache;
        let views: Option<Vec<&wgpu::TextureView>> = bound
            .iter()
            .enumerate()
            .map(|(binding, texture)| {
                let role = TextureRole::ALL[binding / MAPS_PER_ROLE as usize];
                texture
                    .and_then(|t| cache.get(t.handle))
                    .or_else(|| cache.default_for(role))
                    .map(|t| &t.view)
            })
            .collect();
        let (Some(views), Some(sampler), Some(layout)) = (views, cache.sampler(), cache.material_layout()) else {
            log::error!("mesh '{}': material textures unavailable, not uploading", self.name);
            return;
        };

        let mut entries: Vec<wgpu::BindGroupEntry> = views
            .into_iter()
            .enumerate()
            .map(|(binding, view)| wgpu::BindGroupEntry {
                binding: binding as u32,
                resource: wgpu::BindingResource::TextureView(view),
            })
            .collect();
        entries.push(wgpu::BindGroupEntry {
            binding: MATERIAL_SAMPLER_BINDING,
            resource: wgpu::BindingResource::Sampler(sampler),
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &entries,
            label: Some(&format!("{:?} material_bind_group", self.name)),
        });

        self.gpu = Some(GpuMesh {
            vertex_buffer,
            index_buffer,
            bind_group,
        });
    }

    /// Binds this mesh's textures and issues one indexed draw over its
    /// triangle list. Does nothing before [`upload`](Self::upload).
    pub fn draw<P: MeshPass>(&self, program: &ShadingProgram, pass: &mut P) {
        let Some(gpu) = &self.gpu else {
            log::warn!("mesh '{}' drawn before upload", self.name);
            return;
        };
        pass.bind_material(program.material_group, &gpu.bind_group);
        pass.bind_geometry(&gpu.vertex_buffer, &gpu.index_buffer);
        pass.draw_triangles(0..self.indices.len() as u32);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn textures(&self) -> &[TextureRef] {
        &self.textures
    }

    pub fn slots(&self) -> &[TextureSlot] {
        &self.slots
    }

    pub fn is_uploaded(&self) -> bool {
        self.gpu.is_some()
    }
}

/// An imported scene: meshes in traversal order and the textures they use.
///
/// Meshes are declared first so they are dropped before the textures.
pub struct Model {
    pub(crate) meshes: Vec<MeshUnit>,
    pub(crate) textures: TextureCache,
}

impl Model {
    pub fn empty() -> Self {
        Self {
            meshes: Vec::new(),
            textures: TextureCache::new(),
        }
    }

    /// Imports `path`, logging and returning an empty model on failure.
    pub fn load(path: impl AsRef<Path>, device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let path = path.as_ref();
        match Self::try_load(path, device, queue, &ImportOptions::default()) {
            Ok(model) => model,
            Err(e) => {
                log::error!("could not load {}: {}", path.display(), e);
                Self::empty()
            }
        }
    }

    pub fn try_load(
        path: impl AsRef<Path>,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        options: &ImportOptions,
    ) -> Result<Self> {
        resources::load_model(path.as_ref(), device, queue, options)
    }

    pub fn draw<P: MeshPass>(&self, program: &ShadingProgram, pass: &mut P) {
        pass.use_program(program);
        for mesh in &self.meshes {
            mesh.draw(program, pass);
        }
    }

    pub fn meshes(&self) -> &[MeshUnit] {
        &self.meshes
    }

    pub fn textures(&self) -> &TextureCache {
        &self.textures
    }

    /// Number of distinct images this model decoded.
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tex(id: u32, role: TextureRole) -> TextureRef {
        TextureRef {
            handle: TextureHandle(id),
            role,
        }
    }

    #[test]
    fn role_table_round_trips_every_role() {
        for role in TextureRole::ALL {
            assert_eq!(role.uniform_prefix().parse::<TextureRole>().unwrap(), role);
            assert_eq!(ROLE_TABLE[role.index() as usize].0, role);
        }
    }

    #[test]
    fn unknown_role_names_are_rejected() {
        let err = "height".parse::<TextureRole>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedRole(name) if name == "height"));
    }

    #[test]
    fn repeated_roles_get_increasing_instances() {
        let slots = assign_slots(&[
            tex(0, TextureRole::Albedo),
            tex(1, TextureRole::Normal),
            tex(2, TextureRole::Albedo),
        ]);

        assert_eq!(slots[0].uniform_name(), "albedoMap1");
        assert_eq!(slots[1].uniform_name(), "normalMap1");
        assert_eq!(slots[2].uniform_name(), "albedoMap2");
        assert_eq!(slots[0].unit, MATERIAL_BASE_UNIT);
        assert!(slots[2].unit >= MATERIAL_BASE_UNIT + MATERIAL_SAMPLER_BINDING);
    }

    #[test]
    fn units_are_distinct_within_a_mesh() {
        let slots = assign_slots(&[
            tex(0, TextureRole::Albedo),
            tex(1, TextureRole::Albedo),
            tex(2, TextureRole::Specular),
            tex(3, TextureRole::Emissive),
            tex(4, TextureRole::Albedo),
            tex(5, TextureRole::Emissive),
        ]);

        let mut units: Vec<u32> = slots.iter().map(|s| s.unit).collect();
        units.sort_unstable();
        units.dedup();
        assert_eq!(units.len(), slots.len());

        let mut bindings: Vec<u32> = slots.iter().filter_map(|s| s.binding()).collect();
        bindings.sort_unstable();
        assert_eq!(bindings, [0, 1, 7]);
        assert_eq!(slots[1].uniform_name(), "albedoMap2");
        assert_eq!(slots[2].uniform_name(), "specularMap1");
    }

    #[test]
    fn only_bounded_instances_get_a_binding() {
        let slots = assign_slots(&[
            tex(0, TextureRole::Emissive),
            tex(1, TextureRole::Emissive),
        ]);
        assert_eq!(slots[0].binding(), Some(TextureRole::Emissive.index() * MAPS_PER_ROLE));
        assert_eq!(slots[1].binding(), None);
    }

    #[test]
    fn material_units_start_after_ibl_units() {
        let slots = assign_slots(&[tex(0, TextureRole::Albedo)]);
        assert_eq!(slots[0].unit, 3);
    }

    #[test]
    fn vertex_layout_matches_struct() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        assert_eq!(Vertex::desc().array_stride, 32);
    }
}
