use std::{collections::HashMap, path::Path};

use crate::{
    data_structures::{
        model::{self, TextureHandle, TextureRef, TextureRole},
        scene_graph::TextureSource,
        texture::{self, Texture},
    },
    error::{Error, Result},
    pipelines::mipmap::MipmapGenerator,
};

/// Owns every material texture of one model.
///
/// Each source is decoded at most once; later requests for the same source
/// return the existing handle, tagged with whatever role the caller asked
/// for. Not meant for concurrent use.
pub struct TextureCache {
    textures: Vec<Texture>,
    by_key: HashMap<String, TextureHandle>,
    defaults: Vec<Texture>,
    sampler: Option<wgpu::Sampler>,
    material_layout: Option<wgpu::BindGroupLayout>,
    mipmaps: Option<MipmapGenerator>,
    decodes: usize,
}

impl TextureCache {
    pub fn new() -> Self {
        Self {
            textures: Vec::new(),
            by_key: HashMap::new(),
            defaults: Vec::new(),
            sampler: None,
            material_layout: None,
            mipmaps: None,
            decodes: 0,
        }
    }

    /// Returns the texture for `source`, decoding and uploading it on first use.
    pub fn acquire(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        source: &TextureSource,
        role: TextureRole,
    ) -> Result<TextureRef> {
        let key = source.key();
        if let Some(&handle) = self.by_key.get(&key) {
            log::debug!("texture cache hit: {key} as {role}");
            return Ok(TextureRef { handle, role });
        }

        let img = self.decode(source)?;
        let max = device.limits().max_texture_dimension_2d;
        if img.width() > max || img.height() > max {
            return Err(Error::AssetDecode {
                path: key.into(),
                reason: format!(
                    "{}x{} exceeds the device limit of {max}",
                    img.width(),
                    img.height()
                ),
            });
        }

        let mipmaps = match self.mipmaps.take() {
            Some(mipmaps) => mipmaps,
            None => MipmapGenerator::new(device)?,
        };
        let texture = Texture::from_image(device, queue, &mipmaps, &img, &key);
        self.mipmaps = Some(mipmaps);

        let handle = TextureHandle(self.textures.len() as u32);
        self.textures.push(texture);
        self.by_key.insert(key, handle);
        Ok(TextureRef { handle, role })
    }

    fn decode(&mut self, source: &TextureSource) -> Result<image::DynamicImage> {
        self.decodes += 1;
        let decode_err = |reason: String| Error::AssetDecode {
            path: source.key().into(),
            reason,
        };
        let img = match source {
            TextureSource::Path(path) => {
                let bytes = load_binary(path).map_err(|e| decode_err(e.to_string()))?;
                image::load_from_memory(&bytes)
            }
            TextureSource::Embedded { bytes, .. } => image::load_from_memory(bytes),
        }
        .map_err(|e| decode_err(e.to_string()))?;
        log::debug!(
            "decoded {} ({}x{}, {:?})",
            source.key(),
            img.width(),
            img.height(),
            img.color()
        );
        Ok(img)
    }

    /// Creates the per-role fallback textures, the shared sampler and the
    /// material bind group layout.
    pub fn ensure_defaults(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        if self.defaults.is_empty() {
            self.defaults = TextureRole::ALL
                .iter()
                .map(|role| Texture::solid(device, queue, role.default_rgba(), &format!("default {role}")))
                .collect();
        }
        if self.sampler.is_none() {
            self.sampler = Some(texture::create_material_sampler(device));
        }
        if self.material_layout.is_none() {
            self.material_layout = Some(model::material_layout(device));
        }
    }

    pub fn get(&self, handle: TextureHandle) -> Option<&Texture> {
        self.textures.get(handle.0 as usize)
    }

    pub fn handle_for(&self, key: &str) -> Option<TextureHandle> {
        self.by_key.get(key).copied()
    }

    pub fn default_for(&self, role: TextureRole) -> Option<&Texture> {
        self.defaults.get(role.index() as usize)
    }

    pub fn sampler(&self) -> Option<&wgpu::Sampler> {
        self.sampler.as_ref()
    }

    /// Layout every mesh's material bind group is built against.
    pub fn material_layout(&self) -> Option<&wgpu::BindGroupLayout> {
        self.material_layout.as_ref()
    }

    /// How many times an image was decoded, failed attempts included.
    pub fn decode_count(&self) -> usize {
        self.decodes
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

impl Default for TextureCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TextureCache {
    fn drop(&mut self) {
        for texture in self.textures.iter().chain(&self.defaults) {
            texture.texture.destroy();
        }
    }
}

pub fn load_binary(path: &Path) -> Result<Vec<u8>> {
    Ok(std::fs::read(path)?)
}
