use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use cgmath::{Matrix4, SquareMatrix};

use crate::{
    data_structures::{
        model::{MeshUnit, Model, TextureRef, TextureRole},
        scene_graph::SceneAsset,
    },
    error::{Error, Result},
    resources::texture::TextureCache,
};

/**
 * This module contains all logic for loading meshes, textures and panoramas from external files.
 */
pub mod gltf;
pub mod hdr;
pub mod obj;
pub mod texture;

#[derive(Clone, Debug, Default)]
pub struct ImportOptions {
    /// Directory relative texture paths are resolved against. Defaults to the
    /// directory of the scene file.
    pub texture_dir: Option<PathBuf>,
}

impl ImportOptions {
    pub fn with_texture_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.texture_dir = Some(dir.into());
        self
    }

    fn texture_dir_for(&self, scene: &Path) -> PathBuf {
        self.texture_dir.clone().unwrap_or_else(|| {
            scene
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
        })
    }
}

/// Reads a scene file into its CPU-side tree, picking the parser by extension.
pub fn parse_scene(path: &Path, options: &ImportOptions) -> Result<SceneAsset> {
    let texture_dir = options.texture_dir_for(path);
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());
    match extension.as_deref() {
        Some("gltf") | Some("glb") => self::gltf::parse(path, &texture_dir),
        Some("obj") => self::obj::parse(path, &texture_dir),
        _ => Err(Error::SceneParse(format!(
            "{}: unsupported scene format",
            path.display()
        ))),
    }
}

/// Imports a scene file into a GPU-ready [`Model`].
///
/// The node tree is walked depth first; every geometry reference is baked
/// into world space with its node's effective transform and becomes one
/// [`MeshUnit`]. Materials are resolved through the model's [`TextureCache`]
/// the first time a mesh uses them. Buffers are uploaded once the walk is
/// complete.
pub fn load_model(
    path: &Path,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    options: &ImportOptions,
) -> Result<Model> {
    let start = instant::Instant::now();
    let mut asset = parse_scene(path, options)?;
    if let Some(reason) = asset.incomplete.take() {
        return Err(Error::SceneParse(format!("{}: incomplete scene: {reason}", path.display())));
    }
    let Some(root) = asset.root.take() else {
        return Err(Error::SceneParse(format!("{}: scene has no root node", path.display())));
    };
    for mesh in &mut asset.meshes {
        mesh.retain_valid_faces();
        mesh.generate_normals();
    }

    let mut model = Model::empty();
    let mut resolved: HashMap<usize, Vec<TextureRef>> = HashMap::new();
    root.walk(&Matrix4::identity(), &mut |node, effective| {
        for &index in &node.meshes {
            let Some(raw) = asset.meshes.get(index) else {
                log::warn!("node '{}' references missing mesh {index}", node.name);
                continue;
            };
            if raw.faces.is_empty() {
                log::warn!("mesh '{}' has no triangles, skipping", raw.name);
                continue;
            }
            let textures = match raw.material {
                Some(material) => resolved
                    .entry(material)
                    .or_insert_with(|| {
                        resolve_material(&asset, material, device, queue, &mut model.textures)
                    })
                    .clone(),
                None => Vec::new(),
            };
            model.meshes.push(MeshUnit::new(raw.bake(effective), textures));
        }
    });

    let Model { meshes, textures } = &mut model;
    for mesh in meshes.iter_mut() {
        mesh.upload(device, queue, textures);
    }

    log::info!(
        "loaded {}: {} meshes, {} textures in {:?}",
        path.display(),
        model.meshes.len(),
        model.textures.len(),
        start.elapsed()
    );
    Ok(model)
}

/// Acquires every texture of one material. Unknown roles and undecodable
/// images are logged and left out.
fn resolve_material(
    asset: &SceneAsset,
    material: usize,
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    cache: &mut TextureCache,
) -> Vec<TextureRef> {
    let Some(material) = asset.materials.get(material) else {
        log::warn!("material {material} does not exist");
        return Vec::new();
    };
    material
        .textures
        .iter()
        .filter_map(|(name, source)| {
            let role = match name.parse::<TextureRole>() {
                Ok(role) => role,
                Err(e) => {
                    log::warn!("material '{}': {e}, skipping {}", material.name, source.key());
                    return None;
                }
            };
            match cache.acquire(device, queue, source, role) {
                Ok(texture) => Some(texture),
                Err(e) => {
                    log::warn!("material '{}': {e}", material.name);
                    None
                }
            }
        })
        .collect()
}
