//! glTF 2.0 (`.gltf` and `.glb`) to [`SceneAsset`].

use std::path::Path;

use cgmath::{Matrix4, SquareMatrix};

use crate::{
    data_structures::scene_graph::{RawMaterial, RawMesh, SceneAsset, SceneNode, TextureSource},
    error::{Error, Result},
};

/// Deeper hierarchies are treated as malformed (e.g. a node cycle).
const MAX_NODE_DEPTH: usize = 256;

pub fn parse(path: &Path, texture_dir: &Path) -> Result<SceneAsset> {
    let parse_err = |e: ::gltf::Error| Error::SceneParse(format!("{}: {e}", path.display()));
    let ::gltf::Gltf { document, blob } = ::gltf::Gltf::open(path).map_err(parse_err)?;
    let buffers = ::gltf::import_buffers(&document, path.parent(), blob).map_err(parse_err)?;

    let label = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let materials = document
        .materials()
        .map(|material| read_material(&material, &buffers, texture_dir, &label))
        .collect();

    let mut meshes = Vec::new();
    let mut primitives_of = Vec::new();
    for mesh in document.meshes() {
        let mesh_name = mesh.name().unwrap_or("mesh");
        let mut indices = Vec::new();
        for primitive in mesh.primitives() {
            if primitive.mode() != ::gltf::mesh::Mode::Triangles {
                log::warn!(
                    "{label}: skipping {mesh_name} primitive {} ({:?} is not a triangle list)",
                    primitive.index(),
                    primitive.mode()
                );
                continue;
            }
            let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data[..]));
            let Some(positions) = reader.read_positions() else {
                log::warn!("{label}: skipping {mesh_name} primitive {} without positions", primitive.index());
                continue;
            };
            let positions: Vec<[f32; 3]> = positions.collect();
            let flat: Vec<u32> = match reader.read_indices() {
                Some(read) => read.into_u32().collect(),
                None => (0..positions.len() as u32).collect(),
            };

            indices.push(meshes.len());
            meshes.push(RawMesh {
                name: format!("{mesh_name}.{}", primitive.index()),
                normals: reader.read_normals().map(|n| n.collect()).unwrap_or_default(),
                tex_coords: reader.read_tex_coords(0).map(|uv| uv.into_f32().collect()),
                faces: flat.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect(),
                material: primitive.material().index(),
                positions,
            });
        }
        primitives_of.push(indices);
    }

    let mut incomplete = None;
    let root = document
        .default_scene()
        .or_else(|| document.scenes().next())
        .map(|scene| {
            let mut roots: Vec<SceneNode> = scene
                .nodes()
                .map(|node| build_node(node, &primitives_of, 0, &mut incomplete))
                .collect();
            if roots.len() == 1 {
                roots.remove(0)
            } else {
                let mut root = SceneNode::new(scene.name().unwrap_or("scene"), Matrix4::identity());
                root.children = roots;
                root
            }
        });

    Ok(SceneAsset {
        root,
        meshes,
        materials,
        incomplete,
    })
}

fn build_node(
    node: ::gltf::Node,
    primitives_of: &[Vec<usize>],
    depth: usize,
    incomplete: &mut Option<String>,
) -> SceneNode {
    let name = node
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("node{}", node.index()));
    let meshes = node
        .mesh()
        .and_then(|mesh| primitives_of.get(mesh.index()))
        .cloned()
        .unwrap_or_default();
    let mut scene_node =
        SceneNode::new(name, Matrix4::from(node.transform().matrix())).with_meshes(meshes);

    if depth >= MAX_NODE_DEPTH {
        *incomplete = Some(format!("node hierarchy deeper than {MAX_NODE_DEPTH} levels"));
        return scene_node;
    }
    for child in node.children() {
        scene_node
            .children
            .push(build_node(child, primitives_of, depth + 1, incomplete));
    }
    scene_node
}

/// glTF's fixed texture slots mapped to role names. The metallic-roughness
/// image is listed under both roles; the cache decodes it once.
fn read_material(
    material: &::gltf::Material,
    buffers: &[::gltf::buffer::Data],
    texture_dir: &Path,
    label: &str,
) -> RawMaterial {
    let pbr = material.pbr_metallic_roughness();
    let mut slots = Vec::new();
    if let Some(info) = pbr.base_color_texture() {
        slots.push(("albedo", info.texture()));
    }
    if let Some(info) = pbr.metallic_roughness_texture() {
        slots.push(("metallic", info.texture()));
        slots.push(("roughness", info.texture()));
    }
    if let Some(normal) = material.normal_texture() {
        slots.push(("normal", normal.texture()));
    }
    if let Some(occlusion) = material.occlusion_texture() {
        slots.push(("ao", occlusion.texture()));
    }
    if let Some(info) = material.emissive_texture() {
        slots.push(("emissive", info.texture()));
    }

    let textures = slots
        .into_iter()
        .filter_map(|(role, texture)| {
            image_source(texture.source(), buffers, texture_dir, label)
                .map(|source| (role.to_string(), source))
        })
        .collect();

    RawMaterial {
        name: material
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("material{}", material.index().unwrap_or_default())),
        textures,
    }
}

fn image_source(
    image: ::gltf::Image,
    buffers: &[::gltf::buffer::Data],
    texture_dir: &Path,
    label: &str,
) -> Option<TextureSource> {
    match image.source() {
        ::gltf::image::Source::View { view, .. } => {
            let range = view.offset()..view.offset() + view.length();
            let Some(bytes) = buffers.get(view.buffer().index()).and_then(|data| data.get(range)) else {
                log::warn!("{label}: image {} points outside its buffer", image.index());
                return None;
            };
            Some(TextureSource::Embedded {
                key: format!("{label}#image{}", image.index()),
                bytes: bytes.to_vec(),
            })
        }
        ::gltf::image::Source::Uri { uri, .. } if uri.starts_with("data:") => {
            match ::gltf::buffer::Data::from_source(::gltf::buffer::Source::Uri(uri), None) {
                Ok(data) => Some(TextureSource::Embedded {
                    key: format!("{label}#image{}", image.index()),
                    bytes: data.0,
                }),
                Err(e) => {
                    log::warn!("{label}: image {} has an unreadable data URI: {e}", image.index());
                    None
                }
            }
        }
        ::gltf::image::Source::Uri { uri, .. } => match urlencoding::decode(uri) {
            Ok(file) => Some(TextureSource::Path(texture_dir.join(&*file))),
            Err(e) => {
                log::warn!("{label}: image {} uri '{uri}' is not valid UTF-8: {e}", image.index());
                None
            }
        },
    }
}
