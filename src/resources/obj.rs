//! Wavefront OBJ/MTL to [`SceneAsset`].
//!
//! OBJ has no hierarchy, so every object becomes a geometry reference of a
//! single identity root.

use std::path::Path;

use cgmath::{Matrix4, SquareMatrix};

use crate::{
    data_structures::scene_graph::{RawMaterial, RawMesh, SceneAsset, SceneNode, TextureSource},
    error::{Error, Result},
};

/// MTL keys tobj leaves in `unknown_param` that name a texture we bind.
const EXTRA_TEXTURE_KEYS: [(&str, &str); 6] = [
    ("norm", "normal"),
    ("map_Pm", "metallic"),
    ("map_Pr", "roughness"),
    ("map_Ke", "emissive"),
    ("disp", "displacement"),
    ("map_ao", "ao"),
];

pub fn parse(path: &Path, texture_dir: &Path) -> Result<SceneAsset> {
    let (models, materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )
    .map_err(|e| Error::SceneParse(format!("{}: {e}", path.display())))?;

    let materials = match materials {
        Ok(materials) => materials,
        Err(e) => {
            log::warn!("{}: materials unavailable ({e}), loading geometry only", path.display());
            Vec::new()
        }
    };

    let meshes: Vec<RawMesh> = models.into_iter().map(read_mesh).collect();
    let name = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let root = SceneNode::new(name, Matrix4::identity()).with_meshes((0..meshes.len()).collect());

    Ok(SceneAsset {
        root: Some(root),
        meshes,
        materials: materials
            .into_iter()
            .map(|material| read_material(material, texture_dir))
            .collect(),
        incomplete: None,
    })
}

fn read_mesh(model: tobj::Model) -> RawMesh {
    let mesh = model.mesh;
    let tex_coords = (!mesh.texcoords.is_empty()).then(|| {
        mesh.texcoords
            .chunks_exact(2)
            // OBJ puts v = 0 at the bottom of the image.
            .map(|uv| [uv[0], 1.0 - uv[1]])
            .collect()
    });
    RawMesh {
        name: model.name,
        positions: mesh.positions.chunks_exact(3).map(|p| [p[0], p[1], p[2]]).collect(),
        normals: mesh.normals.chunks_exact(3).map(|n| [n[0], n[1], n[2]]).collect(),
        tex_coords,
        faces: mesh.indices.chunks_exact(3).map(|f| [f[0], f[1], f[2]]).collect(),
        material: mesh.material_id,
    }
}

/// The file name is the last token of a texture statement; anything before
/// it is an option such as `-bm 1.0`.
fn texture_file(statement: &str) -> Option<&str> {
    statement.split_whitespace().last()
}

fn read_material(material: tobj::Material, texture_dir: &Path) -> RawMaterial {
    let mut named: Vec<(String, String)> = [
        ("albedo", material.diffuse_texture),
        ("specular", material.specular_texture),
        ("normal", material.normal_texture),
        ("ambient", material.ambient_texture),
        ("shininess", material.shininess_texture),
        ("dissolve", material.dissolve_texture),
    ]
    .into_iter()
    .filter_map(|(role, statement)| statement.map(|s| (role.to_string(), s)))
    .collect();

    let mut extra: Vec<(&String, &String)> = material.unknown_param.iter().collect();
    extra.sort();
    for (key, statement) in extra {
        match EXTRA_TEXTURE_KEYS.iter().find(|(mtl_key, _)| mtl_key == key) {
            Some((_, role)) => named.push((role.to_string(), statement.clone())),
            None if key.starts_with("map_") => named.push((key.clone(), statement.clone())),
            None => {}
        }
    }

    let textures = named
        .into_iter()
        .filter_map(|(role, statement)| {
            texture_file(&statement).map(|file| (role, TextureSource::Path(texture_dir.join(file))))
        })
        .collect();

    RawMaterial {
        name: material.name,
        textures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pbr_scene_obj_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    const QUAD_OBJ: &str = "\
mtllib quad.mtl
o quad
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
vt 0 0
vt 1 0
vt 1 1
vt 0 1
vn 0 0 1
usemtl brick
f 1/1/1 2/2/1 3/3/1 4/4/1
";

    const QUAD_MTL: &str = "\
newmtl brick
map_Kd brick_albedo.png
map_Bump brick_normal.png
map_Pr brick_rough.png
map_Ka brick_ambient.png
map_Foo brick_foo.png
";

    #[test]
    fn quads_are_triangulated_into_one_root() {
        let dir = temp_dir("quad");
        std::fs::write(dir.join("quad.obj"), QUAD_OBJ).unwrap();
        std::fs::write(dir.join("quad.mtl"), QUAD_MTL).unwrap();

        let asset = parse(&dir.join("quad.obj"), &dir).unwrap();
        let root = asset.root.unwrap();
        assert_eq!(root.transform, Matrix4::identity());
        assert_eq!(root.meshes, vec![0]);

        let mesh = &asset.meshes[0];
        assert_eq!(mesh.faces.len(), 2);
        assert_eq!(mesh.normals.len(), mesh.positions.len());
        assert_eq!(mesh.material, Some(0));
        // v flipped into top-left image space
        let uvs = mesh.tex_coords.as_ref().unwrap();
        assert!(uvs.contains(&[0.0, 1.0]));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn mtl_keys_map_to_roles_and_unknown_maps_pass_through() {
        let dir = temp_dir("mtl");
        std::fs::write(dir.join("quad.obj"), QUAD_OBJ).unwrap();
        std::fs::write(dir.join("quad.mtl"), QUAD_MTL).unwrap();

        let asset = parse(&dir.join("quad.obj"), &dir).unwrap();
        let material = &asset.materials[0];
        assert_eq!(material.name, "brick");
        let roles: Vec<&str> = material.textures.iter().map(|(role, _)| role.as_str()).collect();
        assert_eq!(roles, ["albedo", "normal", "ambient", "map_Foo", "roughness"]);
        assert_eq!(
            material.textures[1].1,
            TextureSource::Path(dir.join("brick_normal.png"))
        );

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_material_library_keeps_geometry() {
        let dir = temp_dir("no_mtl");
        std::fs::write(dir.join("quad.obj"), QUAD_OBJ).unwrap();

        let asset = parse(&dir.join("quad.obj"), &dir).unwrap();
        assert_eq!(asset.meshes.len(), 1);
        assert!(asset.materials.is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn texture_statement_options_are_ignored() {
        assert_eq!(texture_file("-bm 0.5 -clamp on rock.png"), Some("rock.png"));
        assert_eq!(texture_file("  "), None);
    }
}
