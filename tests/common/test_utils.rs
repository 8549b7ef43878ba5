use std::{
    ops::Range,
    path::{Path, PathBuf},
};

use pbr_scene::{MeshPass, context::GpuContext, pipelines::pbr::ShadingProgram};

/// Returns a headless GPU context, or `None` (with a note on stderr) when the
/// machine has no usable adapter.
pub fn gpu() -> Option<GpuContext> {
    let _ = env_logger::builder().is_test(true).try_init();
    match GpuContext::blocking() {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            eprintln!("skipping GPU test: {e}");
            None
        }
    }
}

/// Like [`gpu`], but the device only allows 2D textures up to `max_dimension`.
pub fn gpu_with_max_texture(max_dimension: u32) -> Option<GpuContext> {
    let _ = env_logger::builder().is_test(true).try_init();
    let limits = wgpu::Limits {
        max_texture_dimension_2d: max_dimension,
        ..wgpu::Limits::default()
    };
    match futures::executor::block_on(GpuContext::with_limits(limits)) {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            eprintln!("skipping GPU test: {e}");
            None
        }
    }
}

pub fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("pbr_scene_it_{name}"));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn write_png(path: &Path, rgba: [u8; 4]) {
    image::RgbaImage::from_pixel(4, 4, image::Rgba(rgba))
        .save(path)
        .unwrap();
}

/// One triangle with normals and uvs, u16 indices padded to 4 bytes.
fn triangle_bin() -> Vec<u8> {
    let positions: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
    let normals: [[f32; 3]; 3] = [[0.0, 0.0, 1.0]; 3];
    let uvs: [[f32; 2]; 3] = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
    let indices: [u16; 4] = [0, 1, 2, 0];
    let mut bin = Vec::new();
    bin.extend_from_slice(bytemuck::cast_slice(&positions));
    bin.extend_from_slice(bytemuck::cast_slice(&normals));
    bin.extend_from_slice(bytemuck::cast_slice(&uvs));
    bin.extend_from_slice(bytemuck::cast_slice(&indices));
    bin
}

fn primitive(material: usize) -> String {
    format!(
        r#"{{ "attributes": {{ "POSITION": 0, "NORMAL": 1, "TEXCOORD_0": 2 }},
             "indices": 3, "material": {material} }}"#
    )
}

fn write_gltf(dir: &Path, primitives: &[String], materials: &str, images: &str, textures: &str) -> PathBuf {
    std::fs::write(dir.join("triangle.bin"), triangle_bin()).unwrap();
    let json = format!(
        r#"{{
  "asset": {{ "version": "2.0" }},
  "scene": 0,
  "scenes": [{{ "nodes": [0] }}],
  "nodes": [{{ "name": "root", "mesh": 0 }}],
  "meshes": [{{ "name": "tri", "primitives": [{primitives}] }}],
  "materials": {materials},
  "textures": {textures},
  "images": {images},
  "buffers": [{{ "uri": "triangle.bin", "byteLength": 104 }}],
  "bufferViews": [
    {{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }},
    {{ "buffer": 0, "byteOffset": 36, "byteLength": 36 }},
    {{ "buffer": 0, "byteOffset": 72, "byteLength": 24 }},
    {{ "buffer": 0, "byteOffset": 96, "byteLength": 6 }}
  ],
  "accessors": [
    {{ "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
       "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] }},
    {{ "bufferView": 1, "componentType": 5126, "count": 3, "type": "VEC3" }},
    {{ "bufferView": 2, "componentType": 5126, "count": 3, "type": "VEC2" }},
    {{ "bufferView": 3, "componentType": 5123, "count": 3, "type": "SCALAR" }}
  ]
}}"#,
        primitives = primitives.join(", ")
    );
    let path = dir.join("triangle.gltf");
    std::fs::write(&path, json).unwrap();
    path
}

/// A single textured triangle: one mesh, one albedo map.
pub fn textured_triangle(dir: &Path) -> PathBuf {
    write_png(&dir.join("albedo.png"), [200, 40, 40, 255]);
    write_gltf(
        dir,
        &[primitive(0)],
        r#"[{ "name": "painted", "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 } } }]"#,
        r#"[{ "uri": "albedo.png" }]"#,
        r#"[{ "source": 0 }]"#,
    )
}

/// Two meshes whose materials name the same image file through different
/// image entries.
pub fn shared_texture_triangles(dir: &Path) -> PathBuf {
    write_png(&dir.join("albedo.png"), [40, 200, 40, 255]);
    write_gltf(
        dir,
        &[primitive(0), primitive(1)],
        r#"[{ "name": "a", "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 } } },
            { "name": "b", "pbrMetallicRoughness": { "baseColorTexture": { "index": 1 } } }]"#,
        r#"[{ "uri": "albedo.png" }, { "uri": "albedo.png" }]"#,
        r#"[{ "source": 0 }, { "source": 1 }]"#,
    )
}

/// One triangle with an albedo map and a packed metallic-roughness map.
pub fn metallic_roughness_triangle(dir: &Path) -> PathBuf {
    write_png(&dir.join("albedo.png"), [200, 200, 200, 255]);
    write_png(&dir.join("orm.png"), [0, 128, 255, 255]);
    write_gltf(
        dir,
        &[primitive(0)],
        r#"[{ "name": "metal", "pbrMetallicRoughness": {
              "baseColorTexture": { "index": 0 },
              "metallicRoughnessTexture": { "index": 1 } } }]"#,
        r#"[{ "uri": "albedo.png" }, { "uri": "orm.png" }]"#,
        r#"[{ "source": 0 }, { "source": 1 }]"#,
    )
}

/// An OBJ quad whose material names a diffuse map and an ambient map.
pub fn ambient_mapped_quad(dir: &Path) -> PathBuf {
    write_png(&dir.join("diffuse.png"), [90, 90, 200, 255]);
    write_png(&dir.join("ambient.png"), [20, 20, 20, 255]);
    std::fs::write(
        dir.join("quad.mtl"),
        "newmtl lit\nKd 1 1 1\nmap_Kd diffuse.png\nmap_Ka ambient.png\n",
    )
    .unwrap();
    let path = dir.join("quad.obj");
    std::fs::write(
        &path,
        "mtllib quad.mtl\no quad\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\n\
         vt 0 0\nvt 1 0\nvt 1 1\nvt 0 1\nvn 0 0 1\n\
         usemtl lit\nf 1/1/1 2/2/1 3/3/1 4/4/1\n",
    )
    .unwrap();
    path
}

/// Counts what a draw issues instead of encoding it.
#[derive(Default)]
pub struct RecordingPass {
    pub programs: usize,
    pub material_groups: Vec<u32>,
    pub geometry_binds: usize,
    pub draws: Vec<Range<u32>>,
}

impl MeshPass for RecordingPass {
    fn use_program(&mut self, _: &ShadingProgram) {
        self.programs += 1;
    }

    fn bind_material(&mut self, group: u32, _: &wgpu::BindGroup) {
        self.material_groups.push(group);
    }

    fn bind_geometry(&mut self, _: &wgpu::Buffer, _: &wgpu::Buffer) {
        self.geometry_binds += 1;
    }

    fn draw_triangles(&mut self, indices: Range<u32>) {
        self.draws.push(indices);
    }
}
