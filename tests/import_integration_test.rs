#![cfg(feature = "integration-tests")]

mod common;

use common::test_utils::{
    RecordingPass, ambient_mapped_quad, gpu, metallic_roughness_triangle, shared_texture_triangles, temp_dir,
    textured_triangle,
};
use pbr_scene::{ImportOptions, Model, TextureRole, pipelines::pbr::ShadingProgram, resources::texture::TextureCache};

#[test]
fn textured_triangle_imports_as_one_drawable_mesh() {
    let Some(ctx) = gpu() else { return };
    let dir = temp_dir("single_triangle");
    let path = textured_triangle(&dir);

    let model = Model::try_load(&path, &ctx.device, &ctx.queue, &ImportOptions::default()).unwrap();

    assert_eq!(model.meshes().len(), 1);
    let mesh = &model.meshes()[0];
    assert_eq!(mesh.vertices().len(), 3);
    assert_eq!(mesh.indices(), &[0, 1, 2]);
    assert_eq!(mesh.textures().len(), 1);
    assert_eq!(mesh.textures()[0].role, TextureRole::Albedo);
    assert_eq!(mesh.slots()[0].uniform_name(), "albedoMap1");
    assert!(mesh.is_uploaded());
    assert_eq!(model.texture_count(), 1);

    let program = ShadingProgram::new(&ctx.device, wgpu::TextureFormat::Rgba8UnormSrgb).unwrap();
    let mut pass = RecordingPass::default();
    model.draw(&program, &mut pass);
    assert_eq!(pass.programs, 1);
    assert_eq!(pass.material_groups, [program.material_group]);
    assert_eq!(pass.geometry_binds, 1);
    assert_eq!(pass.draws, [0..3]);
}

#[test]
fn shared_image_is_decoded_once() {
    let Some(ctx) = gpu() else { return };
    let dir = temp_dir("shared_texture");
    let path = shared_texture_triangles(&dir);

    let model = Model::try_load(&path, &ctx.device, &ctx.queue, &ImportOptions::default()).unwrap();

    assert_eq!(model.meshes().len(), 2);
    let first = model.meshes()[0].textures()[0];
    let second = model.meshes()[1].textures()[0];
    assert_eq!(first.handle, second.handle);
    assert_eq!(model.textures().decode_count(), 1);
    assert_eq!(model.texture_count(), 1);
}

#[test]
fn material_layout_is_built_once_per_cache() {
    let Some(ctx) = gpu() else { return };
    let mut cache = TextureCache::new();

    cache.ensure_defaults(&ctx.device, &ctx.queue);
    let first = cache.material_layout().cloned().unwrap();
    cache.ensure_defaults(&ctx.device, &ctx.queue);

    assert_eq!(cache.material_layout(), Some(&first));

    let dir = temp_dir("layout_reuse");
    let path = shared_texture_triangles(&dir);
    let model = Model::try_load(&path, &ctx.device, &ctx.queue, &ImportOptions::default()).unwrap();
    assert!(model.meshes().iter().all(|mesh| mesh.is_uploaded()));
    assert!(model.textures().material_layout().is_some());
}

#[test]
fn packed_image_serves_two_roles_from_one_texture() {
    let Some(ctx) = gpu() else { return };
    let dir = temp_dir("metallic_roughness");
    let path = metallic_roughness_triangle(&dir);

    let model = Model::try_load(&path, &ctx.device, &ctx.queue, &ImportOptions::default()).unwrap();

    let textures = model.meshes()[0].textures();
    let roles: Vec<TextureRole> = textures.iter().map(|t| t.role).collect();
    assert_eq!(roles, [TextureRole::Albedo, TextureRole::Metallic, TextureRole::Roughness]);
    assert_eq!(textures[1].handle, textures[2].handle);
    assert_ne!(textures[0].handle, textures[1].handle);
    assert_eq!(model.texture_count(), 2);
    assert_eq!(model.textures().decode_count(), 2);
    let names: Vec<String> = model.meshes()[0].slots().iter().map(|s| s.uniform_name()).collect();
    assert_eq!(names, ["albedoMap1", "metallicMap1", "roughnessMap1"]);
}

#[test]
fn unsupported_role_is_skipped_and_mesh_still_loads() {
    let Some(ctx) = gpu() else { return };
    let dir = temp_dir("ambient_map");
    let path = ambient_mapped_quad(&dir);

    let model = Model::try_load(&path, &ctx.device, &ctx.queue, &ImportOptions::default()).unwrap();

    assert_eq!(model.meshes().len(), 1);
    let mesh = &model.meshes()[0];
    assert_eq!(mesh.indices().len(), 6);
    assert_eq!(mesh.textures().len(), 1);
    assert_eq!(mesh.textures()[0].role, TextureRole::Albedo);
    assert_eq!(model.textures().decode_count(), 1);
    assert!(mesh.is_uploaded());
}

#[test]
fn missing_texture_falls_back_to_defaults() {
    let Some(ctx) = gpu() else { return };
    let dir = temp_dir("missing_texture");
    let path = textured_triangle(&dir);
    std::fs::remove_file(dir.join("albedo.png")).unwrap();

    let model = Model::try_load(&path, &ctx.device, &ctx.queue, &ImportOptions::default()).unwrap();

    assert_eq!(model.meshes().len(), 1);
    assert!(model.meshes()[0].textures().is_empty());
    assert!(model.meshes()[0].is_uploaded());
    assert_eq!(model.texture_count(), 0);
}

#[test]
fn unreadable_scene_loads_as_empty_model() {
    let Some(ctx) = gpu() else { return };
    let dir = temp_dir("unreadable_scene");
    let path = dir.join("broken.gltf");
    std::fs::write(&path, "{ not json").unwrap();

    assert!(Model::try_load(&path, &ctx.device, &ctx.queue, &ImportOptions::default()).is_err());
    assert!(Model::load(&path, &ctx.device, &ctx.queue).is_empty());
}
