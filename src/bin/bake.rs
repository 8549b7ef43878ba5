//! Headless import + IBL run.
//!
//! `bake <scene> <panorama.hdr>` loads the scene, precomputes the IBL maps
//! from the panorama and logs what was produced.

use std::hash::{DefaultHasher, Hash, Hasher};

use anyhow::{Context, bail};
use pbr_scene::{
    HdrPanorama, IblConfig, IblPrecomputer, ImportOptions, Model, context::GpuContext,
};

fn main() -> anyhow::Result<()> {
    if let Err(e) = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init()
    {
        println!("Warning: Could not initialize logger: {}", e);
    };

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [scene, panorama] = args.as_slice() else {
        bail!("usage: bake <scene.gltf|scene.glb|scene.obj> <panorama.hdr|panorama.exr>");
    };

    let ctx = GpuContext::blocking().context("no GPU available")?;

    let model = match Model::try_load(scene, &ctx.device, &ctx.queue, &ImportOptions::default()) {
        Ok(model) => model,
        Err(e) => {
            log::error!("{e}; continuing with an empty scene");
            Model::empty()
        }
    };
    let vertices: usize = model.meshes().iter().map(|m| m.vertices().len()).sum();
    let triangles: usize = model.meshes().iter().map(|m| m.indices().len() / 3).sum();
    log::info!(
        "scene: {} meshes, {vertices} vertices, {triangles} triangles, {} textures",
        model.meshes().len(),
        model.texture_count()
    );

    let panorama = HdrPanorama::open(panorama)?;
    let maps = IblPrecomputer::run(&ctx.device, &ctx.queue, &panorama, IblConfig::default())?;

    let lut = ctx.read_texture(&maps.brdf_lut.texture, 0, 0, 4)?;
    let mut hasher = DefaultHasher::new();
    lut.hash(&mut hasher);
    log::info!(
        "irradiance {0}x{0}, prefilter {1}x{1} ({2} levels), BRDF LUT checksum {3:016x}",
        maps.irradiance.size,
        maps.prefilter.size,
        maps.prefilter.mip_levels,
        hasher.finish()
    );
    Ok(())
}
