#![cfg(feature = "integration-tests")]

mod common;

use common::test_utils::gpu;
use pbr_scene::{
    Error,
    pipelines::basic::{TargetDesc, mk_render_pipeline, mk_shader_module},
};

#[test]
fn invalid_wgsl_is_reported_as_shader_build_error() {
    let Some(ctx) = gpu() else { return };

    let err = mk_shader_module(&ctx.device, "broken", "fn vs_main( -> {").unwrap_err();

    assert!(matches!(err, Error::ShaderBuild { ref label, .. } if label == "broken"));
}

#[test]
fn pipeline_without_fragment_entry_is_reported_as_shader_build_error() {
    let Some(ctx) = gpu() else { return };
    let shader = mk_shader_module(
        &ctx.device,
        "vertex only",
        "@vertex fn vs_main() -> @builtin(position) vec4<f32> { return vec4<f32>(0.0); }",
    )
    .unwrap();
    let layout = ctx
        .device
        .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("empty layout"),
            bind_group_layouts: &[],
            immediate_size: 0,
        });

    let err = mk_render_pipeline(
        &ctx.device,
        "missing fs_main",
        &layout,
        TargetDesc {
            color_format: wgpu::TextureFormat::Rgba8Unorm,
            blend: None,
            depth_format: None,
            cull_mode: None,
        },
        &[],
        &shader,
    )
    .unwrap_err();

    assert!(matches!(err, Error::ShaderBuild { ref label, .. } if label == "missing fs_main"));
}
