//! Off-screen cube capture.
//!
//! One [`CaptureRig`] is reused by every IBL pass: it owns the depth
//! attachment (recreated only when the capture size changes), the per-face
//! view-projection uniform and the unit cube the passes draw.

use cgmath::{Matrix4, Point3, Vector3};
use wgpu::util::DeviceExt;

use crate::{
    camera::OPENGL_TO_WGPU_MATRIX,
    data_structures::texture::{CubemapTexture, Texture},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    /// Array layer of this face in a cube texture.
    pub fn layer(self) -> u32 {
        self as u32
    }

    pub fn forward(self) -> Vector3<f32> {
        match self {
            CubeFace::PositiveX => Vector3::unit_x(),
            CubeFace::NegativeX => -Vector3::unit_x(),
            CubeFace::PositiveY => Vector3::unit_y(),
            CubeFace::NegativeY => -Vector3::unit_y(),
            CubeFace::PositiveZ => Vector3::unit_z(),
            CubeFace::NegativeZ => -Vector3::unit_z(),
        }
    }

    /// Up vectors follow the cube map convention; the Y faces look along
    /// Z so the cross product never degenerates at the poles.
    pub fn up(self) -> Vector3<f32> {
        match self {
            CubeFace::PositiveY => Vector3::unit_z(),
            CubeFace::NegativeY => -Vector3::unit_z(),
            _ => -Vector3::unit_y(),
        }
    }

    pub fn view_matrix(self) -> Matrix4<f32> {
        Matrix4::look_at_rh(Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 0.0, 0.0) + self.forward(), self.up())
    }
}

/// 90 degree square projection. Clip-space y is flipped because wgpu writes
/// the first texel row at the top of the target.
pub fn capture_projection() -> Matrix4<f32> {
    OPENGL_TO_WGPU_MATRIX
        * Matrix4::from_nonuniform_scale(1.0, -1.0, 1.0)
        * cgmath::perspective(cgmath::Deg(90.0), 1.0, 0.1, 10.0)
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct CaptureViews {
    view_proj: [[[f32; 4]; 4]; 6],
}

impl CaptureViews {
    fn new() -> Self {
        let projection = capture_projection();
        let mut view_proj = [[[0.0; 4]; 4]; 6];
        for face in CubeFace::ALL {
            view_proj[face.layer() as usize] = (projection * face.view_matrix()).into();
        }
        Self { view_proj }
    }
}

#[rustfmt::skip]
const CUBE_VERTICES: [[f32; 3]; 36] = [
    // back
    [-1.0, -1.0, -1.0], [ 1.0,  1.0, -1.0], [ 1.0, -1.0, -1.0],
    [ 1.0,  1.0, -1.0], [-1.0, -1.0, -1.0], [-1.0,  1.0, -1.0],
    // front
    [-1.0, -1.0,  1.0], [ 1.0, -1.0,  1.0], [ 1.0,  1.0,  1.0],
    [ 1.0,  1.0,  1.0], [-1.0,  1.0,  1.0], [-1.0, -1.0,  1.0],
    // left
    [-1.0,  1.0,  1.0], [-1.0,  1.0, -1.0], [-1.0, -1.0, -1.0],
    [-1.0, -1.0, -1.0], [-1.0, -1.0,  1.0], [-1.0,  1.0,  1.0],
    // right
    [ 1.0,  1.0,  1.0], [ 1.0, -1.0, -1.0], [ 1.0,  1.0, -1.0],
    [ 1.0, -1.0, -1.0], [ 1.0,  1.0,  1.0], [ 1.0, -1.0,  1.0],
    // bottom
    [-1.0, -1.0, -1.0], [ 1.0, -1.0, -1.0], [ 1.0, -1.0,  1.0],
    [ 1.0, -1.0,  1.0], [-1.0, -1.0,  1.0], [-1.0, -1.0, -1.0],
    // top
    [-1.0,  1.0, -1.0], [ 1.0,  1.0,  1.0], [ 1.0,  1.0, -1.0],
    [ 1.0,  1.0,  1.0], [-1.0,  1.0, -1.0], [-1.0,  1.0,  1.0],
];

pub fn cube_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &[wgpu::VertexAttribute {
            offset: 0,
            shader_location: 0,
            format: wgpu::VertexFormat::Float32x3,
        }],
    }
}

pub struct CaptureRig {
    depth: Option<Texture>,
    size: u32,
    views: wgpu::Buffer,
    cube: wgpu::Buffer,
}

impl CaptureRig {
    pub fn new(device: &wgpu::Device) -> Self {
        let views = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Capture Views Buffer"),
            contents: bytemuck::cast_slice(&[CaptureViews::new()]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let cube = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Capture Cube Buffer"),
            contents: bytemuck::cast_slice(&CUBE_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });
        Self {
            depth: None,
            size: 0,
            views,
            cube,
        }
    }

    /// Prepares the depth attachment for `width` x `height` targets. The
    /// attachment is only reallocated when the size changes.
    pub fn begin_capture(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        if width != height {
            log::warn!("capture target {width}x{height} is not square, using {width}x{width}");
        }
        if self.depth.is_none() || self.size != width {
            self.depth = Some(Texture::create_depth_texture(
                device,
                [width, width],
                "capture depth",
            ));
            self.size = width;
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Starts a pass rendering into one face and mip level of `target`,
    /// cleared to transparent black. Mip sizes must match the last
    /// [`begin_capture`](Self::begin_capture).
    pub fn capture_face<'e>(
        &self,
        encoder: &'e mut wgpu::CommandEncoder,
        target: &CubemapTexture,
        face: CubeFace,
        mip_level: u32,
    ) -> wgpu::RenderPass<'e> {
        let view = target.face_view(face.layer(), mip_level);
        self.capture_view(encoder, &view)
    }

    /// Starts a pass rendering into an arbitrary square 2D view.
    pub fn capture_view<'e>(
        &self,
        encoder: &'e mut wgpu::CommandEncoder,
        view: &wgpu::TextureView,
    ) -> wgpu::RenderPass<'e> {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Capture Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: self.depth.as_ref().map(|depth| {
                wgpu::RenderPassDepthStencilAttachment {
                    view: &depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
            multiview_mask: None,
        });
        let size = self.size as f32;
        pass.set_viewport(0.0, 0.0, size, size, 0.0, 1.0);
        pass
    }

    /// Draws the unit cube as seen from `face`; `instance` selects the
    /// face's matrix (`instance % 6`) and any per-level parameters.
    pub fn draw_cube(&self, pass: &mut wgpu::RenderPass<'_>, instance: u32) {
        pass.set_vertex_buffer(0, self.cube.slice(..));
        pass.draw(0..CUBE_VERTICES.len() as u32, instance..instance + 1);
    }

    pub fn views_buffer(&self) -> &wgpu::Buffer {
        &self.views
    }
}

impl Drop for CaptureRig {
    fn drop(&mut self) {
        self.views.destroy();
        self.cube.destroy();
        if let Some(depth) = &self.depth {
            depth.texture.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{InnerSpace, Vector4};

    #[test]
    fn each_face_looks_down_its_axis() {
        for face in CubeFace::ALL {
            let forward = face.view_matrix() * face.forward().extend(0.0);
            assert!((forward - Vector4::new(0.0, 0.0, -1.0, 0.0)).magnitude() < 1e-6, "{face:?}");
        }
    }

    #[test]
    fn up_vectors_are_never_parallel_to_forward() {
        for face in CubeFace::ALL {
            assert!(face.forward().cross(face.up()).magnitude() > 0.9, "{face:?}");
        }
    }

    #[test]
    fn faces_map_to_consecutive_layers() {
        let layers: Vec<u32> = CubeFace::ALL.iter().map(|f| f.layer()).collect();
        assert_eq!(layers, [0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn projection_flips_clip_space_y() {
        let up = capture_projection() * Vector4::new(0.0, 0.5, -1.0, 1.0);
        assert!(up.y < 0.0);
        let ahead = capture_projection() * Vector4::new(0.0, 0.0, -1.0, 1.0);
        let depth = ahead.z / ahead.w;
        assert!((0.0..=1.0).contains(&depth));
    }

    #[test]
    fn cube_covers_all_six_sides() {
        for axis in 0..3 {
            for sign in [-1.0, 1.0] {
                assert!(CUBE_VERTICES.iter().filter(|v| v[axis] == sign).count() >= 6);
            }
        }
    }
}
