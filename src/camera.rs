//! Orbit/fly camera used to fill the `view`, `projection` and `camPos`
//! shading uniforms.
//!
//! A single value type carries the orientation basis and a tagged projection;
//! the projection matrix is chosen by matching on the tag.

use cgmath::{InnerSpace, Matrix4, Point3, Rad, Vector3};

/// cgmath produces OpenGL clip space (z in -1..1); wgpu expects z in 0..1.
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

const ROTATE_SENSITIVITY: f32 = 0.05;
const DOLLY_SENSITIVITY: f32 = 0.05;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
    Perspective {
        fovy: Rad<f32>,
        aspect: f32,
        znear: f32,
        zfar: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        znear: f32,
        zfar: f32,
    },
}

impl Projection {
    pub fn matrix(&self) -> Matrix4<f32> {
        let proj = match *self {
            Projection::Perspective {
                fovy,
                aspect,
                znear,
                zfar,
            } => cgmath::perspective(fovy, aspect, znear, zfar),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                znear,
                zfar,
            } => cgmath::ortho(left, right, bottom, top, znear, zfar),
        };
        OPENGL_TO_WGPU_MATRIX * proj
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if let Projection::Perspective { aspect, .. } = self {
            *aspect = width as f32 / height.max(1) as f32;
        }
    }
}

#[derive(Clone, Debug)]
pub struct Camera {
    pub position: Point3<f32>,
    direction: Vector3<f32>,
    up: Vector3<f32>,
    right: Vector3<f32>,
    pub speed: f32,
    pub projection: Projection,
}

impl Camera {
    pub fn new<P: Into<Point3<f32>>, V: Into<Vector3<f32>>>(
        position: P,
        direction: V,
        up: V,
        projection: Projection,
    ) -> Self {
        let direction = direction.into().normalize();
        let right = direction.cross(up.into()).normalize();
        let up = right.cross(direction).normalize();
        Self {
            position: position.into(),
            direction,
            up,
            right,
            speed: 1.0,
            projection,
        }
    }

    pub fn direction(&self) -> Vector3<f32> {
        self.direction
    }

    pub fn up(&self) -> Vector3<f32> {
        self.up
    }

    pub fn right(&self) -> Vector3<f32> {
        self.right
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_to_rh(self.position, self.direction, self.up)
    }

    pub fn projection_matrix(&self) -> Matrix4<f32> {
        self.projection.matrix()
    }

    /// Turns the camera by mouse offsets (in pixels): yaw around `up`,
    /// then pitch around the updated `right`.
    pub fn rotate(&mut self, dx: f32, dy: f32) {
        let yaw = cgmath::Deg(-dx * ROTATE_SENSITIVITY);
        let pitch = cgmath::Deg((dy * ROTATE_SENSITIVITY).clamp(-89.0, 89.0));

        let yaw_rot = Matrix4::from_axis_angle(self.up, yaw);
        self.right = (yaw_rot * self.right.extend(0.0)).truncate().normalize();
        let pitch_rot = yaw_rot * Matrix4::from_axis_angle(self.right, pitch);
        self.direction = (pitch_rot * self.direction.extend(0.0))
            .truncate()
            .normalize();
        self.up = self.right.cross(self.direction).normalize();
    }

    pub fn dolly(&mut self, offset: f32) {
        self.position += self.direction * offset * DOLLY_SENSITIVITY;
    }

    pub fn truck(&mut self, dx: f32, dy: f32, dt: f32) {
        self.position += self.right * dx * self.speed * dt;
        self.position += self.up * dy * self.speed * dt;
    }

    /// Changes the field of view; orthographic cameras ignore zoom.
    pub fn zoom(&mut self, fovy: Rad<f32>) {
        if let Projection::Perspective { fovy: f, .. } = &mut self.projection {
            *f = fovy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Deg, Vector4};

    fn perspective() -> Projection {
        Projection::Perspective {
            fovy: Deg(45.0).into(),
            aspect: 800.0 / 600.0,
            znear: 0.1,
            zfar: 100.0,
        }
    }

    #[test]
    fn basis_is_orthonormal_after_rotation() {
        let mut camera = Camera::new(
            (0.0, 0.0, 3.0),
            (0.0, 0.0, -1.0),
            (0.0, 1.0, 0.0),
            perspective(),
        );
        camera.rotate(120.0, -40.0);
        assert!((camera.direction().magnitude() - 1.0).abs() < 1e-5);
        assert!(camera.direction().dot(camera.right()).abs() < 1e-5);
        assert!(camera.direction().dot(camera.up()).abs() < 1e-5);
    }

    #[test]
    fn projection_maps_near_plane_to_zero_depth() {
        let proj = perspective().matrix();
        let clip = proj * Vector4::new(0.0, 0.0, -0.1, 1.0);
        assert!((clip.z / clip.w).abs() < 1e-5);

        let ortho = Projection::Orthographic {
            left: -1.0,
            right: 1.0,
            bottom: -1.0,
            top: 1.0,
            znear: 0.0,
            zfar: 10.0,
        }
        .matrix();
        let clip = ortho * Vector4::new(0.0, 0.0, -10.0, 1.0);
        assert!((clip.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn zoom_only_affects_perspective() {
        let mut camera = Camera::new(
            (0.0, 0.0, 0.0),
            (0.0, 0.0, -1.0),
            (0.0, 1.0, 0.0),
            perspective(),
        );
        camera.zoom(Deg(30.0).into());
        assert!(matches!(
            camera.projection,
            Projection::Perspective { fovy, .. } if (fovy.0 - Rad::from(Deg(30.0f32)).0).abs() < 1e-6
        ));
    }
}
