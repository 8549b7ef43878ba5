//! CPU-side scene tree produced by the asset parsers.
//!
//! Parsers (glTF, OBJ) only translate file contents into a [`SceneAsset`];
//! everything that depends on the hierarchy (transform composition, world
//! space baking, normal correction) lives here so it can be checked without
//! a GPU.

use std::path::PathBuf;

use cgmath::{InnerSpace, Matrix, Matrix3, Matrix4, SquareMatrix, Vector3, Vector4, Zero};

use crate::data_structures::model::Vertex;

/// Where a material's texture comes from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TextureSource {
    /// An image file, already resolved against the asset's texture directory.
    Path(PathBuf),
    /// An image stored inside the asset file. `key` identifies it for caching.
    Embedded { key: String, bytes: Vec<u8> },
}

impl TextureSource {
    /// The identity used for deduplication.
    pub fn key(&self) -> String {
        match self {
            TextureSource::Path(path) => path.to_string_lossy().into_owned(),
            TextureSource::Embedded { key, .. } => key.clone(),
        }
    }
}

/// A material as written in the asset: role names are kept verbatim so the
/// importer can decide what it knows how to bind.
#[derive(Clone, Debug, Default)]
pub struct RawMaterial {
    pub name: String,
    pub textures: Vec<(String, TextureSource)>,
}

/// One geometry reference in the asset's local space.
#[derive(Clone, Debug, Default)]
pub struct RawMesh {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub tex_coords: Option<Vec<[f32; 2]>>,
    pub faces: Vec<[u32; 3]>,
    pub material: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct SceneNode {
    pub name: String,
    pub transform: Matrix4<f32>,
    pub meshes: Vec<usize>,
    pub children: Vec<SceneNode>,
}

impl SceneNode {
    pub fn new(name: impl Into<String>, transform: Matrix4<f32>) -> Self {
        Self {
            name: name.into(),
            transform,
            meshes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_meshes(mut self, meshes: Vec<usize>) -> Self {
        self.meshes = meshes;
        self
    }

    pub fn with_child(mut self, child: SceneNode) -> Self {
        self.children.push(child);
        self
    }

    /// Depth-first pre-order walk. `visit` receives each node with its
    /// effective transform `parent * local`; the parent is always visited
    /// before its children and children in declaration order.
    pub fn walk<F>(&self, parent: &Matrix4<f32>, visit: &mut F)
    where
        F: FnMut(&SceneNode, &Matrix4<f32>),
    {
        let effective = parent * self.transform;
        visit(self, &effective);
        for child in &self.children {
            child.walk(&effective, visit);
        }
    }
}

/// Everything a parser extracted from one asset file.
#[derive(Clone, Debug, Default)]
pub struct SceneAsset {
    pub root: Option<SceneNode>,
    pub meshes: Vec<RawMesh>,
    pub materials: Vec<RawMaterial>,
    /// Set by parsers that could read the file but not all of its content.
    pub incomplete: Option<String>,
}

/// Inverse transpose of the upper 3x3 of `transform`.
///
/// Falls back to the plain upper 3x3 when the matrix is singular, which
/// only happens for degenerate (zero-scale) nodes.
pub fn normal_matrix(transform: &Matrix4<f32>) -> Matrix3<f32> {
    let upper = Matrix3::from_cols(
        transform.x.truncate(),
        transform.y.truncate(),
        transform.z.truncate(),
    );
    match upper.invert() {
        Some(inverse) => inverse.transpose(),
        None => upper,
    }
}

/// Geometry baked into world space, ready for upload.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl RawMesh {
    /// Transforms positions by `transform` and normals by its inverse
    /// transpose (re-normalised). Texture coordinates are copied, or zero
    /// when the mesh has none.
    pub fn bake(&self, transform: &Matrix4<f32>) -> MeshData {
        let normal_matrix = normal_matrix(transform);
        let vertices = self
            .positions
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let position = transform * Vector4::new(p[0], p[1], p[2], 1.0);
                let normal: Vector3<f32> = self.normals.get(i).copied().unwrap_or([0.0; 3]).into();
                let normal = normal_matrix * normal;
                let normal = if normal.magnitude2() > 0.0 {
                    normal.normalize()
                } else {
                    normal
                };
                let tex_coords = self
                    .tex_coords
                    .as_ref()
                    .and_then(|uvs| uvs.get(i).copied())
                    .unwrap_or([0.0, 0.0]);
                Vertex {
                    position: position.truncate().into(),
                    normal: normal.into(),
                    tex_coords,
                }
            })
            .collect();
        let indices = self.faces.iter().flatten().copied().collect();

        MeshData {
            name: self.name.clone(),
            vertices,
            indices,
        }
    }

    /// Fills in smooth normals (area-weighted face normals) when the source
    /// provided none.
    pub fn generate_normals(&mut self) {
        if self.normals.len() == self.positions.len() {
            return;
        }
        let mut normals = vec![Vector3::<f32>::zero(); self.positions.len()];
        for face in &self.faces {
            let [a, b, c] = face.map(|i| Vector3::from(self.positions[i as usize]));
            let n = (b - a).cross(c - a);
            for &i in face {
                normals[i as usize] += n;
            }
        }
        self.normals = normals
            .into_iter()
            .map(|n| {
                if n.magnitude2() > 0.0 {
                    n.normalize().into()
                } else {
                    [0.0, 1.0, 0.0]
                }
            })
            .collect();
    }

    /// Drops faces referencing vertices that do not exist.
    pub fn retain_valid_faces(&mut self) {
        let count = self.positions.len() as u32;
        let before = self.faces.len();
        self.faces.retain(|face| face.iter().all(|&i| i < count));
        if self.faces.len() != before {
            log::warn!(
                "mesh '{}': dropped {} faces with out-of-range indices",
                self.name,
                before - self.faces.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Deg, Vector3};

    fn approx_eq(a: &Matrix4<f32>, b: &Matrix4<f32>) -> bool {
        let a: &[f32; 16] = a.as_ref();
        let b: &[f32; 16] = b.as_ref();
        a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-5)
    }

    #[test]
    fn leaf_transform_composes_parent_before_child() {
        let root_t = Matrix4::from_translation(Vector3::new(10.0, 0.0, 0.0));
        let mid_t = Matrix4::from_angle_y(Deg(90.0));
        let leaf_t = Matrix4::from_nonuniform_scale(2.0, 1.0, 1.0);

        let root = SceneNode::new("root", root_t).with_child(
            SceneNode::new("mid", mid_t).with_child(SceneNode::new("leaf", leaf_t).with_meshes(vec![0])),
        );

        let mut visited = Vec::new();
        root.walk(&Matrix4::identity(), &mut |node, effective| {
            visited.push((node.name.clone(), *effective));
        });

        let names: Vec<_> = visited.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["root", "mid", "leaf"]);

        // Hand-computed: rotate 90 deg about y maps x to -z, then translate.
        #[rustfmt::skip]
        let expected = Matrix4::new(
            0.0, 0.0, -2.0, 0.0,
            0.0, 1.0, 0.0, 0.0,
            1.0, 0.0, 0.0, 0.0,
            10.0, 0.0, 0.0, 1.0,
        );
        assert!(approx_eq(&visited[2].1, &expected));

        let reversed = leaf_t * mid_t * root_t;
        assert!(!approx_eq(&visited[2].1, &reversed));
    }

    #[test]
    fn walk_visits_siblings_in_order_after_their_parent() {
        let root = SceneNode::new("root", Matrix4::identity())
            .with_child(SceneNode::new("a", Matrix4::identity()).with_child(SceneNode::new("a1", Matrix4::identity())))
            .with_child(SceneNode::new("b", Matrix4::identity()));
        let mut names = Vec::new();
        root.walk(&Matrix4::identity(), &mut |node, _| names.push(node.name.clone()));
        assert_eq!(names, ["root", "a", "a1", "b"]);
    }

    #[test]
    fn normals_use_inverse_transpose_under_non_uniform_scale() {
        let transform = Matrix4::from_nonuniform_scale(2.0, 1.0, 1.0);
        let mesh = RawMesh {
            name: "slanted".into(),
            positions: vec![[0.0, 0.0, 0.0]],
            normals: vec![[
                std::f32::consts::FRAC_1_SQRT_2,
                std::f32::consts::FRAC_1_SQRT_2,
                0.0,
            ]],
            tex_coords: None,
            faces: vec![],
            material: None,
        };

        let baked = mesh.bake(&transform);
        let normal = Vector3::from(baked.vertices[0].normal);

        let naive = (transform * Vector4::new(
            std::f32::consts::FRAC_1_SQRT_2,
            std::f32::consts::FRAC_1_SQRT_2,
            0.0,
            0.0,
        ))
        .truncate()
        .normalize();

        assert!((normal.magnitude() - 1.0).abs() < 1e-5);
        assert!((normal - naive).magnitude() > 1e-3);
        // (0.5, 1, 0) normalised
        let expected = Vector3::new(0.5, 1.0, 0.0).normalize();
        assert!((normal - expected).magnitude() < 1e-5);
    }

    #[test]
    fn bake_moves_positions_and_defaults_missing_uvs() {
        let mesh = RawMesh {
            name: "tri".into(),
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            normals: vec![[0.0, 0.0, 1.0]; 3],
            tex_coords: None,
            faces: vec![[0, 1, 2]],
            material: None,
        };
        let baked = mesh.bake(&Matrix4::from_translation(Vector3::new(0.0, 0.0, -5.0)));
        assert_eq!(baked.vertices[1].position, [1.0, 0.0, -5.0]);
        assert_eq!(baked.vertices[2].tex_coords, [0.0, 0.0]);
        assert_eq!(baked.vertices[0].normal, [0.0, 0.0, 1.0]);
        assert_eq!(baked.indices, vec![0, 1, 2]);
    }

    #[test]
    fn generated_normals_face_out_of_ccw_triangle() {
        let mut mesh = RawMesh {
            name: "tri".into(),
            positions: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            faces: vec![[0, 1, 2]],
            ..Default::default()
        };
        mesh.generate_normals();
        assert_eq!(mesh.normals, vec![[0.0, 0.0, 1.0]; 3]);
    }

    #[test]
    fn faces_with_out_of_range_indices_are_dropped() {
        let mut mesh = RawMesh {
            name: "broken".into(),
            positions: vec![[0.0; 3]; 3],
            faces: vec![[0, 1, 2], [0, 1, 7]],
            ..Default::default()
        };
        mesh.retain_valid_faces();
        assert_eq!(mesh.faces, vec![[0, 1, 2]]);
    }

    #[test]
    fn singular_transform_falls_back_to_upper_block() {
        let flat = Matrix4::from_nonuniform_scale(1.0, 0.0, 1.0);
        let nm = normal_matrix(&flat);
        assert_eq!(nm.y, Vector3::new(0.0, 0.0, 0.0));
    }
}
