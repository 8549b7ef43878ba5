//! pbr-scene
//!
//! Scene import and image-based lighting precomputation for physically based
//! rendering on wgpu. Scene files (glTF, OBJ) are flattened into world-space
//! mesh units with deduplicated textures; an HDR panorama is turned into the
//! irradiance cube, pre-filtered specular cube and BRDF lookup table the
//! shading pass samples.
//!
//! High-level modules
//! - `camera`: camera value with a perspective or orthographic projection
//! - `context`: headless GPU device/queue and texture read-back
//! - `data_structures`: meshes, textures, texture roles and the scene tree
//! - `error`: error type shared by both pipelines
//! - `ibl`: capture rig and the four-stage IBL precomputer
//! - `pipelines`: pipeline builders, mip generation and the shading program
//! - `resources`: scene parsers, texture cache and panorama loading
//!

pub mod camera;
pub mod context;
pub mod data_structures;
pub mod error;
pub mod ibl;
pub mod pipelines;
pub mod resources;

// Re-exports commonly used types for convenience in downstream code.
pub use cgmath;
pub use wgpu;

pub use data_structures::model::{MeshPass, MeshUnit, Model, TextureRef, TextureRole};
pub use error::{Error, Result};
pub use ibl::{IblConfig, IblMaps, IblPrecomputer};
pub use resources::{ImportOptions, hdr::HdrPanorama};
