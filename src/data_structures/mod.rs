//! Scene data: meshes, textures and the CPU-side asset tree.
//!
//! - `model` holds vertices, texture references, mesh units and the imported model
//! - `texture` contains the GPU texture wrappers and creation utilities
//! - `scene_graph` is the hierarchical tree parsers produce and the importer walks

pub mod model;
pub mod scene_graph;
pub mod texture;
