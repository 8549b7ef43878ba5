//! Render pipelines: shared builders, mip generation and the shading program.

pub mod basic;
pub mod mipmap;
pub mod pbr;
