//! Error types shared by the import and IBL pipelines.
//!
//! None of these are fatal inside the crate. Texture decode failures and
//! unsupported roles are logged and skipped by the importer; scene parse
//! failures and shader build failures are handed back to the caller, who
//! decides whether to continue with a degraded result.

use std::path::PathBuf;

use crate::ibl::Stage;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An image file could not be read or decoded.
    #[error("failed to decode texture {path:?}: {reason}")]
    AssetDecode { path: PathBuf, reason: String },

    /// The scene file is missing, corrupt or structurally incomplete.
    #[error("failed to parse scene: {0}")]
    SceneParse(String),

    /// A material references a texture role the renderer cannot bind.
    #[error("unsupported texture role '{0}'")]
    UnsupportedRole(String),

    /// A WGSL module failed to compile.
    #[error("failed to build shader '{label}': {log}")]
    ShaderBuild { label: String, log: String },

    /// An IBL stage was requested before the stage it depends on finished.
    #[error("IBL stage {requested:?} requested while {expected:?} is pending")]
    StageOrder { expected: Stage, requested: Stage },

    #[error("no suitable GPU adapter: {0}")]
    NoAdapter(String),

    #[error("GPU device error: {0}")]
    Device(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_input() {
        let err = Error::AssetDecode {
            path: PathBuf::from("textures/brick.png"),
            reason: "unexpected EOF".into(),
        };
        assert!(err.to_string().contains("brick.png"));
        assert!(err.to_string().contains("unexpected EOF"));

        let err = Error::UnsupportedRole("map_d".into());
        assert_eq!(err.to_string(), "unsupported texture role 'map_d'");

        let err = Error::StageOrder {
            expected: Stage::Projection,
            requested: Stage::Prefilter,
        };
        assert!(err.to_string().contains("Prefilter"));
    }
}
