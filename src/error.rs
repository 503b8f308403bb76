// src/error.rs
//! Error taxonomy for the rain pipeline.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RainError {
    /// A tunable is out of range. Raised before the frame loop starts.
    #[error("invalid config `{field}`: {reason}")]
    Config { field: &'static str, reason: String },

    #[error("malformed palette: {0}")]
    Palette(String),

    /// The two halves of a double buffer disagree on their dimensions.
    #[error("double buffer halves differ: {front:?} vs {back:?}")]
    BufferMismatch { front: (u32, u32), back: (u32, u32) },

    #[error("pass `{pass}` requires input `{input}` which no upstream pass provides")]
    MissingInput { pass: &'static str, input: &'static str },

    #[error("failed to load asset {path}: {source}")]
    Asset {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("resource load failed: {0}")]
    Load(String),

    /// The GPU context is gone. The caller must rebuild the renderer.
    #[error("renderer lost: {0}")]
    RendererLost(String),
}

impl RainError {
    pub fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Config {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = RainError> = std::result::Result<T, E>;
