// src/data/assets.rs
//! Background loading of textures.
//!
//! Loads run on worker threads so a slow or failing asset never blocks the
//! frame loop. The frame loop polls a [`Pending`] handle once per frame.

use super::{
    atlas::{AtlasSource, FontDescriptor, GlyphAtlas},
    surface::Surface,
    types::Size,
};
use crate::error::{RainError, Result};
use glam::Vec3;
use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc},
    task::Poll,
    thread,
};

/// Texel edge length of one glyph cell in generated atlases.
const PROCEDURAL_CELL_PX: u32 = 48;

/// A value being produced on a worker thread.
pub struct Pending<T> {
    rx: Option<mpsc::Receiver<Result<T>>>,
    label: String,
}

impl<T: Send + 'static> Pending<T> {
    pub fn spawn<F>(label: impl Into<String>, load: F) -> Self
    where
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let label = label.into();
        let (tx, rx) = mpsc::channel();
        let spawned = thread::Builder::new()
            .name(format!("load:{label}"))
            .spawn(move || {
                // The receiver may already be gone if the pipeline was rebuilt.
                let _ = tx.send(load());
            });
        match spawned {
            Ok(_) => Self {
                rx: Some(rx),
                label,
            },
            Err(e) => {
                let (tx, rx) = mpsc::channel();
                let _ = tx.send(Err(RainError::Load(format!("cannot spawn loader: {e}"))));
                Self {
                    rx: Some(rx),
                    label,
                }
            }
        }
    }

    /// Non-blocking check. Yields the result exactly once.
    pub fn poll(&mut self) -> Poll<Result<T>> {
        let Some(rx) = &self.rx else {
            return Poll::Ready(Err(RainError::Load(format!("{} already consumed", self.label))));
        };
        match rx.try_recv() {
            Ok(result) => {
                self.rx = None;
                Poll::Ready(result)
            }
            Err(mpsc::TryRecvError::Empty) => Poll::Pending,
            Err(mpsc::TryRecvError::Disconnected) => {
                self.rx = None;
                Poll::Ready(Err(RainError::Load(format!(
                    "loader for {} stopped without a result",
                    self.label
                ))))
            }
        }
    }
}

/// Decodes an image file into linear `[0, 1]` RGB texels.
pub fn load_rgb_texture(path: &Path) -> Result<Surface<Vec3>> {
    let img = image::open(path)
        .map_err(|source| RainError::Asset {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgb32f();
    let size = Size::new(img.width(), img.height());
    let texels = img.pixels().map(|p| Vec3::from_array(p.0)).collect();
    Surface::from_vec(size, texels)
        .ok_or_else(|| RainError::Load(format!("{} decoded to a bad size", path.display())))
}

/// Loads (or generates) the atlas for `font`.
pub fn load_atlas(font: &FontDescriptor, asset_dir: &Path) -> Result<GlyphAtlas> {
    match &font.source {
        AtlasSource::Procedural => GlyphAtlas::procedural(font, PROCEDURAL_CELL_PX),
        AtlasSource::Files { .. } => {
            let msdf_path = font
                .msdf_path(asset_dir)
                .ok_or_else(|| RainError::Load(format!("font {} has no MSDF file", font.name)))?;
            let msdf = load_rgb_texture(&msdf_path)?;
            let glint = font
                .glint_path(asset_dir)
                .map(|p| load_rgb_texture(&p))
                .transpose()?;
            GlyphAtlas::new(font.sequence_length, font.grid, msdf, glint)
        }
    }
}

/// Starts loading the atlas for `font` in the background.
pub fn spawn_atlas(font: &'static FontDescriptor, asset_dir: PathBuf) -> Pending<Arc<GlyphAtlas>> {
    Pending::spawn(font.name, move || {
        log::debug!("loading atlas {} from {}", font.name, asset_dir.display());
        load_atlas(font, &asset_dir).map(Arc::new)
    })
}

/// Starts loading an overlay image in the background.
pub fn spawn_texture(path: PathBuf) -> Pending<Arc<Surface<Vec3>>> {
    Pending::spawn(path.display().to_string(), move || load_rgb_texture(&path).map(Arc::new))
}
