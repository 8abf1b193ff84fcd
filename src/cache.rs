//! Single-slot memo of the most recently rendered frame.
//!
//! Keyed on the symlink-resolved source path and its modification time. Only
//! one source is held at a time; devices showing different pictures will
//! evict each other.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use anyhow::anyhow;
use tracing::{debug, info};

use crate::config::EnhanceOptions;
use crate::error::Error;
use crate::processing::pack::PACKED_FRAME_LEN;
use crate::processing::pipeline::{content_hash, render_packed};

/// Turns a source image into packed frame bytes.
pub trait FrameRenderer: Send + Sync {
    fn render(&self, source: &Path) -> anyhow::Result<Vec<u8>>;
}

/// The production renderer: geometry, enhancement, dithering, packing.
#[derive(Debug, Clone)]
pub struct PipelineRenderer {
    options: EnhanceOptions,
}

impl PipelineRenderer {
    pub fn new(options: EnhanceOptions) -> Self {
        Self { options }
    }
}

impl FrameRenderer for PipelineRenderer {
    fn render(&self, source: &Path) -> anyhow::Result<Vec<u8>> {
        render_packed(source, &self.options)
    }
}

/// A complete packed frame and its content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedFrame {
    bytes: Arc<[u8]>,
    hash: String,
}

impl PackedFrame {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let hash = content_hash(&bytes);
        Self {
            bytes: bytes.into(),
            hash,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }
}

#[derive(Debug)]
struct CacheEntry {
    resolved: PathBuf,
    mtime: SystemTime,
    frame: PackedFrame,
}

impl CacheEntry {
    fn matches(&self, resolved: &Path, mtime: SystemTime) -> bool {
        self.resolved == resolved && self.mtime == mtime
    }
}

pub struct FrameCache {
    renderer: Box<dyn FrameRenderer>,
    slot: Mutex<Option<CacheEntry>>,
}

impl FrameCache {
    pub fn new(renderer: impl FrameRenderer + 'static) -> Self {
        Self {
            renderer: Box::new(renderer),
            slot: Mutex::new(None),
        }
    }

    /// Return the frame for `source`, rendering it on a miss.
    ///
    /// The slot is only locked to look up and to store. Rendering happens
    /// outside it, so a renderer that fails or panics leaves the previous
    /// entry in place and the cache usable.
    pub fn get_frame(&self, source: &Path) -> Result<PackedFrame, Error> {
        let (resolved, mtime) = stat_source(source)?;

        if let Some(hit) = self
            .slot
            .lock()
            .expect("frame cache poisoned")
            .as_ref()
            .filter(|entry| entry.matches(&resolved, mtime))
        {
            debug!(path = %resolved.display(), hash = %hit.frame.hash, "frame cache hit");
            return Ok(hit.frame.clone());
        }

        info!(path = %resolved.display(), "frame cache miss; rendering");
        let bytes = self
            .renderer
            .render(&resolved)
            .map_err(|source| Error::Processing {
                path: resolved.clone(),
                source,
            })?;
        if bytes.len() != PACKED_FRAME_LEN {
            return Err(Error::Processing {
                path: resolved,
                source: anyhow!(
                    "renderer produced {} bytes, expected {}",
                    bytes.len(),
                    PACKED_FRAME_LEN
                ),
            });
        }

        let frame = PackedFrame::from_bytes(bytes);
        info!(path = %resolved.display(), hash = %frame.hash, "frame rendered");
        let mut slot = self.slot.lock().expect("frame cache poisoned");
        *slot = Some(CacheEntry {
            resolved,
            mtime,
            frame: frame.clone(),
        });
        Ok(frame)
    }

    /// Source path and hash of whatever is currently cached.
    pub fn cached(&self) -> Option<(PathBuf, String)> {
        self.slot
            .lock()
            .expect("frame cache poisoned")
            .as_ref()
            .map(|entry| (entry.resolved.clone(), entry.frame.hash.clone()))
    }
}

fn stat_source(source: &Path) -> Result<(PathBuf, SystemTime), Error> {
    let not_found = |err: io::Error| {
        if err.kind() == io::ErrorKind::NotFound {
            Error::Unavailable(source.display().to_string())
        } else {
            Error::Processing {
                path: source.to_path_buf(),
                source: err.into(),
            }
        }
    };
    let resolved = fs::canonicalize(source).map_err(not_found)?;
    let mtime = fs::metadata(&resolved)
        .and_then(|meta| meta.modified())
        .map_err(not_found)?;
    Ok((resolved, mtime))
}
