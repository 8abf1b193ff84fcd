//! Per-device round-robin over the images in a directory.
//!
//! Devices poll twice per cycle: once for the hash of the next frame and
//! once for the frame itself. [`RotationManager::peek_next`] answers both
//! without touching state; only [`RotationManager::commit_served`] advances
//! the position, after a frame has actually been handed out.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::device::DeviceId;
use crate::rotation_store::{DeviceRecord, DeviceRecords, RotationStore};

const IMAGE_EXTS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];

/// Return `true` if `path` has an extension the pipeline can decode.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTS.iter().any(|e| *e == ext)
        })
}

/// Image file names directly inside `dir`, sorted. Hidden files are skipped.
pub fn list_images(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| is_supported_image(entry.path()))
        .filter_map(|entry| entry.file_name().to_str().map(str::to_owned))
        .filter(|name| !name.starts_with('.'))
        .collect();
    names.sort();
    names
}

/// Snapshot of one device's rotation, for status reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRotation {
    pub device: String,
    pub current_index: usize,
    pub last_served: Option<String>,
}

pub struct RotationManager {
    base_dir: PathBuf,
    store: RotationStore,
    // Also serializes writes of the state file.
    devices: Mutex<DeviceRecords>,
}

impl RotationManager {
    /// Load persisted positions. An unusable state file is logged and
    /// replaced by empty state rather than stopping the server.
    pub fn open(base_dir: impl Into<PathBuf>, store: RotationStore) -> Self {
        let records = match store.load() {
            Ok(records) => {
                info!(
                    devices = records.len(),
                    path = %store.path().display(),
                    "loaded rotation state"
                );
                records
            }
            Err(err) => {
                warn!(error = %err, "starting with empty rotation state");
                DeviceRecords::new()
            }
        };
        Self {
            base_dir: base_dir.into(),
            store,
            devices: Mutex::new(records),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Directory images are drawn from for `device`: its own folder, then
    /// the shared `default` folder, then the base directory itself.
    pub fn image_dir(&self, device: &DeviceId) -> Option<PathBuf> {
        let own = self.base_dir.join(device.as_str());
        if own.is_dir() {
            return Some(own);
        }
        let shared = self.base_dir.join(DeviceId::DEFAULT);
        if shared.is_dir() {
            return Some(shared);
        }
        self.base_dir.is_dir().then(|| self.base_dir.clone())
    }

    /// Path of the image `device` should be shown next. Does not change state.
    pub fn peek_next(&self, device: &DeviceId) -> Option<PathBuf> {
        let dir = self.image_dir(device)?;
        let images = list_images(&dir);
        if images.is_empty() {
            debug!(%device, dir = %dir.display(), "no images available");
            return None;
        }
        let stored = self.record(device).current_index;
        let index = clamp_index(stored, images.len());
        debug!(%device, index, file = %images[index], "peek");
        Some(dir.join(&images[index]))
    }

    /// Record `served` as handed to `device` and advance past it, then
    /// persist. `served` is the file name returned by the matching
    /// [`peek_next`](Self::peek_next).
    ///
    /// Nothing changes unless `served` is still the image at the stored
    /// position: a second fetch of the same peeked frame, or a directory
    /// change between peek and commit, leaves the rotation where it is.
    /// Returns the committed file name.
    pub fn commit_served(&self, device: &DeviceId, served: &str) -> Option<String> {
        let dir = self.image_dir(device)?;
        let images = list_images(&dir);
        if images.is_empty() {
            warn!(%device, "commit with no images available; rotation unchanged");
            return None;
        }

        let mut devices = self.devices.lock().expect("rotation state poisoned");
        let stored = devices
            .get(device.as_str())
            .map_or(0, |record| record.current_index);
        let index = clamp_index(stored, images.len());
        if images[index] != served {
            warn!(
                %device,
                served,
                expected = %images[index],
                "served image is no longer next; rotation unchanged"
            );
            return None;
        }

        let record = devices.entry(device.as_str().to_owned()).or_default();
        record.last_returned = Some(served.to_owned());
        record.current_index = (index + 1) % images.len();
        info!(
            %device,
            file = served,
            next_index = record.current_index,
            of = images.len(),
            "rotation advanced"
        );

        if let Err(err) = self.store.save(&devices) {
            error!(error = %err, "failed to persist rotation state; keeping in-memory position");
        }
        Some(served.to_owned())
    }

    /// Last image handed to `device`, if it still exists on disk.
    pub fn current_image(&self, device: &DeviceId) -> Option<PathBuf> {
        let name = self.record(device).last_returned?;
        let path = self.image_dir(device)?.join(name);
        path.is_file().then_some(path)
    }

    pub fn snapshot(&self) -> Vec<DeviceRotation> {
        self.devices
            .lock()
            .expect("rotation state poisoned")
            .iter()
            .map(|(device, record)| DeviceRotation {
                device: device.clone(),
                current_index: record.current_index,
                last_served: record.last_returned.clone(),
            })
            .collect()
    }

    fn record(&self, device: &DeviceId) -> DeviceRecord {
        self.devices
            .lock()
            .expect("rotation state poisoned")
            .get(device.as_str())
            .cloned()
            .unwrap_or_default()
    }
}

// Files may have been added or removed since the index was stored.
#[inline]
fn clamp_index(index: usize, len: usize) -> usize {
    if index < len { index } else { 0 }
}
