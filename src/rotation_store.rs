//! Durable rotation positions for every device, in one JSON file.
//!
//! On disk the file is a JSON object mapping device identity to
//! `{ "current_index": int, "last_returned": string | null }`. Files written
//! before devices were told apart hold a single bare record; those are
//! migrated under the `default` identity when loaded.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::device::DeviceId;
use crate::error::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    #[serde(default)]
    pub current_index: usize,
    #[serde(default)]
    pub last_returned: Option<String>,
}

pub type DeviceRecords = BTreeMap<String, DeviceRecord>;

/// Shapes the state file has had over time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSchema {
    /// One record for the whole server.
    LegacySingleDevice(DeviceRecord),
    /// One record per device identity.
    PerDevice(DeviceRecords),
}

impl StoreSchema {
    pub fn detect(value: Value) -> Result<Self> {
        let legacy = value
            .get("current_index")
            .is_some_and(|index| index.is_number());
        if legacy {
            let record = serde_json::from_value(value).context("malformed legacy rotation record")?;
            Ok(Self::LegacySingleDevice(record))
        } else {
            let records = serde_json::from_value(value).context("malformed rotation state map")?;
            Ok(Self::PerDevice(records))
        }
    }

    pub fn migrate(self) -> DeviceRecords {
        match self {
            Self::PerDevice(records) => records,
            Self::LegacySingleDevice(record) => {
                info!("migrating single-device rotation state to per-device map");
                BTreeMap::from([(DeviceId::DEFAULT.to_string(), record)])
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RotationStore {
    path: PathBuf,
}

impl RotationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and migrate the state file. A missing file is an empty map.
    pub fn load(&self) -> Result<DeviceRecords, Error> {
        self.try_load().map_err(|source| Error::Persistence {
            path: self.path.clone(),
            source,
        })
    }

    fn try_load(&self) -> Result<DeviceRecords> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(DeviceRecords::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", self.path.display()));
            }
        };
        let value: Value = serde_json::from_slice(&data)
            .with_context(|| format!("failed to parse {}", self.path.display()))?;
        Ok(StoreSchema::detect(value)?.migrate())
    }

    /// Replace the state file with `records`.
    ///
    /// Writes a sibling temp file, syncs it, then renames it over the target
    /// so a crash never leaves a torn file behind.
    pub fn save(&self, records: &DeviceRecords) -> Result<(), Error> {
        self.try_save(records).map_err(|source| Error::Persistence {
            path: self.path.clone(),
            source,
        })
    }

    fn try_save(&self, records: &DeviceRecords) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create parent dir at {}", parent.display()))?;
        }
        let json = serde_json::to_vec_pretty(records)?;
        let tmp = self.temp_path();
        let mut file =
            File::create(&tmp).with_context(|| format!("failed to open {}", tmp.display()))?;
        file.write_all(&json)
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        file.sync_all()
            .with_context(|| format!("failed to sync {}", tmp.display()))?;
        drop(file);
        fs::rename(&tmp, &self.path).with_context(|| {
            format!(
                "failed to move {} into place at {}",
                tmp.display(),
                self.path.display()
            )
        })?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
