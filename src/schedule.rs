//! Resolve the refresh schedule a device should apply.
//!
//! Sources are tried in order and the first one holding a JSON object wins
//! outright. Fields it leaves unset are *not* filled from later sources;
//! the device falls back to its firmware defaults for those.

use std::fs;
use std::io;
use std::path::PathBuf;

use schedule_model::ScheduleConfig;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Configuration;
use crate::device::DeviceId;
use crate::error::Error;

/// Label reported when no source produced a usable override.
pub const NO_SOURCE: &str = "none";

/// One place a schedule override may come from.
pub trait ScheduleSource: Send + Sync {
    fn label(&self) -> &str;

    /// Raw document text for `device`, or `None` if this source has nothing.
    fn fetch(&self, device: &DeviceId) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OverrideScope {
    /// `<dir>/<device>.json`; never consulted for the default identity.
    Device,
    /// A single fixed file.
    Fixed,
}

/// Override stored as a JSON file on disk.
#[derive(Debug, Clone)]
pub struct OverrideFile {
    label: String,
    path: PathBuf,
    scope: OverrideScope,
}

impl OverrideFile {
    /// Per-device overrides named after the device identity inside `dir`.
    pub fn per_device(dir: impl Into<PathBuf>) -> Self {
        Self {
            label: "device".to_string(),
            path: dir.into(),
            scope: OverrideScope::Device,
        }
    }

    pub fn fixed(label: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            path: path.into(),
            scope: OverrideScope::Fixed,
        }
    }

    fn path_for(&self, device: &DeviceId) -> Option<PathBuf> {
        match self.scope {
            OverrideScope::Fixed => Some(self.path.clone()),
            OverrideScope::Device if device.is_default() => None,
            OverrideScope::Device => Some(self.path.join(format!("{device}.json"))),
        }
    }
}

impl ScheduleSource for OverrideFile {
    fn label(&self) -> &str {
        &self.label
    }

    fn fetch(&self, device: &DeviceId) -> Option<String> {
        let path = self.path_for(device)?;
        match fs::read_to_string(&path) {
            Ok(text) => Some(text),
            Err(err) if err.kind() == io::ErrorKind::NotFound => None,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read schedule override");
                None
            }
        }
    }
}

/// The schedule a device gets and which source supplied it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub config: ScheduleConfig,
    pub source: String,
}

pub struct ScheduleResolver {
    sources: Vec<Box<dyn ScheduleSource>>,
}

impl ScheduleResolver {
    pub fn new(sources: Vec<Box<dyn ScheduleSource>>) -> Self {
        Self { sources }
    }

    /// Device file, then the shared default file, then the global file.
    pub fn from_config(config: &Configuration) -> Self {
        let dir = config.device_schedule_dir();
        let sources: Vec<Box<dyn ScheduleSource>> = vec![
            Box::new(OverrideFile::per_device(&dir)),
            Box::new(OverrideFile::fixed(
                DeviceId::DEFAULT,
                dir.join(format!("{}.json", DeviceId::DEFAULT)),
            )),
            Box::new(OverrideFile::fixed("global", config.global_schedule_path())),
        ];
        Self::new(sources)
    }

    pub fn resolve(&self, device: &DeviceId) -> Resolution {
        for source in &self.sources {
            let Some(text) = source.fetch(device) else {
                continue;
            };
            let object = match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(object)) => object,
                Ok(_) => {
                    warn!(
                        source = source.label(),
                        %device,
                        "schedule override is not a JSON object; skipping"
                    );
                    continue;
                }
                Err(err) => {
                    warn!(
                        source = source.label(),
                        %device,
                        error = %err,
                        "invalid schedule override; skipping"
                    );
                    continue;
                }
            };
            let (config, rejected) = ScheduleConfig::from_json_object(&object);
            for rejection in rejected {
                let err = Error::ConfigValidation(rejection.to_string());
                warn!(source = source.label(), %device, error = %err, "dropping schedule field");
            }
            debug!(source = source.label(), %device, ?config, "schedule resolved");
            return Resolution {
                config,
                source: source.label().to_string(),
            };
        }
        Resolution {
            config: ScheduleConfig::default(),
            source: NO_SOURCE.to_string(),
        }
    }
}
