use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use serde::Deserialize;

/// Colour adjustments applied before quantization. `1.0` leaves a channel
/// untouched and skips the pass entirely.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EnhanceOptions {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
}

impl EnhanceOptions {
    pub const IDENTITY: Self = Self {
        brightness: 1.0,
        contrast: 1.0,
        saturation: 1.0,
    };

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("brightness", self.brightness),
            ("contrast", self.contrast),
            ("saturation", self.saturation),
        ] {
            ensure!(
                value.is_finite() && value >= 0.0,
                "enhance.{} must be a non-negative number",
                name
            );
        }
        Ok(())
    }
}

impl Default for EnhanceOptions {
    // Spectra panels look washed out without a little extra punch.
    fn default() -> Self {
        Self {
            brightness: 1.0,
            contrast: 1.2,
            saturation: 1.2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Address the HTTP listener binds to.
    pub bind_address: IpAddr,
    pub port: u16,
    /// Base image directory. Per-device folders live directly below it.
    pub image_dir: PathBuf,
    /// Rotation state and schedule overrides.
    pub state_dir: PathBuf,
    pub enhance: EnhanceOptions,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        serde_yaml::from_str(&s)
            .with_context(|| format!("failed to parse config at {}", path.display()))
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(self.port > 0, "port must be greater than zero");
        ensure!(
            !self.image_dir.as_os_str().is_empty(),
            "image-dir must not be empty"
        );
        ensure!(
            !self.state_dir.as_os_str().is_empty(),
            "state-dir must not be empty"
        );
        self.enhance.validate()?;
        Ok(self)
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }

    pub fn rotation_state_path(&self) -> PathBuf {
        self.state_dir.join("rotation_state.json")
    }

    pub fn global_schedule_path(&self) -> PathBuf {
        self.state_dir.join("schedule.json")
    }

    pub fn device_schedule_dir(&self) -> PathBuf {
        self.state_dir.join("schedules")
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5000,
            image_dir: PathBuf::from("images"),
            state_dir: PathBuf::from("state"),
            enhance: EnhanceOptions::default(),
        }
    }
}
