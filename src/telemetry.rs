//! Last-contact bookkeeping for each device, kept in memory only.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::device::DeviceId;

/// Header carrying the battery voltage, as a decimal number of volts.
pub const BATTERY_HEADER: &str = "X-Battery-Voltage";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceTelemetry {
    pub last_seen: DateTime<Utc>,
    pub last_endpoint: String,
    /// Most recent reading; a request without one keeps the previous value.
    pub battery_voltage: Option<f32>,
}

#[derive(Debug, Default)]
pub struct Telemetry {
    devices: Mutex<BTreeMap<String, DeviceTelemetry>>,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, device: &DeviceId, endpoint: &str, battery_voltage: Option<f32>) {
        self.record_at(device, endpoint, battery_voltage, Utc::now());
    }

    pub fn record_at(
        &self,
        device: &DeviceId,
        endpoint: &str,
        battery_voltage: Option<f32>,
        at: DateTime<Utc>,
    ) {
        let mut devices = self.devices.lock().expect("telemetry poisoned");
        let previous = devices
            .get(device.as_str())
            .and_then(|entry| entry.battery_voltage);
        devices.insert(
            device.as_str().to_owned(),
            DeviceTelemetry {
                last_seen: at,
                last_endpoint: endpoint.to_owned(),
                battery_voltage: battery_voltage.or(previous),
            },
        );
    }

    pub fn get(&self, device: &DeviceId) -> Option<DeviceTelemetry> {
        self.devices
            .lock()
            .expect("telemetry poisoned")
            .get(device.as_str())
            .cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, DeviceTelemetry> {
        self.devices.lock().expect("telemetry poisoned").clone()
    }
}

/// Parse a battery header value. Garbage and non-finite readings are ignored.
pub fn parse_voltage(raw: &str) -> Option<f32> {
    raw.trim().parse::<f32>().ok().filter(|v| v.is_finite())
}
