//! Schedule override model shared by the frame server and anything that
//! writes override files for it.
//!
//! Override files are loose JSON objects. Each recognized field is checked on
//! its own, so one bad value never discards the rest of the file.

use std::fmt;
use std::ops::RangeInclusive;

use chrono::{DateTime, Duration as ChronoDuration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use fields::{FieldRejection, RejectReason, ScheduleField};
pub use window::EffectiveSchedule;

mod fields {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum ScheduleField {
        RefreshIntervalMinutes,
        ActiveStartHour,
        ActiveEndHour,
        TimezoneOffsetMinutes,
    }

    impl ScheduleField {
        pub const ALL: [Self; 4] = [
            Self::RefreshIntervalMinutes,
            Self::ActiveStartHour,
            Self::ActiveEndHour,
            Self::TimezoneOffsetMinutes,
        ];

        /// Canonical key as written in override files.
        pub fn key(self) -> &'static str {
            match self {
                Self::RefreshIntervalMinutes => "refresh_interval_minutes",
                Self::ActiveStartHour => "active_start_hour",
                Self::ActiveEndHour => "active_end_hour",
                Self::TimezoneOffsetMinutes => "timezone_offset_minutes",
            }
        }

        /// camelCase spelling, accepted when the canonical key is absent.
        pub fn alias(self) -> &'static str {
            match self {
                Self::RefreshIntervalMinutes => "refreshIntervalMinutes",
                Self::ActiveStartHour => "activeStartHour",
                Self::ActiveEndHour => "activeEndHour",
                Self::TimezoneOffsetMinutes => "timezoneOffsetMinutes",
            }
        }

        pub fn range(self) -> RangeInclusive<i64> {
            match self {
                Self::RefreshIntervalMinutes => 1..=1440,
                Self::ActiveStartHour | Self::ActiveEndHour => 0..=23,
                Self::TimezoneOffsetMinutes => -720..=840,
            }
        }
    }

    impl fmt::Display for ScheduleField {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.key())
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum RejectReason {
        NotAnInteger,
        OutOfRange,
    }

    /// A recognized field whose value was dropped during validation.
    #[derive(Debug, Clone, PartialEq)]
    pub struct FieldRejection {
        pub field: ScheduleField,
        pub value: Value,
        pub reason: RejectReason,
    }

    impl fmt::Display for FieldRejection {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self.reason {
                RejectReason::NotAnInteger => {
                    write!(f, "{} must be an integer (got {})", self.field, self.value)
                }
                RejectReason::OutOfRange => {
                    let range = self.field.range();
                    write!(
                        f,
                        "{} must be within {}..={} (got {})",
                        self.field,
                        range.start(),
                        range.end(),
                        self.value
                    )
                }
            }
        }
    }
}

/// A possibly partial schedule override. Unset fields are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_interval_minutes: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_start_hour: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_end_hour: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone_offset_minutes: Option<i16>,
}

impl ScheduleConfig {
    /// Validate every recognized field of `object` independently.
    ///
    /// Unknown keys are ignored. Returns the accepted subset together with
    /// the fields that were dropped.
    pub fn from_json_object(object: &Map<String, Value>) -> (Self, Vec<FieldRejection>) {
        let mut config = Self::default();
        let mut rejected = Vec::new();
        for field in ScheduleField::ALL {
            let Some(value) = object.get(field.key()).or_else(|| object.get(field.alias())) else {
                continue;
            };
            match validate_value(field, value) {
                Ok(accepted) => config.set(field, accepted),
                Err(reason) => rejected.push(FieldRejection {
                    field,
                    value: value.clone(),
                    reason,
                }),
            }
        }
        (config, rejected)
    }

    pub fn get(&self, field: ScheduleField) -> Option<i64> {
        match field {
            ScheduleField::RefreshIntervalMinutes => self.refresh_interval_minutes.map(i64::from),
            ScheduleField::ActiveStartHour => self.active_start_hour.map(i64::from),
            ScheduleField::ActiveEndHour => self.active_end_hour.map(i64::from),
            ScheduleField::TimezoneOffsetMinutes => self.timezone_offset_minutes.map(i64::from),
        }
    }

    pub fn is_empty(&self) -> bool {
        ScheduleField::ALL.iter().all(|field| self.get(*field).is_none())
    }

    /// Fill unset fields from the firmware's built-in defaults.
    pub fn effective(&self) -> EffectiveSchedule {
        let defaults = EffectiveSchedule::FIRMWARE_DEFAULTS;
        EffectiveSchedule {
            refresh_interval_minutes: self
                .refresh_interval_minutes
                .unwrap_or(defaults.refresh_interval_minutes),
            active_start_hour: self.active_start_hour.unwrap_or(defaults.active_start_hour),
            active_end_hour: self.active_end_hour.unwrap_or(defaults.active_end_hour),
            timezone_offset_minutes: self
                .timezone_offset_minutes
                .unwrap_or(defaults.timezone_offset_minutes),
        }
    }

    // Callers pass values already checked against `field.range()`.
    fn set(&mut self, field: ScheduleField, value: i64) {
        match field {
            ScheduleField::RefreshIntervalMinutes => {
                self.refresh_interval_minutes = u16::try_from(value).ok()
            }
            ScheduleField::ActiveStartHour => self.active_start_hour = u8::try_from(value).ok(),
            ScheduleField::ActiveEndHour => self.active_end_hour = u8::try_from(value).ok(),
            ScheduleField::TimezoneOffsetMinutes => {
                self.timezone_offset_minutes = i16::try_from(value).ok()
            }
        }
    }
}

fn validate_value(field: ScheduleField, value: &Value) -> Result<i64, RejectReason> {
    let Some(number) = value.as_i64() else {
        return Err(if value.is_u64() {
            RejectReason::OutOfRange
        } else {
            RejectReason::NotAnInteger
        });
    };
    if field.range().contains(&number) {
        Ok(number)
    } else {
        Err(RejectReason::OutOfRange)
    }
}

mod window {
    use super::*;

    /// A fully populated schedule, as the device will end up applying it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
    pub struct EffectiveSchedule {
        pub refresh_interval_minutes: u16,
        pub active_start_hour: u8,
        pub active_end_hour: u8,
        pub timezone_offset_minutes: i16,
    }

    impl EffectiveSchedule {
        pub const FIRMWARE_DEFAULTS: Self = Self {
            refresh_interval_minutes: 15,
            active_start_hour: 8,
            active_end_hour: 20,
            timezone_offset_minutes: 0,
        };

        /// Whether `instant` falls inside the active window in the device's
        /// local time. The end hour is exclusive; a start after the end spans
        /// midnight and equal hours mean the window never closes.
        pub fn is_active_at(&self, instant: DateTime<Utc>) -> bool {
            let local = instant + ChronoDuration::minutes(i64::from(self.timezone_offset_minutes));
            let hour = local.hour() as u8;
            let (start, end) = (self.active_start_hour, self.active_end_hour);
            if start == end {
                true
            } else if start < end {
                (start..end).contains(&hour)
            } else {
                hour >= start || hour < end
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn accepts_all_fields_in_range() {
        let (cfg, rejected) = ScheduleConfig::from_json_object(&object(json!({
            "refresh_interval_minutes": 30,
            "active_start_hour": 7,
            "active_end_hour": 22,
            "timezone_offset_minutes": -300,
        })));
        assert!(rejected.is_empty());
        assert_eq!(cfg.refresh_interval_minutes, Some(30));
        assert_eq!(cfg.active_start_hour, Some(7));
        assert_eq!(cfg.active_end_hour, Some(22));
        assert_eq!(cfg.timezone_offset_minutes, Some(-300));
    }

    #[test]
    fn drops_bad_fields_independently() {
        let (cfg, rejected) = ScheduleConfig::from_json_object(&object(json!({
            "refresh_interval_minutes": 0,
            "active_start_hour": "8",
            "active_end_hour": 21,
            "timezone_offset_minutes": 12.5,
            "unrelated": true,
        })));
        assert_eq!(cfg.active_end_hour, Some(21));
        assert_eq!(cfg.refresh_interval_minutes, None);
        assert_eq!(cfg.active_start_hour, None);
        assert_eq!(cfg.timezone_offset_minutes, None);

        let reasons: Vec<_> = rejected.iter().map(|r| (r.field, r.reason)).collect();
        assert_eq!(
            reasons,
            vec![
                (ScheduleField::RefreshIntervalMinutes, RejectReason::OutOfRange),
                (ScheduleField::ActiveStartHour, RejectReason::NotAnInteger),
                (ScheduleField::TimezoneOffsetMinutes, RejectReason::NotAnInteger),
            ]
        );
    }

    #[test]
    fn range_edges_are_inclusive() {
        let (cfg, rejected) = ScheduleConfig::from_json_object(&object(json!({
            "refresh_interval_minutes": 1440,
            "active_start_hour": 0,
            "active_end_hour": 23,
            "timezone_offset_minutes": 840,
        })));
        assert!(rejected.is_empty());
        assert_eq!(cfg.timezone_offset_minutes, Some(840));

        let (cfg, rejected) = ScheduleConfig::from_json_object(&object(json!({
            "refresh_interval_minutes": 1441,
            "active_end_hour": 24,
            "timezone_offset_minutes": -721,
        })));
        assert!(cfg.is_empty());
        assert_eq!(rejected.len(), 3);
    }

    #[test]
    fn camel_case_alias_is_accepted() {
        let (cfg, rejected) = ScheduleConfig::from_json_object(&object(json!({
            "refreshIntervalMinutes": 60,
            "timezoneOffsetMinutes": 120,
        })));
        assert!(rejected.is_empty());
        assert_eq!(cfg.refresh_interval_minutes, Some(60));
        assert_eq!(cfg.timezone_offset_minutes, Some(120));
    }

    #[test]
    fn rejection_message_names_range() {
        let (_, rejected) =
            ScheduleConfig::from_json_object(&object(json!({ "active_start_hour": 30 })));
        assert_eq!(
            rejected[0].to_string(),
            "active_start_hour must be within 0..=23 (got 30)"
        );
    }

    #[test]
    fn effective_fills_firmware_defaults() {
        let cfg = ScheduleConfig {
            refresh_interval_minutes: Some(5),
            ..ScheduleConfig::default()
        };
        let eff = cfg.effective();
        assert_eq!(eff.refresh_interval_minutes, 5);
        assert_eq!(eff.active_start_hour, 8);
        assert_eq!(eff.active_end_hour, 20);
        assert_eq!(eff.timezone_offset_minutes, 0);
    }

    #[test]
    fn active_window_handles_offset_and_midnight_wrap() {
        let noon_utc = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let day = EffectiveSchedule::FIRMWARE_DEFAULTS;
        assert!(day.is_active_at(noon_utc));

        let shifted = EffectiveSchedule {
            timezone_offset_minutes: 540,
            ..day
        };
        // 21:00 local
        assert!(!shifted.is_active_at(noon_utc));

        let overnight = EffectiveSchedule {
            active_start_hour: 22,
            active_end_hour: 6,
            ..day
        };
        assert!(!overnight.is_active_at(noon_utc));
        let late = Utc.with_ymd_and_hms(2025, 3, 1, 23, 30, 0).unwrap();
        assert!(overnight.is_active_at(late));

        let always = EffectiveSchedule {
            active_start_hour: 9,
            active_end_hour: 9,
            ..day
        };
        assert!(always.is_active_at(late));
    }
}
