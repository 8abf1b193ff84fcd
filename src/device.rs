//! Device identity as reported by the panel firmware.

use std::convert::Infallible;
use std::fmt;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use tracing::warn;

/// Header the firmware uses to identify itself (its Wi-Fi MAC address).
pub const DEVICE_HEADER: &str = "X-Device-MAC";

/// Normalized, opaque device identity used to partition per-device state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub const DEFAULT: &'static str = "default";

    /// Lowercase, strip `:`, `-` and spaces. What remains must be ASCII
    /// alphanumeric or `_`, so the result is always safe as a single path
    /// component. Empty input and input with any other character map to
    /// `default`; dropping those characters instead could merge two devices.
    pub fn normalize(raw: &str) -> Self {
        let cleaned: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | ' '))
            .map(|c| c.to_ascii_lowercase())
            .collect();
        if cleaned.is_empty() {
            return Self::default();
        }
        if !cleaned.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            warn!(raw, "rejecting device identity with unexpected characters");
            return Self::default();
        }
        Self(cleaned)
    }

    pub fn from_header(value: Option<&str>) -> Self {
        value.map(Self::normalize).unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0 == Self::DEFAULT
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S> FromRequestParts<S> for DeviceId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(DEVICE_HEADER)
            .and_then(|value| value.to_str().ok());
        Ok(Self::from_header(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::DeviceId;

    #[test]
    fn strips_separators_and_lowercases() {
        assert_eq!(DeviceId::normalize("AA:11:BB:22:CC:33").as_str(), "aa11bb22cc33");
        assert_eq!(DeviceId::normalize("aa-11-bb-22-cc-33").as_str(), "aa11bb22cc33");
        assert_eq!(DeviceId::normalize(" AA 11 BB 22 CC 33 ").as_str(), "aa11bb22cc33");
    }

    #[test]
    fn missing_or_empty_maps_to_default() {
        assert!(DeviceId::from_header(None).is_default());
        assert!(DeviceId::from_header(Some("")).is_default());
        assert!(DeviceId::from_header(Some(":-:")).is_default());
    }

    #[test]
    fn path_characters_never_survive() {
        assert!(DeviceId::normalize("../../etc").is_default());
        assert!(DeviceId::normalize("/..").is_default());
        assert!(DeviceId::normalize("aa\\bb").is_default());
    }

    #[test]
    fn unexpected_characters_do_not_merge_identities() {
        assert!(DeviceId::normalize("ab.c").is_default());
        assert!(DeviceId::normalize("a%62c").is_default());
        assert_eq!(DeviceId::normalize("AB_c").as_str(), "ab_c");
        assert_ne!(DeviceId::normalize("ab.c"), DeviceId::normalize("abc"));
    }
}
