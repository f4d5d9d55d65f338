//! Devices, health snapshots and enrollment messages.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::MdmError;

/// Hardware and settings inventory reported by a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub serial_number: String,
    #[serde(default)]
    pub udid: String,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub settings: BTreeMap<String, serde_json::Value>,
}

/// A managed device. The identifier is unique and stable across lifecycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub identifier: String,
    pub name: String,
    pub model: String,
    pub os_version: String,
    #[serde(default)]
    pub info: DeviceInfo,
}

impl Device {
    pub fn new(
        identifier: impl Into<String>,
        name: impl Into<String>,
        model: impl Into<String>,
        os_version: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            model: model.into(),
            os_version: os_version.into(),
            info: DeviceInfo::default(),
        }
    }

    pub fn with_info(mut self, info: DeviceInfo) -> Self {
        self.info = info;
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.info.settings.insert(key.into(), value);
        self
    }

    /// True when the device reports the boolean setting as enabled.
    pub fn setting_enabled(&self, key: &str) -> bool {
        self.info
            .settings
            .get(key)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkStatus {
    Connected,
    Disconnected,
    #[default]
    Unknown,
}

/// Health snapshot exactly as a transport reports it, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDeviceHealth {
    pub battery_level: f64,
    pub available_storage: u64,
    pub total_storage: u64,
    #[serde(default)]
    pub network_status: NetworkStatus,
    pub last_seen: DateTime<Utc>,
}

/// Validated point-in-time device health. Recomputed per query, never stored.
///
/// Storage values of zero mean "not yet known"; once known, both are positive
/// and available never exceeds total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDeviceHealth", into = "RawDeviceHealth")]
pub struct DeviceHealth {
    battery_level: f64,
    available_storage: u64,
    total_storage: u64,
    network_status: NetworkStatus,
    last_seen: DateTime<Utc>,
}

impl DeviceHealth {
    pub fn new(
        battery_level: f64,
        available_storage: u64,
        total_storage: u64,
        network_status: NetworkStatus,
        last_seen: DateTime<Utc>,
    ) -> Result<Self, MdmError> {
        if !(0.0..=1.0).contains(&battery_level) {
            return Err(MdmError::ServerError(format!(
                "battery level {} outside [0, 1]",
                battery_level
            )));
        }
        let storage_known = available_storage > 0 || total_storage > 0;
        if storage_known && (total_storage == 0 || available_storage > total_storage) {
            return Err(MdmError::ServerError(format!(
                "available storage {} exceeds total storage {}",
                available_storage, total_storage
            )));
        }
        Ok(Self {
            battery_level,
            available_storage,
            total_storage,
            network_status,
            last_seen,
        })
    }

    pub fn battery_level(&self) -> f64 {
        self.battery_level
    }

    pub fn available_storage(&self) -> u64 {
        self.available_storage
    }

    pub fn total_storage(&self) -> u64 {
        self.total_storage
    }

    pub fn network_status(&self) -> NetworkStatus {
        self.network_status
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_seen
    }

    pub fn storage_known(&self) -> bool {
        self.total_storage > 0
    }
}

impl TryFrom<RawDeviceHealth> for DeviceHealth {
    type Error = MdmError;

    fn try_from(raw: RawDeviceHealth) -> Result<Self, Self::Error> {
        DeviceHealth::new(
            raw.battery_level,
            raw.available_storage,
            raw.total_storage,
            raw.network_status,
            raw.last_seen,
        )
    }
}

impl From<DeviceHealth> for RawDeviceHealth {
    fn from(health: DeviceHealth) -> Self {
        Self {
            battery_level: health.battery_level,
            available_storage: health.available_storage,
            total_storage: health.total_storage,
            network_status: health.network_status,
            last_seen: health.last_seen,
        }
    }
}

/// Enrollment request sent to the MDM server.
#[derive(Clone, Serialize, Deserialize)]
pub struct EnrollmentProfile {
    pub device_identifier: String,
    pub organization_id: String,
    pub server_url: Url,
    pub enrollment_token: String,
    pub device_info: DeviceInfo,
}

impl fmt::Debug for EnrollmentProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnrollmentProfile")
            .field("device_identifier", &self.device_identifier)
            .field("organization_id", &self.organization_id)
            .field("server_url", &self.server_url.as_str())
            .field("enrollment_token", &"<redacted>")
            .field("device_info", &self.device_info)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Enrolled,
    Pending,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentResponse {
    pub status: EnrollmentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl EnrollmentResponse {
    pub fn enrolled() -> Self {
        Self {
            status: EnrollmentStatus::Enrolled,
            error_message: None,
        }
    }

    pub fn pending() -> Self {
        Self {
            status: EnrollmentStatus::Pending,
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: EnrollmentStatus::Failed,
            error_message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_rejects_battery_out_of_range() {
        let result = DeviceHealth::new(1.2, 10, 100, NetworkStatus::Connected, Utc::now());
        assert!(matches!(result, Err(MdmError::ServerError(_))));
    }

    #[test]
    fn health_rejects_available_above_total() {
        let result = DeviceHealth::new(0.5, 200, 100, NetworkStatus::Connected, Utc::now());
        assert!(result.is_err());
    }

    #[test]
    fn health_allows_unknown_storage() {
        let health = DeviceHealth::new(0.5, 0, 0, NetworkStatus::Unknown, Utc::now()).unwrap();
        assert!(!health.storage_known());
    }

    #[test]
    fn health_deserialization_validates() {
        let json = r#"{
            "battery_level": 3.0,
            "available_storage": 1,
            "total_storage": 2,
            "network_status": "connected",
            "last_seen": "2026-01-01T00:00:00Z"
        }"#;
        assert!(serde_json::from_str::<DeviceHealth>(json).is_err());
    }

    #[test]
    fn profile_debug_redacts_token() {
        let profile = EnrollmentProfile {
            device_identifier: "device-001".to_string(),
            organization_id: "org".to_string(),
            server_url: Url::parse("https://mdm.test.com").unwrap(),
            enrollment_token: "secret-token-value".to_string(),
            device_info: DeviceInfo::default(),
        };
        let debug = format!("{:?}", profile);
        assert!(!debug.contains("secret-token-value"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn setting_enabled_reads_booleans_only() {
        let device = Device::new("d", "n", "m", "17.0")
            .with_setting("passcodeSet", serde_json::Value::Bool(true))
            .with_setting("encrypted", serde_json::Value::String("yes".into()));
        assert!(device.setting_enabled("passcodeSet"));
        assert!(!device.setting_enabled("encrypted"));
        assert!(!device.setting_enabled("missing"));
    }
}
