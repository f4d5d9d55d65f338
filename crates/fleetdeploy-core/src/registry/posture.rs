//! Device compliance rules evaluated against applied security policies.

use chrono::{DateTime, Duration, Utc};
use semver::Version;

use crate::types::{Device, DeviceHealth, MdmPolicy, PolicyType};

pub const MINIMUM_OS_VERSION: &str = "minimumOSVersion";
pub const REQUIRE_PASSCODE: &str = "requirePasscode";
pub const REQUIRE_ENCRYPTION: &str = "requireEncryption";
pub const MINIMUM_BATTERY_LEVEL: &str = "minimumBatteryLevel";
pub const MAX_INACTIVE_DAYS: &str = "maxInactiveDays";

/// Device settings that back the boolean requirements.
pub const PASSCODE_SETTING: &str = "passcodeEnabled";
pub const ENCRYPTION_SETTING: &str = "encryptionEnabled";

/// Result of one compliance evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostureReport {
    pub failures: Vec<String>,
}

impl PostureReport {
    pub fn is_compliant(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn summary(&self) -> String {
        self.failures.join("; ")
    }
}

/// Parse an OS version, padding missing minor/patch components with zero.
pub fn parse_os_version(raw: &str) -> Option<Version> {
    let trimmed = raw.trim().trim_start_matches(['v', 'V']);
    let parts: Vec<&str> = trimmed.split('.').collect();
    if parts.is_empty() || parts.len() > 3 || parts.iter().any(|p| p.is_empty()) {
        return None;
    }
    let mut padded = parts.join(".");
    for _ in parts.len()..3 {
        padded.push_str(".0");
    }
    Version::parse(&padded).ok()
}

pub fn evaluate(
    device: &Device,
    policies: &[MdmPolicy],
    health: &DeviceHealth,
    now: DateTime<Utc>,
) -> PostureReport {
    let mut failures = Vec::new();

    for policy in policies.iter().filter(|p| p.policy_type == PolicyType::Security) {
        if let Some(minimum) = policy.str_setting(MINIMUM_OS_VERSION) {
            match (parse_os_version(&device.os_version), parse_os_version(minimum)) {
                (Some(actual), Some(required)) if actual < required => failures.push(format!(
                    "OS {} is below required {} ({})",
                    device.os_version, minimum, policy.identifier
                )),
                (None, _) => failures.push(format!(
                    "OS version '{}' cannot be compared ({})",
                    device.os_version, policy.identifier
                )),
                _ => {}
            }
        }

        if policy.bool_setting(REQUIRE_PASSCODE) == Some(true)
            && !device.setting_enabled(PASSCODE_SETTING)
        {
            failures.push(format!("passcode not enabled ({})", policy.identifier));
        }

        if policy.bool_setting(REQUIRE_ENCRYPTION) == Some(true)
            && !device.setting_enabled(ENCRYPTION_SETTING)
        {
            failures.push(format!("encryption not enabled ({})", policy.identifier));
        }

        if let Some(minimum) = policy.int_setting(MINIMUM_BATTERY_LEVEL) {
            let percent = health.battery_level() * 100.0;
            if percent < minimum as f64 {
                failures.push(format!(
                    "battery {:.0}% below required {}% ({})",
                    percent, minimum, policy.identifier
                ));
            }
        }

        if let Some(days) = policy.int_setting(MAX_INACTIVE_DAYS)
            && now - health.last_seen() > Duration::days(days)
        {
            failures.push(format!(
                "last seen {} exceeds {} inactive days ({})",
                health.last_seen().to_rfc3339(),
                days,
                policy.identifier
            ));
        }
    }

    PostureReport { failures }
}
