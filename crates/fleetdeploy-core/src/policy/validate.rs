//! Structural validation of policies before they reach a device.

use crate::error::MdmError;
use crate::registry::posture;
use crate::types::{MdmPolicy, PolicyType, PolicyValue};

#[derive(Debug, Clone, Copy)]
enum Expect {
    Bool,
    Int { min: i64, max: i64 },
    Text,
    OsVersion,
    List,
}

/// Known keys for a policy type. Keys outside this table pass through
/// unchecked.
fn schema(policy_type: PolicyType) -> &'static [(&'static str, Expect)] {
    use Expect::*;
    match policy_type {
        PolicyType::Security => &[
            (posture::MINIMUM_OS_VERSION, OsVersion),
            (posture::REQUIRE_PASSCODE, Bool),
            (posture::REQUIRE_ENCRYPTION, Bool),
            (posture::MINIMUM_BATTERY_LEVEL, Int { min: 0, max: 100 }),
            (posture::MAX_INACTIVE_DAYS, Int { min: 0, max: 3650 }),
            ("passcodeMinLength", Int { min: 0, max: 64 }),
        ],
        PolicyType::Network => &[
            ("proxyHost", Text),
            ("proxyPort", Int { min: 1, max: 65535 }),
            ("allowedDomains", List),
        ],
        PolicyType::Restrictions => &[
            ("allowCamera", Bool),
            ("allowScreenshots", Bool),
            ("allowAppInstallation", Bool),
            ("blockedApps", List),
        ],
        PolicyType::Email => &[
            ("emailAddress", Text),
            ("incomingServer", Text),
            ("outgoingServer", Text),
            ("useSSL", Bool),
        ],
        PolicyType::Vpn => &[
            ("vpnType", Text),
            ("server", Text),
            ("onDemand", Bool),
        ],
        PolicyType::Wifi => &[
            ("ssid", Text),
            ("securityType", Text),
            ("autoJoin", Bool),
            ("hiddenNetwork", Bool),
        ],
        PolicyType::Unknown => &[],
    }
}

pub fn validate_policy(policy: &MdmPolicy) -> Result<(), MdmError> {
    if policy.identifier.trim().is_empty() {
        return Err(MdmError::InvalidPolicy(format!(
            "policy '{}' has an empty identifier",
            policy.name
        )));
    }
    if policy.policy_type == PolicyType::Unknown {
        return Err(MdmError::InvalidPolicy(format!(
            "policy {} has an unsupported type",
            policy.identifier
        )));
    }

    for (key, expect) in schema(policy.policy_type) {
        let Some(value) = policy.configuration.get(*key) else {
            continue;
        };
        let ok = match (expect, value) {
            (Expect::Bool, PolicyValue::Bool(_)) => true,
            (Expect::Int { min, max }, PolicyValue::Int(i)) => (*min..=*max).contains(i),
            (Expect::Text, PolicyValue::String(s)) => !s.trim().is_empty(),
            (Expect::OsVersion, PolicyValue::String(s)) => posture::parse_os_version(s).is_some(),
            (Expect::List, PolicyValue::List(_)) => true,
            _ => false,
        };
        if !ok {
            return Err(MdmError::InvalidPolicy(format!(
                "policy {}: {} has malformed {} value",
                policy.identifier,
                key,
                value.kind()
            )));
        }
    }
    Ok(())
}

/// Validate every policy; the first invalid one rejects the whole set.
pub fn validate_all(policies: &[MdmPolicy]) -> Result<(), MdmError> {
    policies.iter().try_for_each(validate_policy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_keys_are_type_checked() {
        let bad = MdmPolicy::new("sec", "Security", PolicyType::Security)
            .with_setting("requirePasscode", PolicyValue::String("yes".into()));
        assert!(matches!(
            validate_policy(&bad),
            Err(MdmError::InvalidPolicy(_))
        ));

        let good = MdmPolicy::new("sec", "Security", PolicyType::Security)
            .with_setting("requirePasscode", PolicyValue::Bool(true))
            .with_setting("minimumOSVersion", PolicyValue::String("17.1".into()));
        assert!(validate_policy(&good).is_ok());
    }

    #[test]
    fn ranges_are_enforced() {
        let policy = MdmPolicy::new("sec", "Security", PolicyType::Security)
            .with_setting("minimumBatteryLevel", PolicyValue::Int(150));
        assert!(validate_policy(&policy).is_err());
    }

    #[test]
    fn unknown_keys_pass_through() {
        let policy = MdmPolicy::new("wifi", "Office", PolicyType::Wifi)
            .with_setting("vendorExtension", PolicyValue::Int(7));
        assert!(validate_policy(&policy).is_ok());
    }

    #[test]
    fn unknown_type_and_empty_identifier_are_rejected() {
        assert!(validate_policy(&MdmPolicy::new("x", "X", PolicyType::Unknown)).is_err());
        assert!(validate_policy(&MdmPolicy::new(" ", "X", PolicyType::Vpn)).is_err());
    }

    #[test]
    fn unparseable_minimum_os_is_rejected() {
        let policy = MdmPolicy::new("sec", "Security", PolicyType::Security)
            .with_setting("minimumOSVersion", PolicyValue::String("latest".into()));
        assert!(validate_policy(&policy).is_err());
    }
}
