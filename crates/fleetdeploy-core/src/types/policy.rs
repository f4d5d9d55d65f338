//! MDM configuration policies.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    Security,
    Network,
    Restrictions,
    Email,
    Vpn,
    Wifi,
    /// Any type this engine does not understand. Never applied.
    #[serde(other)]
    Unknown,
}

impl PolicyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyType::Security => "security",
            PolicyType::Network => "network",
            PolicyType::Restrictions => "restrictions",
            PolicyType::Email => "email",
            PolicyType::Vpn => "vpn",
            PolicyType::Wifi => "wifi",
            PolicyType::Unknown => "unknown",
        }
    }
}

/// A single policy configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PolicyValue {
    Bool(bool),
    Int(i64),
    String(String),
    List(Vec<String>),
}

impl PolicyValue {
    pub fn kind(&self) -> &'static str {
        match self {
            PolicyValue::Bool(_) => "bool",
            PolicyValue::Int(_) => "int",
            PolicyValue::String(_) => "string",
            PolicyValue::List(_) => "list",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MdmPolicy {
    pub identifier: String,
    pub name: String,
    #[serde(rename = "type")]
    pub policy_type: PolicyType,
    #[serde(default)]
    pub configuration: BTreeMap<String, PolicyValue>,
}

impl MdmPolicy {
    pub fn new(
        identifier: impl Into<String>,
        name: impl Into<String>,
        policy_type: PolicyType,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            name: name.into(),
            policy_type,
            configuration: BTreeMap::new(),
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: PolicyValue) -> Self {
        self.configuration.insert(key.into(), value);
        self
    }

    pub fn bool_setting(&self, key: &str) -> Option<bool> {
        match self.configuration.get(key) {
            Some(PolicyValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn int_setting(&self, key: &str) -> Option<i64> {
        match self.configuration.get(key) {
            Some(PolicyValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn str_setting(&self, key: &str) -> Option<&str> {
        match self.configuration.get(key) {
            Some(PolicyValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_policy_type_deserializes_to_unknown() {
        let json = r#"{"identifier":"p1","name":"Kiosk","type":"kiosk_mode"}"#;
        let policy: MdmPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.policy_type, PolicyType::Unknown);
    }

    #[test]
    fn configuration_values_keep_their_kind() {
        let json = r#"{
            "identifier": "sec",
            "name": "Baseline",
            "type": "security",
            "configuration": {
                "requirePasscode": true,
                "minimumBatteryLevel": 20,
                "minimumOSVersion": "17.0",
                "blockedApps": ["com.bad.app"]
            }
        }"#;
        let policy: MdmPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.bool_setting("requirePasscode"), Some(true));
        assert_eq!(policy.int_setting("minimumBatteryLevel"), Some(20));
        assert_eq!(policy.str_setting("minimumOSVersion"), Some("17.0"));
        assert_eq!(
            policy.configuration.get("blockedApps").map(PolicyValue::kind),
            Some("list")
        );
    }
}
