//! Deployment outcomes.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::types::compliance::ComplianceReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Success,
    PartialFailure,
    Failure,
}

impl DeploymentStatus {
    /// Success exactly when nothing failed; failure when nothing was deployed.
    pub fn from_outcome(deployed: usize, failed: usize) -> Self {
        if failed == 0 {
            DeploymentStatus::Success
        } else if deployed == 0 {
            DeploymentStatus::Failure
        } else {
            DeploymentStatus::PartialFailure
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Success => "success",
            DeploymentStatus::PartialFailure => "partial_failure",
            DeploymentStatus::Failure => "failure",
        }
    }
}

/// Stage of the per-device pipeline at which a device failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStep {
    Enrollment,
    Policy,
    Compliance,
    Install,
    /// Not attempted because a sibling device failed without `force`.
    Skipped,
}

impl DeploymentStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStep::Enrollment => "enrollment",
            DeploymentStep::Policy => "policy",
            DeploymentStep::Compliance => "compliance",
            DeploymentStep::Install => "install",
            DeploymentStep::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFailure {
    pub device_identifier: String,
    pub step: DeploymentStep,
    pub kind: Option<ErrorKind>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentAnalytics {
    pub target_count: usize,
    pub deployed_count: usize,
    pub failed_count: usize,
    pub failures_by_step: BTreeMap<DeploymentStep, usize>,
    pub upload_size: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub status: DeploymentStatus,
    pub app_identifier: String,
    pub deployment_id: Uuid,
    pub deployed_devices: BTreeSet<String>,
    pub failed_devices: BTreeSet<String>,
    /// One entry per member of `failed_devices`.
    #[serde(default)]
    pub failures: Vec<DeviceFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compliance_report: Option<ComplianceReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analytics: Option<DeploymentAnalytics>,
    pub timestamp: DateTime<Utc>,
}

impl DeploymentResult {
    pub fn failure_for(&self, device_identifier: &str) -> Option<&DeviceFailure> {
        self.failures
            .iter()
            .find(|f| f.device_identifier == device_identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_follows_outcome_counts() {
        assert_eq!(DeploymentStatus::from_outcome(3, 0), DeploymentStatus::Success);
        assert_eq!(DeploymentStatus::from_outcome(2, 1), DeploymentStatus::PartialFailure);
        assert_eq!(DeploymentStatus::from_outcome(0, 2), DeploymentStatus::Failure);
    }

    #[test]
    fn empty_target_list_is_a_success() {
        assert_eq!(DeploymentStatus::from_outcome(0, 0), DeploymentStatus::Success);
    }
}
