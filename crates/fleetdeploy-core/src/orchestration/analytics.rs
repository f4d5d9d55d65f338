//! Fleet-wide deployment analytics derived from the audit log.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::compliance::scoring::round2;
use crate::types::{AuditAction, AuditLogEntry, DeploymentStatus};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetAnalytics {
    pub enrolled_devices: usize,
    pub deployments: usize,
    pub successful_deployments: usize,
    pub partial_deployments: usize,
    pub failed_deployments: usize,
    pub device_installs: usize,
    pub device_failures: usize,
    pub failures_by_step: BTreeMap<String, usize>,
    pub data_access_events: usize,
    /// Share of per-device attempts that installed, in percent.
    pub device_success_rate: f64,
}

pub fn fleet_analytics(entries: &[AuditLogEntry], enrolled_devices: usize) -> FleetAnalytics {
    let mut analytics = FleetAnalytics {
        enrolled_devices,
        ..FleetAnalytics::default()
    };

    for entry in entries {
        match &entry.action {
            AuditAction::DeploymentCompleted { status, .. } => {
                analytics.deployments += 1;
                match status {
                    DeploymentStatus::Success => analytics.successful_deployments += 1,
                    DeploymentStatus::PartialFailure => analytics.partial_deployments += 1,
                    DeploymentStatus::Failure => analytics.failed_deployments += 1,
                }
            }
            AuditAction::DeviceDeployed => analytics.device_installs += 1,
            AuditAction::DeviceDeployFailed { step } => {
                analytics.device_failures += 1;
                *analytics.failures_by_step.entry(step.clone()).or_default() += 1;
            }
            AuditAction::DataAccess { .. } => analytics.data_access_events += 1,
            _ => {}
        }
    }

    let attempts = analytics.device_installs + analytics.device_failures;
    analytics.device_success_rate = if attempts == 0 {
        100.0
    } else {
        round2(analytics.device_installs as f64 / attempts as f64 * 100.0)
    };
    analytics
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_outcomes_and_failure_steps() {
        let entries = vec![
            AuditLogEntry::new(AuditAction::DeviceDeployed, "d1", "app"),
            AuditLogEntry::new(AuditAction::DeviceDeployed, "d2", "app"),
            AuditLogEntry::new(
                AuditAction::DeviceDeployFailed {
                    step: "enrollment".to_string(),
                },
                "d3",
                "not enrolled",
            ),
            AuditLogEntry::new(
                AuditAction::DeploymentCompleted {
                    status: DeploymentStatus::PartialFailure,
                    deployed: 2,
                    failed: 1,
                },
                "app",
                "done",
            ),
        ];
        let analytics = fleet_analytics(&entries, 2);
        assert_eq!(analytics.deployments, 1);
        assert_eq!(analytics.partial_deployments, 1);
        assert_eq!(analytics.failures_by_step.get("enrollment"), Some(&1));
        assert_eq!(analytics.device_success_rate, 66.67);
    }
}
