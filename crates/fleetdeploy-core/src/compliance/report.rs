//! Folding audit entries into report counters.

use crate::types::{AuditAction, AuditLogEntry, ComplianceData, Severity};

/// Counters plus the severity of every security incident seen.
#[derive(Debug, Default)]
pub struct Tally {
    pub data: ComplianceData,
    pub incidents: Vec<Severity>,
}

/// Fold entries into counters. When `count_deployments` is false, completed
/// deployments are left to the caller.
pub fn tally(entries: &[AuditLogEntry], count_deployments: bool) -> Tally {
    let mut tally = Tally::default();
    for entry in entries {
        match &entry.action {
            AuditAction::DeploymentCompleted { status, .. } if count_deployments => {
                tally.data.record_deployment(*status);
            }
            AuditAction::ComplianceViolation { .. } => tally.data.compliance_violations += 1,
            AuditAction::SecurityIncident { severity } => {
                tally.data.security_incidents += 1;
                tally.incidents.push(*severity);
            }
            AuditAction::DataAccess { .. } => tally.data.data_access_events += 1,
            _ => {}
        }
    }
    tally.data.audit_log_entries = entries.len() as u64;
    tally
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataKind, DeploymentStatus};

    fn entry(action: AuditAction) -> AuditLogEntry {
        AuditLogEntry::new(action, "subject", "message")
    }

    #[test]
    fn counts_each_event_kind() {
        let entries = vec![
            entry(AuditAction::DeploymentCompleted {
                status: DeploymentStatus::Success,
                deployed: 2,
                failed: 0,
            }),
            entry(AuditAction::DeploymentCompleted {
                status: DeploymentStatus::PartialFailure,
                deployed: 1,
                failed: 1,
            }),
            entry(AuditAction::ComplianceViolation {
                severity: Severity::High,
            }),
            entry(AuditAction::SecurityIncident {
                severity: Severity::Critical,
            }),
            entry(AuditAction::DataAccess {
                data_kind: DataKind::DeviceInfo,
            }),
            entry(AuditAction::DeviceEnrolled),
        ];
        let tally = tally(&entries, true);
        assert_eq!(tally.data.total_deployments, 2);
        assert_eq!(tally.data.successful_deployments, 1);
        assert_eq!(tally.data.failed_deployments, 0);
        assert_eq!(tally.data.compliance_violations, 1);
        assert_eq!(tally.data.security_incidents, 1);
        assert_eq!(tally.data.data_access_events, 1);
        assert_eq!(tally.data.audit_log_entries, 6);
        assert_eq!(tally.incidents, vec![Severity::Critical]);
    }

    #[test]
    fn deployments_can_be_left_out() {
        let entries = vec![entry(AuditAction::DeploymentCompleted {
            status: DeploymentStatus::Failure,
            deployed: 0,
            failed: 1,
        })];
        assert_eq!(tally(&entries, false).data.total_deployments, 0);
    }
}
