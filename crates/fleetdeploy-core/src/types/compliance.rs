//! Compliance findings, audit events and reports.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ComplianceError;
use crate::types::deployment::DeploymentStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Points deducted from a 100-point score per finding of this severity.
    pub fn penalty(self) -> u32 {
        match self {
            Severity::Critical => 40,
            Severity::High => 25,
            Severity::Medium => 10,
            Severity::Low => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    Privacy,
    Security,
    DataProtection,
    Metadata,
    Versioning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceViolation {
    #[serde(rename = "type")]
    pub violation_type: ViolationType,
    pub severity: Severity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VulnerabilityType {
    UnsignedBinary,
    InsecureTransport,
    InsecureAssetUrl,
    UnversionedRelease,
    UnverifiedPayloadSize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityVulnerability {
    #[serde(rename = "type")]
    pub vulnerability_type: VulnerabilityType,
    pub severity: Severity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceRequirements {
    pub is_compliant: bool,
    pub violations: Vec<ComplianceViolation>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityAssessment {
    /// 0 (worst) to 100 (no findings).
    pub score: u8,
    pub vulnerabilities: Vec<SecurityVulnerability>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "timestamp", rename_all = "snake_case")]
pub enum ReportPeriod {
    Daily,
    Weekly,
    Monthly,
    /// A single deployment, identified by its completion timestamp.
    Deployment(DateTime<Utc>),
}

impl ReportPeriod {
    /// Look-back window for rolling periods.
    pub fn window(&self) -> Option<Duration> {
        match self {
            ReportPeriod::Daily => Some(Duration::days(1)),
            ReportPeriod::Weekly => Some(Duration::days(7)),
            ReportPeriod::Monthly => Some(Duration::days(30)),
            ReportPeriod::Deployment(_) => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            ReportPeriod::Daily => "daily".to_string(),
            ReportPeriod::Weekly => "weekly".to_string(),
            ReportPeriod::Monthly => "monthly".to_string(),
            ReportPeriod::Deployment(ts) => format!("deployment@{}", ts.to_rfc3339()),
        }
    }
}

/// Aggregated counters for one reporting period.
///
/// `total_deployments` covers successful, failed and partially failed
/// deployments, so it is never smaller than `successful + failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceData {
    pub total_deployments: u64,
    pub successful_deployments: u64,
    pub failed_deployments: u64,
    pub compliance_violations: u64,
    pub security_incidents: u64,
    pub data_access_events: u64,
    pub audit_log_entries: u64,
}

impl ComplianceData {
    pub fn new(
        total_deployments: u64,
        successful_deployments: u64,
        failed_deployments: u64,
    ) -> Result<Self, ComplianceError> {
        let accounted = successful_deployments.checked_add(failed_deployments);
        if accounted.is_none_or(|sum| sum > total_deployments) {
            return Err(ComplianceError::ReportGenerationFailed(format!(
                "{} successful + {} failed deployments exceed total {}",
                successful_deployments, failed_deployments, total_deployments
            )));
        }
        Ok(Self {
            total_deployments,
            successful_deployments,
            failed_deployments,
            ..Self::default()
        })
    }

    pub fn with_compliance_violations(mut self, count: u64) -> Self {
        self.compliance_violations = count;
        self
    }

    pub fn with_security_incidents(mut self, count: u64) -> Self {
        self.security_incidents = count;
        self
    }

    pub fn with_data_access_events(mut self, count: u64) -> Self {
        self.data_access_events = count;
        self
    }

    pub fn with_audit_log_entries(mut self, count: u64) -> Self {
        self.audit_log_entries = count;
        self
    }

    pub(crate) fn record_deployment(&mut self, status: DeploymentStatus) {
        self.total_deployments += 1;
        match status {
            DeploymentStatus::Success => self.successful_deployments += 1,
            DeploymentStatus::Failure => self.failed_deployments += 1,
            DeploymentStatus::PartialFailure => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceSummary {
    pub success_rate: f64,
    pub compliance_rate: f64,
    pub security_score: f64,
    pub risk_level: RiskLevel,
}

/// What kind of device data was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    DeviceInfo,
    DeviceHealth,
    PolicySet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataAccessEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub device_identifier: String,
    pub data_kind: DataKind,
    pub accessor: String,
}

impl DataAccessEvent {
    pub fn new(
        device_identifier: impl Into<String>,
        data_kind: DataKind,
        accessor: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            device_identifier: device_identifier.into(),
            data_kind,
            accessor: accessor.into(),
        }
    }
}

/// Action recorded in the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AuditAction {
    DeviceEnrolled,
    EnrollmentPending,
    EnrollmentRejected,
    DeviceRemoved,
    PoliciesApplied { count: usize },
    BundleSigned,
    BundleUploaded { file_size: u64 },
    AppInstalled,
    AppRemoved,
    DeviceDeployed,
    DeviceDeployFailed { step: String },
    DeploymentCompleted {
        status: DeploymentStatus,
        deployed: usize,
        failed: usize,
    },
    ComplianceViolation { severity: Severity },
    SecurityIncident { severity: Severity },
    DataAccess { data_kind: DataKind },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub action: AuditAction,
    /// Device or bundle the action applies to.
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<Uuid>,
    pub message: String,
}

impl AuditLogEntry {
    pub fn new(action: AuditAction, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action,
            subject: subject.into(),
            deployment_id: None,
            message: message.into(),
        }
    }

    pub fn for_deployment(mut self, deployment_id: Uuid) -> Self {
        self.deployment_id = Some(deployment_id);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceReport {
    pub period: ReportPeriod,
    pub generated_at: DateTime<Utc>,
    pub data: ComplianceData,
    /// Populated only when audit logs were requested.
    #[serde(default)]
    pub audit_log: Vec<AuditLogEntry>,
    pub summary: ComplianceSummary,
}

impl ComplianceReport {
    pub fn new(
        period: ReportPeriod,
        generated_at: DateTime<Utc>,
        data: ComplianceData,
        audit_log: Vec<AuditLogEntry>,
        summary: ComplianceSummary,
    ) -> Self {
        Self {
            period,
            generated_at,
            data,
            audit_log,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compliance_data_rejects_overcounted_outcomes() {
        assert!(ComplianceData::new(10, 8, 3).is_err());
        assert!(ComplianceData::new(10, 8, 2).is_ok());
        assert!(ComplianceData::new(10, 7, 2).is_ok());
    }

    #[test]
    fn partial_failures_count_toward_total_only() {
        let mut data = ComplianceData::default();
        data.record_deployment(DeploymentStatus::Success);
        data.record_deployment(DeploymentStatus::PartialFailure);
        data.record_deployment(DeploymentStatus::Failure);
        assert_eq!(data.total_deployments, 3);
        assert_eq!(data.successful_deployments, 1);
        assert_eq!(data.failed_deployments, 1);
    }

    #[test]
    fn severity_penalties_are_ordered() {
        assert!(Severity::Critical.penalty() > Severity::High.penalty());
        assert!(Severity::High.penalty() > Severity::Medium.penalty());
        assert!(Severity::Medium.penalty() > Severity::Low.penalty());
    }

    #[test]
    fn audit_entry_serializes_action_inline() {
        let entry = AuditLogEntry::new(
            AuditAction::PoliciesApplied { count: 2 },
            "device-001",
            "applied baseline",
        );
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["action"], "policies_applied");
        assert_eq!(value["count"], 2);

        let back: AuditLogEntry = serde_json::from_value(value).unwrap();
        assert_eq!(back, entry);
    }
}
