//! Compliance aggregator.
//!
//! Read-only over devices and bundles: everything it reports is derived from
//! bundle metadata or from events other components wrote to the audit log.

pub mod monitor;
pub mod report;
pub mod rules;
pub mod scoring;

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::audit::AuditLog;
use crate::config::ComplianceConfiguration;
use crate::error::ComplianceError;
use crate::types::{
    AppBundle, AuditAction, ComplianceData, ComplianceReport, ComplianceRequirements,
    ComplianceSummary, DataAccessEvent, DeploymentResult, ReportPeriod, SecurityAssessment,
    Severity,
};

pub use monitor::DataAccessSubscription;

#[derive(Debug, Clone)]
pub struct ComplianceAggregator {
    config: ComplianceConfiguration,
    audit: Arc<AuditLog>,
}

impl ComplianceAggregator {
    pub fn new(config: ComplianceConfiguration, audit: Arc<AuditLog>) -> Self {
        Self { config, audit }
    }

    pub fn config(&self) -> &ComplianceConfiguration {
        &self.config
    }

    pub fn requirements(
        &self,
        bundle: &AppBundle,
    ) -> Result<ComplianceRequirements, ComplianceError> {
        if bundle.identifier().trim().is_empty() {
            return Err(ComplianceError::ComplianceCheckFailed(
                "bundle identifier is empty".to_string(),
            ));
        }
        let violations = rules::check_requirements(bundle, &self.config);
        let recommendations =
            rules::recommendations(violations.iter().map(|v| v.remediation.as_ref()));
        Ok(ComplianceRequirements {
            is_compliant: violations.is_empty(),
            violations,
            recommendations,
        })
    }

    pub fn security_assessment(
        &self,
        bundle: &AppBundle,
    ) -> Result<SecurityAssessment, ComplianceError> {
        if bundle.identifier().trim().is_empty() {
            return Err(ComplianceError::SecurityAssessmentFailed(
                "bundle identifier is empty".to_string(),
            ));
        }
        let vulnerabilities = rules::find_vulnerabilities(bundle);
        let recommendations =
            rules::recommendations(vulnerabilities.iter().map(|v| v.remediation.as_ref()));
        Ok(SecurityAssessment {
            score: scoring::score_vulnerabilities(&vulnerabilities),
            vulnerabilities,
            recommendations,
        })
    }

    /// Summary of arbitrary counters using this aggregator's risk thresholds.
    pub fn summarize(&self, data: &ComplianceData, incidents: &[Severity]) -> ComplianceSummary {
        scoring::summarize(data, incidents, self.config.risk_thresholds())
    }

    /// Aggregate the audit log over `period`.
    ///
    /// `Deployment(ts)` selects the deployment that completed at `ts`.
    pub fn report(
        &self,
        period: ReportPeriod,
        include_audit_logs: bool,
    ) -> Result<ComplianceReport, ComplianceError> {
        let now = Utc::now();
        let entries = match period {
            ReportPeriod::Deployment(ts) => {
                let deployment_id = self
                    .audit
                    .entries()
                    .into_iter()
                    .filter(|e| matches!(e.action, AuditAction::DeploymentCompleted { .. }))
                    .find(|e| e.timestamp == ts)
                    .and_then(|e| e.deployment_id)
                    .ok_or_else(|| {
                        ComplianceError::ReportGenerationFailed(format!(
                            "no deployment completed at {}",
                            ts.to_rfc3339()
                        ))
                    })?;
                self.audit.entries_for_deployment(deployment_id)
            }
            rolling => match rolling.window() {
                Some(window) => self.audit.entries_since(now - window),
                None => self.audit.entries(),
            },
        };

        let tally = report::tally(&entries, true);
        let summary = self.summarize(&tally.data, &tally.incidents);
        debug!(period = %period.label(), entries = entries.len(), "report generated");
        Ok(ComplianceReport::new(
            period,
            now,
            tally.data,
            if include_audit_logs { entries } else { Vec::new() },
            summary,
        ))
    }

    /// Report covering a single deployment, with its audit trail attached.
    pub fn deployment_report(
        &self,
        result: &DeploymentResult,
    ) -> Result<ComplianceReport, ComplianceError> {
        let entries = self.audit.entries_for_deployment(result.deployment_id);
        let mut tally = report::tally(&entries, false);
        tally.data.record_deployment(result.status);

        let summary = self.summarize(&tally.data, &tally.incidents);
        Ok(ComplianceReport::new(
            ReportPeriod::Deployment(result.timestamp),
            Utc::now(),
            tally.data,
            entries,
            summary,
        ))
    }

    /// Forward live data-access events to `on_event` without blocking.
    pub fn monitor_data_access<F>(
        &self,
        on_event: F,
    ) -> Result<DataAccessSubscription, ComplianceError>
    where
        F: Fn(DataAccessEvent) + Send + 'static,
    {
        monitor::spawn(self.audit.subscribe_data_access(), on_event)
    }
}
