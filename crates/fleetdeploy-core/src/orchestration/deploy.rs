//! End-to-end deploy workflow.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::audit::AuditLog;
use crate::compliance::ComplianceAggregator;
use crate::distribution::DistributionPipeline;
use crate::error::{DeployError, DistributionError, ErrorKind, MdmError};
use crate::policy::PolicyEngine;
use crate::registry::DeviceRegistry;
use crate::types::{
    AppBundle, AuditAction, AuditLogEntry, DeploymentAnalytics, DeploymentResult,
    DeploymentStatus, DeploymentStep, DeviceFailure, MdmPolicy,
};

/// What to deploy and where.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub bundle: AppBundle,
    pub targets: Vec<String>,
    pub policies: Vec<MdmPolicy>,
    /// Keep going after a device fails instead of stopping devices that have
    /// not started yet.
    pub force: bool,
}

impl DeployRequest {
    pub fn new(bundle: AppBundle) -> Self {
        Self {
            bundle,
            targets: Vec::new(),
            policies: Vec::new(),
            force: false,
        }
    }

    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_policies(mut self, policies: Vec<MdmPolicy>) -> Self {
        self.policies = policies;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

#[derive(Debug, Clone)]
pub struct DeploymentOrchestrator {
    registry: Arc<DeviceRegistry>,
    policies: PolicyEngine,
    distribution: Arc<DistributionPipeline>,
    compliance: Arc<ComplianceAggregator>,
    audit: Arc<AuditLog>,
}

/// Shared state for one deploy's fan-out.
struct Fanout<'a> {
    bundle: &'a AppBundle,
    policies: &'a [MdmPolicy],
    force: bool,
    deployment_id: Uuid,
    stopped: AtomicBool,
}

impl DeploymentOrchestrator {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        distribution: Arc<DistributionPipeline>,
        compliance: Arc<ComplianceAggregator>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            policies: PolicyEngine::new(Arc::clone(&registry)),
            registry,
            distribution,
            compliance,
            audit,
        }
    }

    /// Sign (when required), upload once, then install on every target.
    ///
    /// Sign, upload and compliance-check failures are returned as errors since
    /// nothing was fanned out. Per-device failures land in the result.
    #[instrument(skip(self, request), fields(app = %request.bundle.identifier(), targets = request.targets.len(), force = request.force))]
    pub async fn deploy(&self, request: DeployRequest) -> Result<DeploymentResult, DeployError> {
        let started = Instant::now();
        let deployment_id = Uuid::new_v4();
        let DeployRequest {
            bundle,
            targets,
            policies,
            force,
        } = request;

        let bundle = if self.distribution.config().requires_signing() && !bundle.is_signed() {
            self.distribution.sign(bundle)?
        } else {
            bundle
        };

        self.record_findings(&bundle, deployment_id)?;

        let upload = self.distribution.upload(&bundle).await?;

        let mut seen = BTreeSet::new();
        let targets: Vec<String> = targets
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();

        let fanout = Fanout {
            bundle: &bundle,
            policies: &policies,
            force,
            deployment_id,
            stopped: AtomicBool::new(false),
        };
        let outcomes = join_all(targets.iter().map(|t| self.deploy_device(&fanout, t))).await;

        let mut deployed_devices = BTreeSet::new();
        let mut failed_devices = BTreeSet::new();
        let mut failures = Vec::new();
        let mut failures_by_step: BTreeMap<DeploymentStep, usize> = BTreeMap::new();
        for (target, outcome) in targets.iter().zip(outcomes) {
            match outcome {
                Ok(()) => {
                    deployed_devices.insert(target.clone());
                }
                Err(failure) => {
                    failed_devices.insert(target.clone());
                    *failures_by_step.entry(failure.step).or_default() += 1;
                    failures.push(failure);
                }
            }
        }

        let status = DeploymentStatus::from_outcome(deployed_devices.len(), failed_devices.len());
        let timestamp = Utc::now();
        self.audit.record(
            AuditLogEntry::new(
                AuditAction::DeploymentCompleted {
                    status,
                    deployed: deployed_devices.len(),
                    failed: failed_devices.len(),
                },
                bundle.identifier(),
                format!("deployment {} finished: {}", deployment_id, status.as_str()),
            )
            .for_deployment(deployment_id)
            .at(timestamp),
        );

        let analytics = DeploymentAnalytics {
            target_count: targets.len(),
            deployed_count: deployed_devices.len(),
            failed_count: failed_devices.len(),
            failures_by_step,
            upload_size: upload.file_size,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        let mut result = DeploymentResult {
            status,
            app_identifier: bundle.identifier().to_string(),
            deployment_id,
            deployed_devices,
            failed_devices,
            failures,
            compliance_report: None,
            analytics: Some(analytics),
            timestamp,
        };
        result.compliance_report = Some(self.compliance.deployment_report(&result)?);

        info!(
            %deployment_id,
            status = status.as_str(),
            deployed = result.deployed_devices.len(),
            failed = result.failed_devices.len(),
            "deployment finished"
        );
        Ok(result)
    }

    /// Log requirement violations and security findings for this deployment.
    /// They are reported, not enforced.
    fn record_findings(&self, bundle: &AppBundle, deployment_id: Uuid) -> Result<(), DeployError> {
        let requirements = self.compliance.requirements(bundle)?;
        for violation in &requirements.violations {
            self.audit.record(
                AuditLogEntry::new(
                    AuditAction::ComplianceViolation {
                        severity: violation.severity,
                    },
                    bundle.identifier(),
                    violation.description.clone(),
                )
                .for_deployment(deployment_id),
            );
        }

        let assessment = self.compliance.security_assessment(bundle)?;
        for finding in &assessment.vulnerabilities {
            self.audit.record(
                AuditLogEntry::new(
                    AuditAction::SecurityIncident {
                        severity: finding.severity,
                    },
                    bundle.identifier(),
                    finding.description.clone(),
                )
                .for_deployment(deployment_id),
            );
        }
        if !requirements.is_compliant || !assessment.vulnerabilities.is_empty() {
            warn!(
                violations = requirements.violations.len(),
                score = assessment.score,
                "bundle has compliance findings"
            );
        }
        Ok(())
    }

    /// Enrollment check, policy apply and install for one device, in order,
    /// under a single hold on the device record.
    async fn deploy_device(&self, fanout: &Fanout<'_>, target: &str) -> Result<(), DeviceFailure> {
        self.check_halted(fanout, target, "not started")?;

        let mut lease = self
            .registry
            .lock_enrolled(target)
            .await
            .map_err(|e| self.fail_mdm(fanout, target, DeploymentStep::Enrollment, e))?;

        self.check_halted(fanout, target, "policies not applied")?;
        self.policies
            .apply_locked(fanout.policies, &mut lease)
            .await
            .map_err(|e| self.fail_mdm(fanout, target, DeploymentStep::Policy, e))?;

        self.check_halted(fanout, target, "not installed")?;
        self.distribution
            .install_locked(fanout.bundle, &mut lease)
            .await
            .map_err(|e| {
                let step = match e {
                    DistributionError::Device(_) => DeploymentStep::Compliance,
                    _ => DeploymentStep::Install,
                };
                self.fail(fanout, target, step, Some(e.kind()), e.to_string())
            })?;

        self.audit.record(
            AuditLogEntry::new(
                AuditAction::DeviceDeployed,
                target,
                fanout.bundle.identifier(),
            )
            .for_deployment(fanout.deployment_id),
        );
        Ok(())
    }

    /// Without `force`, a device stops at its next step once any other
    /// device has failed.
    fn check_halted(
        &self,
        fanout: &Fanout<'_>,
        target: &str,
        what: &str,
    ) -> Result<(), DeviceFailure> {
        if fanout.force || !fanout.stopped.load(Ordering::SeqCst) {
            return Ok(());
        }
        Err(self.fail(
            fanout,
            target,
            DeploymentStep::Skipped,
            None,
            format!("{} after an earlier device failed", what),
        ))
    }

    fn fail_mdm(
        &self,
        fanout: &Fanout<'_>,
        target: &str,
        step: DeploymentStep,
        error: MdmError,
    ) -> DeviceFailure {
        self.fail(fanout, target, step, Some(error.kind()), error.to_string())
    }

    fn fail(
        &self,
        fanout: &Fanout<'_>,
        target: &str,
        step: DeploymentStep,
        kind: Option<ErrorKind>,
        message: String,
    ) -> DeviceFailure {
        if step != DeploymentStep::Skipped {
            fanout.stopped.store(true, Ordering::SeqCst);
            warn!(device = %target, step = step.as_str(), error = %message, "device failed");
        }
        self.audit.record(
            AuditLogEntry::new(
                AuditAction::DeviceDeployFailed {
                    step: step.as_str().to_string(),
                },
                target,
                message.clone(),
            )
            .for_deployment(fanout.deployment_id),
        );
        DeviceFailure {
            device_identifier: target.to_string(),
            step,
            kind,
            message,
        }
    }
}
