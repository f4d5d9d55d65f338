//! Policy engine: validates policy sets and applies them atomically.

pub mod validate;

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::MdmError;
use crate::registry::{DeviceLease, DeviceRegistry};
use crate::transport::with_timeout;
use crate::types::{AuditAction, AuditLogEntry, DataKind, MdmPolicy};

pub use validate::{validate_all, validate_policy};

#[derive(Debug, Clone)]
pub struct PolicyEngine {
    registry: Arc<DeviceRegistry>,
}

impl PolicyEngine {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self { registry }
    }

    /// Apply `policies` to an enrolled device, all or nothing.
    ///
    /// Policies replace applied ones with the same identifier and accumulate
    /// otherwise.
    pub async fn apply(
        &self,
        policies: &[MdmPolicy],
        device_identifier: &str,
    ) -> Result<(), MdmError> {
        let mut lease = self.registry.lock_enrolled(device_identifier).await?;
        self.apply_locked(policies, &mut lease).await
    }

    /// Same as [`Self::apply`] for a device the caller already holds.
    pub async fn apply_locked(
        &self,
        policies: &[MdmPolicy],
        lease: &mut DeviceLease,
    ) -> Result<(), MdmError> {
        validate_all(policies)?;
        if policies.is_empty() {
            return Ok(());
        }

        let merged = merge(lease.policies(), policies);

        let timeout = self.registry.config().timeout();
        with_timeout(
            timeout,
            "apply policies",
            self.registry
                .transport()
                .apply_policies(lease.identifier(), policies),
        )
        .await
        .map_err(|e| {
            warn!(device = %lease.identifier(), error = %e, "policy push failed");
            e.into_mdm(MdmError::ServerError)
        })?;

        lease.commit_policies(merged);
        info!(device = %lease.identifier(), count = policies.len(), "policies applied");
        self.registry.audit().record(AuditLogEntry::new(
            AuditAction::PoliciesApplied {
                count: policies.len(),
            },
            lease.identifier(),
            policies
                .iter()
                .map(|p| p.identifier.as_str())
                .collect::<Vec<_>>()
                .join(","),
        ));
        Ok(())
    }

    /// Policies currently committed for an enrolled device.
    pub async fn current(&self, device_identifier: &str) -> Result<Vec<MdmPolicy>, MdmError> {
        let lease = self.registry.lock_enrolled(device_identifier).await?;
        self.registry
            .audit()
            .record_data_access(device_identifier, DataKind::PolicySet, "policy-engine");
        Ok(lease.policies().to_vec())
    }
}

fn merge(current: &[MdmPolicy], incoming: &[MdmPolicy]) -> Vec<MdmPolicy> {
    let mut merged = current.to_vec();
    for policy in incoming {
        match merged.iter_mut().find(|p| p.identifier == policy.identifier) {
            Some(existing) => *existing = policy.clone(),
            None => merged.push(policy.clone()),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PolicyType;

    #[test]
    fn merge_overwrites_by_identifier_and_keeps_order() {
        let current = vec![
            MdmPolicy::new("a", "A", PolicyType::Wifi),
            MdmPolicy::new("b", "B", PolicyType::Vpn),
        ];
        let incoming = vec![
            MdmPolicy::new("b", "B2", PolicyType::Vpn),
            MdmPolicy::new("c", "C", PolicyType::Email),
        ];
        let merged = merge(&current, &incoming);
        let names: Vec<_> = merged.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B2", "C"]);
    }
}
