//! Device registry: the single owner of device lifecycle state.
//!
//! Records live in an append-only arena indexed by identifier. Each record
//! sits behind its own async mutex, so work on one device is serialized while
//! different devices never contend. The arena index itself is only locked for
//! the brief lookup/insert.

pub mod lifecycle;
pub mod posture;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::audit::AuditLog;
use crate::config::MdmConfiguration;
use crate::error::MdmError;
use crate::transport::{MdmTransport, with_timeout};
use crate::types::{
    AuditAction, AuditLogEntry, DataKind, Device, DeviceHealth, EnrollmentProfile,
    EnrollmentResponse, EnrollmentStatus, MdmPolicy,
};

pub use lifecycle::LifecycleState;
pub use posture::PostureReport;

/// Enrollment tokens shorter than this are rejected before any remote call.
pub const MIN_TOKEN_LEN: usize = 32;

const ACCESSOR: &str = "registry";

/// Everything the registry knows about one device identifier.
#[derive(Debug)]
pub(crate) struct DeviceRecord {
    device: Device,
    state: LifecycleState,
    /// Incremented each time a removed identifier is enrolled again.
    generation: u64,
    policies: Vec<MdmPolicy>,
    installed_apps: BTreeSet<String>,
}

impl DeviceRecord {
    fn new(device: Device) -> Self {
        Self {
            device,
            state: LifecycleState::Unenrolled,
            generation: 0,
            policies: Vec::new(),
            installed_apps: BTreeSet::new(),
        }
    }

    fn advance(&mut self, next: LifecycleState) {
        debug_assert!(
            self.state == next || self.state.can_transition_to(next),
            "illegal lifecycle transition {} -> {}",
            self.state,
            next
        );
        if self.state != next {
            debug!(device = %self.device.identifier, from = %self.state, to = %next, "lifecycle");
        }
        self.state = next;
    }
}

#[derive(Debug, Default)]
struct RecordArena {
    slots: Vec<Arc<AsyncMutex<DeviceRecord>>>,
    index: HashMap<String, usize>,
}

/// Exclusive access to an enrolled device for the duration of one step.
///
/// Holding a lease serializes the holder with every other operation on the
/// same device.
#[derive(Debug)]
pub struct DeviceLease {
    record: OwnedMutexGuard<DeviceRecord>,
}

impl DeviceLease {
    pub fn device(&self) -> &Device {
        &self.record.device
    }

    pub fn identifier(&self) -> &str {
        &self.record.device.identifier
    }

    pub fn generation(&self) -> u64 {
        self.record.generation
    }

    pub fn policies(&self) -> &[MdmPolicy] {
        &self.record.policies
    }

    pub fn installed_apps(&self) -> &BTreeSet<String> {
        &self.record.installed_apps
    }

    /// Replace the committed policy set. Only the policy engine commits.
    pub(crate) fn commit_policies(&mut self, policies: Vec<MdmPolicy>) {
        self.record.policies = policies;
    }

    pub(crate) fn record_install(&mut self, app_identifier: &str) {
        self.record
            .installed_apps
            .insert(app_identifier.to_string());
    }

    pub(crate) fn record_removal(&mut self, app_identifier: &str) -> bool {
        self.record.installed_apps.remove(app_identifier)
    }
}

/// Reverts an in-flight enrollment unless it is explicitly committed.
///
/// Dropping the enrollment future drops this guard, which restores the prior
/// lifecycle state and releases the reserved token.
struct EnrollmentAttempt<'a> {
    record: tokio::sync::MutexGuard<'a, DeviceRecord>,
    prior: LifecycleState,
    tokens: &'a Mutex<HashSet<[u8; 32]>>,
    digest: [u8; 32],
    settled: bool,
}

impl EnrollmentAttempt<'_> {
    /// Keep the token spent and move to `state`.
    fn commit(mut self, state: LifecycleState) {
        if self.prior == LifecycleState::Removed {
            self.record.generation += 1;
            self.record.policies.clear();
            self.record.installed_apps.clear();
        }
        self.record.advance(state);
        self.settled = true;
    }

    /// Restore the prior state but keep the token spent.
    fn reject(mut self) {
        let prior = self.prior;
        self.record.advance(prior);
        self.settled = true;
    }
}

impl Drop for EnrollmentAttempt<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let prior = self.prior;
            self.record.advance(prior);
            lock_tokens(self.tokens).remove(&self.digest);
        }
    }
}

fn lock_tokens(tokens: &Mutex<HashSet<[u8; 32]>>) -> MutexGuard<'_, HashSet<[u8; 32]>> {
    tokens.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct DeviceRegistry {
    config: MdmConfiguration,
    transport: Arc<dyn MdmTransport>,
    audit: Arc<AuditLog>,
    arena: Mutex<RecordArena>,
    spent_tokens: Mutex<HashSet<[u8; 32]>>,
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("config", &self.config)
            .field("devices", &self.arena().slots.len())
            .finish_non_exhaustive()
    }
}

impl DeviceRegistry {
    pub fn new(
        config: MdmConfiguration,
        transport: Arc<dyn MdmTransport>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            config,
            transport,
            audit,
            arena: Mutex::new(RecordArena::default()),
            spent_tokens: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &MdmConfiguration {
        &self.config
    }

    pub(crate) fn transport(&self) -> &Arc<dyn MdmTransport> {
        &self.transport
    }

    pub(crate) fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    fn arena(&self) -> MutexGuard<'_, RecordArena> {
        self.arena.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn slot(&self, identifier: &str) -> Option<Arc<AsyncMutex<DeviceRecord>>> {
        let arena = self.arena();
        arena
            .index
            .get(identifier)
            .map(|&i| Arc::clone(&arena.slots[i]))
    }

    fn slot_or_insert(&self, device: &Device) -> Arc<AsyncMutex<DeviceRecord>> {
        let mut arena = self.arena();
        if let Some(&i) = arena.index.get(&device.identifier) {
            return Arc::clone(&arena.slots[i]);
        }
        let slot = Arc::new(AsyncMutex::new(DeviceRecord::new(device.clone())));
        let i = arena.slots.len();
        arena.slots.push(Arc::clone(&slot));
        arena.index.insert(device.identifier.clone(), i);
        slot
    }

    fn all_slots(&self) -> Vec<Arc<AsyncMutex<DeviceRecord>>> {
        self.arena().slots.clone()
    }

    /// Enroll `device` with a single-use enrollment token.
    ///
    /// A `pending` response leaves the device in `Enrolling`; a later call
    /// with a fresh token confirms it.
    pub async fn enroll(
        &self,
        device: &Device,
        token: &str,
    ) -> Result<EnrollmentResponse, MdmError> {
        if token.chars().count() < MIN_TOKEN_LEN {
            return Err(MdmError::InvalidToken(format!(
                "token must be at least {} characters",
                MIN_TOKEN_LEN
            )));
        }
        if device.identifier.trim().is_empty() {
            return Err(MdmError::EnrollmentFailed(
                "device identifier is empty".to_string(),
            ));
        }
        let digest = *blake3::hash(token.as_bytes()).as_bytes();
        if lock_tokens(&self.spent_tokens).contains(&digest) {
            return Err(MdmError::InvalidToken(
                "token has already been used".to_string(),
            ));
        }

        let slot = self.slot_or_insert(device);
        let mut record = slot.lock().await;

        if record.state.is_enrolled() {
            debug!(device = %device.identifier, "already enrolled");
            return Ok(EnrollmentResponse::enrolled());
        }

        if !lock_tokens(&self.spent_tokens).insert(digest) {
            return Err(MdmError::InvalidToken(
                "token has already been used".to_string(),
            ));
        }

        let prior = record.state;
        record.device = device.clone();
        record.advance(LifecycleState::Enrolling);
        let attempt = EnrollmentAttempt {
            record,
            prior,
            tokens: &self.spent_tokens,
            digest,
            settled: false,
        };

        let profile = EnrollmentProfile {
            device_identifier: device.identifier.clone(),
            organization_id: self.config.organization_id().to_string(),
            server_url: self.config.server_url().clone(),
            enrollment_token: token.to_string(),
            device_info: device.info.clone(),
        };

        let response = match with_timeout(
            self.config.timeout(),
            "enroll",
            self.transport.enroll(&profile),
        )
        .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(device = %device.identifier, error = %e, "enrollment call failed");
                // Attempt drops here and releases the token.
                return Err(e.into_mdm(MdmError::EnrollmentFailed));
            }
        };

        match response.status {
            EnrollmentStatus::Enrolled => {
                attempt.commit(LifecycleState::Enrolled);
                info!(device = %device.identifier, "device enrolled");
                self.audit.record(AuditLogEntry::new(
                    AuditAction::DeviceEnrolled,
                    &device.identifier,
                    format!("enrolled into {}", self.config.organization_id()),
                ));
                Ok(response)
            }
            EnrollmentStatus::Pending => {
                attempt.commit(LifecycleState::Enrolling);
                info!(device = %device.identifier, "enrollment pending approval");
                self.audit.record(AuditLogEntry::new(
                    AuditAction::EnrollmentPending,
                    &device.identifier,
                    "enrollment awaiting server approval",
                ));
                Ok(response)
            }
            EnrollmentStatus::Failed => {
                attempt.reject();
                let reason = response
                    .error_message
                    .unwrap_or_else(|| "rejected by server".to_string());
                warn!(device = %device.identifier, %reason, "enrollment rejected");
                self.audit.record(AuditLogEntry::new(
                    AuditAction::EnrollmentRejected,
                    &device.identifier,
                    reason.clone(),
                ));
                Err(MdmError::EnrollmentFailed(reason))
            }
        }
    }

    /// Unenroll a device. Unknown or already removed devices are a no-op.
    pub async fn remove(&self, device_identifier: &str) -> Result<(), MdmError> {
        let Some(slot) = self.slot(device_identifier) else {
            return Ok(());
        };
        let mut record = slot.lock().await;
        if matches!(
            record.state,
            LifecycleState::Unenrolled | LifecycleState::Removed
        ) {
            return Ok(());
        }

        with_timeout(
            self.config.timeout(),
            "unenroll",
            self.transport.unenroll(device_identifier),
        )
        .await
        .map_err(|e| e.into_mdm(MdmError::ServerError))?;

        record.advance(LifecycleState::Removed);
        record.policies.clear();
        record.installed_apps.clear();
        info!(device = %device_identifier, "device removed");
        self.audit.record(AuditLogEntry::new(
            AuditAction::DeviceRemoved,
            device_identifier,
            "removed from management",
        ));
        Ok(())
    }

    /// Enrolled devices, ordered by identifier.
    pub async fn list_enrolled(&self) -> Vec<Device> {
        let mut devices = Vec::new();
        for slot in self.all_slots() {
            let record = slot.lock().await;
            if record.state.is_enrolled() {
                devices.push(record.device.clone());
            }
        }
        devices.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        devices
    }

    pub async fn info(&self, device_identifier: &str) -> Result<Device, MdmError> {
        let lease = self.lock_enrolled(device_identifier).await?;
        self.audit
            .record_data_access(device_identifier, DataKind::DeviceInfo, ACCESSOR);
        Ok(lease.device().clone())
    }

    pub async fn is_enrolled(&self, device_identifier: &str) -> bool {
        self.state(device_identifier).await.is_enrolled()
    }

    /// Current lifecycle state; never-seen identifiers are `Unenrolled`.
    pub async fn state(&self, device_identifier: &str) -> LifecycleState {
        match self.slot(device_identifier) {
            Some(slot) => slot.lock().await.state,
            None => LifecycleState::Unenrolled,
        }
    }

    pub async fn generation(&self, device_identifier: &str) -> Option<u64> {
        match self.slot(device_identifier) {
            Some(slot) => Some(slot.lock().await.generation),
            None => None,
        }
    }

    /// Fresh health snapshot from the MDM server.
    pub async fn health(&self, device_identifier: &str) -> Result<DeviceHealth, MdmError> {
        let lease = self.lock_enrolled(device_identifier).await?;
        self.fetch_health(lease.identifier()).await
    }

    /// Recompute compliance from the applied policies and a fresh health
    /// snapshot.
    pub async fn is_compliant(&self, device_identifier: &str) -> Result<bool, MdmError> {
        let mut lease = self.lock_enrolled(device_identifier).await?;
        Ok(self.assess(&mut lease).await?.is_compliant())
    }

    /// Adopt devices the server already reports as enrolled.
    /// Returns the number of newly adopted devices.
    pub async fn sync(&self) -> Result<usize, MdmError> {
        let remote = with_timeout(
            self.config.timeout(),
            "list devices",
            self.transport.enrolled_devices(),
        )
        .await
        .map_err(|e| e.into_mdm(MdmError::ServerError))?;

        let mut adopted = 0;
        for device in remote {
            let slot = self.slot_or_insert(&device);
            let mut record = slot.lock().await;
            if record.state.is_enrolled() {
                continue;
            }
            if record.state == LifecycleState::Removed {
                record.generation += 1;
                record.policies.clear();
                record.installed_apps.clear();
            }
            record.device = device;
            if record.state != LifecycleState::Enrolling {
                record.advance(LifecycleState::Enrolling);
            }
            record.advance(LifecycleState::Enrolled);
            self.audit.record(AuditLogEntry::new(
                AuditAction::DeviceEnrolled,
                &record.device.identifier,
                "adopted from server inventory",
            ));
            adopted += 1;
        }
        if adopted > 0 {
            info!(adopted, "synchronized enrolled devices");
        }
        Ok(adopted)
    }

    /// Lock a device for one pipeline step, failing unless it is enrolled.
    pub async fn lock_enrolled(&self, device_identifier: &str) -> Result<DeviceLease, MdmError> {
        let not_enrolled = || MdmError::DeviceNotEnrolled(device_identifier.to_string());
        let slot = self.slot(device_identifier).ok_or_else(not_enrolled)?;
        let record = slot.lock_owned().await;
        if !record.state.is_enrolled() {
            return Err(not_enrolled());
        }
        Ok(DeviceLease { record })
    }

    /// Evaluate compliance for a leased device and record the outcome.
    pub async fn assess(&self, lease: &mut DeviceLease) -> Result<PostureReport, MdmError> {
        let health = self.fetch_health(lease.identifier()).await?;
        let report = posture::evaluate(lease.device(), lease.policies(), &health, Utc::now());
        let next = if report.is_compliant() {
            LifecycleState::Compliant
        } else {
            LifecycleState::NonCompliant
        };
        lease.record.advance(next);
        if !report.is_compliant() {
            debug!(device = %lease.identifier(), failures = %report.summary(), "non-compliant");
        }
        Ok(report)
    }

    async fn fetch_health(&self, device_identifier: &str) -> Result<DeviceHealth, MdmError> {
        let raw = with_timeout(
            self.config.timeout(),
            "device health",
            self.transport.device_health(device_identifier),
        )
        .await
        .map_err(|e| e.into_mdm(MdmError::ServerError))?;
        let health = DeviceHealth::try_from(raw)?;
        self.audit
            .record_data_access(device_identifier, DataKind::DeviceHealth, ACCESSOR);
        Ok(health)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::SimulatedFleet;

    fn registry(fleet: Arc<SimulatedFleet>) -> DeviceRegistry {
        let config = MdmConfiguration::new("https://mdm.test.com", "test-org-id", "auth").unwrap();
        DeviceRegistry::new(config, fleet, Arc::new(AuditLog::new()))
    }

    fn token(seed: char) -> String {
        std::iter::repeat_n(seed, 40).collect()
    }

    #[tokio::test]
    async fn enroll_then_remove_cycles_generation() {
        let fleet = Arc::new(SimulatedFleet::new());
        let registry = registry(fleet.clone());
        let device = Device::new("d1", "Phone", "iPhone", "17.0");

        registry.enroll(&device, &token('a')).await.unwrap();
        assert_eq!(registry.state("d1").await, LifecycleState::Enrolled);
        assert_eq!(registry.generation("d1").await, Some(0));

        registry.remove("d1").await.unwrap();
        assert_eq!(registry.state("d1").await, LifecycleState::Removed);

        registry.enroll(&device, &token('b')).await.unwrap();
        assert_eq!(registry.generation("d1").await, Some(1));
    }

    #[tokio::test]
    async fn already_enrolled_device_skips_remote_call() {
        let fleet = Arc::new(SimulatedFleet::new());
        let registry = registry(fleet.clone());
        let device = Device::new("d1", "Phone", "iPhone", "17.0");

        registry.enroll(&device, &token('a')).await.unwrap();
        let response = registry.enroll(&device, &token('b')).await.unwrap();
        assert_eq!(response.status, EnrollmentStatus::Enrolled);
        assert_eq!(fleet.enroll_calls(), 1);
    }

    #[tokio::test]
    async fn network_failure_releases_token() {
        let fleet = Arc::new(SimulatedFleet::new());
        fleet.make_unreachable("d1");
        let registry = registry(fleet.clone());
        let device = Device::new("d1", "Phone", "iPhone", "17.0");

        let err = registry.enroll(&device, &token('a')).await.unwrap_err();
        assert!(matches!(err, MdmError::NetworkError(_)));
        assert_eq!(registry.state("d1").await, LifecycleState::Unenrolled);
        assert!(lock_tokens(&registry.spent_tokens).is_empty());
    }

    #[tokio::test]
    async fn lease_requires_enrollment() {
        let registry = registry(Arc::new(SimulatedFleet::new()));
        let err = registry.lock_enrolled("ghost").await.unwrap_err();
        assert_eq!(err, MdmError::DeviceNotEnrolled("ghost".to_string()));
    }
}
