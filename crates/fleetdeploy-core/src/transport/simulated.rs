//! In-process fleet used by `--simulate` runs and tests.
//!
//! Behaviour is scripted per device: rejections, pending enrollments,
//! install failures, unreachable devices and artificial latency.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use url::Url;
use uuid::Uuid;

use super::{DistributionTransport, MdmTransport, TransportError, UploadReceipt};
use crate::types::{
    AppBundle, Device, EnrollmentProfile, EnrollmentResponse, MdmPolicy, NetworkStatus,
    RawDeviceHealth,
};

const SIMULATED_BASE: &str = "https://simulated.fleetdeploy.invalid/";
const DEFAULT_PAYLOAD_SIZE: u64 = 4 * 1024 * 1024;

#[derive(Debug, Default)]
struct FleetState {
    enrolled: BTreeMap<String, Device>,
    rejected: HashSet<String>,
    pending: HashSet<String>,
    unreachable: HashSet<String>,
    policy_failures: HashSet<String>,
    install_failures: HashSet<String>,
    latency: HashMap<String, Duration>,
    health: HashMap<String, RawDeviceHealth>,
    policies: HashMap<String, Vec<MdmPolicy>>,
    installed: BTreeMap<String, BTreeSet<String>>,
    catalog: Vec<AppBundle>,
    upload_latency: Option<Duration>,
    reported_upload_size: Option<u64>,
    reject_uploads: bool,
}

/// Scripted stand-in for both the MDM and the distribution server.
#[derive(Debug, Default)]
pub struct SimulatedFleet {
    state: Mutex<FleetState>,
    enroll_calls: AtomicUsize,
    upload_calls: AtomicUsize,
    install_calls: AtomicUsize,
}

impl SimulatedFleet {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FleetState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Device already enrolled server-side, as if by an earlier process.
    pub fn with_enrolled(self, device: Device) -> Self {
        self.state()
            .enrolled
            .insert(device.identifier.clone(), device);
        self
    }

    pub fn with_catalog_app(self, bundle: AppBundle) -> Self {
        self.state().catalog.push(bundle);
        self
    }

    pub fn reject_enrollment(&self, device_identifier: &str) {
        self.state().rejected.insert(device_identifier.to_string());
    }

    /// Enrollment answers `pending` until [`Self::approve_pending`].
    pub fn hold_enrollment(&self, device_identifier: &str) {
        self.state().pending.insert(device_identifier.to_string());
    }

    pub fn approve_pending(&self, device_identifier: &str) {
        self.state().pending.remove(device_identifier);
    }

    /// Every device-scoped call fails with a network error.
    pub fn make_unreachable(&self, device_identifier: &str) {
        self.state().unreachable.insert(device_identifier.to_string());
    }

    pub fn fail_policies(&self, device_identifier: &str) {
        self.state()
            .policy_failures
            .insert(device_identifier.to_string());
    }

    pub fn fail_installs(&self, device_identifier: &str) {
        self.state()
            .install_failures
            .insert(device_identifier.to_string());
    }

    pub fn set_latency(&self, device_identifier: &str, latency: Duration) {
        self.state()
            .latency
            .insert(device_identifier.to_string(), latency);
    }

    pub fn set_health(&self, device_identifier: &str, health: RawDeviceHealth) {
        self.state()
            .health
            .insert(device_identifier.to_string(), health);
    }

    pub fn set_upload_latency(&self, latency: Duration) {
        self.state().upload_latency = Some(latency);
    }

    /// Override the file size the server reports for uploads.
    pub fn report_upload_size(&self, size: u64) {
        self.state().reported_upload_size = Some(size);
    }

    pub fn reject_uploads(&self) {
        self.state().reject_uploads = true;
    }

    pub fn enroll_calls(&self) -> usize {
        self.enroll_calls.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn install_calls(&self) -> usize {
        self.install_calls.load(Ordering::SeqCst)
    }

    pub fn is_enrolled_remotely(&self, device_identifier: &str) -> bool {
        self.state().enrolled.contains_key(device_identifier)
    }

    pub fn installed_apps(&self, device_identifier: &str) -> BTreeSet<String> {
        self.state()
            .installed
            .get(device_identifier)
            .cloned()
            .unwrap_or_default()
    }

    pub fn applied_policies(&self, device_identifier: &str) -> Vec<MdmPolicy> {
        self.state()
            .policies
            .get(device_identifier)
            .cloned()
            .unwrap_or_default()
    }

    fn default_health() -> RawDeviceHealth {
        RawDeviceHealth {
            battery_level: 0.8,
            available_storage: 32 * 1024 * 1024 * 1024,
            total_storage: 64 * 1024 * 1024 * 1024,
            network_status: NetworkStatus::Connected,
            last_seen: Utc::now(),
        }
    }

    /// Apply scripted latency and reachability for one device.
    async fn reach(&self, device_identifier: &str) -> Result<(), TransportError> {
        let (latency, unreachable) = {
            let state = self.state();
            (
                state.latency.get(device_identifier).copied(),
                state.unreachable.contains(device_identifier),
            )
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if unreachable {
            return Err(TransportError::Network(format!(
                "device {} is unreachable",
                device_identifier
            )));
        }
        Ok(())
    }

    fn require_enrolled(state: &FleetState, device_identifier: &str) -> Result<(), TransportError> {
        if state.enrolled.contains_key(device_identifier) {
            Ok(())
        } else {
            Err(TransportError::Rejected(format!(
                "HTTP 404: unknown device {}",
                device_identifier
            )))
        }
    }
}

#[async_trait]
impl MdmTransport for SimulatedFleet {
    async fn enroll(
        &self,
        profile: &EnrollmentProfile,
    ) -> Result<EnrollmentResponse, TransportError> {
        self.enroll_calls.fetch_add(1, Ordering::SeqCst);
        self.reach(&profile.device_identifier).await?;

        let mut state = self.state();
        if state.rejected.contains(&profile.device_identifier) {
            return Ok(EnrollmentResponse::failed(format!(
                "device {} rejected by server",
                profile.device_identifier
            )));
        }
        if state.pending.contains(&profile.device_identifier) {
            return Ok(EnrollmentResponse::pending());
        }

        let device = state
            .enrolled
            .entry(profile.device_identifier.clone())
            .or_insert_with(|| {
                Device::new(
                    profile.device_identifier.clone(),
                    profile.device_identifier.clone(),
                    "unknown",
                    "0.0.0",
                )
            });
        device.info = profile.device_info.clone();
        Ok(EnrollmentResponse::enrolled())
    }

    async fn unenroll(&self, device_identifier: &str) -> Result<(), TransportError> {
        self.reach(device_identifier).await?;
        let mut state = self.state();
        state.enrolled.remove(device_identifier);
        state.policies.remove(device_identifier);
        state.installed.remove(device_identifier);
        Ok(())
    }

    async fn enrolled_devices(&self) -> Result<Vec<Device>, TransportError> {
        Ok(self.state().enrolled.values().cloned().collect())
    }

    async fn device_health(
        &self,
        device_identifier: &str,
    ) -> Result<RawDeviceHealth, TransportError> {
        self.reach(device_identifier).await?;
        let state = self.state();
        Self::require_enrolled(&state, device_identifier)?;
        Ok(state
            .health
            .get(device_identifier)
            .cloned()
            .unwrap_or_else(Self::default_health))
    }

    async fn apply_policies(
        &self,
        device_identifier: &str,
        policies: &[MdmPolicy],
    ) -> Result<(), TransportError> {
        self.reach(device_identifier).await?;
        let mut state = self.state();
        Self::require_enrolled(&state, device_identifier)?;
        if state.policy_failures.contains(device_identifier) {
            return Err(TransportError::Server {
                status: 500,
                message: "policy push failed".to_string(),
            });
        }
        let applied = state
            .policies
            .entry(device_identifier.to_string())
            .or_default();
        for policy in policies {
            match applied.iter_mut().find(|p| p.identifier == policy.identifier) {
                Some(existing) => *existing = policy.clone(),
                None => applied.push(policy.clone()),
            }
        }
        Ok(())
    }

    async fn install_app(
        &self,
        device_identifier: &str,
        bundle: &AppBundle,
    ) -> Result<(), TransportError> {
        self.install_calls.fetch_add(1, Ordering::SeqCst);
        self.reach(device_identifier).await?;
        let mut state = self.state();
        Self::require_enrolled(&state, device_identifier)?;
        if state.install_failures.contains(device_identifier) {
            return Err(TransportError::Rejected(format!(
                "device {} refused {}",
                device_identifier,
                bundle.identifier()
            )));
        }
        state
            .installed
            .entry(device_identifier.to_string())
            .or_default()
            .insert(bundle.identifier().to_string());
        Ok(())
    }

    async fn remove_app(
        &self,
        device_identifier: &str,
        app_identifier: &str,
    ) -> Result<(), TransportError> {
        self.reach(device_identifier).await?;
        let mut state = self.state();
        Self::require_enrolled(&state, device_identifier)?;
        let removed = state
            .installed
            .get_mut(device_identifier)
            .is_some_and(|apps| apps.remove(app_identifier));
        if !removed {
            return Err(TransportError::Rejected(format!(
                "{} is not installed on {}",
                app_identifier, device_identifier
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DistributionTransport for SimulatedFleet {
    async fn upload(&self, bundle: &AppBundle) -> Result<UploadReceipt, TransportError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        let (latency, reject, reported) = {
            let state = self.state();
            (
                state.upload_latency,
                state.reject_uploads,
                state.reported_upload_size,
            )
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if reject {
            return Err(TransportError::Rejected(format!(
                "upload of {} refused",
                bundle.identifier()
            )));
        }

        let upload_id = Uuid::new_v4().to_string();
        let destination = Url::parse(SIMULATED_BASE)
            .and_then(|base| base.join(&format!("apps/{}/{}", bundle.identifier(), upload_id)))
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let file_size = reported
            .or(bundle.declared_size())
            .unwrap_or(DEFAULT_PAYLOAD_SIZE);

        let mut state = self.state();
        state.catalog.retain(|b| b.identifier() != bundle.identifier());
        state.catalog.push(bundle.clone());

        Ok(UploadReceipt {
            upload_id,
            destination,
            file_size,
        })
    }

    async fn catalog(&self) -> Result<Vec<AppBundle>, TransportError> {
        Ok(self.state().catalog.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeviceInfo;

    fn profile(id: &str) -> EnrollmentProfile {
        EnrollmentProfile {
            device_identifier: id.to_string(),
            organization_id: "org".to_string(),
            server_url: Url::parse("https://mdm.test.com").unwrap(),
            enrollment_token: "t".repeat(40),
            device_info: DeviceInfo::default(),
        }
    }

    #[tokio::test]
    async fn scripted_enrollment_outcomes() {
        let fleet = SimulatedFleet::new();
        fleet.reject_enrollment("bad");
        fleet.hold_enrollment("slow");

        assert_eq!(
            fleet.enroll(&profile("ok")).await.unwrap(),
            EnrollmentResponse::enrolled()
        );
        assert_eq!(
            fleet.enroll(&profile("slow")).await.unwrap(),
            EnrollmentResponse::pending()
        );
        let rejected = fleet.enroll(&profile("bad")).await.unwrap();
        assert!(rejected.error_message.is_some());

        assert!(fleet.is_enrolled_remotely("ok"));
        assert!(!fleet.is_enrolled_remotely("slow"));
        assert_eq!(fleet.enroll_calls(), 3);
    }

    #[tokio::test]
    async fn unreachable_device_is_a_network_error() {
        let fleet = SimulatedFleet::new();
        fleet.make_unreachable("d1");
        let err = fleet.enroll(&profile("d1")).await.unwrap_err();
        assert!(matches!(err, TransportError::Network(_)));
    }

    #[tokio::test]
    async fn upload_reports_declared_size_and_lists_in_catalog() {
        let fleet = SimulatedFleet::new();
        let bundle = AppBundle::new("com.test.app");
        let receipt = fleet.upload(&bundle).await.unwrap();
        assert_eq!(receipt.file_size, DEFAULT_PAYLOAD_SIZE);
        assert!(receipt.destination.as_str().contains("com.test.app"));
        assert_eq!(fleet.catalog().await.unwrap().len(), 1);
    }
}
