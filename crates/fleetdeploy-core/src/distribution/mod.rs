//! Distribution pipeline: sign -> upload -> install.
//!
//! Install is the step that enforces the pipeline's ordering guarantee: an
//! app is only reported installed on a device that was enrolled and compliant
//! while its record was held for the install.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::audit::AuditLog;
use crate::config::DistributionConfiguration;
use crate::error::{DistributionError, MdmError};
use crate::registry::{DeviceLease, DeviceRegistry};
use crate::signing::{AppSigner, CertificateSigner};
use crate::transport::{DistributionTransport, with_timeout};
use crate::types::{AppBundle, AuditAction, AuditLogEntry, UploadResult};

pub struct DistributionPipeline {
    config: DistributionConfiguration,
    signer: Arc<dyn AppSigner>,
    transport: Arc<dyn DistributionTransport>,
    registry: Arc<DeviceRegistry>,
    audit: Arc<AuditLog>,
    /// Bundles uploaded by this process, by identifier.
    uploaded: Mutex<BTreeMap<String, AppBundle>>,
}

impl std::fmt::Debug for DistributionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributionPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DistributionPipeline {
    /// Pipeline signing with the configured certificate and profile.
    pub fn new(
        config: DistributionConfiguration,
        transport: Arc<dyn DistributionTransport>,
        registry: Arc<DeviceRegistry>,
        audit: Arc<AuditLog>,
    ) -> Self {
        let signer = Arc::new(CertificateSigner::new(
            config.signing_certificate_path(),
            config.provisioning_profile_path(),
        ));
        Self {
            config,
            signer,
            transport,
            registry,
            audit,
            uploaded: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_signer(mut self, signer: Arc<dyn AppSigner>) -> Self {
        self.signer = signer;
        self
    }

    pub fn config(&self) -> &DistributionConfiguration {
        &self.config
    }

    fn uploaded(&self) -> MutexGuard<'_, BTreeMap<String, AppBundle>> {
        self.uploaded.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn sign(&self, bundle: AppBundle) -> Result<AppBundle, DistributionError> {
        require_identifier(&bundle)?;
        if self.config.signing_certificate_path().as_os_str().is_empty() {
            return Err(DistributionError::InvalidSigningCertificate(
                "signing certificate path is empty".to_string(),
            ));
        }
        if self.config.provisioning_profile_path().as_os_str().is_empty() {
            return Err(DistributionError::InvalidSigningCertificate(
                "provisioning profile path is empty".to_string(),
            ));
        }

        let signature = self.signer.sign(&bundle.signing_payload())?;
        info!(app = %bundle.identifier(), fingerprint = %signature.certificate_fingerprint, "bundle signed");
        self.audit.record(AuditLogEntry::new(
            AuditAction::BundleSigned,
            bundle.identifier(),
            format!("signed with {}", signature.algorithm),
        ));
        Ok(bundle.signed_with(signature))
    }

    pub async fn upload(&self, bundle: &AppBundle) -> Result<UploadResult, DistributionError> {
        require_identifier(bundle)?;
        if self.config.requires_signing() && !bundle.is_signed() {
            return Err(DistributionError::InvalidAppBundle(format!(
                "{} must be signed before upload",
                bundle.identifier()
            )));
        }
        if let Some(signature) = bundle.signature() {
            self.signer
                .verify(&bundle.signing_payload(), signature)
                .map_err(|e| match e {
                    DistributionError::SignatureVerificationFailed(_) => e,
                    other => DistributionError::SignatureVerificationFailed(other.to_string()),
                })?;
        }

        debug!(app = %bundle.identifier(), "uploading bundle");
        let receipt = with_timeout(
            self.config.upload_timeout(),
            "upload",
            self.transport.upload(bundle),
        )
        .await
        .map_err(|e| e.into_distribution(DistributionError::UploadFailed))?;

        if receipt.file_size == 0 {
            return Err(DistributionError::UploadFailed(format!(
                "server reported an empty upload for {}",
                bundle.identifier()
            )));
        }
        if let Some(declared) = bundle.declared_size()
            && declared != receipt.file_size
        {
            return Err(DistributionError::UploadFailed(format!(
                "uploaded {} bytes but {} declares {}",
                receipt.file_size,
                bundle.identifier(),
                declared
            )));
        }

        self.uploaded()
            .insert(bundle.identifier().to_string(), bundle.clone());
        info!(app = %bundle.identifier(), upload_id = %receipt.upload_id, size = receipt.file_size, "bundle uploaded");
        self.audit.record(AuditLogEntry::new(
            AuditAction::BundleUploaded {
                file_size: receipt.file_size,
            },
            bundle.identifier(),
            receipt.destination.to_string(),
        ));

        Ok(UploadResult {
            app_identifier: bundle.identifier().to_string(),
            upload_id: receipt.upload_id,
            destination: receipt.destination,
            timestamp: Utc::now(),
            file_size: receipt.file_size,
        })
    }

    pub async fn install(
        &self,
        bundle: &AppBundle,
        device_identifier: &str,
    ) -> Result<(), DistributionError> {
        let mut lease = self.registry.lock_enrolled(device_identifier).await?;
        self.install_locked(bundle, &mut lease).await
    }

    /// Install on a device the caller already holds. Compliance is
    /// re-assessed under the same lease.
    pub async fn install_locked(
        &self,
        bundle: &AppBundle,
        lease: &mut DeviceLease,
    ) -> Result<(), DistributionError> {
        require_identifier(bundle)?;
        let posture = self.registry.assess(lease).await?;
        if !posture.is_compliant() {
            return Err(MdmError::DeviceNotCompliant(format!(
                "{}: {}",
                lease.identifier(),
                posture.summary()
            ))
            .into());
        }

        with_timeout(
            self.registry.config().timeout(),
            "install",
            self.registry
                .transport()
                .install_app(lease.identifier(), bundle),
        )
        .await
        .map_err(|e| {
            warn!(device = %lease.identifier(), app = %bundle.identifier(), error = %e, "install failed");
            e.into_distribution(|msg| {
                DistributionError::ServerError(format!("install rejected: {}", msg))
            })
        })?;

        lease.record_install(bundle.identifier());
        info!(device = %lease.identifier(), app = %bundle.identifier(), "app installed");
        self.audit.record(AuditLogEntry::new(
            AuditAction::AppInstalled,
            lease.identifier(),
            bundle.identifier(),
        ));
        Ok(())
    }

    pub async fn remove_app(
        &self,
        bundle: &AppBundle,
        device_identifier: &str,
    ) -> Result<(), DistributionError> {
        require_identifier(bundle)?;
        let mut lease = self.registry.lock_enrolled(device_identifier).await?;

        with_timeout(
            self.registry.config().timeout(),
            "remove app",
            self.registry
                .transport()
                .remove_app(lease.identifier(), bundle.identifier()),
        )
        .await
        .map_err(|e| match e {
            crate::transport::TransportError::Network(msg) => DistributionError::NetworkError(msg),
            other => DistributionError::RemovalFailed(other.to_string()),
        })?;

        lease.record_removal(bundle.identifier());
        info!(device = %device_identifier, app = %bundle.identifier(), "app removed");
        self.audit.record(AuditLogEntry::new(
            AuditAction::AppRemoved,
            device_identifier,
            bundle.identifier(),
        ));
        Ok(())
    }

    /// Server catalog merged with bundles uploaded by this process.
    pub async fn list_available(&self) -> Result<Vec<AppBundle>, DistributionError> {
        let catalog = with_timeout(
            self.registry.config().timeout(),
            "catalog",
            self.transport.catalog(),
        )
        .await
        .map_err(|e| e.into_distribution(DistributionError::ServerError))?;

        let mut merged: BTreeMap<String, AppBundle> = catalog
            .into_iter()
            .map(|b| (b.identifier().to_string(), b))
            .collect();
        for (identifier, bundle) in self.uploaded().iter() {
            merged.insert(identifier.clone(), bundle.clone());
        }
        Ok(merged.into_values().collect())
    }
}

fn require_identifier(bundle: &AppBundle) -> Result<(), DistributionError> {
    if bundle.identifier().trim().is_empty() {
        return Err(DistributionError::InvalidAppBundle(
            "bundle identifier is empty".to_string(),
        ));
    }
    Ok(())
}
