//! Error types for each engine component.
//!
//! Every component owns a closed error enum. Callers match on the variant
//! (or on [`ErrorKind`]) and never on message text.

use serde::{Deserialize, Serialize};

/// Configuration validation failures, raised once at construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to read config file {path}: {message}")]
    Unreadable { path: String, message: String },

    #[error("Failed to write config file {path}: {message}")]
    Unwritable { path: String, message: String },

    #[error("{0}")]
    Parse(String),
}

/// Enrollment and device-management failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MdmError {
    #[error("Invalid enrollment token: {0}")]
    InvalidToken(String),

    #[error("Enrollment failed: {0}")]
    EnrollmentFailed(String),

    #[error("Device not enrolled: {0}")]
    DeviceNotEnrolled(String),

    #[error("Device not compliant: {0}")]
    DeviceNotCompliant(String),

    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Server error: {0}")]
    ServerError(String),
}

/// Signing, upload and install failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DistributionError {
    #[error("Invalid app bundle: {0}")]
    InvalidAppBundle(String),

    #[error("Invalid signing certificate: {0}")]
    InvalidSigningCertificate(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Signature verification failed: {0}")]
    SignatureVerificationFailed(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("App removal failed: {0}")]
    RemovalFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Server error: {0}")]
    ServerError(String),

    /// A device precondition (enrolled, compliant) did not hold.
    #[error(transparent)]
    Device(#[from] MdmError),
}

/// Compliance evaluation and reporting failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComplianceError {
    #[error("Compliance check failed: {0}")]
    ComplianceCheckFailed(String),

    #[error("Report generation failed: {0}")]
    ReportGenerationFailed(String),

    #[error("Security assessment failed: {0}")]
    SecurityAssessmentFailed(String),

    #[error("Audit logging failed: {0}")]
    AuditLoggingFailed(String),

    #[error("Data access monitoring failed: {0}")]
    DataAccessMonitoringFailed(String),
}

/// Errors surfaced by the deployment orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Mdm(#[from] MdmError),

    #[error(transparent)]
    Distribution(#[from] DistributionError),

    #[error(transparent)]
    Compliance(#[from] ComplianceError),
}

/// Flat, serializable classification of every error variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidConfiguration,
    InvalidToken,
    EnrollmentFailed,
    DeviceNotEnrolled,
    DeviceNotCompliant,
    InvalidPolicy,
    InvalidAppBundle,
    InvalidSigningCertificate,
    SigningFailed,
    SignatureVerificationFailed,
    UploadFailed,
    RemovalFailed,
    NetworkError,
    ServerError,
    ComplianceCheckFailed,
    ReportGenerationFailed,
    SecurityAssessmentFailed,
    AuditLoggingFailed,
    DataAccessMonitoringFailed,
}

impl ErrorKind {
    /// Only network and server failures are eligible for caller-directed retry.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::NetworkError | ErrorKind::ServerError)
    }
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidConfiguration
    }
}

impl MdmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MdmError::InvalidToken(_) => ErrorKind::InvalidToken,
            MdmError::EnrollmentFailed(_) => ErrorKind::EnrollmentFailed,
            MdmError::DeviceNotEnrolled(_) => ErrorKind::DeviceNotEnrolled,
            MdmError::DeviceNotCompliant(_) => ErrorKind::DeviceNotCompliant,
            MdmError::InvalidPolicy(_) => ErrorKind::InvalidPolicy,
            MdmError::NetworkError(_) => ErrorKind::NetworkError,
            MdmError::ServerError(_) => ErrorKind::ServerError,
        }
    }
}

impl DistributionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DistributionError::InvalidAppBundle(_) => ErrorKind::InvalidAppBundle,
            DistributionError::InvalidSigningCertificate(_) => {
                ErrorKind::InvalidSigningCertificate
            }
            DistributionError::SigningFailed(_) => ErrorKind::SigningFailed,
            DistributionError::SignatureVerificationFailed(_) => {
                ErrorKind::SignatureVerificationFailed
            }
            DistributionError::UploadFailed(_) => ErrorKind::UploadFailed,
            DistributionError::RemovalFailed(_) => ErrorKind::RemovalFailed,
            DistributionError::NetworkError(_) => ErrorKind::NetworkError,
            DistributionError::ServerError(_) => ErrorKind::ServerError,
            DistributionError::Device(inner) => inner.kind(),
        }
    }
}

impl ComplianceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ComplianceError::ComplianceCheckFailed(_) => ErrorKind::ComplianceCheckFailed,
            ComplianceError::ReportGenerationFailed(_) => ErrorKind::ReportGenerationFailed,
            ComplianceError::SecurityAssessmentFailed(_) => ErrorKind::SecurityAssessmentFailed,
            ComplianceError::AuditLoggingFailed(_) => ErrorKind::AuditLoggingFailed,
            ComplianceError::DataAccessMonitoringFailed(_) => {
                ErrorKind::DataAccessMonitoringFailed
            }
        }
    }
}

impl DeployError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployError::Config(e) => e.kind(),
            DeployError::Mdm(e) => e.kind(),
            DeployError::Distribution(e) => e.kind(),
            DeployError::Compliance(e) => e.kind(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }
}
