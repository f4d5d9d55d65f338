//! Shared domain types used across the registry, pipeline and compliance layers.

pub mod bundle;
pub mod compliance;
pub mod deployment;
pub mod device;
pub mod policy;

pub use bundle::{AppBundle, AppMetadata, BundleSignature, UploadResult};
pub use compliance::{
    AuditAction, AuditLogEntry, ComplianceData, ComplianceReport, ComplianceRequirements,
    ComplianceSummary, ComplianceViolation, DataAccessEvent, DataKind, ReportPeriod, RiskLevel,
    SecurityAssessment, SecurityVulnerability, Severity, ViolationType, VulnerabilityType,
};
pub use deployment::{
    DeploymentAnalytics, DeploymentResult, DeploymentStatus, DeploymentStep, DeviceFailure,
};
pub use device::{
    Device, DeviceHealth, DeviceInfo, EnrollmentProfile, EnrollmentResponse, EnrollmentStatus,
    NetworkStatus, RawDeviceHealth,
};
pub use policy::{MdmPolicy, PolicyType, PolicyValue};
