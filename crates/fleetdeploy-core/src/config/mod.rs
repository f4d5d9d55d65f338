//! Validated service configuration.
//!
//! Each service owns an immutable copy of its configuration. Values come
//! either from code or from `fleetdeploy.toml` (see [`schema`]), and both
//! paths go through the same validating constructors.

pub mod parser;
pub mod schema;
pub mod store;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

pub use parser::{parse_fleet_toml, parse_fleet_toml_str, to_toml};
pub use schema::FleetConfigFile;
pub use store::ConfigStore;

pub const DEFAULT_MDM_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MdmConfiguration {
    server_url: Url,
    organization_id: String,
    auth_token: String,
    timeout: Duration,
}

impl MdmConfiguration {
    pub fn new(
        server_url: &str,
        organization_id: &str,
        auth_token: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Self::from_parts(Some(server_url), Some(organization_id), auth_token.into())
    }

    pub(crate) fn from_parts(
        server_url: Option<&str>,
        organization_id: Option<&str>,
        auth_token: String,
    ) -> Result<Self, ConfigError> {
        let server_url = require_url("mdm.server_url", server_url)?;
        let organization_id = require_text("mdm.organization_id", organization_id)?;
        Ok(Self {
            server_url,
            organization_id,
            auth_token,
            timeout: DEFAULT_MDM_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn server_url(&self) -> &Url {
        &self.server_url
    }

    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    pub fn auth_token(&self) -> &str {
        &self.auth_token
    }

    /// Per-call timeout applied to every MDM operation.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionConfiguration {
    app_store_url: Url,
    requires_signing: bool,
    signing_certificate_path: PathBuf,
    provisioning_profile_path: PathBuf,
    upload_timeout: Duration,
}

impl DistributionConfiguration {
    pub fn new(
        app_store_url: &str,
        requires_signing: bool,
        signing_certificate_path: impl Into<PathBuf>,
        provisioning_profile_path: impl Into<PathBuf>,
    ) -> Result<Self, ConfigError> {
        Self::from_parts(
            Some(app_store_url),
            requires_signing,
            signing_certificate_path.into(),
            provisioning_profile_path.into(),
        )
    }

    pub(crate) fn from_parts(
        app_store_url: Option<&str>,
        requires_signing: bool,
        signing_certificate_path: PathBuf,
        provisioning_profile_path: PathBuf,
    ) -> Result<Self, ConfigError> {
        let app_store_url = require_url("distribution.app_store_url", app_store_url)?;
        Ok(Self {
            app_store_url,
            requires_signing,
            signing_certificate_path,
            provisioning_profile_path,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
        })
    }

    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    pub fn app_store_url(&self) -> &Url {
        &self.app_store_url
    }

    pub fn requires_signing(&self) -> bool {
        self.requires_signing
    }

    pub fn signing_certificate_path(&self) -> &Path {
        &self.signing_certificate_path
    }

    pub fn provisioning_profile_path(&self) -> &Path {
        &self.provisioning_profile_path
    }

    pub fn upload_timeout(&self) -> Duration {
        self.upload_timeout
    }
}

/// Score cut-offs used to derive a report's risk level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    pub critical_security_below: f64,
    pub critical_compliance_below: f64,
    pub high_security_below: f64,
    pub high_compliance_below: f64,
    pub medium_security_below: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            critical_security_below: 50.0,
            critical_compliance_below: 80.0,
            high_security_below: 70.0,
            high_compliance_below: 90.0,
            medium_security_below: 90.0,
        }
    }
}

impl RiskThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let all = [
            ("critical_security_below", self.critical_security_below),
            ("critical_compliance_below", self.critical_compliance_below),
            ("high_security_below", self.high_security_below),
            ("high_compliance_below", self.high_compliance_below),
            ("medium_security_below", self.medium_security_below),
        ];
        for (name, value) in all {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "compliance.risk_thresholds.{} must be within [0, 100], got {}",
                    name, value
                )));
            }
        }
        if self.critical_security_below > self.high_security_below
            || self.high_security_below > self.medium_security_below
        {
            return Err(ConfigError::InvalidConfiguration(
                "security thresholds must satisfy critical <= high <= medium".to_string(),
            ));
        }
        if self.critical_compliance_below > self.high_compliance_below {
            return Err(ConfigError::InvalidConfiguration(
                "compliance thresholds must satisfy critical <= high".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComplianceConfiguration {
    audit_logging: bool,
    data_encryption: bool,
    privacy_compliance: bool,
    security_compliance: bool,
    risk_thresholds: RiskThresholds,
}

impl ComplianceConfiguration {
    /// The compliance service refuses to run without audit logging and
    /// data encryption.
    pub fn new(
        audit_logging: bool,
        data_encryption: bool,
        privacy_compliance: bool,
        security_compliance: bool,
    ) -> Result<Self, ConfigError> {
        if !audit_logging {
            return Err(ConfigError::InvalidConfiguration(
                "compliance.audit_logging must be enabled".to_string(),
            ));
        }
        if !data_encryption {
            return Err(ConfigError::InvalidConfiguration(
                "compliance.data_encryption must be enabled".to_string(),
            ));
        }
        Ok(Self {
            audit_logging,
            data_encryption,
            privacy_compliance,
            security_compliance,
            risk_thresholds: RiskThresholds::default(),
        })
    }

    pub fn with_risk_thresholds(mut self, thresholds: RiskThresholds) -> Result<Self, ConfigError> {
        thresholds.validate()?;
        self.risk_thresholds = thresholds;
        Ok(self)
    }

    pub fn audit_logging(&self) -> bool {
        self.audit_logging
    }

    pub fn data_encryption(&self) -> bool {
        self.data_encryption
    }

    pub fn privacy_compliance(&self) -> bool {
        self.privacy_compliance
    }

    pub fn security_compliance(&self) -> bool {
        self.security_compliance
    }

    pub fn risk_thresholds(&self) -> &RiskThresholds {
        &self.risk_thresholds
    }
}

/// The three validated configurations loaded together.
#[derive(Debug, Clone, PartialEq)]
pub struct FleetConfig {
    pub mdm: MdmConfiguration,
    pub distribution: DistributionConfiguration,
    pub compliance: ComplianceConfiguration,
}

fn require_text(field: &str, value: Option<&str>) -> Result<String, ConfigError> {
    match value {
        None => Err(ConfigError::InvalidConfiguration(format!(
            "{} is required",
            field
        ))),
        Some(v) if v.trim().is_empty() => Err(ConfigError::InvalidConfiguration(format!(
            "{} must not be empty",
            field
        ))),
        Some(v) => Ok(v.to_string()),
    }
}

fn require_url(field: &str, value: Option<&str>) -> Result<Url, ConfigError> {
    let raw = require_text(field, value)?;
    let url = Url::parse(&raw).map_err(|e| {
        ConfigError::InvalidConfiguration(format!("{} is not a valid URL ({}): {}", field, raw, e))
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ConfigError::InvalidConfiguration(format!(
            "{} must be an http(s) URL with a host, got {}",
            field, raw
        )));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mdm_configuration_accepts_valid_values() {
        let config = MdmConfiguration::new("https://mdm.test.com", "test-org-id", "token").unwrap();
        assert_eq!(config.server_url().host_str(), Some("mdm.test.com"));
        assert_eq!(config.timeout(), DEFAULT_MDM_TIMEOUT);
    }

    #[test]
    fn absent_and_empty_urls_report_differently() {
        let absent = MdmConfiguration::from_parts(None, Some("org"), String::new()).unwrap_err();
        let empty = MdmConfiguration::from_parts(Some(""), Some("org"), String::new()).unwrap_err();
        assert!(absent.to_string().contains("is required"));
        assert!(empty.to_string().contains("must not be empty"));
    }

    #[test]
    fn malformed_url_is_rejected() {
        let err = DistributionConfiguration::new("not a url", true, "", "").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidConfiguration(_)));
        let err = DistributionConfiguration::new("ftp://store.test.com", true, "", "").unwrap_err();
        assert!(err.to_string().contains("http(s)"));
    }

    #[test]
    fn empty_organization_is_rejected() {
        let err = MdmConfiguration::new("https://mdm.test.com", "  ", "token").unwrap_err();
        assert!(err.to_string().contains("organization_id"));
    }

    #[test]
    fn compliance_requires_audit_logging_and_encryption() {
        assert!(ComplianceConfiguration::new(false, true, true, true).is_err());
        assert!(ComplianceConfiguration::new(true, false, true, true).is_err());
        assert!(ComplianceConfiguration::new(true, true, false, false).is_ok());
    }

    #[test]
    fn risk_thresholds_must_be_ordered() {
        let thresholds = RiskThresholds {
            critical_security_below: 80.0,
            high_security_below: 70.0,
            ..RiskThresholds::default()
        };
        let config = ComplianceConfiguration::new(true, true, true, true).unwrap();
        assert!(config.with_risk_thresholds(thresholds).is_err());
    }
}
