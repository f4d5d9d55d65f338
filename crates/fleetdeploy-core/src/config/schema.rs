//! On-disk schema for fleetdeploy.toml
//!
//! Every field is optional here so that validation can tell a missing value
//! apart from an empty one:
//!
//! ```toml
//! [mdm]
//! server_url = "https://mdm.example.com"
//! organization_id = "example-org"
//! auth_token = "..."
//! timeout_secs = 30
//!
//! [distribution]
//! app_store_url = "https://apps.example.com"
//! requires_signing = true
//! signing_certificate_path = "/etc/fleetdeploy/signing.pem"
//! provisioning_profile_path = "/etc/fleetdeploy/enterprise.mobileprovision"
//! upload_timeout_secs = 300
//!
//! [compliance]
//! audit_logging = true
//! data_encryption = true
//! privacy_compliance = true
//! security_compliance = true
//!
//! [compliance.risk_thresholds]
//! critical_security_below = 50.0
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{
    ComplianceConfiguration, DistributionConfiguration, FleetConfig, MdmConfiguration,
    RiskThresholds,
};
use crate::error::ConfigError;

/// Root structure of fleetdeploy.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfigFile {
    #[serde(default)]
    pub mdm: MdmSection,

    #[serde(default)]
    pub distribution: DistributionSection,

    #[serde(default)]
    pub compliance: ComplianceSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MdmSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,

    #[serde(default)]
    pub auth_token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_store_url: Option<String>,

    #[serde(default = "default_requires_signing")]
    pub requires_signing: bool,

    #[serde(default)]
    pub signing_certificate_path: PathBuf,

    #[serde(default)]
    pub provisioning_profile_path: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_timeout_secs: Option<u64>,
}

impl Default for DistributionSection {
    fn default() -> Self {
        Self {
            app_store_url: None,
            requires_signing: true,
            signing_certificate_path: PathBuf::new(),
            provisioning_profile_path: PathBuf::new(),
            upload_timeout_secs: None,
        }
    }
}

fn default_requires_signing() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceSection {
    #[serde(default = "default_enabled")]
    pub audit_logging: bool,

    #[serde(default = "default_enabled")]
    pub data_encryption: bool,

    #[serde(default = "default_enabled")]
    pub privacy_compliance: bool,

    #[serde(default = "default_enabled")]
    pub security_compliance: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_thresholds: Option<RiskThresholds>,
}

impl Default for ComplianceSection {
    fn default() -> Self {
        Self {
            audit_logging: true,
            data_encryption: true,
            privacy_compliance: true,
            security_compliance: true,
            risk_thresholds: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

impl FleetConfigFile {
    /// Validate every section and build the immutable service configurations.
    pub fn validate(&self) -> Result<FleetConfig, ConfigError> {
        let mut mdm = MdmConfiguration::from_parts(
            self.mdm.server_url.as_deref(),
            self.mdm.organization_id.as_deref(),
            self.mdm.auth_token.clone(),
        )?;
        if let Some(secs) = self.mdm.timeout_secs {
            mdm = mdm.with_timeout(positive_secs("mdm.timeout_secs", secs)?);
        }

        let mut distribution = DistributionConfiguration::from_parts(
            self.distribution.app_store_url.as_deref(),
            self.distribution.requires_signing,
            self.distribution.signing_certificate_path.clone(),
            self.distribution.provisioning_profile_path.clone(),
        )?;
        if let Some(secs) = self.distribution.upload_timeout_secs {
            distribution = distribution
                .with_upload_timeout(positive_secs("distribution.upload_timeout_secs", secs)?);
        }

        let mut compliance = ComplianceConfiguration::new(
            self.compliance.audit_logging,
            self.compliance.data_encryption,
            self.compliance.privacy_compliance,
            self.compliance.security_compliance,
        )?;
        if let Some(thresholds) = self.compliance.risk_thresholds {
            compliance = compliance.with_risk_thresholds(thresholds)?;
        }

        Ok(FleetConfig {
            mdm,
            distribution,
            compliance,
        })
    }
}

fn positive_secs(field: &str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::InvalidConfiguration(format!(
            "{} must be greater than zero",
            field
        )));
    }
    Ok(Duration::from_secs(secs))
}
