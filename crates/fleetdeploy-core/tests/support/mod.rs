#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use fleetdeploy_core::config::{
    ComplianceConfiguration, DistributionConfiguration, FleetConfig, MdmConfiguration,
};
use fleetdeploy_core::context::FleetContext;
use fleetdeploy_core::transport::SimulatedFleet;
use fleetdeploy_core::types::{AppBundle, AppMetadata, Device};
use tempfile::TempDir;
use url::Url;

pub const SERVER_URL: &str = "https://mdm.test.com";
pub const ORG_ID: &str = "test-org-id";
pub const STORE_URL: &str = "https://apps.test.com";

static TOKEN_SEQ: AtomicUsize = AtomicUsize::new(0);

/// A never-before-used enrollment token of `len` characters (`len` >= 16).
pub fn token_of_len(len: usize) -> String {
    let seq = TOKEN_SEQ.fetch_add(1, Ordering::SeqCst);
    let mut token = format!("tok{}-", seq);
    while token.len() < len {
        token.push('x');
    }
    token
}

pub fn token() -> String {
    token_of_len(60)
}

pub fn device(identifier: &str) -> Device {
    Device::new(identifier, format!("{} phone", identifier), "Phone 15", "17.2")
}

/// Signing material written into a temp dir that lives as long as the value.
pub struct SigningFiles {
    pub dir: TempDir,
}

impl SigningFiles {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("cert.pem"), b"-----BEGIN CERTIFICATE-----test").unwrap();
        std::fs::write(dir.path().join("profile.mobileprovision"), b"profile-bytes").unwrap();
        Self { dir }
    }

    pub fn cert(&self) -> std::path::PathBuf {
        self.dir.path().join("cert.pem")
    }

    pub fn profile(&self) -> std::path::PathBuf {
        self.dir.path().join("profile.mobileprovision")
    }
}

pub fn mdm_config() -> MdmConfiguration {
    MdmConfiguration::new(SERVER_URL, ORG_ID, "bearer-token").unwrap()
}

pub fn fleet_config(files: &SigningFiles) -> FleetConfig {
    FleetConfig {
        mdm: mdm_config().with_timeout(Duration::from_millis(500)),
        distribution: DistributionConfiguration::new(
            STORE_URL,
            true,
            files.cert(),
            files.profile(),
        )
        .unwrap(),
        compliance: ComplianceConfiguration::new(true, true, true, true).unwrap(),
    }
}

/// Simulated context with signing material on disk.
pub fn simulated() -> (FleetContext, Arc<SimulatedFleet>, SigningFiles) {
    let files = SigningFiles::new();
    let (context, fleet) = FleetContext::simulated(fleet_config(&files));
    (context, fleet, files)
}

/// A bundle that passes every requirement and security check.
pub fn clean_bundle(identifier: &str) -> AppBundle {
    AppBundle::new(identifier)
        .with_version("1.2.0")
        .with_source_url(Url::parse(&format!("https://apps.test.com/{}.ipa", identifier)).unwrap())
        .with_metadata(AppMetadata {
            name: "Test App".to_string(),
            size: Some(2048),
            privacy_policy_url: Some(Url::parse("https://test.com/privacy").unwrap()),
            ..AppMetadata::default()
        })
}

pub async fn enroll_all(context: &FleetContext, identifiers: &[&str]) {
    for id in identifiers {
        context
            .registry()
            .enroll(&device(id), &token())
            .await
            .unwrap();
    }
}
