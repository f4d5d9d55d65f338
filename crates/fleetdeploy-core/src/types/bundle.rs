//! Distributable application bundles and upload receipts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Store-facing description of an application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    /// Payload size in bytes, when declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<Url>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub screenshot_urls: Vec<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy_policy_url: Option<Url>,
}

/// Detached signature attached by the signing step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleSignature {
    pub algorithm: String,
    /// Hex-encoded signature value.
    pub value: String,
    pub certificate_fingerprint: String,
    pub signed_at: DateTime<Utc>,
}

/// A distributable application artifact, identified by `identifier`.
///
/// The signature can only be attached by the distribution pipeline's signing
/// step; everything else is read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppBundle {
    identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_url: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<AppMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signature: Option<BundleSignature>,
}

impl AppBundle {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            version: None,
            source_url: None,
            metadata: None,
            signature: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_source_url(mut self, url: Url) -> Self {
        self.source_url = Some(url);
        self
    }

    pub fn with_metadata(mut self, metadata: AppMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn source_url(&self) -> Option<&Url> {
        self.source_url.as_ref()
    }

    pub fn metadata(&self) -> Option<&AppMetadata> {
        self.metadata.as_ref()
    }

    pub fn signature(&self) -> Option<&BundleSignature> {
        self.signature.as_ref()
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Declared payload size, if the metadata carries one.
    pub fn declared_size(&self) -> Option<u64> {
        self.metadata.as_ref().and_then(|m| m.size)
    }

    /// Bytes covered by a signature: identity, version and declared size.
    pub fn signing_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.identifier.len() + 32);
        payload.extend_from_slice(self.identifier.as_bytes());
        payload.push(0);
        payload.extend_from_slice(self.version.as_deref().unwrap_or_default().as_bytes());
        payload.push(0);
        payload.extend_from_slice(&self.declared_size().unwrap_or(0).to_le_bytes());
        payload
    }

    pub(crate) fn signed_with(mut self, signature: BundleSignature) -> Self {
        self.signature = Some(signature);
        self
    }
}

/// Receipt for a bundle accepted by the distribution server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub app_identifier: String,
    pub upload_id: String,
    pub destination: Url,
    pub timestamp: DateTime<Utc>,
    pub file_size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_bundle_is_unsigned() {
        let bundle = AppBundle::new("com.test.app");
        assert!(!bundle.is_signed());
        assert_eq!(bundle.declared_size(), None);
    }

    #[test]
    fn signing_payload_changes_with_version() {
        let a = AppBundle::new("com.test.app").with_version("1.0.0");
        let b = AppBundle::new("com.test.app").with_version("1.0.1");
        assert_ne!(a.signing_payload(), b.signing_payload());
    }

    #[test]
    fn manifest_deserializes_without_signature() {
        let json = r#"{
            "identifier": "com.test.app",
            "version": "2.1.0",
            "metadata": { "name": "Test", "size": 1024 }
        }"#;
        let bundle: AppBundle = serde_json::from_str(json).unwrap();
        assert_eq!(bundle.identifier(), "com.test.app");
        assert_eq!(bundle.declared_size(), Some(1024));
        assert!(!bundle.is_signed());
    }
}
