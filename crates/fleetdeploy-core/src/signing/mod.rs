//! Bundle signing.
//!
//! [`AppSigner`] is the seam for a real code-signing backend.
//! [`CertificateSigner`] derives a signing key from the configured
//! certificate and provisioning profile and produces a keyed BLAKE3 MAC over
//! the bundle's signing payload.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::DistributionError;
use crate::types::BundleSignature;

pub const SIGNATURE_ALGORITHM: &str = "blake3-keyed";

const KEY_CONTEXT: &str = "fleetdeploy 2026-01 app bundle signing key";

pub trait AppSigner: Send + Sync {
    fn sign(&self, payload: &[u8]) -> Result<BundleSignature, DistributionError>;

    fn verify(&self, payload: &[u8], signature: &BundleSignature)
    -> Result<(), DistributionError>;
}

/// Signs with key material read from disk on every call, so rotated
/// certificates take effect without a restart.
#[derive(Debug, Clone)]
pub struct CertificateSigner {
    certificate_path: PathBuf,
    profile_path: PathBuf,
}

struct SigningKey {
    key: [u8; 32],
    fingerprint: String,
}

impl CertificateSigner {
    pub fn new(certificate_path: impl Into<PathBuf>, profile_path: impl Into<PathBuf>) -> Self {
        Self {
            certificate_path: certificate_path.into(),
            profile_path: profile_path.into(),
        }
    }

    fn load_key(&self) -> Result<SigningKey, DistributionError> {
        let certificate = read_material("signing certificate", &self.certificate_path)?;
        let profile = read_material("provisioning profile", &self.profile_path)?;

        let mut hasher = blake3::Hasher::new_derive_key(KEY_CONTEXT);
        hasher.update(&(certificate.len() as u64).to_le_bytes());
        hasher.update(&certificate);
        hasher.update(&profile);

        Ok(SigningKey {
            key: *hasher.finalize().as_bytes(),
            fingerprint: blake3::hash(&certificate).to_hex().to_string(),
        })
    }
}

fn read_material(label: &str, path: &Path) -> Result<Vec<u8>, DistributionError> {
    if path.as_os_str().is_empty() {
        return Err(DistributionError::InvalidSigningCertificate(format!(
            "{} path is empty",
            label
        )));
    }
    let bytes = std::fs::read(path).map_err(|e| {
        DistributionError::InvalidSigningCertificate(format!(
            "cannot read {} {}: {}",
            label,
            path.display(),
            e
        ))
    })?;
    if bytes.is_empty() {
        return Err(DistributionError::InvalidSigningCertificate(format!(
            "{} {} is empty",
            label,
            path.display()
        )));
    }
    Ok(bytes)
}

impl AppSigner for CertificateSigner {
    fn sign(&self, payload: &[u8]) -> Result<BundleSignature, DistributionError> {
        if payload.is_empty() {
            return Err(DistributionError::SigningFailed(
                "nothing to sign".to_string(),
            ));
        }
        let key = self.load_key()?;
        let mac = blake3::keyed_hash(&key.key, payload);
        Ok(BundleSignature {
            algorithm: SIGNATURE_ALGORITHM.to_string(),
            value: mac.to_hex().to_string(),
            certificate_fingerprint: key.fingerprint,
            signed_at: Utc::now(),
        })
    }

    fn verify(
        &self,
        payload: &[u8],
        signature: &BundleSignature,
    ) -> Result<(), DistributionError> {
        if signature.algorithm != SIGNATURE_ALGORITHM {
            return Err(DistributionError::SignatureVerificationFailed(format!(
                "unsupported algorithm {}",
                signature.algorithm
            )));
        }
        let key = self.load_key()?;
        if signature.certificate_fingerprint != key.fingerprint {
            return Err(DistributionError::SignatureVerificationFailed(
                "signed with a different certificate".to_string(),
            ));
        }
        let claimed = blake3::Hash::from_hex(&signature.value).map_err(|e| {
            DistributionError::SignatureVerificationFailed(format!("malformed signature: {}", e))
        })?;
        // blake3::Hash equality is constant-time.
        if blake3::keyed_hash(&key.key, payload) != claimed {
            return Err(DistributionError::SignatureVerificationFailed(
                "signature does not match bundle contents".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn signer_in(temp: &TempDir, certificate: &[u8]) -> CertificateSigner {
        let cert = temp.path().join("signing.pem");
        let profile = temp.path().join("enterprise.mobileprovision");
        std::fs::write(&cert, certificate).unwrap();
        std::fs::write(&profile, b"profile").unwrap();
        CertificateSigner::new(cert, profile)
    }

    #[test]
    fn signature_verifies_against_same_payload() {
        let temp = TempDir::new().unwrap();
        let signer = signer_in(&temp, b"certificate-a");
        let signature = signer.sign(b"com.test.app").unwrap();
        assert_eq!(signature.algorithm, SIGNATURE_ALGORITHM);
        signer.verify(b"com.test.app", &signature).unwrap();
    }

    #[test]
    fn tampered_payload_fails_verification() {
        let temp = TempDir::new().unwrap();
        let signer = signer_in(&temp, b"certificate-a");
        let signature = signer.sign(b"com.test.app").unwrap();
        let err = signer.verify(b"com.test.evil", &signature).unwrap_err();
        assert!(matches!(err, DistributionError::SignatureVerificationFailed(_)));
    }

    #[test]
    fn other_certificate_fails_verification() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let signature = signer_in(&first, b"certificate-a").sign(b"payload").unwrap();
        let err = signer_in(&second, b"certificate-b")
            .verify(b"payload", &signature)
            .unwrap_err();
        assert!(matches!(err, DistributionError::SignatureVerificationFailed(_)));
    }

    #[test]
    fn empty_or_missing_material_is_invalid_certificate() {
        let temp = TempDir::new().unwrap();
        let empty = signer_in(&temp, b"");
        assert!(matches!(
            empty.sign(b"payload"),
            Err(DistributionError::InvalidSigningCertificate(_))
        ));

        let missing = CertificateSigner::new(temp.path().join("nope.pem"), "profile");
        assert!(matches!(
            missing.sign(b"payload"),
            Err(DistributionError::InvalidSigningCertificate(_))
        ));
    }
}
