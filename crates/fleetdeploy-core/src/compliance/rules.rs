//! Fixed rule sets evaluated against bundle metadata.

use url::Url;

use crate::config::ComplianceConfiguration;
use crate::types::{
    AppBundle, ComplianceViolation, SecurityVulnerability, Severity, ViolationType,
    VulnerabilityType,
};

fn violation(
    violation_type: ViolationType,
    severity: Severity,
    description: String,
    remediation: &str,
) -> ComplianceViolation {
    ComplianceViolation {
        violation_type,
        severity,
        description,
        remediation: Some(remediation.to_string()),
    }
}

fn vulnerability(
    vulnerability_type: VulnerabilityType,
    severity: Severity,
    description: String,
    remediation: &str,
) -> SecurityVulnerability {
    SecurityVulnerability {
        vulnerability_type,
        severity,
        description,
        remediation: Some(remediation.to_string()),
    }
}

fn is_https(url: &Url) -> bool {
    url.scheme() == "https"
}

pub fn check_requirements(
    bundle: &AppBundle,
    config: &ComplianceConfiguration,
) -> Vec<ComplianceViolation> {
    let mut violations = Vec::new();
    let id = bundle.identifier();

    match bundle.metadata() {
        None => violations.push(violation(
            ViolationType::Metadata,
            Severity::Medium,
            format!("{} has no store metadata", id),
            "Provide app metadata with name, description and category",
        )),
        Some(metadata) => {
            if metadata.name.trim().is_empty() {
                violations.push(violation(
                    ViolationType::Metadata,
                    Severity::Low,
                    format!("{} metadata has no display name", id),
                    "Set a display name in the app metadata",
                ));
            }
        }
    }

    if config.privacy_compliance()
        && bundle
            .metadata()
            .and_then(|m| m.privacy_policy_url.as_ref())
            .is_none()
    {
        violations.push(violation(
            ViolationType::Privacy,
            Severity::High,
            format!("{} does not link a privacy policy", id),
            "Publish a privacy policy and reference it in the app metadata",
        ));
    }

    if config.security_compliance() && !bundle.is_signed() {
        violations.push(violation(
            ViolationType::Security,
            Severity::High,
            format!("{} is not signed", id),
            "Sign the bundle with the enterprise certificate before distribution",
        ));
    }

    if config.data_encryption()
        && let Some(source) = bundle.source_url()
        && !is_https(source)
    {
        violations.push(violation(
            ViolationType::DataProtection,
            Severity::High,
            format!("{} is served over {}", id, source.scheme()),
            "Serve the bundle over HTTPS",
        ));
    }

    if bundle.version().is_none_or(|v| v.trim().is_empty()) {
        violations.push(violation(
            ViolationType::Versioning,
            Severity::Low,
            format!("{} has no version", id),
            "Tag the bundle with a release version",
        ));
    }

    violations
}

pub fn find_vulnerabilities(bundle: &AppBundle) -> Vec<SecurityVulnerability> {
    let mut found = Vec::new();
    let id = bundle.identifier();

    if !bundle.is_signed() {
        found.push(vulnerability(
            VulnerabilityType::UnsignedBinary,
            Severity::Critical,
            format!("{} carries no signature", id),
            "Sign the bundle so devices can verify its origin",
        ));
    }

    if let Some(source) = bundle.source_url()
        && !is_https(source)
    {
        found.push(vulnerability(
            VulnerabilityType::InsecureTransport,
            Severity::High,
            format!("{} is downloaded over {}", id, source.scheme()),
            "Serve the bundle over HTTPS",
        ));
    }

    if let Some(metadata) = bundle.metadata() {
        let assets = metadata
            .icon_url
            .iter()
            .chain(metadata.screenshot_urls.iter())
            .chain(metadata.privacy_policy_url.iter());
        for url in assets.filter(|u| !is_https(u)) {
            found.push(vulnerability(
                VulnerabilityType::InsecureAssetUrl,
                Severity::Medium,
                format!("{} references insecure asset {}", id, url),
                "Host store assets over HTTPS",
            ));
        }
    }

    if bundle.version().is_none() {
        found.push(vulnerability(
            VulnerabilityType::UnversionedRelease,
            Severity::Low,
            format!("{} cannot be traced to a release", id),
            "Tag the bundle with a release version",
        ));
    }

    if bundle.declared_size().is_none() {
        found.push(vulnerability(
            VulnerabilityType::UnverifiedPayloadSize,
            Severity::Low,
            format!("{} does not declare its payload size", id),
            "Declare the payload size so uploads can be verified",
        ));
    }

    found
}

/// Remediation texts, de-duplicated in first-seen order.
pub fn recommendations<'a>(remediations: impl Iterator<Item = Option<&'a String>>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for text in remediations.flatten() {
        if !out.iter().any(|r| r == text) {
            out.push(text.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AppMetadata;

    fn config(privacy: bool, security: bool) -> ComplianceConfiguration {
        ComplianceConfiguration::new(true, true, privacy, security).unwrap()
    }

    fn complete_metadata() -> AppMetadata {
        AppMetadata {
            name: "Test App".to_string(),
            size: Some(1024),
            privacy_policy_url: Some(Url::parse("https://test.com/privacy").unwrap()),
            ..AppMetadata::default()
        }
    }

    #[test]
    fn missing_privacy_policy_is_a_privacy_violation() {
        let bundle = AppBundle::new("com.test.app")
            .with_version("1.0")
            .with_metadata(AppMetadata {
                name: "Test".to_string(),
                ..AppMetadata::default()
            });
        let violations = check_requirements(&bundle, &config(true, false));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].violation_type, ViolationType::Privacy);
    }

    #[test]
    fn disabled_checks_do_not_fire() {
        let bundle = AppBundle::new("com.test.app").with_version("1.0").with_metadata(AppMetadata {
            name: "Test".to_string(),
            ..AppMetadata::default()
        });
        assert!(check_requirements(&bundle, &config(false, false)).is_empty());
        assert_eq!(check_requirements(&bundle, &config(false, true)).len(), 1);
    }

    #[test]
    fn plain_http_source_is_flagged_twice() {
        let bundle = AppBundle::new("com.test.app")
            .with_version("1.0")
            .with_metadata(complete_metadata())
            .with_source_url(Url::parse("http://cdn.test.com/app.ipa").unwrap());
        let violations = check_requirements(&bundle, &config(true, false));
        assert!(
            violations
                .iter()
                .any(|v| v.violation_type == ViolationType::DataProtection)
        );
        let vulns = find_vulnerabilities(&bundle);
        assert!(
            vulns
                .iter()
                .any(|v| v.vulnerability_type == VulnerabilityType::InsecureTransport)
        );
    }

    #[test]
    fn recommendations_are_deduplicated() {
        let bundle = AppBundle::new("com.test.app")
            .with_source_url(Url::parse("http://cdn.test.com/app.ipa").unwrap());
        let violations = check_requirements(&bundle, &config(false, false));
        let vulns = find_vulnerabilities(&bundle);
        let recs = recommendations(
            violations
                .iter()
                .map(|v| v.remediation.as_ref())
                .chain(vulns.iter().map(|v| v.remediation.as_ref())),
        );
        let https = recs.iter().filter(|r| r.contains("HTTPS")).count();
        assert_eq!(https, 1);
    }
}
