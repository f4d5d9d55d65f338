//! Table and JSON rendering for CLI output.

use anyhow::Result;
use serde::Serialize;

use fleetdeploy_core::orchestration::FleetAnalytics;
use fleetdeploy_core::types::{
    AppBundle, ComplianceReport, ComplianceRequirements, DataAccessEvent, DeploymentResult,
    DeviceHealth, SecurityAssessment,
};

/// Print any serializable value wrapped in versioned output.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let output = serde_json::json!({
        "schema_version": 1,
        "data": value,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub fn print_deployment(result: &DeploymentResult) {
    println!(
        "\nDeployment {} of {}: {}",
        result.deployment_id,
        result.app_identifier,
        result.status.as_str()
    );
    println!("  {:<24} {:<12} {}", "DEVICE", "STEP", "RESULT");
    println!("  {}", "-".repeat(70));

    for id in &result.deployed_devices {
        println!("  {:<24} {:<12} ✓ deployed", truncate(id, 24), "-");
    }
    for failure in &result.failures {
        println!(
            "  {:<24} {:<12} ✗ {}",
            truncate(&failure.device_identifier, 24),
            failure.step.as_str(),
            failure.message
        );
    }

    if let Some(analytics) = &result.analytics {
        println!(
            "\n  {} deployed, {} failed of {} targets in {}ms ({} bytes uploaded)",
            analytics.deployed_count,
            analytics.failed_count,
            analytics.target_count,
            analytics.duration_ms,
            analytics.upload_size
        );
    }
    if let Some(report) = &result.compliance_report {
        println!(
            "  Risk level: {:?}, security score {:.2}",
            report.summary.risk_level, report.summary.security_score
        );
    }
}

pub fn print_report(report: &ComplianceReport) {
    let data = &report.data;
    let summary = &report.summary;
    println!("\nCompliance report ({})", report.period.label());
    println!("  Generated:        {}", report.generated_at.to_rfc3339());
    println!("  {}", "-".repeat(50));
    println!("  Deployments:      {}", data.total_deployments);
    println!("  Successful:       {}", data.successful_deployments);
    println!("  Failed:           {}", data.failed_deployments);
    println!("  Violations:       {}", data.compliance_violations);
    println!("  Incidents:        {}", data.security_incidents);
    println!("  Data access:      {}", data.data_access_events);
    println!("  {}", "-".repeat(50));
    println!("  Success rate:     {:.2}%", summary.success_rate);
    println!("  Compliance rate:  {:.2}%", summary.compliance_rate);
    println!("  Security score:   {:.2}", summary.security_score);
    println!("  Risk level:       {:?}", summary.risk_level);

    if !report.audit_log.is_empty() {
        println!("\n  Audit log:");
        for entry in &report.audit_log {
            println!(
                "    {} {:<20} {}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                truncate(&entry.subject, 20),
                entry.message
            );
        }
    }
}

pub fn print_analytics(analytics: &FleetAnalytics) {
    println!("\nFleet analytics");
    println!("  {}", "-".repeat(50));
    println!("  Enrolled devices:   {}", analytics.enrolled_devices);
    println!(
        "  Deployments:        {} ({} ok, {} partial, {} failed)",
        analytics.deployments,
        analytics.successful_deployments,
        analytics.partial_deployments,
        analytics.failed_deployments
    );
    println!("  Device installs:    {}", analytics.device_installs);
    println!("  Device failures:    {}", analytics.device_failures);
    println!("  Device success:     {:.2}%", analytics.device_success_rate);
    println!("  Data access events: {}", analytics.data_access_events);
    for (step, count) in &analytics.failures_by_step {
        println!("    {:<12} {}", step, count);
    }
}

pub fn print_compliance(
    bundle: &AppBundle,
    requirements: &ComplianceRequirements,
    assessment: &SecurityAssessment,
) {
    let verdict = if requirements.is_compliant {
        "✓ compliant"
    } else {
        "✗ non-compliant"
    };
    println!("\n{}: {}", bundle.identifier(), verdict);
    println!("  Security score: {}", assessment.score);

    if !requirements.violations.is_empty() {
        println!("\n  {:<16} {:<10} {}", "VIOLATION", "SEVERITY", "DESCRIPTION");
        println!("  {}", "-".repeat(70));
        for v in &requirements.violations {
            println!(
                "  {:<16} {:<10} {}",
                format!("{:?}", v.violation_type),
                v.severity.as_str(),
                v.description
            );
        }
    }
    if !assessment.vulnerabilities.is_empty() {
        println!("\n  {:<24} {:<10} {}", "FINDING", "SEVERITY", "DESCRIPTION");
        println!("  {}", "-".repeat(70));
        for v in &assessment.vulnerabilities {
            println!(
                "  {:<24} {:<10} {}",
                format!("{:?}", v.vulnerability_type),
                v.severity.as_str(),
                v.description
            );
        }
    }

    let recommendations = requirements
        .recommendations
        .iter()
        .chain(&assessment.recommendations);
    for (i, rec) in recommendations.enumerate() {
        if i == 0 {
            println!("\n  Recommendations:");
        }
        println!("    - {}", rec);
    }
}

pub fn print_health(device_identifier: &str, health: &DeviceHealth) {
    let storage = if health.storage_known() {
        format!(
            "{}/{} MB free",
            health.available_storage() / 1_000_000,
            health.total_storage() / 1_000_000
        )
    } else {
        "storage unknown".to_string()
    };
    println!(
        "  {:<24} battery {:>5.1}%  {:<22} {:?}",
        truncate(device_identifier, 24),
        health.battery_level() * 100.0,
        storage,
        health.network_status()
    );
}

pub fn print_data_access(event: DataAccessEvent) {
    println!(
        "  [access] {} {:?} on {} by {}",
        event.timestamp.format("%H:%M:%S"),
        event.data_kind,
        event.device_identifier,
        event.accessor
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
