//! Score, rate and risk calculations.

use crate::config::RiskThresholds;
use crate::types::{ComplianceData, ComplianceSummary, RiskLevel, SecurityVulnerability, Severity};

const FULL_SCORE: u32 = 100;

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn deduct(severities: impl Iterator<Item = Severity>) -> u32 {
    let penalty = severities.fold(0u32, |acc, s| acc.saturating_add(s.penalty()));
    FULL_SCORE.saturating_sub(penalty)
}

/// 100 minus the severity penalty of every finding, floored at 0.
pub fn score_vulnerabilities(vulnerabilities: &[SecurityVulnerability]) -> u8 {
    // deduct() never exceeds 100.
    deduct(vulnerabilities.iter().map(|v| v.severity)) as u8
}

pub fn security_score(incidents: &[Severity]) -> f64 {
    deduct(incidents.iter().copied()) as f64
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    round2(part as f64 / total as f64 * 100.0)
}

pub fn success_rate(data: &ComplianceData) -> f64 {
    percent(data.successful_deployments, data.total_deployments)
}

pub fn compliance_rate(data: &ComplianceData) -> f64 {
    let clean = data
        .total_deployments
        .saturating_sub(data.compliance_violations);
    percent(clean, data.total_deployments)
}

pub fn classify_risk(security: f64, compliance: f64, thresholds: &RiskThresholds) -> RiskLevel {
    if security < thresholds.critical_security_below
        || compliance < thresholds.critical_compliance_below
    {
        RiskLevel::Critical
    } else if security < thresholds.high_security_below
        || compliance < thresholds.high_compliance_below
    {
        RiskLevel::High
    } else if security < thresholds.medium_security_below {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Summarize counters; `incidents` carries the severity of each security
/// incident in the period.
pub fn summarize(
    data: &ComplianceData,
    incidents: &[Severity],
    thresholds: &RiskThresholds,
) -> ComplianceSummary {
    let success_rate = success_rate(data);
    let compliance_rate = compliance_rate(data);
    let security_score = security_score(incidents);
    ComplianceSummary {
        success_rate,
        compliance_rate,
        security_score,
        risk_level: classify_risk(security_score, compliance_rate, thresholds),
    }
}
