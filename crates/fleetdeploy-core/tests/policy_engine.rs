//! Policy engine tests against a simulated fleet.

mod support;

use fleetdeploy_core::error::MdmError;
use fleetdeploy_core::types::{AuditAction, MdmPolicy, PolicyType, PolicyValue};

use support::{enroll_all, simulated};

fn wifi(identifier: &str, ssid: &str) -> MdmPolicy {
    MdmPolicy::new(identifier, "Office Wi-Fi", PolicyType::Wifi)
        .with_setting("ssid", PolicyValue::String(ssid.to_string()))
        .with_setting("autoJoin", PolicyValue::Bool(true))
}

#[tokio::test]
async fn applied_policies_merge_by_identifier() {
    let (context, fleet, _files) = simulated();
    enroll_all(&context, &["d1"]).await;
    let engine = context.policies();

    engine
        .apply(&[wifi("wifi-1", "HQ"), wifi("wifi-2", "Lab")], "d1")
        .await
        .unwrap();
    engine.apply(&[wifi("wifi-1", "HQ-5G")], "d1").await.unwrap();

    let current = engine.current("d1").await.unwrap();
    assert_eq!(current.len(), 2);
    assert_eq!(current[0].identifier, "wifi-1");
    assert_eq!(current[0].str_setting("ssid"), Some("HQ-5G"));
    assert_eq!(fleet.applied_policies("d1").len(), 2);
}

#[tokio::test]
async fn applying_to_unenrolled_device_fails() {
    let (context, _fleet, _files) = simulated();
    let err = context
        .policies()
        .apply(&[wifi("wifi-1", "HQ")], "ghost")
        .await
        .unwrap_err();
    assert_eq!(err, MdmError::DeviceNotEnrolled("ghost".to_string()));
}

#[tokio::test]
async fn one_invalid_policy_rejects_the_whole_set() {
    let (context, fleet, _files) = simulated();
    enroll_all(&context, &["d1"]).await;

    let bad = MdmPolicy::new("net-1", "Proxy", PolicyType::Network)
        .with_setting("proxyPort", PolicyValue::Int(70000));
    let err = context
        .policies()
        .apply(&[wifi("wifi-1", "HQ"), bad], "d1")
        .await
        .unwrap_err();

    assert!(matches!(err, MdmError::InvalidPolicy(_)));
    assert!(fleet.applied_policies("d1").is_empty());
    assert!(context.policies().current("d1").await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_keys_pass_validation() {
    let (context, _fleet, _files) = simulated();
    enroll_all(&context, &["d1"]).await;
    let policy = wifi("wifi-1", "HQ").with_setting("vendorExtension", PolicyValue::Int(7));
    context.policies().apply(&[policy], "d1").await.unwrap();
}

#[tokio::test]
async fn failed_push_leaves_committed_set_unchanged() {
    let (context, fleet, _files) = simulated();
    enroll_all(&context, &["d1"]).await;
    let engine = context.policies();
    engine.apply(&[wifi("wifi-1", "HQ")], "d1").await.unwrap();

    fleet.fail_policies("d1");
    let err = engine.apply(&[wifi("wifi-2", "Lab")], "d1").await.unwrap_err();

    assert!(matches!(err, MdmError::ServerError(_)));
    let current = engine.current("d1").await.unwrap();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].identifier, "wifi-1");
}

#[tokio::test]
async fn empty_policy_set_is_a_no_op() {
    let (context, _fleet, _files) = simulated();
    enroll_all(&context, &["d1"]).await;
    context.policies().apply(&[], "d1").await.unwrap();

    let applied = context
        .audit()
        .entries()
        .into_iter()
        .filter(|e| matches!(e.action, AuditAction::PoliciesApplied { .. }))
        .count();
    assert_eq!(applied, 0);
}

#[tokio::test]
async fn removal_clears_policies_for_the_next_generation() {
    let (context, _fleet, _files) = simulated();
    enroll_all(&context, &["d1"]).await;
    context
        .policies()
        .apply(&[wifi("wifi-1", "HQ")], "d1")
        .await
        .unwrap();

    context.registry().remove("d1").await.unwrap();
    enroll_all(&context, &["d1"]).await;

    assert!(context.policies().current("d1").await.unwrap().is_empty());
}
