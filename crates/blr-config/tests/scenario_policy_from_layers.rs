use blr_config::{load_layered_yaml_from_strings, reconcile_policy_from_config};
use blr_reconcile::ReconcilePolicy;

#[test]
fn overlay_turns_on_counting_and_keeps_default_tolerance() {
    let loaded = load_layered_yaml_from_strings(&[
        "reconcile:\n  count_gtid_mismatches: false\n",
        "reconcile:\n  count_gtid_mismatches: true\n  count_change_type_mismatches: true\n",
    ])
    .unwrap();
    let policy = reconcile_policy_from_config(&loaded.config_json).unwrap();
    assert_eq!(
        policy,
        ReconcilePolicy {
            timestamp_tolerance_ms: 100,
            count_gtid_mismatches: true,
            count_change_type_mismatches: true,
        }
    );
}

#[test]
fn tolerance_override() {
    let loaded =
        load_layered_yaml_from_strings(&["reconcile:\n  timestamp_tolerance_ms: 1500\n"]).unwrap();
    let policy = reconcile_policy_from_config(&loaded.config_json).unwrap();
    assert_eq!(policy.timestamp_tolerance_ms, 1500);
}
