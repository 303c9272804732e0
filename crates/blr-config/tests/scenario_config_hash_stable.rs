use blr_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
reconcile:
  timestamp_tolerance_ms: 100
  count_gtid_mismatches: false
  count_change_type_mismatches: false
"#;

const BASE_YAML_REORDERED: &str = r#"
reconcile:
  count_change_type_mismatches: false
  timestamp_tolerance_ms: 100
  count_gtid_mismatches: false
"#;

const OVERLAY_YAML: &str = r#"
reconcile:
  count_gtid_mismatches: true
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
    assert_eq!(a.config_hash.len(), 64);
}

#[test]
fn key_order_does_not_change_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
}

#[test]
fn overlay_overrides_and_changes_hash() {
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let layered = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_ne!(base.config_hash, layered.config_hash);
    assert_eq!(
        layered.config_json.pointer("/reconcile/count_gtid_mismatches"),
        Some(&serde_json::json!(true))
    );
    // Siblings of an overridden key survive the merge.
    assert_eq!(
        layered.config_json.pointer("/reconcile/timestamp_tolerance_ms"),
        Some(&serde_json::json!(100))
    );
}

#[test]
fn invalid_yaml_is_an_error() {
    assert!(load_layered_yaml_from_strings(&["reconcile: [unclosed"]).is_err());
}
