use anyhow::{anyhow, Result};
use blr_reconcile::ReconcilePolicy;
use serde_json::Value;

/// Build the comparison policy from a merged config. Absent keys keep
/// their defaults; a present key of the wrong type is an error.
pub fn reconcile_policy_from_config(cfg: &Value) -> Result<ReconcilePolicy> {
    let mut policy = ReconcilePolicy::default();

    if let Some(v) = cfg.pointer("/reconcile/timestamp_tolerance_ms") {
        let ms = v.as_i64().ok_or_else(|| {
            anyhow!("reconcile.timestamp_tolerance_ms must be an integer (got {v})")
        })?;
        if ms < 0 {
            return Err(anyhow!(
                "reconcile.timestamp_tolerance_ms must be >= 0 (got {ms})"
            ));
        }
        policy.timestamp_tolerance_ms = ms;
    }

    if let Some(b) = read_bool(cfg, "/reconcile/count_gtid_mismatches")? {
        policy.count_gtid_mismatches = b;
    }
    if let Some(b) = read_bool(cfg, "/reconcile/count_change_type_mismatches")? {
        policy.count_change_type_mismatches = b;
    }

    Ok(policy)
}

fn read_bool(cfg: &Value, pointer: &str) -> Result<Option<bool>> {
    match cfg.pointer(pointer) {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(anyhow!(
            "{} must be a boolean (got {other})",
            pointer.trim_start_matches('/').replace('/', ".")
        )),
    }
}
