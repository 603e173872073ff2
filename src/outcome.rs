//! Gateway payload normalization.
//!
//! Payment gateways disagree on where the status lives and what it is
//! called, and the set of providers changes over time. Everything the
//! reconciler decides flows through `normalize_outcome`, a pure function
//! over the raw JSON payload, so the mapping table can be tested without
//! HTTP or storage.

use serde_json::Value;

/// Canonical payment outcome derived from a gateway payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalOutcome {
    Success,
    Failed,
    /// Not yet terminal, or the payload was unrecognizable. Never triggers
    /// a state transition.
    Pending,
}

/// Fields checked for a textual status, in priority order.
const STATUS_FIELDS: &[&[&str]] = &[
    &["status"],
    &["payment_status"],
    &["paymentStatus"],
    &["state"],
    &["data", "status"],
    &["data", "payment_status"],
    &["result", "status"],
];

/// Fields checked for a numeric result code.
const CODE_FIELDS: &[&[&str]] = &[&["code"], &["data", "code"], &["resultCode"]];

const SUCCESS_STATUSES: &[&str] = &[
    "success",
    "successful",
    "completed",
    "complete",
    "paid",
    "approved",
];

const FAILURE_STATUSES: &[&str] = &["failed", "declined", "cancelled", "canceled", "error"];

/// Numeric code some gateways use instead of a textual success status.
const SUCCESS_CODE: i64 = 601;

/// Normalize a raw gateway payload into a canonical outcome.
pub fn normalize_outcome(payload: &Value) -> CanonicalOutcome {
    for status in status_candidates(payload) {
        if SUCCESS_STATUSES.contains(&status.as_str()) {
            return CanonicalOutcome::Success;
        }
        if FAILURE_STATUSES.contains(&status.as_str()) {
            return CanonicalOutcome::Failed;
        }
    }

    for path in CODE_FIELDS {
        if let Some(code) = numeric_at(payload, path) {
            if code == SUCCESS_CODE {
                return CanonicalOutcome::Success;
            }
        }
    }

    CanonicalOutcome::Pending
}

/// The first textual status found in the payload, trimmed and lowercased.
/// Exposed for audit logging alongside the raw payload.
pub fn raw_status(payload: &Value) -> Option<String> {
    status_candidates(payload).into_iter().next()
}

fn status_candidates(payload: &Value) -> Vec<String> {
    let mut found = Vec::new();
    for path in STATUS_FIELDS {
        if let Some(s) = string_at(payload, path) {
            let normalized = s.trim().to_ascii_lowercase();
            if !normalized.is_empty() {
                found.push(normalized);
            }
        }
    }
    found
}

fn value_at<'a>(payload: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = payload;
    for key in path {
        current = current.get(key)?;
    }
    Some(current)
}

fn string_at<'a>(payload: &'a Value, path: &[&str]) -> Option<&'a str> {
    value_at(payload, path)?.as_str()
}

/// Accept numeric codes sent as numbers or numeric strings.
fn numeric_at(payload: &Value, path: &[&str]) -> Option<i64> {
    match value_at(payload, path)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_synonyms() {
        for status in ["success", "successful", "completed", "complete", "paid", "approved"] {
            assert_eq!(
                normalize_outcome(&json!({ "status": status })),
                CanonicalOutcome::Success,
                "status '{}' should map to Success",
                status
            );
        }
    }

    #[test]
    fn test_failure_synonyms() {
        for status in ["failed", "declined", "cancelled", "canceled", "error"] {
            assert_eq!(
                normalize_outcome(&json!({ "status": status })),
                CanonicalOutcome::Failed,
                "status '{}' should map to Failed",
                status
            );
        }
    }

    #[test]
    fn test_pending_and_unknown_statuses() {
        for status in ["pending", "processing", "in_progress", "awaiting", "waiting", "banana"] {
            assert_eq!(
                normalize_outcome(&json!({ "status": status })),
                CanonicalOutcome::Pending,
                "status '{}' should map to Pending",
                status
            );
        }
    }

    #[test]
    fn test_status_is_trimmed_and_lowercased() {
        assert_eq!(
            normalize_outcome(&json!({ "status": "  PAID \n" })),
            CanonicalOutcome::Success
        );
    }

    #[test]
    fn test_nested_status_fields() {
        assert_eq!(
            normalize_outcome(&json!({ "data": { "status": "completed" } })),
            CanonicalOutcome::Success
        );
        assert_eq!(
            normalize_outcome(&json!({ "result": { "status": "declined" } })),
            CanonicalOutcome::Failed
        );
        assert_eq!(
            normalize_outcome(&json!({ "data": { "payment_status": "paid" } })),
            CanonicalOutcome::Success
        );
    }

    #[test]
    fn test_first_recognized_field_wins() {
        // Top-level status takes priority over nested fields
        assert_eq!(
            normalize_outcome(&json!({ "status": "failed", "data": { "status": "paid" } })),
            CanonicalOutcome::Failed
        );
    }

    #[test]
    fn test_numeric_success_code() {
        assert_eq!(
            normalize_outcome(&json!({ "code": 601 })),
            CanonicalOutcome::Success
        );
        assert_eq!(
            normalize_outcome(&json!({ "code": "601" })),
            CanonicalOutcome::Success
        );
        assert_eq!(
            normalize_outcome(&json!({ "data": { "code": 601 } })),
            CanonicalOutcome::Success
        );
        assert_eq!(
            normalize_outcome(&json!({ "resultCode": 601 })),
            CanonicalOutcome::Success
        );
        assert_eq!(
            normalize_outcome(&json!({ "code": 600 })),
            CanonicalOutcome::Pending
        );
    }

    #[test]
    fn test_textual_status_beats_numeric_code() {
        assert_eq!(
            normalize_outcome(&json!({ "status": "failed", "code": 601 })),
            CanonicalOutcome::Failed
        );
    }

    #[test]
    fn test_empty_and_garbage_payloads() {
        assert_eq!(normalize_outcome(&json!({})), CanonicalOutcome::Pending);
        assert_eq!(normalize_outcome(&json!(null)), CanonicalOutcome::Pending);
        assert_eq!(normalize_outcome(&json!([1, 2])), CanonicalOutcome::Pending);
        assert_eq!(
            normalize_outcome(&json!({ "status": "   " })),
            CanonicalOutcome::Pending
        );
        assert_eq!(
            normalize_outcome(&json!({ "status": 42 })),
            CanonicalOutcome::Pending
        );
    }

    #[test]
    fn test_raw_status_reports_first_candidate() {
        assert_eq!(
            raw_status(&json!({ "payment_status": " Paid " })),
            Some("paid".to_string())
        );
        assert_eq!(raw_status(&json!({})), None);
    }
}
