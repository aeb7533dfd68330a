//! The checker hook (§6 `POST /tasks/{id}/check`): a stateless
//! consistency comparison between source-document values and prepared
//! return values. Never touches a `Task` — the caller (gateway) owns
//! loading and persisting anything derived from the report.

use crate::{CheckerReport, FieldDiscrepancy};
use std::collections::{HashMap, HashSet};

/// Compare `source_values` against `prepared_values` field by field.
///
/// A field is a discrepancy whenever it is present in either map and the
/// two values differ (including one side missing the field entirely). A
/// discrepancy is `documented` when `documented_reasons` carries an entry
/// for that field name; documented discrepancies still appear in the
/// report but are excluded from `flagged_count`.
pub fn check_consistency(
    source_values: &HashMap<String, serde_json::Value>,
    prepared_values: &HashMap<String, serde_json::Value>,
    prior_year_values: Option<&HashMap<String, serde_json::Value>>,
    documented_reasons: &HashMap<String, String>,
    injected_error_fields: &[String],
) -> CheckerReport {
    let mut fields: Vec<&String> = source_values.keys().chain(prepared_values.keys()).collect();
    fields.sort();
    fields.dedup();

    let mut discrepancies = Vec::new();
    for field in fields {
        let source = source_values.get(field);
        let prepared = prepared_values.get(field);
        if source == prepared {
            continue;
        }
        let documented = documented_reasons.contains_key(field);
        discrepancies.push(FieldDiscrepancy {
            field: field.clone(),
            source_value: source.cloned().unwrap_or(serde_json::Value::Null),
            prepared_value: prepared.cloned().unwrap_or(serde_json::Value::Null),
            prior_year_value: prior_year_values.and_then(|m| m.get(field)).cloned(),
            documented,
        });
    }

    let flagged_count = discrepancies.iter().filter(|d| !d.documented).count();

    let flagged_fields: HashSet<&str> = discrepancies.iter().map(|d| d.field.as_str()).collect();
    let injected_errors_detected = injected_error_fields
        .iter()
        .filter(|f| flagged_fields.contains(f.as_str()))
        .cloned()
        .collect();

    CheckerReport {
        discrepancies,
        flagged_count,
        injected_errors_detected,
    }
}
