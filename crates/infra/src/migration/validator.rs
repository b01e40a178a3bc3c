//! Structural validation of the flat JSON file
//!
//! Works on the raw [`Value`] so that every problem in every record is
//! reported in one pass, including records serde would reject outright.

use chrono::{DateTime, Utc};
use reminder_domain::constants::{is_valid_snowflake, METADATA_KEY};
use reminder_domain::types::snowflake;
use reminder_domain::Event;
use serde::Serialize;
use serde_json::{Map, Value};

const REQUIRED_FIELDS: &[&str] = &[
    "message_id",
    "channel_id",
    "guild_id",
    "title",
    "interval_minutes",
    "last_reminder",
    "created_at",
    "required_reactions",
];

/// Outcome of [`validate_document`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    /// Records seen, excluding `_metadata`
    pub records: usize,
    /// Records without any error
    pub valid: usize,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Check every record; never stops at the first bad one
pub fn validate_document(value: &Value) -> ValidationReport {
    let mut report = ValidationReport::default();
    let Some(root) = value.as_object() else {
        report.errors.push("document must be a JSON object keyed by message id".to_string());
        return report;
    };

    for (key, record) in root {
        if key == METADATA_KEY {
            if !record.is_object() {
                report.errors.push(format!("{METADATA_KEY} must be an object"));
            }
            continue;
        }
        report.records += 1;
        let errors = validate_record(key, record);
        if errors.is_empty() {
            report.valid += 1;
        }
        report.errors.extend(errors);
    }
    report
}

/// Problems with one record; empty when it can be migrated
pub fn validate_record(key: &str, record: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    let Some(fields) = record.as_object() else {
        return vec![format!("record {key}: must be an object")];
    };

    for field in REQUIRED_FIELDS {
        if !fields.contains_key(*field) {
            errors.push(format!("record {key}: missing field {field}"));
        }
    }

    match snowflake::parse(key) {
        Some(id) if is_valid_snowflake(id) => {
            if let Some(message_id) = fields.get("message_id").and_then(id_value) {
                if message_id != id {
                    errors.push(format!("record {key}: message_id {message_id} does not match its key"));
                }
            }
        }
        _ => errors.push(format!("record {key}: key is not a valid message id")),
    }

    for field in ["message_id", "channel_id", "guild_id"] {
        if let Some(value) = fields.get(field) {
            check_id(key, field, value, &mut errors);
        }
    }

    if let Some(title) = fields.get("title") {
        if !title.is_string() {
            errors.push(format!("record {key}: title must be a string"));
        }
    }

    if let Some(interval) = fields.get("interval_minutes") {
        match interval.as_f64() {
            Some(minutes) if minutes.is_finite() && minutes > 0.0 => {}
            _ => errors.push(format!("record {key}: interval_minutes must be a positive number")),
        }
    }

    if let Some(paused) = fields.get("is_paused") {
        if !paused.is_boolean() {
            errors.push(format!("record {key}: is_paused must be a boolean"));
        }
    }

    match fields.get("required_reactions").map(Value::as_array) {
        Some(Some(reactions)) if reactions.is_empty() => {
            errors.push(format!("record {key}: required_reactions must not be empty"));
        }
        Some(Some(reactions)) if !reactions.iter().all(Value::is_string) => {
            errors.push(format!("record {key}: required_reactions must be strings"));
        }
        Some(None) => errors.push(format!("record {key}: required_reactions must be a list")),
        _ => {}
    }

    for field in ["last_reminder", "created_at"] {
        if let Some(value) = fields.get(field) {
            check_timestamp(key, field, value, &mut errors);
        }
    }

    for field in ["all_users", "users_who_reacted"] {
        match fields.get(field).map(Value::as_array) {
            Some(Some(ids)) => {
                for id in ids {
                    check_id(key, field, id, &mut errors);
                }
            }
            Some(None) => errors.push(format!("record {key}: {field} must be a list")),
            None => {}
        }
    }

    match fields.get("reactions").map(Value::as_array) {
        Some(Some(reactions)) => {
            for (index, reaction) in reactions.iter().enumerate() {
                check_reaction(key, index, reaction, &mut errors);
            }
        }
        Some(None) => errors.push(format!("record {key}: reactions must be a list")),
        None => {}
    }

    // Anything serde would still reject, e.g. a non-string description.
    if errors.is_empty() {
        if let Err(err) = serde_json::from_value::<Event>(record.clone()) {
            errors.push(format!("record {key}: {err}"));
        }
    }
    errors
}

fn check_reaction(key: &str, index: usize, reaction: &Value, errors: &mut Vec<String>) {
    let Some(fields) = reaction.as_object() else {
        errors.push(format!("record {key}: reaction {index} must be an object"));
        return;
    };
    let field_name = format!("reaction {index} user_id");
    match fields.get("user_id") {
        Some(value) => check_id(key, &field_name, value, errors),
        None => errors.push(format!("record {key}: missing field {field_name}")),
    }
    if !fields.get("emoji").is_some_and(Value::is_string) {
        errors.push(format!("record {key}: reaction {index} emoji must be a string"));
    }
    match fields.get("reacted_at") {
        Some(value) => check_timestamp(key, &format!("reaction {index} reacted_at"), value, errors),
        None => errors.push(format!("record {key}: missing field reaction {index} reacted_at")),
    }
}

fn id_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => snowflake::parse(text),
        _ => None,
    }
}

fn check_id(key: &str, field: &str, value: &Value, errors: &mut Vec<String>) {
    match id_value(value) {
        Some(id) if is_valid_snowflake(id) => {}
        _ => errors.push(format!(
            "record {key}: {field} {value} must be a positive integer no larger than {}",
            i64::MAX
        )),
    }
}

fn check_timestamp(key: &str, field: &str, value: &Value, errors: &mut Vec<String>) {
    let parses = value
        .as_str()
        .is_some_and(|text| DateTime::parse_from_rfc3339(text).is_ok());
    if !parses {
        errors.push(format!("record {key}: {field} is not an RFC 3339 timestamp"));
    }
}

/// Records of a raw document in key order, `_metadata` excluded
pub fn records(value: &Value) -> impl Iterator<Item = (&String, &Value)> {
    value
        .as_object()
        .into_iter()
        .flat_map(Map::iter)
        .filter(|(key, _)| key.as_str() != METADATA_KEY)
}

/// Timestamp of a record field, if it parses
pub fn record_time(record: &Value, field: &str) -> Option<DateTime<Utc>> {
    record
        .get(field)
        .and_then(Value::as_str)
        .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
        .map(|at| at.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(id: u64) -> Value {
        json!({
            "message_id": id,
            "channel_id": "10",
            "guild_id": 1,
            "title": "Standup",
            "interval_minutes": 60,
            "is_paused": false,
            "last_reminder": "2024-01-01T12:00:00Z",
            "created_at": "2024-01-01T11:00:00+00:00",
            "required_reactions": ["✅"],
            "reactions": [{ "user_id": "5", "emoji": "✅", "reacted_at": "2024-01-01T12:01:00Z" }],
            "all_users": [5, "6"],
            "users_who_reacted": [5]
        })
    }

    #[test]
    fn well_formed_document_passes() {
        let doc = json!({ "_metadata": { "version": 1 }, "100": record(100), "200": record(200) });

        let report = validate_document(&doc);

        assert!(report.is_valid(), "{:?}", report.errors);
        assert_eq!(report.records, 2);
        assert_eq!(report.valid, 2);
    }

    /// Tests that every bad record is reported, not only the first
    #[test]
    fn errors_are_aggregated_across_records() {
        let mut bad_interval = record(100);
        bad_interval["interval_minutes"] = json!(0);
        let mut bad_ids = record(200);
        bad_ids["guild_id"] = json!(-4);
        bad_ids["all_users"] = json!([u64::MAX]);
        let mut missing = record(300);
        missing.as_object_mut().expect("object").remove("title");
        missing["required_reactions"] = json!([]);

        let doc = json!({ "100": bad_interval, "200": bad_ids, "300": missing, "400": record(400) });
        let report = validate_document(&doc);

        assert_eq!(report.records, 4);
        assert_eq!(report.valid, 1);
        assert_eq!(report.errors.len(), 5, "{:?}", report.errors);
        assert!(report.errors.iter().any(|e| e.contains("record 300: missing field title")));
    }

    #[test]
    fn key_must_match_message_id() {
        let doc = json!({ "100": record(101), "abc": record(102) });

        let report = validate_document(&doc);

        assert_eq!(report.valid, 0);
        assert!(report.errors.iter().any(|e| e.contains("does not match its key")));
        assert!(report.errors.iter().any(|e| e.contains("record abc: key is not a valid message id")));
    }

    #[test]
    fn timestamps_must_parse() {
        let mut bad = record(100);
        bad["last_reminder"] = json!("yesterday");
        bad["reactions"][0]["reacted_at"] = json!(12);

        let errors = validate_record("100", &bad);

        assert_eq!(errors.len(), 2, "{errors:?}");
    }

    #[test]
    fn non_object_document_is_rejected() {
        let report = validate_document(&json!([1, 2, 3]));
        assert!(!report.is_valid());
        assert_eq!(report.records, 0);
    }

    #[test]
    fn record_helpers_skip_metadata() {
        let doc = json!({ "_metadata": {}, "100": record(100) });
        let keys: Vec<&String> = records(&doc).map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["100"]);
        assert!(record_time(&doc["100"], "created_at").is_some());
    }
}
