//! Post-migration verification
//!
//! Compares each record of the original flat file with its SQLite row on a
//! fixed set of critical fields and scores the result instead of returning a
//! single pass/fail bit.

use std::collections::BTreeSet;
use std::sync::Arc;

use reminder_domain::{Event, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use super::validator::records;
use crate::storage::SqliteStorageBackend;

/// One mismatch between the flat file and SQLite
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discrepancy {
    pub message_id: String,
    pub field: String,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VerificationReport {
    pub records_checked: usize,
    pub matched: usize,
    /// Records with no SQLite row
    pub missing: Vec<String>,
    /// SQLite rows with no record in the file
    pub unexpected: Vec<u64>,
    pub discrepancies: Vec<Discrepancy>,
    /// Share of records that matched, 0 to 100
    pub integrity_score: f64,
}

impl VerificationReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && self.discrepancies.is_empty()
    }
}

pub struct MigrationVerifier {
    sqlite: Arc<SqliteStorageBackend>,
}

impl MigrationVerifier {
    pub fn new(sqlite: Arc<SqliteStorageBackend>) -> Self {
        Self { sqlite }
    }

    pub async fn verify(&self, original: &Value) -> Result<VerificationReport> {
        let repository = self.sqlite.repository()?;
        let stored = repository.load_document().await?;

        let mut report = VerificationReport::default();
        let mut seen = BTreeSet::new();
        for (key, record) in records(original) {
            report.records_checked += 1;
            let expected = match serde_json::from_value::<Event>(record.clone()) {
                Ok(event) => event,
                Err(err) => {
                    report.discrepancies.push(Discrepancy {
                        message_id: key.clone(),
                        field: "record".into(),
                        expected: "a decodable event".into(),
                        actual: err.to_string(),
                    });
                    continue;
                }
            };
            seen.insert(expected.message_id);

            let Some(actual) = stored.get(expected.message_id) else {
                report.missing.push(key.clone());
                continue;
            };
            let before = report.discrepancies.len();
            compare(key, &expected, actual, &mut report.discrepancies);
            if report.discrepancies.len() == before {
                report.matched += 1;
            }
        }

        report.unexpected =
            stored.events.keys().copied().filter(|id| !seen.contains(id)).collect();
        report.integrity_score = if report.records_checked == 0 {
            100.0
        } else {
            report.matched as f64 * 100.0 / report.records_checked as f64
        };

        if report.is_clean() {
            info!(records = report.records_checked, "Migration verified");
        } else {
            warn!(
                score = report.integrity_score,
                missing = report.missing.len(),
                unexpected = report.unexpected.len(),
                discrepancies = report.discrepancies.len(),
                "Migration verification found differences"
            );
        }
        Ok(report)
    }
}

fn compare(key: &str, expected: &Event, actual: &Event, out: &mut Vec<Discrepancy>) {
    let mut check = |field: &str, expected: String, actual: String| {
        if expected != actual {
            out.push(Discrepancy { message_id: key.to_string(), field: field.into(), expected, actual });
        }
    };
    check("message_id", expected.message_id.to_string(), actual.message_id.to_string());
    check("channel_id", expected.channel_id.to_string(), actual.channel_id.to_string());
    check("guild_id", expected.guild_id.to_string(), actual.guild_id.to_string());
    check("title", expected.title.clone(), actual.title.clone());
    check(
        "interval_minutes",
        expected.interval_minutes.to_string(),
        actual.interval_minutes.to_string(),
    );
    check("is_paused", expected.is_paused.to_string(), actual.is_paused.to_string());
    check(
        "required_reactions",
        expected.required_reactions.join(","),
        actual.required_reactions.join(","),
    );
}
