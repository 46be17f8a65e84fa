// src/models/session.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::catalog::Catalog;

/// Authoritative progress of one test-taker.
///
/// Only `engine::progression::advance` produces changed copies of a record;
/// the session service stores them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: Uuid,
    pub test_started_at: DateTime<Utc>,
    pub section_index: usize,
    pub section_started_at: DateTime<Utc>,
    pub question_index: usize,
    pub completed: bool,
    /// Set by the completing advance.
    pub completed_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    /// A fresh session positioned on the first question of the first section.
    pub fn new(id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id,
            test_started_at: now,
            section_index: 0,
            section_started_at: now,
            question_index: 0,
            completed: false,
            completed_at: None,
        }
    }

    /// Key of the current section, or an empty string if the index is
    /// outside the catalog.
    pub fn section_key<'a>(&self, catalog: &'a Catalog) -> &'a str {
        catalog
            .section(self.section_index)
            .map(|section| section.key.as_str())
            .unwrap_or_default()
    }

    /// Whether the request's expected position names where this record is.
    /// Missing fields match anything.
    pub fn is_at(&self, catalog: &Catalog, expected: &ExpectedPosition) -> bool {
        let section_matches = expected
            .section_key
            .as_deref()
            .is_none_or(|key| key == self.section_key(catalog));
        let question_matches = expected
            .question_index
            .is_none_or(|index| index == self.question_index);
        section_matches && question_matches
    }
}

/// The position an advance request claims to advance from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpectedPosition {
    pub section_key: Option<String>,
    pub question_index: Option<usize>,
}

impl ExpectedPosition {
    pub fn is_empty(&self) -> bool {
        self.section_key.is_none() && self.question_index.is_none()
    }
}

/// Response of `POST /api/start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartResponse {
    pub user_id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    pub section_key: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub section_started_at: DateTime<Utc>,
    pub question_index: usize,
}

impl StartResponse {
    pub fn from_record(record: &SessionRecord, catalog: &Catalog) -> Self {
        Self {
            user_id: record.id.to_string(),
            started_at: record.test_started_at,
            section_key: record.section_key(catalog).to_string(),
            section_started_at: record.section_started_at,
            question_index: record.question_index,
        }
    }
}

/// Query string of `GET /api/status`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Response of `GET /api/status`: remaining seconds computed at `now`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub now: DateTime<Utc>,
    pub section_key: String,
    pub section_remaining: u64,
    pub total_remaining: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub section_started_at: DateTime<Utc>,
    pub question_index: usize,
    pub completed: bool,
}

/// Body of `POST /api/advance`.
///
/// `sectionKey` and `questionIndex` are optional; when sent, a request whose
/// position no longer matches the session is answered with the current state
/// instead of advancing again.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceRequest {
    #[validate(length(min = 1, max = 64))]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 32))]
    pub section_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_index: Option<usize>,
}

impl AdvanceRequest {
    pub fn expected_position(&self) -> ExpectedPosition {
        ExpectedPosition {
            section_key: self.section_key.clone(),
            question_index: self.question_index,
        }
    }
}

/// Response of `POST /api/advance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceResponse {
    pub section_key: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub section_started_at: DateTime<Utc>,
    pub question_index: usize,
    pub completed: bool,
}

impl AdvanceResponse {
    pub fn from_record(record: &SessionRecord, catalog: &Catalog) -> Self {
        Self {
            section_key: record.section_key(catalog).to_string(),
            section_started_at: record.section_started_at,
            question_index: record.question_index,
            completed: record.completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_response_uses_camel_case_and_millis() {
        let now = DateTime::<Utc>::from_timestamp_millis(1_700_000_000_123).unwrap();
        let record = SessionRecord::new(Uuid::nil(), now);
        let json = serde_json::to_value(StartResponse::from_record(&record, &Catalog::standard()))
            .unwrap();

        assert_eq!(json["userId"], Uuid::nil().to_string());
        assert_eq!(json["startedAt"], 1_700_000_000_123_i64);
        assert_eq!(json["sectionKey"], "A");
        assert_eq!(json["questionIndex"], 0);
    }

    #[test]
    fn expected_position_matches_partially() {
        let catalog = Catalog::standard();
        let mut record = SessionRecord::new(Uuid::new_v4(), Utc::now());
        record.question_index = 1;

        assert!(record.is_at(&catalog, &ExpectedPosition::default()));
        assert!(record.is_at(
            &catalog,
            &ExpectedPosition {
                section_key: Some("A".to_string()),
                question_index: None,
            }
        ));
        assert!(!record.is_at(
            &catalog,
            &ExpectedPosition {
                section_key: Some("A".to_string()),
                question_index: Some(0),
            }
        ));
    }

    #[test]
    fn advance_request_accepts_bare_user_id() {
        let request: AdvanceRequest =
            serde_json::from_str(r#"{"userId":"abc"}"#).unwrap();
        assert!(request.expected_position().is_empty());
    }
}
