pub mod http;
pub mod xml;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub use http::HttpChangesetSource;

/// One remote changeset, as decoded from the API body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesetRecord {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub changes_count: u64,
    pub author: String,
    pub comments_count: u64,
    pub tags: BTreeMap<String, String>,
}

impl ChangesetRecord {
    pub fn date(&self) -> NaiveDate {
        self.created_at.date_naive()
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Records(Vec<ChangesetRecord>),
    /// The user exists but nothing qualifies.
    Empty,
}

impl FetchOutcome {
    pub fn from_records(records: Vec<ChangesetRecord>) -> Self {
        if records.is_empty() {
            Self::Empty
        } else {
            Self::Records(records)
        }
    }

    pub fn into_records(self) -> Vec<ChangesetRecord> {
        match self {
            Self::Records(records) => records,
            Self::Empty => Vec::new(),
        }
    }
}

/// Every variant means the source is unavailable for this user on this run.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("changeset request timed out after {secs}s")]
    Timeout { secs: u64 },
    #[error("changeset network error: {0}")]
    Network(String),
    #[error("changeset api returned status {status}")]
    Status { status: u16 },
    #[error("changeset body could not be decoded: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedRecord {
    #[error("changeset is missing mandatory attribute `{0}`")]
    MissingField(&'static str),
    #[error("changeset attribute `{field}` has invalid value `{value}`")]
    InvalidField { field: &'static str, value: String },
}

/// Remote changeset history for a single user.
///
/// `since_id` is a hint. Implementations may ignore it and return the full
/// history; the aggregator filters against the watermark regardless.
#[async_trait]
pub trait ChangesetSource: Send + Sync {
    async fn fetch(&self, user_id: u64, since_id: Option<u64>)
        -> Result<FetchOutcome, SourceError>;
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn record(id: u64) -> ChangesetRecord {
        ChangesetRecord {
            id,
            created_at: Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 0).unwrap(),
            changes_count: 1,
            author: "mapper".to_string(),
            comments_count: 0,
            tags: BTreeMap::from([("created_by".to_string(), "JOSM".to_string())]),
        }
    }

    #[test]
    fn empty_records_become_empty_outcome() {
        assert_eq!(FetchOutcome::from_records(Vec::new()), FetchOutcome::Empty);
        let outcome = FetchOutcome::from_records(vec![record(1)]);
        assert_eq!(outcome.into_records().len(), 1);
    }

    #[test]
    fn date_uses_utc_calendar_day() {
        let rec = record(7);
        assert_eq!(rec.date(), NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        assert_eq!(rec.tag("created_by"), Some("JOSM"));
        assert_eq!(rec.tag("source"), None);
    }
}
