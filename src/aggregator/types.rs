use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const UNKNOWN_TAG: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagCount {
    pub value: String,
    pub count: u64,
}

/// Tag value counts in first-encountered order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagHistogram(Vec<TagCount>);

impl TagHistogram {
    pub fn increment(&mut self, value: &str) {
        match self.0.iter_mut().find(|entry| entry.value == value) {
            Some(entry) => entry.count += 1,
            None => self.0.push(TagCount {
                value: value.to_string(),
                count: 1,
            }),
        }
    }

    pub fn get(&self, value: &str) -> u64 {
        self.0
            .iter()
            .find(|entry| entry.value == value)
            .map_or(0, |entry| entry.count)
    }

    /// Highest count wins; on a tie the earliest entry is kept.
    pub fn most_used(&self) -> Option<&str> {
        let mut best: Option<&TagCount> = None;
        for entry in &self.0 {
            if best.map_or(true, |b| entry.count > b.count) {
                best = Some(entry);
            }
        }
        best.map(|entry| entry.value.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TagCount> {
        self.0.iter()
    }
}

impl<'a> FromIterator<&'a str> for TagHistogram {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut histogram = Self::default();
        for value in iter {
            histogram.increment(value);
        }
        histogram
    }
}

/// Persisted per-user rollup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub user_id: u64,
    pub username: Option<String>,
    pub first_edit_date: NaiveDate,
    pub last_edit_date: NaiveDate,
    pub total_edit_days: u64,
    pub active_edit_days_last_30: u64,
    pub total_changes: u64,
    pub changes_last_30_days: u64,
    pub changeset_count: u64,
    pub changesets_with_comments: u64,
    /// 0 = Monday .. 6 = Sunday.
    pub edits_per_weekday: BTreeMap<u8, u64>,
    /// UTC hour 0..=23.
    pub edits_per_hour: BTreeMap<u8, u64>,
    pub editor_usage: TagHistogram,
    pub source_usage: TagHistogram,
    pub most_used_editor: String,
    pub most_used_source: String,
    pub last_changeset_id: u64,
    /// Every edit date with the number of changes made on it.
    pub edit_days: BTreeMap<NaiveDate, u64>,
    /// Changes keyed by changeset timestamp, pruned to the trailing window.
    #[serde(default)]
    pub recent_edits: BTreeMap<DateTime<Utc>, u64>,
    pub updated_at: DateTime<Utc>,
}

impl UserSummary {
    pub fn new(user_id: u64, first_edit_date: NaiveDate, updated_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            username: None,
            first_edit_date,
            last_edit_date: first_edit_date,
            total_edit_days: 0,
            active_edit_days_last_30: 0,
            total_changes: 0,
            changes_last_30_days: 0,
            changeset_count: 0,
            changesets_with_comments: 0,
            edits_per_weekday: BTreeMap::new(),
            edits_per_hour: BTreeMap::new(),
            editor_usage: TagHistogram::default(),
            source_usage: TagHistogram::default(),
            most_used_editor: UNKNOWN_TAG.to_string(),
            most_used_source: UNKNOWN_TAG.to_string(),
            last_changeset_id: 0,
            edit_days: BTreeMap::new(),
            recent_edits: BTreeMap::new(),
            updated_at,
        }
    }
}
