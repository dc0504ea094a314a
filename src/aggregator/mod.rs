//! Incremental rollup of changeset records into a [`UserSummary`].
//!
//! Merging is pure: the caller supplies the prior summary, the fetched
//! records and the run's reference time. Records at or below the prior
//! watermark are ignored, so replaying a batch is a no-op.

pub mod types;

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};

use crate::source::ChangesetRecord;

pub use types::{TagCount, TagHistogram, UserSummary, UNKNOWN_TAG};

/// Trailing window for the "last 30 days" counters.
pub const RECENT_WINDOW_DAYS: i64 = 30;

pub const EDITOR_TAG: &str = "created_by";
pub const SOURCE_TAG: &str = "source";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AggregateError {
    #[error("changeset {id} appears more than once in the batch for user {user_id}")]
    DuplicateChangeset { user_id: u64, id: u64 },
}

pub fn merge(
    user_id: u64,
    prior: Option<UserSummary>,
    records: &[ChangesetRecord],
    reference_time: DateTime<Utc>,
) -> Result<Option<UserSummary>, AggregateError> {
    let watermark = prior.as_ref().map(|summary| summary.last_changeset_id);
    let fresh: Vec<&ChangesetRecord> = records
        .iter()
        .filter(|record| watermark.map_or(true, |w| record.id > w))
        .collect();

    let mut seen = HashSet::with_capacity(fresh.len());
    for record in &fresh {
        if !seen.insert(record.id) {
            return Err(AggregateError::DuplicateChangeset {
                user_id,
                id: record.id,
            });
        }
    }

    let (Some(batch_first), Some(batch_last)) = (
        fresh.iter().map(|record| record.date()).min(),
        fresh.iter().map(|record| record.date()).max(),
    ) else {
        return Ok(prior);
    };

    let mut summary = match prior {
        Some(summary) => summary,
        None => UserSummary::new(user_id, batch_first, reference_time),
    };
    summary.first_edit_date = summary.first_edit_date.min(batch_first);
    summary.last_edit_date = summary.last_edit_date.max(batch_last);

    for record in fresh {
        absorb(&mut summary, record);
    }
    refresh_derived(&mut summary, reference_time);

    Ok(Some(summary))
}

fn absorb(summary: &mut UserSummary, record: &ChangesetRecord) {
    if summary.username.is_none() && !record.author.is_empty() {
        summary.username = Some(record.author.clone());
    }

    *summary.edit_days.entry(record.date()).or_insert(0) += record.changes_count;
    *summary.recent_edits.entry(record.created_at).or_insert(0) += record.changes_count;
    summary.total_changes += record.changes_count;
    summary.changeset_count += 1;
    if record.comments_count > 0 {
        summary.changesets_with_comments += 1;
    }

    let weekday = record.created_at.weekday().num_days_from_monday() as u8;
    let hour = record.created_at.hour() as u8;
    *summary.edits_per_weekday.entry(weekday).or_insert(0) += 1;
    *summary.edits_per_hour.entry(hour).or_insert(0) += 1;

    if let Some(editor) = record.tag(EDITOR_TAG) {
        summary.editor_usage.increment(editor);
    }
    if let Some(source) = record.tag(SOURCE_TAG) {
        summary.source_usage.increment(source);
    }

    summary.last_changeset_id = summary.last_changeset_id.max(record.id);
}

/// Recomputes every field derived from the edit-day history and histograms.
fn refresh_derived(summary: &mut UserSummary, reference_time: DateTime<Utc>) {
    summary.total_edit_days = summary.edit_days.len() as u64;

    // Entries older than the window start are dropped.
    let window_start = reference_time - Duration::days(RECENT_WINDOW_DAYS);
    summary.recent_edits = summary.recent_edits.split_off(&window_start);

    let active_days: BTreeSet<NaiveDate> = summary
        .recent_edits
        .keys()
        .map(|created_at| created_at.date_naive())
        .collect();
    summary.active_edit_days_last_30 = active_days.len() as u64;
    summary.changes_last_30_days = summary.recent_edits.values().sum();

    summary.most_used_editor = summary
        .editor_usage
        .most_used()
        .unwrap_or(UNKNOWN_TAG)
        .to_string();
    summary.most_used_source = summary
        .source_usage
        .most_used()
        .unwrap_or(UNKNOWN_TAG)
        .to_string();
    summary.updated_at = reference_time;
}
