use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use changeset_stats::source::ChangesetRecord;

pub fn ts(raw: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%SZ")
        .expect("timestamp fixture")
        .and_utc()
}

pub fn day(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("date fixture")
}

pub fn changeset(id: u64, created_at: &str, changes_count: u64) -> ChangesetRecord {
    ChangesetRecord {
        id,
        created_at: ts(created_at),
        changes_count,
        author: format!("mapper{id}"),
        comments_count: 0,
        tags: BTreeMap::new(),
    }
}

pub fn authored(mut record: ChangesetRecord, author: &str) -> ChangesetRecord {
    record.author = author.to_string();
    record
}

pub fn with_tag(mut record: ChangesetRecord, key: &str, value: &str) -> ChangesetRecord {
    record.tags.insert(key.to_string(), value.to_string());
    record
}

pub fn with_comments(mut record: ChangesetRecord, comments: u64) -> ChangesetRecord {
    record.comments_count = comments;
    record
}

/// Three changesets across 2024-01-01 and 2024-01-02, ten changes, one commented.
pub fn three_changesets(author: &str) -> Vec<ChangesetRecord> {
    vec![
        authored(changeset(1, "2024-01-01T10:00:00Z", 5), author),
        authored(changeset(2, "2024-01-01T15:30:00Z", 3), author),
        with_comments(authored(changeset(3, "2024-01-02T09:00:00Z", 2), author), 1),
    ]
}
