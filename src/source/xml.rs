//! Decoder for the `/api/0.6/changesets` XML body.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{ChangesetRecord, MalformedRecord};

const CREATED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed xml: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("document ended with {open} unclosed element(s)")]
    Truncated { open: usize },
}

#[derive(Debug, Default)]
pub struct DecodedBatch {
    pub records: Vec<ChangesetRecord>,
    pub malformed: Vec<MalformedRecord>,
}

impl DecodedBatch {
    fn push(&mut self, raw: RawChangeset) {
        match ChangesetRecord::try_from(raw) {
            Ok(record) => self.records.push(record),
            Err(e) => self.malformed.push(e),
        }
    }
}

#[derive(Debug, Default)]
struct RawChangeset {
    id: Option<String>,
    created_at: Option<String>,
    changes_count: Option<String>,
    user: Option<String>,
    comments_count: Option<String>,
    tags: BTreeMap<String, String>,
}

impl RawChangeset {
    fn from_element(element: &BytesStart<'_>) -> Result<Self, quick_xml::Error> {
        let mut raw = Self::default();
        for attr in element.attributes() {
            let attr = attr?;
            let value = attr.unescape_value()?.into_owned();
            match attr.key.as_ref() {
                b"id" => raw.id = Some(value),
                b"created_at" => raw.created_at = Some(value),
                b"changes_count" => raw.changes_count = Some(value),
                b"user" => raw.user = Some(value),
                b"comments_count" => raw.comments_count = Some(value),
                _ => {}
            }
        }
        Ok(raw)
    }

    /// Tags without both `k` and `v` are ignored. A repeated key overwrites.
    fn add_tag(&mut self, element: &BytesStart<'_>) -> Result<(), quick_xml::Error> {
        let mut key = None;
        let mut value = None;
        for attr in element.attributes() {
            let attr = attr?;
            match attr.key.as_ref() {
                b"k" => key = Some(attr.unescape_value()?.into_owned()),
                b"v" => value = Some(attr.unescape_value()?.into_owned()),
                _ => {}
            }
        }
        if let (Some(k), Some(v)) = (key, value) {
            self.tags.insert(k, v);
        }
        Ok(())
    }
}

fn parse_count(field: &'static str, raw: Option<String>) -> Result<u64, MalformedRecord> {
    match raw {
        None => Ok(0),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map_err(|_| MalformedRecord::InvalidField { field, value }),
    }
}

impl TryFrom<RawChangeset> for ChangesetRecord {
    type Error = MalformedRecord;

    fn try_from(raw: RawChangeset) -> Result<Self, Self::Error> {
        let id_raw = raw.id.ok_or(MalformedRecord::MissingField("id"))?;
        let id = id_raw
            .trim()
            .parse::<u64>()
            .map_err(|_| MalformedRecord::InvalidField {
                field: "id",
                value: id_raw.clone(),
            })?;

        let created_raw = raw
            .created_at
            .ok_or(MalformedRecord::MissingField("created_at"))?;
        let created_at = NaiveDateTime::parse_from_str(created_raw.trim(), CREATED_AT_FORMAT)
            .map_err(|_| MalformedRecord::InvalidField {
                field: "created_at",
                value: created_raw.clone(),
            })?
            .and_utc();

        Ok(ChangesetRecord {
            id,
            created_at,
            changes_count: parse_count("changes_count", raw.changes_count)?,
            author: raw.user.unwrap_or_default(),
            comments_count: parse_count("comments_count", raw.comments_count)?,
            tags: raw.tags,
        })
    }
}

/// Decodes every `<changeset>` element of an API response.
///
/// Individually malformed changesets are collected in `malformed` and do not
/// fail the batch. A broken document is an error, and so is one that ends
/// before every element is closed.
pub fn parse_changesets(body: &str) -> Result<DecodedBatch, DecodeError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut batch = DecodedBatch::default();
    let mut current: Option<RawChangeset> = None;
    let mut depth = 0usize;

    loop {
        let event = reader.read_event()?;
        match &event {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth = depth.saturating_sub(1),
            _ => {}
        }
        match event {
            Event::Start(e) if e.name().as_ref() == b"changeset" => {
                if let Some(unclosed) = current.take() {
                    batch.push(unclosed);
                }
                current = Some(RawChangeset::from_element(&e)?);
            }
            Event::Empty(e) if e.name().as_ref() == b"changeset" => {
                batch.push(RawChangeset::from_element(&e)?);
            }
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"tag" => {
                if let Some(changeset) = current.as_mut() {
                    changeset.add_tag(&e)?;
                }
            }
            Event::End(e) if e.name().as_ref() == b"changeset" => {
                if let Some(changeset) = current.take() {
                    batch.push(changeset);
                }
            }
            Event::Eof if depth > 0 => return Err(DecodeError::Truncated { open: depth }),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(batch)
}
