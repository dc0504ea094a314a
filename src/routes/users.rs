use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregator::{TagCount, UserSummary};
use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, USER_NOT_FOUND_MESSAGE};
use crate::response::{ok, paginated, AppError};
use crate::state::AppState;
use crate::validation::{parse_user_id, parse_user_key, UserKey};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/lookup", get(lookup_user))
        .route("/:user_id", get(get_user))
}

/// Rendered form of a stored summary; the per-day history stays internal.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummaryView {
    pub user_id: u64,
    pub username: Option<String>,
    pub first_edit: NaiveDate,
    pub last_edit: NaiveDate,
    pub total_edit_days: u64,
    pub active_edit_days_last_30: u64,
    pub total_changes: u64,
    pub changes_last_30_days: u64,
    pub most_used_editor: String,
    pub most_used_source: String,
    pub changeset_count: u64,
    pub changesets_with_comments: u64,
    pub edits_per_weekday: BTreeMap<u8, u64>,
    pub edits_per_hour: BTreeMap<u8, u64>,
    pub editor_usage: Vec<TagCount>,
    pub source_usage: Vec<TagCount>,
    pub last_changeset_id: u64,
    pub updated_at: DateTime<Utc>,
}

impl From<&UserSummary> for UserSummaryView {
    fn from(summary: &UserSummary) -> Self {
        Self {
            user_id: summary.user_id,
            username: summary.username.clone(),
            first_edit: summary.first_edit_date,
            last_edit: summary.last_edit_date,
            total_edit_days: summary.total_edit_days,
            active_edit_days_last_30: summary.active_edit_days_last_30,
            total_changes: summary.total_changes,
            changes_last_30_days: summary.changes_last_30_days,
            most_used_editor: summary.most_used_editor.clone(),
            most_used_source: summary.most_used_source.clone(),
            changeset_count: summary.changeset_count,
            changesets_with_comments: summary.changesets_with_comments,
            edits_per_weekday: summary.edits_per_weekday.clone(),
            edits_per_hour: summary.edits_per_hour.clone(),
            editor_usage: summary.editor_usage.iter().cloned().collect(),
            source_usage: summary.source_usage.iter().cloned().collect(),
            last_changeset_id: summary.last_changeset_id,
            updated_at: summary.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LookupQuery {
    q: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    page: Option<u64>,
    per_page: Option<u64>,
}

async fn lookup_user(
    State(state): State<AppState>,
    Query(query): Query<LookupQuery>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let input = query.q.unwrap_or_default();
    let key =
        parse_user_key(&input).map_err(|msg| AppError::bad_request("INVALID_USER_INPUT", msg))?;

    let user_id = match key {
        UserKey::Id(id) => Some(id),
        UserKey::Username(name) => state.store().find_by_username(&name)?,
    };
    let summary = match user_id {
        Some(id) => state.store().load_summary(id)?,
        None => None,
    }
    .ok_or_else(|| AppError::not_found(USER_NOT_FOUND_MESSAGE))?;

    Ok(ok(UserSummaryView::from(&summary)))
}

async fn get_user(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let user_id =
        parse_user_id(&raw_id).map_err(|msg| AppError::bad_request("INVALID_USER_INPUT", msg))?;
    let summary = state
        .store()
        .load_summary(user_id)?
        .ok_or_else(|| AppError::not_found(USER_NOT_FOUND_MESSAGE))?;
    Ok(ok(UserSummaryView::from(&summary)))
}

async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query
        .per_page
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let offset = usize::try_from(page.saturating_sub(1).saturating_mul(per_page))
        .unwrap_or(usize::MAX);

    let summaries = state.store().list_summaries(per_page as usize, offset)?;
    let total = state.store().count_summaries() as u64;
    let views = summaries.iter().map(UserSummaryView::from).collect();

    Ok(paginated(views, total, page, per_page))
}
