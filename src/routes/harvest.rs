use axum::extract::{Path, State};
use axum::routing::post;
use axum::Router;
use chrono::Utc;
use serde::Serialize;

use crate::response::{ok, AppError};
use crate::state::AppState;
use crate::validation::parse_user_id;
use crate::workers::UserOutcome;

pub fn router() -> Router<AppState> {
    Router::new().route("/:user_id", post(harvest_user))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HarvestResponse {
    user_id: u64,
    outcome: UserOutcome,
}

/// Fetch and merge one user immediately.
async fn harvest_user(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let user_id =
        parse_user_id(&raw_id).map_err(|msg| AppError::bad_request("INVALID_USER_INPUT", msg))?;
    let outcome = state.scheduler().harvest_one(user_id, Utc::now()).await?;
    Ok(ok(HarvestResponse { user_id, outcome }))
}
