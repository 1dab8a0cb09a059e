//! Moderator-only routes.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};
use services::ReportCascade;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::identity::CurrentUser;
use crate::AppState;

pub async fn delete_report(
    State(state): State<AppState>,
    CurrentUser(moderator_id): CurrentUser,
    Path(report_id): Path<Uuid>,
) -> ApiResult<Json<ReportCascade>> {
    let cascade = state
        .engine
        .moderation
        .moderator_delete_report(moderator_id, report_id)
        .await?;
    Ok(Json(cascade))
}

pub async fn ban_user(
    State(state): State<AppState>,
    CurrentUser(moderator_id): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    state
        .engine
        .moderation
        .set_banned(moderator_id, user_id, true)
        .await?;
    Ok(Json(json!({ "message": "User banned." })))
}

pub async fn unban_user(
    State(state): State<AppState>,
    CurrentUser(moderator_id): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    state
        .engine
        .moderation
        .set_banned(moderator_id, user_id, false)
        .await?;
    Ok(Json(json!({ "message": "User unbanned." })))
}
