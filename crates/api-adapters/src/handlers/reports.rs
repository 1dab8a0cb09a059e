//! Report reads, owner edits, and votes.

use axum::extract::{Path, Query, State};
use axum::Json;
use domains::models::{Report, UserReportVote};
use serde::Deserialize;
use serde_json::{json, Value};
use services::ReportCascade;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::identity::CurrentUser;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DescriptionBody {
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct VoteBody {
    pub upvote: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct VotesQuery {
    /// `true` for upvotes only, `false` for downvotes only.
    pub upvote: Option<bool>,
}

pub async fn list_reports(
    State(state): State<AppState>,
    Path(pothole_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Report>>> {
    Ok(Json(state.engine.queries.reports_for_pothole(pothole_id).await?))
}

pub async fn get_report(
    State(state): State<AppState>,
    Path((pothole_id, report_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Report>> {
    Ok(Json(state.engine.queries.report(pothole_id, report_id).await?))
}

pub async fn list_user_reports(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> ApiResult<Json<Vec<Report>>> {
    Ok(Json(state.engine.queries.reports_for_user(user_id).await?))
}

pub async fn update_description(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path((pothole_id, report_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<DescriptionBody>,
) -> ApiResult<Json<Report>> {
    let report = state
        .engine
        .reports
        .update_description(user_id, pothole_id, report_id, &body.description)
        .await?;
    Ok(Json(report))
}

pub async fn delete_report(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path((pothole_id, report_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<ReportCascade>> {
    let cascade = state
        .engine
        .moderation
        .owner_delete_report(user_id, pothole_id, report_id)
        .await?;
    Ok(Json(cascade))
}

pub async fn vote(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path((pothole_id, report_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<VoteBody>,
) -> ApiResult<Json<Value>> {
    let outcome = state
        .engine
        .moderation
        .vote(user_id, pothole_id, report_id, body.upvote)
        .await?;
    Ok(Json(json!({ "message": outcome.message(), "result": outcome })))
}

pub async fn list_votes(
    State(state): State<AppState>,
    Path((pothole_id, report_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<VotesQuery>,
) -> ApiResult<Json<Vec<UserReportVote>>> {
    let votes = state
        .engine
        .queries
        .votes_for_report(pothole_id, report_id, query.upvote)
        .await?;
    Ok(Json(votes))
}
