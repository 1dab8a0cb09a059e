//! Pothole listing and report ingestion.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use domains::models::Pothole;
use serde::Deserialize;
use services::{DriverSubmission, IngestionOutcome, StandardSubmission};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::identity::CurrentUser;
use crate::payload::decode_images;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct StandardReportBody {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub description: Option<String>,
    /// Base64 payloads, optionally as data URLs.
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DriverReportBody {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

pub async fn list_potholes(State(state): State<AppState>) -> ApiResult<Json<Vec<Pothole>>> {
    Ok(Json(state.engine.queries.potholes().await?))
}

pub async fn get_pothole(
    State(state): State<AppState>,
    Path(pothole_id): Path<Uuid>,
) -> ApiResult<Json<Pothole>> {
    Ok(Json(state.engine.queries.pothole(pothole_id).await?))
}

pub async fn list_user_potholes(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> ApiResult<Json<Vec<Pothole>>> {
    Ok(Json(state.engine.queries.potholes_for_user(user_id).await?))
}

fn ingestion_response(outcome: IngestionOutcome) -> impl IntoResponse {
    let status = match outcome {
        IngestionOutcome::Created { .. } => StatusCode::CREATED,
        IngestionOutcome::ExpiryReset { .. } => StatusCode::OK,
    };
    (status, Json(outcome))
}

pub async fn report_standard(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(body): Json<StandardReportBody>,
) -> ApiResult<impl IntoResponse> {
    let submission = StandardSubmission {
        latitude: body.latitude,
        longitude: body.longitude,
        description: body.description,
        images: decode_images(&body.images),
    };
    let outcome = state
        .engine
        .ingestion
        .report_standard(user_id, submission)
        .await?;
    Ok(ingestion_response(outcome))
}

pub async fn report_driver(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Json(body): Json<DriverReportBody>,
) -> ApiResult<impl IntoResponse> {
    let submission = DriverSubmission {
        latitude: body.latitude,
        longitude: body.longitude,
    };
    let outcome = state
        .engine
        .ingestion
        .report_driver(user_id, submission)
        .await?;
    Ok(ingestion_response(outcome))
}
