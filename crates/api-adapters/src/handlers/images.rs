//! Images attached to an existing report.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use domains::models::ReportedImage;
use serde::Deserialize;
use serde_json::{json, Value};
use services::{AttachmentStatus, ImageRemoval};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::identity::CurrentUser;
use crate::payload::decode_images;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ImagesBody {
    pub images: Vec<String>,
}

pub async fn list_images(
    State(state): State<AppState>,
    Path((pothole_id, report_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Vec<ReportedImage>>> {
    Ok(Json(
        state
            .engine
            .queries
            .images_for_report(pothole_id, report_id)
            .await?,
    ))
}

pub async fn get_image(
    State(state): State<AppState>,
    Path((pothole_id, report_id, image_id)): Path<(Uuid, Uuid, Uuid)>,
) -> ApiResult<Json<ReportedImage>> {
    Ok(Json(
        state
            .engine
            .queries
            .image(pothole_id, report_id, image_id)
            .await?,
    ))
}

/// 201 when every image was attached, 206 when some were not.
pub async fn add_images(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path((pothole_id, report_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<ImagesBody>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let summary = state
        .engine
        .reports
        .add_images(user_id, pothole_id, report_id, decode_images(&body.images))
        .await?;

    let (status, message) = match summary.status() {
        AttachmentStatus::Partial { failed, total } => (
            StatusCode::PARTIAL_CONTENT,
            format!("{failed} of {total} images failed to upload."),
        ),
        AttachmentStatus::AllSucceeded | AttachmentStatus::NoneSubmitted => {
            (StatusCode::CREATED, "All images added to report!".to_string())
        }
    };
    Ok((status, Json(json!({ "message": message, "summary": summary }))))
}

pub async fn delete_image(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path((pothole_id, report_id, image_id)): Path<(Uuid, Uuid, Uuid)>,
) -> ApiResult<Json<ImageRemoval>> {
    let removal = state
        .engine
        .reports
        .delete_image(user_id, pothole_id, report_id, image_id)
        .await?;
    Ok(Json(removal))
}
