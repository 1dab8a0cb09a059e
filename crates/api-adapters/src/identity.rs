//! Caller identity. Authentication happens upstream; the authenticated user
//! id arrives in the `X-User-Id` header.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use domains::error::AppError;
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone, Copy)]
pub struct CurrentUser(pub Uuid);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::Forbidden("missing X-User-Id header".into()))?;
        let user_id = raw
            .to_str()
            .ok()
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .ok_or_else(|| AppError::ValidationError("X-User-Id is not a valid UUID".into()))?;

        state.engine.provision_user(user_id).await?;
        Ok(Self(user_id))
    }
}
