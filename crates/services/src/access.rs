//! Caller checks shared by every mutating operation.

use domains::error::{AppError, Result};
use domains::models::User;
use domains::traits::UserRepo;
use tracing::debug;
use uuid::Uuid;

/// Loads the caller and rejects unknown or banned users before any state
/// is touched.
pub(crate) async fn require_active_user(users: &dyn UserRepo, user_id: Uuid) -> Result<User> {
    let user = users
        .get_user(user_id)
        .await
        .map_err(AppError::persistence)?
        .ok_or_else(|| AppError::Forbidden(format!("unknown user {user_id}")))?;
    if user.banned {
        debug!(%user_id, "rejected banned user");
        return Err(AppError::Forbidden("User is banned.".to_string()));
    }
    Ok(user)
}

pub(crate) async fn require_moderator(users: &dyn UserRepo, user_id: Uuid) -> Result<User> {
    let user = require_active_user(users, user_id).await?;
    if !user.moderator {
        return Err(AppError::Forbidden(
            "moderator privileges are required".to_string(),
        ));
    }
    Ok(user)
}
