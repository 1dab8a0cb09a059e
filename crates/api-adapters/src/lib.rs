//! # api-adapters
//!
//! The HTTP surface of the pothole engine.

pub mod payload;

#[cfg(feature = "web-axum")]
pub mod error;
#[cfg(feature = "web-axum")]
pub mod handlers;
#[cfg(feature = "web-axum")]
pub mod identity;
#[cfg(feature = "web-axum")]
pub mod middleware;

#[cfg(feature = "web-axum")]
pub use web::{router, AppState};

#[cfg(feature = "web-axum")]
mod web {
    use axum::routing::{delete, get, post};
    use axum::Router;
    use services::Engine;

    use crate::handlers::{images, moderation, potholes, reports};

    /// State shared by every handler.
    #[derive(Clone)]
    pub struct AppState {
        pub engine: Engine,
    }

    /// Builds the API routes. Middleware is applied separately with
    /// [`crate::middleware::apply_standard_middleware`].
    pub fn router(state: AppState) -> Router {
        Router::new()
            .route("/potholes", get(potholes::list_potholes))
            .route("/potholes/user", get(potholes::list_user_potholes))
            .route("/potholes/standard", post(potholes::report_standard))
            .route("/potholes/driver", post(potholes::report_driver))
            .route("/potholes/{pothole_id}", get(potholes::get_pothole))
            .route("/potholes/{pothole_id}/reports", get(reports::list_reports))
            .route(
                "/potholes/{pothole_id}/reports/{report_id}",
                get(reports::get_report)
                    .put(reports::update_description)
                    .delete(reports::delete_report),
            )
            .route(
                "/potholes/{pothole_id}/reports/{report_id}/vote",
                post(reports::vote),
            )
            .route(
                "/potholes/{pothole_id}/reports/{report_id}/votes",
                get(reports::list_votes),
            )
            .route(
                "/potholes/{pothole_id}/reports/{report_id}/images",
                get(images::list_images).post(images::add_images),
            )
            .route(
                "/potholes/{pothole_id}/reports/{report_id}/images/{image_id}",
                get(images::get_image).delete(images::delete_image),
            )
            .route("/reports/user", get(reports::list_user_reports))
            .route(
                "/moderator/reports/{report_id}",
                delete(moderation::delete_report),
            )
            .route("/moderator/users/{user_id}/ban", post(moderation::ban_user))
            .route("/moderator/users/{user_id}/unban", post(moderation::unban_user))
            .with_state(state)
    }
}
