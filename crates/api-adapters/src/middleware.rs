//! Middleware stack for the pothole API.

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, Method};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::identity::USER_ID_HEADER;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Any origin may call the API; identity travels in a header, not a cookie.
pub fn cors_policy() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            HeaderName::from_static(USER_ID_HEADER),
        ])
        .max_age(std::time::Duration::from_secs(3600))
}

/// Request ids, tracing spans, CORS and the body limit.
pub fn apply_standard_middleware(router: Router, max_body_bytes: usize) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    router
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(cors_policy())
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
}
