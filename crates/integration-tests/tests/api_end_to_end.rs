use api_adapters::middleware::apply_standard_middleware;
use api_adapters::{router, AppState};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use domains::media::storage_key_from_url;
use integration_tests::{png, Harness};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

fn app(h: &Harness) -> Router {
    apply_standard_middleware(
        router(AppState {
            engine: h.engine.clone(),
        }),
        10 * 1024 * 1024,
    )
}

async fn call(app: &Router, method: &str, uri: &str, user: Uuid, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("X-User-Id", user.to_string())
        .header("content-type", "application/json");
    let request = builder
        .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    assert!(response.headers().contains_key("x-request-id"));
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn image_lifecycle_over_http() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let app = app(&h);
    let owner = Uuid::now_v7();
    let encoded = format!("data:image/png;base64,{}", STANDARD.encode(png(64, 48)));

    let (status, created) = call(
        &app,
        "POST",
        "/potholes/standard",
        owner,
        Some(json!({
            "latitude": 10.6415,
            "longitude": -61.3990,
            "description": "Lip of the pothole is cracking wider",
            "images": [encoded],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["images"]["attached"].as_array().unwrap().len(), 1);

    let report_uri = format!(
        "/potholes/{}/reports/{}",
        created["pothole_id"].as_str().unwrap(),
        created["report_id"].as_str().unwrap()
    );
    let (status, images) = call(&app, "GET", &format!("{report_uri}/images"), owner, None).await;
    assert_eq!(status, StatusCode::OK);
    let image_id = images[0]["id"].as_str().unwrap().to_string();
    let image_url = images[0]["image_url"].as_str().unwrap().to_string();
    let key = storage_key_from_url(&image_url).unwrap();
    assert!(h.media_root().join(&key).exists());

    let (status, edited) = call(
        &app,
        "PUT",
        &report_uri,
        owner,
        Some(json!({ "description": "Now marked with a cone" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["description"], "Now marked with a cone");

    let stranger = Uuid::now_v7();
    let (status, _) = call(&app, "DELETE", &format!("{report_uri}/images/{image_id}"), stranger, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, removal) = call(&app, "DELETE", &format!("{report_uri}/images/{image_id}"), owner, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(removal["blob_failure"].is_null());
    assert!(!h.media_root().join(&key).exists());

    let (status, _) = call(&app, "GET", &format!("{report_uri}/images/{image_id}"), owner, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn my_reports_and_moderator_removal() -> anyhow::Result<()> {
    let h = Harness::new().await?;
    let app = app(&h);
    let author = Uuid::now_v7();

    let (_, created) = call(
        &app,
        "POST",
        "/potholes/driver",
        author,
        Some(json!({ "latitude": 10.28, "longitude": -61.46 })),
    )
    .await;
    let report_id = created["report_id"].as_str().unwrap().to_string();

    let (_, mine) = call(&app, "GET", "/reports/user", author, None).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
    assert_eq!(mine[0]["description"], "Pothole submitted via Driver Mode.");

    let moderator = h.moderator().await?;
    let (status, cascade) = call(&app, "DELETE", &format!("/moderator/reports/{report_id}"), moderator, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cascade["pothole_removed"], true);

    let (_, mine) = call(&app, "GET", "/reports/user", author, None).await;
    assert!(mine.as_array().unwrap().is_empty());
    Ok(())
}
