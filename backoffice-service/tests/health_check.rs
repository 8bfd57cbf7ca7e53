mod common;

use backoffice_service::services::init_metrics;
use common::TestApp;

#[tokio::test]
#[ignore = "requires a running MongoDB"]
async fn health_check_reports_service_identity() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(app.url("/health"))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        response
            .headers()
            .get("x-content-type-options")
            .and_then(|v| v.to_str().ok()),
        Some("nosniff")
    );

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "backoffice-service");

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running MongoDB"]
async fn readiness_check_pings_the_database() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(app.url("/ready"))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running MongoDB"]
async fn metrics_endpoint_returns_prometheus_text() {
    init_metrics().expect("metrics recorder");
    let app = TestApp::spawn().await;

    // Generate at least one request sample.
    app.client
        .get(app.url("/health"))
        .send()
        .await
        .expect("Failed to execute request");

    let response = app
        .client
        .get(app.url("/metrics"))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = response.text().await.expect("Failed to get response body");
    assert!(body.contains("http_requests_total"), "unexpected metrics: {}", body);

    app.cleanup().await;
}

#[tokio::test]
#[ignore = "requires a running MongoDB"]
async fn protected_routes_require_a_token() {
    let app = TestApp::spawn().await;

    let anonymous = app
        .client
        .get(app.url("/customers"))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(anonymous.status().as_u16(), 401);

    let forged = app
        .client
        .get(app.url("/customers"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(forged.status().as_u16(), 401);

    let body: serde_json::Value = forged.json().await.expect("Failed to parse JSON");
    assert_eq!(body["success"], false);

    app.cleanup().await;
}
