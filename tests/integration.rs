use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use qr_tracking::api::rest::router;
use qr_tracking::engine::notifier::Notification;
use qr_tracking::engine::notifier::run_notification_worker;
use qr_tracking::state::AppState;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;

fn setup() -> (axum::Router, mpsc::Receiver<Notification>) {
    let (state, rx) = AppState::new(1024, 1024);
    (router(Arc::new(state)), rx)
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_json(response).await)
}

async fn create_company(app: &axum::Router, email: &str) -> String {
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/companies",
            json!({
                "name": "Northwind Freight",
                "contactPerson": "Ola Nordmann",
                "email": email,
                "phone": "+47 555 0101",
                "address": "1 Harbour Road"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["id"].as_str().unwrap().to_string()
}

async fn create_user(app: &axum::Router, email: &str) -> String {
    let (status, body) = send(
        app,
        json_request(
            "POST",
            "/users",
            json!({
                "name": "Asha",
                "email": email,
                "phone": "+91 555 0102",
                "address": "22 Lake View"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["id"].as_str().unwrap().to_string()
}

async fn create_qr(app: &axum::Router, body: Value) -> String {
    let (status, body) = send(app, json_request("POST", "/qr", body)).await;
    assert_eq!(status, StatusCode::OK);
    body["id"].as_str().unwrap().to_string()
}

fn destination() -> Value {
    json!({
        "name": "Pier 4",
        "address": "4 Quay Lane",
        "latitude": 52.52,
        "longitude": 13.405
    })
}

async fn activated_qr(app: &axum::Router) -> String {
    let qr_id = create_qr(app, destination()).await;
    let (status, _) = send(
        app,
        json_request(
            "POST",
            &format!("/qr/{qr_id}/activate"),
            json!({ "partner_name": "Dispatch Dan" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    qr_id
}

#[tokio::test]
async fn health_returns_ok() {
    let (app, _rx) = setup();
    let response = app.oneshot(get_request("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["qr_codes"], 0);
    assert_eq!(body["active_sessions"], 0);
    assert_eq!(body["companies"], 0);
}

#[tokio::test]
async fn metrics_returns_prometheus_format() {
    let (app, _rx) = setup();
    let response = app.oneshot(get_request("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.contains("text/plain"));

    let body = body_string(response).await;
    assert!(body.contains("active_tracking_sessions"));
    assert!(body.contains("qr_codes_created_total"));
}

#[tokio::test]
async fn create_qr_returns_pending_download_code() {
    let (app, _rx) = setup();
    let (status, body) = send(&app, json_request("POST", "/qr", destination())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PendingDownload");
    assert_eq!(body["destination"]["name"], "Pier 4");

    let id = body["id"].as_str().unwrap();
    assert_eq!(id.len(), 4);
    let value: u16 = id.parse().unwrap();
    assert!((1000..=9999).contains(&value));
}

#[tokio::test]
async fn create_qr_missing_name_returns_400() {
    let (app, _rx) = setup();
    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/qr",
            json!({
                "name": " ",
                "address": "4 Quay Lane",
                "latitude": 52.52,
                "longitude": 13.405
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("name"));
}

#[tokio::test]
async fn create_qr_out_of_range_latitude_returns_400() {
    let (app, _rx) = setup();
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/qr",
            json!({
                "name": "Nowhere",
                "address": "?",
                "latitude": 123.0,
                "longitude": 13.405
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_qr_id_returns_400() {
    let (app, _rx) = setup();
    let response = app
        .oneshot(get_request("/qr/12ab/tracking"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_qr_returns_404() {
    let (app, _rx) = setup();
    let (status, body) = send(&app, get_request("/qr/4321/tracking")).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("4321"));
}

#[tokio::test]
async fn position_before_activation_returns_409() {
    let (app, _rx) = setup();
    let qr_id = create_qr(&app, destination()).await;

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/qr/{qr_id}/position"),
            json!({
                "partner_email": "dan@example.com",
                "latitude": 52.51,
                "longitude": 13.39
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn full_tracking_flow() {
    let (app, _rx) = setup();
    let qr_id = create_qr(&app, destination()).await;

    let (_, view) = send(&app, get_request(&format!("/qr/{qr_id}/tracking"))).await;
    assert_eq!(view["status"], "Pending");
    assert!(view["delivery_partner"].is_null());

    let (status, view) = send(
        &app,
        json_request(
            "POST",
            &format!("/qr/{qr_id}/activate"),
            json!({ "partner_name": "Dispatch Dan", "user_email": "Asha@Example.com" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["qr_status"], "Active");

    let (status, view) = send(
        &app,
        json_request(
            "POST",
            &format!("/qr/{qr_id}/position"),
            json!({
                "partner_email": "dan@example.com",
                "partner_name": "Dispatch Dan",
                "latitude": 52.51,
                "longitude": 13.39
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["qr_status"], "Tracking");
    assert_eq!(view["status"], "InProgress");
    assert_eq!(view["delivery_partner"]["name"], "Dispatch Dan");
    assert_eq!(view["delivery_partner"]["coordinates"]["latitude"], 52.51);
    assert!(view["delivery_partner"]["distance_km"].as_f64().unwrap() > 0.0);

    let (status, view) = send(
        &app,
        json_request(
            "POST",
            &format!("/qr/{qr_id}/delivered"),
            json!({ "partner_name": "Dispatch Dan" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "Delivered");
    assert_eq!(view["delivered"]["partner_name"], "Dispatch Dan");

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/qr/{qr_id}/position"),
            json!({
                "partner_email": "dan@example.com",
                "latitude": 52.52,
                "longitude": 13.40
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, health) = send(&app, get_request("/health")).await;
    assert_eq!(health["active_sessions"], 0);
}

#[tokio::test]
async fn aviation_role_reports_boarded_status() {
    let (app, _rx) = setup();
    let qr_id = activated_qr(&app).await;

    let (status, view) = send(
        &app,
        json_request(
            "POST",
            &format!("/qr/{qr_id}/position"),
            json!({
                "partner_email": "rao@air.example",
                "partner_name": "Cpt. Rao",
                "role": "Captain",
                "role_only": true
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "BoardedAndArriving");
    assert_eq!(view["delivery_partner"]["status"], "BOARDED AND ARRIVING");
    assert_eq!(view["delivery_partner"]["role"], "Captain");
    assert!(view["delivery_partner"].get("coordinates").is_none());
}

#[tokio::test]
async fn stop_tracking_with_reason() {
    let (app, _rx) = setup();
    let qr_id = activated_qr(&app).await;

    let (status, view) = send(
        &app,
        json_request(
            "POST",
            &format!("/qr/{qr_id}/stop"),
            json!({ "user_email": "dan@example.com", "reason": "other_scan" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "Stopped");
    assert_eq!(view["stopped"]["reason"], "OtherScan");

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            &format!("/qr/{qr_id}/stop"),
            json!({ "user_email": "dan@example.com" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn live_location_routes_by_qr_id() {
    let (app, _rx) = setup();
    let qr_id = activated_qr(&app).await;

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/live-location",
            json!({
                "qr_id": qr_id,
                "partner_email": "dan@example.com",
                "latitude": 52.5,
                "longitude": 13.4
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tracking_mode"], "qr_only");
    assert_eq!(body["tracking"]["status"], "InProgress");

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/live-location",
            json!({
                "partner_email": "dan@example.com",
                "latitude": 48.85,
                "longitude": 2.35
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tracking_mode"], "normal");

    let (_, locations) = send(&app, get_request("/live-locations")).await;
    let list = locations.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["coordinates"]["latitude"], 48.85);
}

#[tokio::test]
async fn duplicate_company_email_returns_409() {
    let (app, _rx) = setup();
    create_company(&app, "ops@northwind.test").await;

    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/companies",
            json!({
                "name": "Northwind Again",
                "contact_person": "Kari",
                "email": "OPS@northwind.test",
                "phone": "555",
                "address": "2 Harbour Road"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn invalid_user_email_returns_400() {
    let (app, _rx) = setup();
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/users",
            json!({
                "name": "Asha",
                "email": "not-an-email",
                "phone": "555",
                "address": "22 Lake View"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn access_check_only_grants_assigned_user() {
    let (app, _rx) = setup();
    let company_id = create_company(&app, "ops@northwind.test").await;
    let user_id = create_user(&app, "asha@example.com").await;
    let other_id = create_user(&app, "ben@example.com").await;

    let mut body = destination();
    body["company_id"] = json!(company_id);
    body["assigned_user_id"] = json!(user_id);
    let qr_id = create_qr(&app, body).await;

    let (status, granted) = send(&app, get_request(&format!("/qr/{qr_id}/access/{user_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(granted["access"], true);
    assert_eq!(granted["company_id"], company_id);

    let (status, denied) = send(&app, get_request(&format!("/qr/{qr_id}/access/{other_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(denied["access"], false);
}

#[tokio::test]
async fn company_orders_reflect_tracking_state() {
    let (app, _rx) = setup();
    let company_id = create_company(&app, "ops@northwind.test").await;

    let mut body = destination();
    body["company_id"] = json!(company_id);
    let pending = create_qr(&app, body.clone()).await;
    let tracked = create_qr(&app, body).await;
    create_qr(&app, destination()).await;

    send(
        &app,
        json_request("POST", &format!("/qr/{tracked}/activate"), json!({})),
    )
    .await;
    send(
        &app,
        json_request(
            "POST",
            &format!("/qr/{tracked}/position"),
            json!({
                "partner_email": "dan@example.com",
                "partner_name": "Dispatch Dan",
                "latitude": 52.5,
                "longitude": 13.4
            }),
        ),
    )
    .await;

    let (status, board) = send(&app, get_request(&format!("/companies/{company_id}/orders"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(board["total"], 2);

    let orders = board["orders"].as_array().unwrap();
    let find = |qr_id: &str| {
        orders
            .iter()
            .find(|order| order["qr_id"] == qr_id)
            .unwrap()
            .clone()
    };
    let pending_order = find(&pending);
    assert_eq!(pending_order["status"], "Pending");
    assert_eq!(pending_order["delivery_partner"], "Not assigned");
    assert_eq!(pending_order["order_id"], format!("ORD-{pending}"));

    let tracked_order = find(&tracked);
    assert_eq!(tracked_order["status"], "In Progress");
    assert_eq!(tracked_order["delivery_partner"], "Dispatch Dan");

    let (status, filtered) = send(&app, get_request(&format!("/qr?company_id={company_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(filtered.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn partners_are_listed_per_company() {
    let (app, _rx) = setup();
    let company_id = create_company(&app, "ops@northwind.test").await;

    let (status, partner) = send(
        &app,
        json_request(
            "POST",
            "/partners",
            json!({
                "name": "Pilot Pia",
                "email": "pia@air.example",
                "phone": "555",
                "role": "Pilot",
                "vehicleType": "Aircraft",
                "companies": [company_id]
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(partner["role"], "Pilot");
    assert_eq!(partner["active"], true);

    let (_, listed) = send(&app, get_request(&format!("/companies/{company_id}/partners"))).await;
    assert_eq!(listed["total"], 1);

    let partner_id = partner["id"].as_str().unwrap();
    let response = app
        .clone()
        .oneshot(json_request(
            "PATCH",
            &format!("/partners/{partner_id}/status"),
            json!({ "active": false }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (_, listed) = send(&app, get_request(&format!("/companies/{company_id}/partners"))).await;
    assert_eq!(listed["total"], 0);
}

#[tokio::test]
async fn partner_with_unknown_company_returns_400() {
    let (app, _rx) = setup();
    let (status, _) = send(
        &app,
        json_request(
            "POST",
            "/partners",
            json!({
                "name": "Rider",
                "email": "rider@example.com",
                "phone": "555",
                "vehicle_type": "Bike",
                "company_ids": ["00000000-0000-0000-0000-000000000000"]
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn assignment_notification_is_processed() {
    let (state, rx) = AppState::new(1024, 1024);
    let shared = Arc::new(state);
    tokio::spawn(run_notification_worker(
        shared.clone(),
        rx,
        "noreply@example.com".to_string(),
    ));
    let app = router(shared.clone());

    let company_id = create_company(&app, "ops@northwind.test").await;
    let user_id = create_user(&app, "asha@example.com").await;

    let mut body = destination();
    body["company_id"] = json!(company_id);
    body["assigned_user_id"] = json!(user_id);
    create_qr(&app, body).await;

    tokio::time::sleep(Duration::from_millis(200)).await;

    let sent = shared
        .metrics
        .notifications_total
        .with_label_values(&["success"])
        .get();
    assert_eq!(sent, 1);
    assert_eq!(shared.metrics.notifications_in_queue.get(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_company_registrations_keep_email_unique() {
    let (app, _rx) = setup();
    let barrier = Arc::new(tokio::sync::Barrier::new(16));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let app = app.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                let (status, _) = send(
                    &app,
                    json_request(
                        "POST",
                        "/companies",
                        json!({
                            "name": "Northwind Freight",
                            "contact_person": "Ola Nordmann",
                            "email": "Ops@Northwind.test",
                            "phone": "+47 555 0101",
                            "address": "1 Harbour Road"
                        }),
                    ),
                )
                .await;
                status
            })
        })
        .collect();

    let mut statuses = Vec::new();
    for handle in handles {
        statuses.push(handle.await.unwrap());
    }

    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::OK).count(), 1);
    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::CONFLICT).count(),
        15
    );

    let (_, listed) = send(&app, get_request("/companies")).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_partner_email_returns_409() {
    let (app, _rx) = setup();
    let partner = json!({
        "name": "Rider",
        "email": "rider@example.com",
        "phone": "555",
        "vehicle_type": "Bike"
    });

    let (status, _) = send(&app, json_request("POST", "/partners", partner.clone())).await;
    assert_eq!(status, StatusCode::OK);

    let mut shouted = partner;
    shouted["email"] = json!("RIDER@example.com");
    let (status, body) = send(&app, json_request("POST", "/partners", shouted)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already registered"));
}

#[tokio::test]
async fn missing_body_fields_return_400_json() {
    let (app, _rx) = setup();
    let qr_id = activated_qr(&app).await;

    let (status, body) = send(
        &app,
        json_request("POST", &format!("/qr/{qr_id}/stop"), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("user_email"));

    let (status, body) = send(
        &app,
        json_request("POST", "/qr", json!({ "name": "Pier 4", "address": "4 Quay Lane" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let malformed = Request::builder()
        .method("POST")
        .uri("/users")
        .header("content-type", "application/json")
        .body(Body::from("{\"name\": "))
        .unwrap();
    let (status, body) = send(&app, malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn deactivated_partner_position_returns_409() {
    let (app, _rx) = setup();
    let qr_id = activated_qr(&app).await;

    let (_, partner) = send(
        &app,
        json_request(
            "POST",
            "/partners",
            json!({
                "name": "Rider",
                "email": "rider@example.com",
                "phone": "555",
                "vehicle_type": "Bike"
            }),
        ),
    )
    .await;
    let partner_id = partner["id"].as_str().unwrap();

    let (status, _) = send(
        &app,
        json_request(
            "PATCH",
            &format!("/partners/{partner_id}/status"),
            json!({ "active": false }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            &format!("/qr/{qr_id}/position"),
            json!({
                "partner_email": "rider@example.com",
                "latitude": 52.5,
                "longitude": 13.4
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("deactivated"));

    let (_, view) = send(&app, get_request(&format!("/qr/{qr_id}/tracking"))).await;
    assert_eq!(view["qr_status"], "Active");
}
