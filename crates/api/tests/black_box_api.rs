use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use horizon_api::app::{AppServices, build_app};
use horizon_auth::{Hs256AuthGateway, JwtClaims};
use horizon_core::UserId;
use horizon_infra::store::InMemoryTicketingStore;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

const JWT_SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, in-memory store, ephemeral port.
        let services = Arc::new(AppServices::new(InMemoryTicketingStore::new()));
        let gateway = Arc::new(Hs256AuthGateway::new(JWT_SECRET.as_bytes()));
        let app = build_app(services, gateway);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(&self, path: &str, token: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn get(&self, path: &str, token: Option<&str>) -> reqwest::Response {
        let mut req = self.client.get(self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req.send().await.unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(is_host: bool) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: UserId::new(),
        email: "someone@example.com".to_string(),
        name: "Someone".to_string(),
        is_host,
        issued_at: now - ChronoDuration::seconds(5),
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

/// Create a category and one event with 10 VIP seats at 100; returns both ids.
async fn seed_event(srv: &TestServer, host: &str, category: &str, event: &str) -> (String, String) {
    let res = srv
        .post("/api/categories", host, json!({ "name": category }))
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    let category_id = created["id"].as_str().unwrap().to_string();

    let now = Utc::now();
    let res = srv
        .post(
            "/api/events",
            host,
            json!({
                "name": event,
                "location": "Main Hall",
                "date": now.date_naive(),
                "start_time": now + ChronoDuration::hours(2),
                "end_time": now + ChronoDuration::hours(4),
                "category_id": category_id,
                "tickets": [{ "type": "VIP", "price": 100, "total_quantity": 10 }],
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.unwrap();
    (category_id, created["id"].as_str().unwrap().to_string())
}

async fn vip_available(srv: &TestServer, event_id: &str) -> u64 {
    let res = srv.get(&format!("/api/events/{event_id}"), None).await;
    assert_eq!(res.status(), StatusCode::OK);
    let event: Value = res.json().await.unwrap();
    event["tickets"][0]["available_quantity"].as_u64().unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::spawn().await;
    let res = srv.get("/health", None).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let res = srv.get("/api/bookings/user", None).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unauthorized");

    let res = srv.get("/api/bookings/user", Some("garbage")).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Public reads need no token.
    let res = srv.get("/api/events", None).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn booking_lifecycle_book_cancel_and_hide() {
    let srv = TestServer::spawn().await;
    let host = mint_jwt(true);
    let fan = mint_jwt(false);
    let (_, event_id) = seed_event(&srv, &host, "Concerts", "Gala").await;

    let res = srv
        .post(
            "/api/bookings",
            &fan,
            json!({ "event_id": event_id, "ticket_type": "vip", "quantity": 3 }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let receipt: Value = res.json().await.unwrap();
    assert_eq!(receipt["total_paid"], 300);
    assert_eq!(receipt["status"], "confirmed");
    assert!(receipt["transaction_id"].as_str().unwrap().starts_with("TXN-"));
    let booking_id = receipt["booking_id"].as_str().unwrap().to_string();
    assert_eq!(vip_available(&srv, &event_id).await, 7);

    let res = srv.get("/api/bookings/user", Some(&fan)).await;
    let mine: Value = res.json().await.unwrap();
    assert_eq!(mine["items"].as_array().unwrap().len(), 1);

    let res = srv
        .client
        .put(srv.url(&format!("/api/bookings/{booking_id}/cancel")))
        .bearer_auth(&fan)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(vip_available(&srv, &event_id).await, 10);

    let res = srv
        .get(&format!("/api/bookings/{booking_id}"), Some(&fan))
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = srv
        .client
        .put(srv.url(&format!("/api/bookings/{booking_id}/cancel")))
        .bearer_auth(&fan)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "already_cancelled");
}

#[tokio::test]
async fn overbooking_and_bad_input_are_rejected() {
    let srv = TestServer::spawn().await;
    let host = mint_jwt(true);
    let fan = mint_jwt(false);
    let (_, event_id) = seed_event(&srv, &host, "Concerts", "Gala").await;

    let res = srv
        .post(
            "/api/bookings",
            &fan,
            json!({ "event_id": event_id, "ticket_type": "VIP", "quantity": 11 }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_inventory");

    let res = srv
        .post(
            "/api/bookings",
            &fan,
            json!({ "event_id": event_id, "ticket_type": "Student", "quantity": 1 }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "ticket_type_not_found");

    let res = srv
        .post(
            "/api/bookings",
            &fan,
            json!({ "event_id": event_id, "ticket_type": "VIP", "quantity": 0 }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = srv
        .post(
            "/api/bookings",
            &fan,
            json!({ "event_id": "not-an-id", "ticket_type": "VIP", "quantity": 1 }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    assert_eq!(vip_available(&srv, &event_id).await, 10);
}

#[tokio::test]
async fn only_the_owner_may_cancel() {
    let srv = TestServer::spawn().await;
    let host = mint_jwt(true);
    let owner = mint_jwt(false);
    let stranger = mint_jwt(false);
    let (_, event_id) = seed_event(&srv, &host, "Concerts", "Gala").await;

    let res = srv
        .post(
            "/api/bookings",
            &owner,
            json!({ "event_id": event_id, "ticket_type": "VIP", "quantity": 2 }),
        )
        .await;
    let receipt: Value = res.json().await.unwrap();
    let booking_id = receipt["booking_id"].as_str().unwrap().to_string();

    let res = srv
        .client
        .put(srv.url(&format!("/api/bookings/{booking_id}/cancel")))
        .bearer_auth(&stranger)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = srv
        .get(&format!("/api/bookings/{booking_id}"), Some(&stranger))
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    // Hosts may read any booking.
    let res = srv
        .get(&format!("/api/bookings/{booking_id}"), Some(&host))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(vip_available(&srv, &event_id).await, 8);
}

#[tokio::test]
async fn admin_listing_and_writes_are_host_only() {
    let srv = TestServer::spawn().await;
    let fan = mint_jwt(false);
    let host = mint_jwt(true);

    let res = srv.get("/api/bookings/all", Some(&fan)).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = srv
        .post("/api/categories", &fan, json!({ "name": "Comedy" }))
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = srv.get("/api/bookings/all", Some(&host)).await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn category_delete_requires_cascade_flag_when_populated() {
    let srv = TestServer::spawn().await;
    let host = mint_jwt(true);
    let fan = mint_jwt(false);
    let (category_id, event_id) = seed_event(&srv, &host, "Festivals", "Spring Fest").await;

    let res = srv
        .post(
            "/api/bookings",
            &fan,
            json!({ "event_id": event_id, "ticket_type": "VIP", "quantity": 1 }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = srv
        .client
        .delete(srv.url(&format!("/api/categories/{category_id}")))
        .bearer_auth(&host)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "category_has_events");

    let res = srv
        .client
        .delete(srv.url(&format!("/api/categories/{category_id}?cascade=true")))
        .bearer_auth(&host)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["events_removed"], 1);
    assert_eq!(body["bookings_removed"], 1);

    let res = srv.get(&format!("/api/events/{event_id}"), None).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let res = srv.get(&format!("/api/categories/{category_id}"), None).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let res = srv.get("/api/bookings/user", Some(&fan)).await;
    let mine: Value = res.json().await.unwrap();
    assert!(mine["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn events_are_managed_by_their_host_only() {
    let srv = TestServer::spawn().await;
    let host = mint_jwt(true);
    let other_host = mint_jwt(true);
    let (_, event_id) = seed_event(&srv, &host, "Talks", "Keynote").await;

    let res = srv
        .client
        .delete(srv.url(&format!("/api/events/{event_id}")))
        .bearer_auth(&other_host)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = srv
        .client
        .delete(srv.url(&format!("/api/events/{event_id}")))
        .bearer_auth(&host)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let res = srv.get(&format!("/api/events/{event_id}"), None).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn category_lookup_by_name_is_case_insensitive() {
    let srv = TestServer::spawn().await;
    let host = mint_jwt(true);
    seed_event(&srv, &host, "Theatre", "Hamlet").await;

    let res = srv.get("/api/categories/name/THEATRE/events", None).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["items"][0]["name"], "Hamlet");
    assert_eq!(body["items"][0]["category_name"], "Theatre");

    let res = srv.get("/api/categories/with-events", None).await;
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["items"][0]["event_count"], 1);
}
