use actix_web::{test, web, App};
use chrono::Utc;
use serde_json::json;
use session_keeper::auth::{handlers, LogNotifier};
use session_keeper::clock::ManualClock;
use session_keeper::db::{MemoryStore, Role, Store};
use session_keeper::{AppState, Settings};
use std::sync::Arc;

fn test_state() -> (AppState, MemoryStore) {
    let config = Settings::new_for_test().expect("Failed to load test config");
    let store = MemoryStore::new();
    let state = AppState::with_parts(
        config,
        Arc::new(store.clone()),
        Arc::new(LogNotifier),
        Arc::new(ManualClock::new(Utc::now())),
    )
    .expect("Failed to build app state");
    (state, store)
}

macro_rules! app {
    ($state:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($state.clone()))
                .configure(handlers::configure),
        )
        .await
    };
}

#[actix_web::test]
async fn test_register_login_logout() {
    let (state, _store) = test_state();
    let app = app!(state);

    let register_response = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({
            "email": "test@example.com",
            "password": "password123",
            "name": "Test User"
        }))
        .send_request(&app)
        .await;

    assert_eq!(register_response.status(), 201);
    let register_body: serde_json::Value = test::read_body_json(register_response).await;
    assert!(register_body.get("access_token").is_some());
    assert!(register_body.get("refresh_token").is_some());
    assert_eq!(register_body["account"]["email"], "test@example.com");
    assert_eq!(register_body["account"]["role"], "standard_user");
    assert!(register_body["account"].get("password_hash").is_none());

    let login_response = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({
            "email": "test@example.com",
            "password": "password123"
        }))
        .send_request(&app)
        .await;

    assert_eq!(login_response.status(), 200);
    let login_body: serde_json::Value = test::read_body_json(login_response).await;
    let token = login_body["access_token"].as_str().unwrap().to_string();

    let profile_response = test::TestRequest::get()
        .uri("/api/profile")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .send_request(&app)
        .await;
    assert_eq!(profile_response.status(), 200);

    let sessions_response = test::TestRequest::get()
        .uri("/api/sessions")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .send_request(&app)
        .await;
    assert_eq!(sessions_response.status(), 200);
    let sessions_body: serde_json::Value = test::read_body_json(sessions_response).await;
    assert_eq!(sessions_body["count"], 2);

    let logout_response = test::TestRequest::post()
        .uri("/api/auth/logout")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .send_request(&app)
        .await;
    assert_eq!(logout_response.status(), 200);

    let after_logout = test::TestRequest::get()
        .uri("/api/profile")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .send_request(&app)
        .await;
    assert_eq!(after_logout.status(), 401);
}

#[actix_web::test]
async fn test_invalid_login() {
    let (state, _store) = test_state();
    let app = app!(state);

    let response = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(json!({
            "email": "nonexistent@example.com",
            "password": "wrongpassword"
        }))
        .send_request(&app)
        .await;

    assert_eq!(response.status(), 401);
    let body: serde_json::Value = test::read_body_json(response).await;
    assert_eq!(body["error"]["status"], 401);
    assert_eq!(body["error"]["message"], "Authentication error: Invalid email or password");
}

#[actix_web::test]
async fn test_invalid_registration() {
    let (state, _store) = test_state();
    let app = app!(state);

    let response = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({
            "email": "not-an-email",
            "password": "password123",
            "name": "Test User"
        }))
        .send_request(&app)
        .await;
    assert_eq!(response.status(), 400);

    let response = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({ "email": "test@example.com" }))
        .send_request(&app)
        .await;
    assert_eq!(response.status(), 400);
}

#[actix_web::test]
async fn test_duplicate_registration_conflicts() {
    let (state, _store) = test_state();
    let app = app!(state);
    let body = json!({
        "email": "test@example.com",
        "password": "password123",
        "name": "Test User"
    });

    let first = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&body)
        .send_request(&app)
        .await;
    assert_eq!(first.status(), 201);

    let second = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&body)
        .send_request(&app)
        .await;
    assert_eq!(second.status(), 409);
}

#[actix_web::test]
async fn test_reset_request_responses_are_identical() {
    let (state, _store) = test_state();
    let app = app!(state);

    test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({
            "email": "test@example.com",
            "password": "password123",
            "name": "Test User"
        }))
        .send_request(&app)
        .await;

    let known = test::TestRequest::post()
        .uri("/api/auth/password-reset/request")
        .set_json(json!({ "email": "test@example.com" }))
        .send_request(&app)
        .await;
    let unknown = test::TestRequest::post()
        .uri("/api/auth/password-reset/request")
        .set_json(json!({ "email": "nobody@example.com" }))
        .send_request(&app)
        .await;

    assert_eq!(known.status(), unknown.status());
    let known_body = test::read_body(known).await;
    let unknown_body = test::read_body(unknown).await;
    assert_eq!(known_body, unknown_body);
}

#[actix_web::test]
async fn test_admin_routes_require_admin_role() {
    let (state, store) = test_state();
    let app = app!(state);

    let response = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(json!({
            "email": "admin@example.com",
            "password": "password123",
            "name": "Admin"
        }))
        .send_request(&app)
        .await;
    let body: serde_json::Value = test::read_body_json(response).await;
    let token = body["access_token"].as_str().unwrap().to_string();

    let invite = json!({
        "email": "bob@example.com",
        "name": "Bob",
        "role": "standard_user"
    });

    let forbidden = test::TestRequest::post()
        .uri("/api/admin/invite")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(&invite)
        .send_request(&app)
        .await;
    assert_eq!(forbidden.status(), 403);

    let mut account = store
        .find_account_by_email("admin@example.com")
        .await
        .unwrap()
        .unwrap();
    account.role = Role::Admin;
    store.update_account(&account).await.unwrap();

    let created = test::TestRequest::post()
        .uri("/api/admin/invite")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(&invite)
        .send_request(&app)
        .await;
    assert_eq!(created.status(), 201);
    let created_body: serde_json::Value = test::read_body_json(created).await;
    let invitation_token = created_body["invitation_token"].as_str().unwrap().to_string();

    let listed = test::TestRequest::get()
        .uri("/api/admin/invitations")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .send_request(&app)
        .await;
    let listed_body: serde_json::Value = test::read_body_json(listed).await;
    assert_eq!(listed_body["count"], 1);

    let accepted = test::TestRequest::post()
        .uri("/api/auth/accept-invitation")
        .set_json(json!({ "token": invitation_token, "password": "password123" }))
        .send_request(&app)
        .await;
    assert_eq!(accepted.status(), 200);

    let replay = test::TestRequest::post()
        .uri("/api/auth/accept-invitation")
        .set_json(json!({ "token": invitation_token, "password": "password123" }))
        .send_request(&app)
        .await;
    assert_eq!(replay.status(), 400);
}

#[actix_web::test]
async fn test_missing_bearer_token() {
    let (state, _store) = test_state();
    let app = app!(state);

    let response = test::TestRequest::get()
        .uri("/api/sessions")
        .send_request(&app)
        .await;
    assert_eq!(response.status(), 401);
}

#[actix_web::test]
async fn test_forwarded_header_does_not_change_throttling_key() {
    let (state, _store) = test_state();
    let app = app!(state);
    let peer: std::net::SocketAddr = "10.0.0.9:5000".parse().unwrap();

    test::TestRequest::post()
        .uri("/api/auth/register")
        .peer_addr(peer)
        .set_json(json!({
            "email": "test@example.com",
            "password": "password123",
            "name": "Test User"
        }))
        .send_request(&app)
        .await;

    let mut statuses = Vec::new();
    for i in 0..8 {
        let response = test::TestRequest::post()
            .uri("/api/auth/login")
            .peer_addr(peer)
            .insert_header(("X-Forwarded-For", format!("203.0.113.{}", i)))
            .insert_header(("Forwarded", format!("for=198.51.100.{}", i)))
            .set_json(json!({
                "email": "test@example.com",
                "password": "wrongpassword"
            }))
            .send_request(&app)
            .await;
        statuses.push(response.status().as_u16());
    }

    assert_eq!(statuses, vec![401, 401, 401, 401, 401, 429, 429, 429]);
}
