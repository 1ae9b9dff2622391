// tests/api_tests.rs

use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use quiz_backend::{
    config::Config,
    models::user::Role,
    routes,
    state::AppState,
    store::{MemoryStore, UserStore},
    utils::hash::hash_password,
};
use serde_json::{Value, json};
use tower::ServiceExt;

const SECRET: &str = "test_secret_for_integration_tests";

struct TestApp {
    address: String,
    store: Arc<MemoryStore>,
    client: reqwest::Client,
}

/// Spawns the app on a random port backed by a fresh in-memory store.
async fn spawn_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let state = AppState::new(store.clone(), Config::for_tests(SECRET));
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address: format!("http://127.0.0.1:{}", port),
        store,
        client: reqwest::Client::new(),
    }
}

fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, &uuid::Uuid::new_v4().to_string()[..8])
}

impl TestApp {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    async fn register(&self, username: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/auth/register"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("Failed to execute request")
    }

    async fn login(&self, username: &str, password: &str) -> String {
        let body: Value = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("Login failed")
            .json()
            .await
            .expect("Failed to parse login json");
        body["token"].as_str().expect("Token not found").to_string()
    }

    async fn user_token(&self) -> String {
        let name = unique_name("u");
        self.register(&name, "password123").await;
        self.login(&name, "password123").await
    }

    async fn admin_token(&self) -> String {
        let name = unique_name("admin");
        let hash = hash_password("adminpass").unwrap();
        self.store.create_user(&name, &hash, Role::Admin).await.unwrap();
        self.login(&name, "adminpass").await
    }
}

#[tokio::test]
async fn unknown_path_is_404() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/random_path_that_does_not_exist"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn register_works() {
    let app = spawn_app().await;
    let name = unique_name("u");

    let response = app.register(&name, "password123").await;

    assert_eq!(response.status().as_u16(), 201);
    let user: Value = response.json().await.unwrap();
    assert_eq!(user["username"], name);
    assert_eq!(user["role"], "user");
    assert!(user.get("password").is_none());
}

#[tokio::test]
async fn register_fails_validation() {
    let app = spawn_app().await;

    let response = app.register("yo", "password123").await;

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "ValidationError");
}

#[tokio::test]
async fn duplicate_username_is_conflict() {
    let app = spawn_app().await;
    let name = unique_name("u");

    assert_eq!(app.register(&name, "password123").await.status().as_u16(), 201);
    let response = app.register(&name, "password456").await;

    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
async fn login_with_wrong_password_is_unauthorized() {
    let app = spawn_app().await;
    let name = unique_name("u");
    app.register(&name, "password123").await;

    let response = app
        .client
        .post(app.url("/api/auth/login"))
        .json(&json!({ "username": name, "password": "nope" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn me_returns_current_user() {
    let app = spawn_app().await;
    let name = unique_name("u");
    app.register(&name, "password123").await;
    let token = app.login(&name, "password123").await;

    let me: Value = app
        .client
        .get(app.url("/api/auth/me"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(me["username"], name);
}

#[tokio::test]
async fn protected_routes_need_a_token() {
    let app = spawn_app().await;

    for path in ["/api/quizzes", "/api/attempts", "/api/auth/me", "/api/admin/stats"] {
        let response = app.client.get(app.url(path)).send().await.unwrap();
        assert_eq!(response.status().as_u16(), 401, "{}", path);
    }

    let response = app
        .client
        .get(app.url("/api/quizzes"))
        .bearer_auth("not.a.token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn admin_routes_reject_regular_users() {
    let app = spawn_app().await;
    let token = app.user_token().await;

    let response = app
        .client
        .post(app.url("/api/admin/quizzes"))
        .bearer_auth(&token)
        .json(&json!({ "title": "Nope", "category": "x", "passScore": 50 }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Forbidden");
}

#[tokio::test]
async fn admin_manages_quizzes_and_questions() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    let user = app.user_token().await;

    // Draft quiz
    let response = app
        .client
        .post(app.url("/api/admin/quizzes"))
        .bearer_auth(&admin)
        .json(&json!({
            "title": "Lifetimes <script>alert(1)</script>",
            "category": "rust",
            "difficulty": "hard",
            "timeLimit": 15,
            "passScore": 70
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let quiz: Value = response.json().await.unwrap();
    let quiz_id = quiz["id"].as_i64().unwrap();
    assert_eq!(quiz["title"], "Lifetimes ");
    assert_eq!(quiz["isPublished"], false);

    // Invisible to users while unpublished
    let response = app
        .client
        .get(app.url(&format!("/api/quizzes/{}", quiz_id)))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);

    // Single choice question with two correct options is rejected
    let response = app
        .client
        .post(app.url(&format!("/api/admin/quizzes/{}/questions", quiz_id)))
        .bearer_auth(&admin)
        .json(&json!({
            "text": "Pick one",
            "type": "single",
            "options": [
                { "text": "a", "isCorrect": true },
                { "text": "b", "isCorrect": true }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    // Unknown type is rejected
    let response = app
        .client
        .post(app.url(&format!("/api/admin/quizzes/{}/questions", quiz_id)))
        .bearer_auth(&admin)
        .json(&json!({
            "text": "Essay",
            "type": "essay",
            "options": [{ "text": "x", "isCorrect": true }]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let response = app
        .client
        .post(app.url(&format!("/api/admin/quizzes/{}/questions", quiz_id)))
        .bearer_auth(&admin)
        .json(&json!({
            "text": "What does 'a mean?",
            "type": "single",
            "points": 2,
            "explanation": "A lifetime parameter.",
            "options": [
                { "text": "A lifetime", "isCorrect": true },
                { "text": "A char", "isCorrect": false }
            ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 201);
    let question: Value = response.json().await.unwrap();
    let question_id = question["id"].as_i64().unwrap();
    assert_eq!(question["points"], 2);

    // Publish
    let response = app
        .client
        .put(app.url(&format!("/api/admin/quizzes/{}", quiz_id)))
        .bearer_auth(&admin)
        .json(&json!({ "isPublished": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    // Users now see the quiz and its questions without markers
    let quiz: Value = app
        .client
        .get(app.url(&format!("/api/quizzes/{}", quiz_id)))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(quiz["totalQuestions"], 1);

    let questions: Vec<Value> = app
        .client
        .get(app.url(&format!("/api/quizzes/{}/questions", quiz_id)))
        .bearer_auth(&user)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(questions.len(), 1);
    assert!(questions[0]["options"][0].get("isCorrect").is_none());
    assert!(questions[0].get("explanation").is_none());

    // Edit and delete the question
    let response = app
        .client
        .put(app.url(&format!("/api/admin/questions/{}", question_id)))
        .bearer_auth(&admin)
        .json(&json!({ "points": 5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let updated: Value = response.json().await.unwrap();
    assert_eq!(updated["points"], 5);

    let response = app
        .client
        .delete(app.url(&format!("/api/admin/questions/{}", question_id)))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    let response = app
        .client
        .delete(app.url(&format!("/api/admin/quizzes/{}", quiz_id)))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 204);

    let response = app
        .client
        .delete(app.url(&format!("/api/admin/quizzes/{}", quiz_id)))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn admin_lists_users_and_stats() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    app.user_token().await;

    let users: Vec<Value> = app
        .client
        .get(app.url("/api/admin/users"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(users.len(), 2);

    let stats: Value = app
        .client
        .get(app.url("/api/admin/stats"))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["totalUsers"], 2);
    assert_eq!(stats["totalAttempts"], 0);
    assert_eq!(stats["passRate"], 0.0);
}

#[tokio::test]
async fn router_returns_json_error_body() {
    let state = AppState::new(Arc::new(MemoryStore::new()), Config::for_tests(SECRET));
    let app = routes::create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/attempts/1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"], "Unauthorized");
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn malformed_json_bodies_get_json_error_body() {
    let app = spawn_app().await;
    let user = app.user_token().await;
    let admin = app.admin_token().await;

    let cases = [
        ("/api/auth/register", None),
        ("/api/auth/login", None),
        ("/api/attempts/1/answers", Some(&user)),
        ("/api/attempts/1/complete", Some(&user)),
        ("/api/quizzes/1/submit", Some(&user)),
        ("/api/admin/quizzes", Some(&admin)),
    ];

    for (path, token) in cases {
        let mut request = app
            .client
            .post(app.url(path))
            .header("content-type", "application/json")
            .body("{not json");
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{path}");
        let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
        assert!(content_type.starts_with("application/json"), "{path}: {content_type}");
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "ValidationError", "{path}");
        assert!(body["message"].is_string());
    }
}
