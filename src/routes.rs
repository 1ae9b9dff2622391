// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    handlers::{admin, attempt, auth, quiz},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Assembles the main application router.
///
/// * `/api/auth`: registration and login are public, `/me` needs a token.
/// * `/api/quizzes` and `/api/attempts`: any authenticated user.
/// * `/api/admin`: authenticated admins only.
/// * Anything else is served from `STATIC_DIR` when configured.
pub fn create_router(state: AppState) -> Router {
    let auth_layer = middleware::from_fn_with_state(state.clone(), auth_middleware);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .merge(
            Router::new()
                .route("/me", get(auth::me))
                .layer(auth_layer.clone()),
        );

    let quiz_routes = Router::new()
        .route("/", get(quiz::list_quizzes))
        .route("/{id}", get(quiz::get_quiz))
        .route("/{id}/questions", get(quiz::list_questions))
        .route("/{id}/leaderboard", get(quiz::get_leaderboard))
        .route("/{id}/attempts", post(attempt::start_attempt))
        .route("/{id}/submit", post(attempt::submit_quiz))
        .layer(auth_layer.clone());

    let attempt_routes = Router::new()
        .route("/", get(attempt::list_my_attempts))
        .route("/{id}", get(attempt::get_attempt))
        .route("/{id}/answers", post(attempt::submit_answers))
        .route("/{id}/complete", post(attempt::complete_attempt))
        .layer(auth_layer.clone());

    let admin_routes = Router::new()
        .route("/users", get(admin::list_users))
        .route("/stats", get(admin::get_stats))
        .route("/quizzes", get(admin::list_quizzes).post(admin::create_quiz))
        .route(
            "/quizzes/{id}",
            put(admin::update_quiz).delete(admin::delete_quiz),
        )
        .route(
            "/quizzes/{id}/questions",
            get(admin::list_questions).post(admin::create_question),
        )
        .route(
            "/questions/{id}",
            put(admin::update_question).delete(admin::delete_question),
        )
        .route("/attempts", get(admin::list_attempts))
        .route("/attempts/{id}", axum::routing::delete(admin::delete_attempt))
        // Auth runs first, then the admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(auth_layer);

    let mut router = Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/quizzes", quiz_routes)
        .nest("/api/attempts", attempt_routes)
        .nest("/api/admin", admin_routes);

    if let Some(dir) = &state.config.static_dir {
        tracing::info!("Serving static files from {}", dir);
        router = router.fallback_service(ServeDir::new(dir));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config.cors_origins)),
        )
        .with_state(state)
}
