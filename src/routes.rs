// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post, put},
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{
    handlers::{admin, community, interaction},
    state::AppState,
    utils::jwt::{auth_middleware, moderator_middleware, viewer_middleware},
};

/// Assembles the main application router.
///
/// * Public reads see an optional viewer; every write requires a token.
/// * Admin routes additionally pass the moderator gate.
/// * Applies global middleware (Trace, CORS) and serves uploaded files.
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let public_routes = Router::new()
        .route("/categories", get(community::list_categories))
        .route("/posts", get(community::list_posts))
        .route("/posts/{id}", get(community::get_post))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            viewer_middleware,
        ));

    let member_routes = Router::new()
        .route("/posts", post(community::create_post))
        .route("/posts/{id}", delete(community::delete_post))
        .route("/posts/{id}/status", put(community::change_post_status))
        .route("/posts/{id}/comments", post(interaction::create_comment))
        .route("/posts/{id}/vote", post(interaction::vote_post))
        .route("/comments/{id}", delete(interaction::delete_comment))
        .route("/comments/{id}/vote", post(interaction::vote_comment))
        .route("/comments/{id}/solution", post(interaction::mark_solution))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/moderation-logs", get(admin::list_moderation_logs))
        .route("/users/{id}/ban", post(admin::ban_user))
        .route("/users/{id}/unban", post(admin::unban_user))
        .route("/users/{id}/role", put(admin::change_role))
        // Double middleware protection: Auth first, then Moderator check
        .layer(middleware::from_fn_with_state(
            state.clone(),
            moderator_middleware,
        ))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let uploads = ServeDir::new(&state.config.uploads_dir);

    Router::new()
        .nest(
            "/api",
            public_routes
                .merge(member_routes)
                .nest("/admin", admin_routes),
        )
        .nest_service("/uploads", uploads)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
