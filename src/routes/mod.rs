pub mod extract;
pub mod sessions;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value as JsonValue};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::auth::{require_admin, require_bearer_auth};
use crate::AppState;

pub async fn health() -> Json<JsonValue> {
    Json(json!({ "status": "ok" }))
}

/// Full HTTP surface. Session tokens are the credential for the
/// token-addressed routes; creation and listing need a bearer JWT.
pub fn build_router(state: AppState) -> Router {
    let create_api = Router::new()
        .route("/api/sessions", post(sessions::create_session))
        .layer(from_fn_with_state(state.clone(), require_bearer_auth));

    let admin_api = Router::new()
        .route("/api/admin/sessions", get(sessions::list_sessions))
        .layer(from_fn_with_state(state.clone(), require_admin));

    let token_api = Router::new()
        .route(
            "/api/sessions/:token",
            get(sessions::get_session).delete(sessions::cancel_session),
        )
        .route("/api/sessions/:token/questions", get(sessions::get_questions))
        .route(
            "/api/sessions/:token/answers/:sequence",
            put(sessions::submit_answer).delete(sessions::clear_answer),
        )
        .route(
            "/api/sessions/:token/complete",
            post(sessions::complete_session),
        )
        .route("/api/sessions/:token/detail", get(sessions::get_detail));

    Router::new()
        .route("/health", get(health))
        .merge(create_api)
        .merge(admin_api)
        .merge(token_api)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
