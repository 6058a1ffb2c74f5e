use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::server::handlers::{chat, feedback, health, history};
use crate::state::AppState;

const APP_ENV_HEADER: &str = "x-app-env";

/// Creates the application router with all routes and middleware.
///
/// This function sets up:
/// - CORS middleware
/// - Health check endpoint
/// - Chat, feedback and history endpoints
/// - An `X-App-Env` response header naming the deployment environment
pub fn router(state: Arc<AppState>) -> Router {
    let cors_layer = build_cors_layer(&state.config.app.cors_allowed_origins);
    let env_header = HeaderValue::from_str(&state.config.app.environment)
        .unwrap_or_else(|_| HeaderValue::from_static("unknown"));

    Router::new()
        .route("/health", get(health::health))
        .route("/api/chat", post(chat::chat))
        .route("/api/agent/query", post(chat::chat))
        .route("/api/feedback", post(feedback::submit_feedback))
        .route(
            "/history/sessions",
            get(history::list_sessions).post(history::create_session),
        )
        .route("/history/sessions/:session_id", delete(history::delete_session))
        .route(
            "/history/sessions/:session_id/messages",
            get(history::list_messages).post(history::add_message),
        )
        .with_state(state)
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static(APP_ENV_HEADER),
            env_header,
        ))
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allowed = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();

    let layer = if allowed.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        CorsLayer::new().allow_origin(AllowOrigin::list(allowed))
    };

    layer
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::ACCEPT, header::CONTENT_TYPE])
}
