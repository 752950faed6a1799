use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handlers::{
        auth::{login_handler, register_handler},
        handle_websocket::websocket_handler,
        health::health_handler,
    },
    infra::app_state::AppState,
};

pub const WEBSOCKET: &str = "/ws";
pub const REGISTER: &str = "/register";
pub const LOGIN: &str = "/login";
pub const HEALTH: &str = "/health";

pub fn create_app(state: AppState) -> Router {
    let cors_layer = cors_layer(&state);

    Router::new()
        .route(WEBSOCKET, get(websocket_handler))
        .route(REGISTER, post(register_handler))
        .route(LOGIN, post(login_handler))
        .route(HEALTH, get(health_handler))
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let cors = &state.config().cors;
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if cors.allows_any_origin() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = cors
        .allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin.trim()).ok())
        .collect();
    layer.allow_origin(origins)
}
