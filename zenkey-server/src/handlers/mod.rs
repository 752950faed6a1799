pub mod auth;
pub mod handle_websocket;
pub mod health;
