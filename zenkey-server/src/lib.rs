//! ZenKey scan station server.
//!
//! Serves the realtime WebSocket channel, the account routes and a health
//! probe on top of the scan service actor in [`infra::scan`].

pub mod handlers;
pub mod infra;
pub mod routes;

pub use routes::create_app;
