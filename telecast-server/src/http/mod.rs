//! HTTP server module: axum router, request handlers, and the
//! rate-limit/connection-limit/CORS/trace middleware stack.

pub mod handlers;
pub mod routes;

pub use routes::create_router;
