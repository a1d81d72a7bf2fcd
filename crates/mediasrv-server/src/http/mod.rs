//! HTTP server module: the playback API, an admin reload endpoint, and
//! health/version checks.

pub mod credentials;
pub mod handlers;
pub mod routes;

pub use routes::create_router;
