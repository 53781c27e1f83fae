//! HTTP façade over the core components

pub mod handlers;
pub mod routes;

pub use handlers::ApiState;
pub use routes::create_router;
