//! HTTP request handlers for the API service.

pub mod auth;
pub mod health;
pub mod metrics;

pub use auth::{get_auth_config, get_auth_status, get_me, verify_token};
pub use health::health_check;
pub use metrics::metrics_handler;
