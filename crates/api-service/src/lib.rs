//! API Service Library
//!
//! Core of the PaaS backend HTTP API. The part implemented here is the JWT
//! authentication gate: bearer tokens are verified against a remotely
//! published JWKS that is cached, refreshed on TTL expiry, and force-refreshed
//! once when a token names an unknown key. A local development fallback
//! decodes tokens without verification, and only when explicitly enabled.
//!
//! # Architecture
//!
//! ```text
//! routes/mod.rs -> middleware/auth.rs -> auth/verifier.rs
//!                                          -> auth/resolver.rs
//!                                          -> auth/cache.rs
//!                                          -> auth/jwks.rs (network)
//! ```
//!
//! # Modules
//!
//! - `auth` - JWKS fetching and caching, key resolution, token verification
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Auth gate and HTTP metrics
//! - `models` - Request/response bodies
//! - `observability` - Prometheus metrics
//! - `routes` - Axum router setup

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
