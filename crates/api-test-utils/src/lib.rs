//! Test utilities for the API service.
//!
//! - `keys` - embedded RSA keypairs, token signing, JWK rendering
//! - `jwks_server` - wiremock-backed JWKS endpoint
//! - `server_harness` - `TestApiServer` for end-to-end tests over real HTTP

pub mod jwks_server;
pub mod keys;
pub mod server_harness;

pub use jwks_server::MockJwksServer;
pub use keys::{jwks_json, unix_in, user_claims, TestKeypair};
pub use server_harness::TestApiServer;
