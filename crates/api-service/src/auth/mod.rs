//! Authentication module for the API service.
//!
//! Verifies bearer tokens against a rotating, remotely fetched JWKS.
//!
//! # Components
//!
//! - `jwks` - JWKS fetcher (the network boundary)
//! - `cache` - JWKS cache with TTL and explicit invalidation
//! - `resolver` - key lookup by `kid` with one forced refresh
//! - `verifier` - accept/reject decision for a raw token
//! - `identity` - claim set of an accepted token
//! - `clock` - injectable time source

pub mod cache;
pub mod clock;
pub mod identity;
pub mod jwks;
pub mod resolver;
pub mod verifier;

pub use cache::{JwksCache, KeySetGeneration};
pub use clock::{Clock, ManualClock, SystemClock};
pub use identity::DecodedIdentity;
pub use jwks::{FetchError, HttpJwksFetcher, JwksFetcher, SigningKey};
pub use resolver::KeyResolver;
pub use verifier::{AuthDecision, TokenVerifier};
