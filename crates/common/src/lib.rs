//! Common utilities and types shared across the PaaS backend crates.

#![warn(clippy::pedantic)]

/// Module for common configuration
pub mod config;

/// Module for JWT utilities (size limits, unverified header and claim parsing)
pub mod jwt;
