//! Mock JWKS endpoint backed by wiremock.

use crate::keys::{jwks_json, TestKeypair};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock serves the key set on.
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// A wiremock server publishing a JWKS.
///
/// Mocks mounted with an expected call count are verified when the server
/// is dropped, so `.expect(n)` doubles as the fetch-count assertion.
pub struct MockJwksServer {
    server: MockServer,
}

impl MockJwksServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Full JWKS URL to configure the service with.
    pub fn jwks_url(&self) -> String {
        format!("{}{}", self.server.uri(), JWKS_PATH)
    }

    /// Serve `keys`, expecting exactly `expected_fetches` requests.
    pub async fn serve_keys(&self, keys: &[&TestKeypair], expected_fetches: u64) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(keys)))
            .expect(expected_fetches)
            .mount(&self.server)
            .await;
    }

    /// Serve `keys` for at most `times` requests, then fall through to
    /// whatever was mounted next.
    pub async fn serve_keys_times(&self, keys: &[&TestKeypair], times: u64) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json(keys)))
            .up_to_n_times(times)
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Answer with `status`, expecting exactly `expected_fetches` requests.
    pub async fn serve_status(&self, status: u16, expected_fetches: u64) {
        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(status))
            .expect(expected_fetches)
            .mount(&self.server)
            .await;
    }

    /// Number of requests received so far.
    pub async fn request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or_default()
    }

    /// Drop all mounted mocks, verifying their expectations first.
    pub async fn reset(&self) {
        self.server.verify().await;
        self.server.reset().await;
    }
}
