//! Authenticated request pipeline.
//!
//! Every outbound call passes through here: the current access token is
//! attached as a bearer header, a cached CSRF token is attached to mutating
//! methods, and a 401 response triggers a single-flight token refresh.
//!
//! # Single-flight refresh
//!
//! Any number of concurrently in-flight requests can observe a 401 around
//! the same time (parallel metadata fetches plus a checkout step call). The
//! first caller to reach the refresh state becomes the leader and invokes
//! the identity provider's refresh exactly once; every other caller parks on
//! a oneshot receiver and is resolved with the leader's outcome. Each caller
//! then replays its own original request at most once; a second 401 is a
//! terminal [`CheckoutError::AuthRequired`].

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use url::Url;

use crate::api::document::ApiDocument;
use crate::api::transport::{HttpRequest, HttpResponse, Transport};
use crate::config::CommerceConfig;
use crate::error::{CheckoutError, Result};

const CSRF_HEADER: &str = "x-csrf-token";
const JSON_API_CONTENT_TYPE: &str = "application/vnd.api+json";

/// Supplies tokens to the pipeline.
///
/// Implemented by the embedding application's identity layer. The pipeline
/// never stores an access token; it asks for the current one before every
/// request.
pub trait IdentityProvider: Send + Sync {
    /// The current access token, if one is available. May be stale; a stale
    /// token surfaces as a 401 and is recovered by the pipeline.
    fn valid_access_token(&self) -> impl Future<Output = Option<SecretString>> + Send;

    /// Perform a token refresh. Returns whether the refresh succeeded.
    fn refresh_access_token(&self) -> impl Future<Output = bool> + Send;
}

impl<I: IdentityProvider> IdentityProvider for Arc<I> {
    fn valid_access_token(&self) -> impl Future<Output = Option<SecretString>> + Send {
        (**self).valid_access_token()
    }

    fn refresh_access_token(&self) -> impl Future<Output = bool> + Send {
        (**self).refresh_access_token()
    }
}

/// Authenticated JSON:API request pipeline.
///
/// Cheap to clone; clones share the CSRF cache and the refresh coordinator.
pub struct RequestPipeline<I, T> {
    inner: Arc<PipelineInner<I, T>>,
}

impl<I, T> Clone for RequestPipeline<I, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct PipelineInner<I, T> {
    identity: I,
    transport: T,
    base_url: Url,
    csrf_token: Mutex<Option<String>>,
    refresh: Mutex<RefreshState>,
}

#[derive(Default)]
struct RefreshState {
    in_progress: bool,
    waiters: Vec<oneshot::Sender<Option<SecretString>>>,
}

enum RefreshRole {
    Leader,
    Follower(oneshot::Receiver<Option<SecretString>>),
}

impl<I: IdentityProvider, T: Transport> RequestPipeline<I, T> {
    /// Create a pipeline over the given identity provider and transport.
    #[must_use]
    pub fn new(config: &CommerceConfig, identity: I, transport: T) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                identity,
                transport,
                base_url: config.base_url.clone(),
                csrf_token: Mutex::new(None),
                refresh: Mutex::new(RefreshState::default()),
            }),
        }
    }

    /// Issue a GET request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the server rejects it, or the
    /// response is not a valid JSON:API document.
    pub async fn get(&self, path: &str) -> Result<ApiDocument> {
        self.request(Method::GET, path, None).await
    }

    /// Issue a POST request with a JSON:API body.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::get`].
    pub async fn post(&self, path: &str, body: serde_json::Value) -> Result<ApiDocument> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// Issue a PATCH request with a JSON:API body.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::get`].
    pub async fn patch(&self, path: &str, body: serde_json::Value) -> Result<ApiDocument> {
        self.request(Method::PATCH, path, Some(body)).await
    }

    /// Issue a DELETE request.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Self::get`].
    pub async fn delete(&self, path: &str) -> Result<ApiDocument> {
        self.request(Method::DELETE, path, None).await
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<ApiDocument> {
        let token = self.inner.identity.valid_access_token().await;
        let response = self
            .send_once(method.clone(), path, body.as_ref(), token.as_ref())
            .await?;

        if response.status != StatusCode::UNAUTHORIZED {
            return self.finish(response);
        }

        debug!(%method, path, "request unauthorized, coordinating token refresh");
        let Some(token) = self.coordinate_refresh().await else {
            return Err(CheckoutError::AuthRequired);
        };

        // Replay the original request exactly once with the fresh token.
        let response = self
            .send_once(method.clone(), path, body.as_ref(), Some(&token))
            .await?;
        if response.status == StatusCode::UNAUTHORIZED {
            warn!(%method, path, "request still unauthorized after token refresh");
            return Err(CheckoutError::AuthRequired);
        }
        self.finish(response)
    }

    async fn send_once(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        token: Option<&SecretString>,
    ) -> Result<HttpResponse> {
        let url = self
            .inner
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| CheckoutError::UnexpectedResponse(format!("invalid path {path}: {e}")))?;

        let mut headers = vec![
            ("accept".to_string(), JSON_API_CONTENT_TYPE.to_string()),
            ("content-type".to_string(), JSON_API_CONTENT_TYPE.to_string()),
        ];
        if let Some(token) = token {
            headers.push((
                "authorization".to_string(),
                format!("Bearer {}", token.expose_secret()),
            ));
        }
        if is_mutating(&method)
            && let Some(csrf) = self.cached_csrf()
        {
            headers.push((CSRF_HEADER.to_string(), csrf));
        }

        let response = self
            .inner
            .transport
            .send(HttpRequest {
                method,
                url: url.to_string(),
                headers,
                body: body.cloned(),
            })
            .await?;
        Ok(response)
    }

    /// One caller refreshes; everyone else waits for its outcome.
    async fn coordinate_refresh(&self) -> Option<SecretString> {
        let role = {
            let mut state = self.lock_refresh();
            if state.in_progress {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                RefreshRole::Follower(rx)
            } else {
                state.in_progress = true;
                RefreshRole::Leader
            }
        };

        match role {
            RefreshRole::Follower(rx) => rx.await.ok().flatten(),
            RefreshRole::Leader => {
                // If the leader future is dropped mid-refresh, the guard
                // fails the waiters instead of leaving them parked forever.
                let guard = LeaderGuard {
                    pipeline: self,
                    completed: false,
                };
                let refreshed = self.inner.identity.refresh_access_token().await;
                let outcome = if refreshed {
                    // Fetch the new token once and share it with all waiters.
                    self.inner.identity.valid_access_token().await
                } else {
                    warn!("token refresh failed");
                    None
                };
                guard.complete(outcome.clone());
                outcome
            }
        }
    }

    fn complete_refresh(&self, outcome: Option<SecretString>) {
        let mut state = self.lock_refresh();
        state.in_progress = false;
        for waiter in state.waiters.drain(..) {
            let _ = waiter.send(outcome.clone());
        }
    }

    fn lock_refresh(&self) -> std::sync::MutexGuard<'_, RefreshState> {
        self.inner
            .refresh
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn cached_csrf(&self) -> Option<String> {
        self.inner
            .csrf_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn finish(&self, response: HttpResponse) -> Result<ApiDocument> {
        if let Some(csrf) = response.header(CSRF_HEADER) {
            *self
                .inner
                .csrf_token
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(csrf.to_string());
        }

        let document = match ApiDocument::parse(&response.body) {
            Ok(document) => document,
            Err(e) => {
                warn!(
                    status = %response.status,
                    body = %response.body.chars().take(500).collect::<String>(),
                    "failed to parse JSON:API response"
                );
                return Err(CheckoutError::Parse(e));
            }
        };

        if response.status.is_success() {
            return Ok(document);
        }

        let message = document
            .error_message()
            .unwrap_or_else(|| format!("HTTP {}", response.status));
        Err(CheckoutError::Api {
            status: response.status.as_u16(),
            message,
        })
    }
}

struct LeaderGuard<'a, I: IdentityProvider, T: Transport> {
    pipeline: &'a RequestPipeline<I, T>,
    completed: bool,
}

impl<I: IdentityProvider, T: Transport> LeaderGuard<'_, I, T> {
    fn complete(mut self, outcome: Option<SecretString>) {
        self.pipeline.complete_refresh(outcome);
        self.completed = true;
    }
}

impl<I: IdentityProvider, T: Transport> Drop for LeaderGuard<'_, I, T> {
    fn drop(&mut self) {
        if !self.completed {
            self.pipeline.complete_refresh(None);
        }
    }
}

fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PATCH | Method::PUT | Method::DELETE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::api::transport::TransportError;

    fn test_config() -> CommerceConfig {
        CommerceConfig::new(Url::parse("https://shop.example.com/api/").expect("valid url"))
    }

    struct FakeIdentity {
        token: Mutex<Option<String>>,
        refresh_calls: AtomicUsize,
        refresh_succeeds: bool,
    }

    impl FakeIdentity {
        fn with_token(token: &str) -> Self {
            Self {
                token: Mutex::new(Some(token.to_string())),
                refresh_calls: AtomicUsize::new(0),
                refresh_succeeds: true,
            }
        }

        fn failing_refresh(token: &str) -> Self {
            Self {
                refresh_succeeds: false,
                ..Self::with_token(token)
            }
        }
    }

    impl IdentityProvider for FakeIdentity {
        async fn valid_access_token(&self) -> Option<SecretString> {
            self.token
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
                .map(SecretString::from)
        }

        async fn refresh_access_token(&self) -> bool {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            // Simulate a slow refresh so concurrent 401 handlers overlap.
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.refresh_succeeds {
                *self.token.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some("fresh-token".to_string());
                true
            } else {
                false
            }
        }
    }

    /// Responds 401 until it sees `Bearer fresh-token`, then 200.
    struct ExpiredTokenTransport {
        requests: AtomicUsize,
        always_reject: bool,
    }

    impl ExpiredTokenTransport {
        fn new() -> Self {
            Self {
                requests: AtomicUsize::new(0),
                always_reject: false,
            }
        }
    }

    impl Transport for ExpiredTokenTransport {
        async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let authorized = !self.always_reject
                && request
                    .headers
                    .iter()
                    .any(|(name, value)| name == "authorization" && value == "Bearer fresh-token");
            if authorized {
                Ok(HttpResponse {
                    status: StatusCode::OK,
                    headers: vec![],
                    body: r#"{ "data": null }"#.to_string(),
                })
            } else {
                Ok(HttpResponse {
                    status: StatusCode::UNAUTHORIZED,
                    headers: vec![],
                    body: String::new(),
                })
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight_refresh_under_concurrent_401s() {
        let identity = Arc::new(FakeIdentity::with_token("stale-token"));
        let transport = Arc::new(ExpiredTokenTransport::new());
        let pipeline =
            RequestPipeline::new(&test_config(), Arc::clone(&identity), Arc::clone(&transport));

        let (a, b, c, d) = tokio::join!(
            pipeline.get("checkouts/1"),
            pipeline.get("checkouts/2"),
            pipeline.get("checkouts/3"),
            pipeline.get("checkouts/4"),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok() && d.is_ok());

        // Exactly one refresh for four concurrent 401s.
        assert_eq!(identity.refresh_calls.load(Ordering::SeqCst), 1);
        // Four initial sends plus four replays.
        assert_eq!(transport.requests.load(Ordering::SeqCst), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_failure_fails_all_waiters_consistently() {
        let identity = Arc::new(FakeIdentity::failing_refresh("stale-token"));
        let transport = Arc::new(ExpiredTokenTransport::new());
        let pipeline =
            RequestPipeline::new(&test_config(), Arc::clone(&identity), Arc::clone(&transport));

        let (a, b, c) = tokio::join!(
            pipeline.get("checkouts/1"),
            pipeline.get("checkouts/2"),
            pipeline.get("checkouts/3"),
        );
        for result in [a, b, c] {
            assert!(matches!(result, Err(CheckoutError::AuthRequired)));
        }
        assert_eq!(identity.refresh_calls.load(Ordering::SeqCst), 1);
        // No replays after a failed refresh.
        assert_eq!(transport.requests.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_retried_at_most_once() {
        let identity = Arc::new(FakeIdentity::with_token("stale-token"));
        let transport = Arc::new(ExpiredTokenTransport {
            requests: AtomicUsize::new(0),
            always_reject: true,
        });
        let pipeline =
            RequestPipeline::new(&test_config(), Arc::clone(&identity), Arc::clone(&transport));

        let result = pipeline.get("checkouts/1").await;
        assert!(matches!(result, Err(CheckoutError::AuthRequired)));
        // Original request plus exactly one replay.
        assert_eq!(transport.requests.load(Ordering::SeqCst), 2);
    }

    /// Records headers and hands back a CSRF token on the first response.
    struct CsrfTransport {
        seen_csrf: Mutex<Vec<Option<String>>>,
    }

    impl Transport for CsrfTransport {
        async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
            let csrf = request
                .headers
                .iter()
                .find(|(name, _)| name == CSRF_HEADER)
                .map(|(_, value)| value.clone());
            self.seen_csrf
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(csrf);
            Ok(HttpResponse {
                status: StatusCode::OK,
                headers: vec![(CSRF_HEADER.to_string(), "csrf-abc".to_string())],
                body: r#"{ "data": null }"#.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_csrf_header_attached_to_mutating_requests() {
        let identity = FakeIdentity::with_token("fresh-token");
        let transport = Arc::new(CsrfTransport {
            seen_csrf: Mutex::new(vec![]),
        });
        let pipeline = RequestPipeline::new(&test_config(), identity, Arc::clone(&transport));

        // GET caches the CSRF token from the response.
        pipeline.get("checkouts/1").await.expect("get succeeds");
        // POST carries it.
        pipeline
            .post("checkouts", serde_json::json!({ "data": null }))
            .await
            .expect("post succeeds");

        let seen = transport
            .seen_csrf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        assert_eq!(seen, vec![None, Some("csrf-abc".to_string())]);
    }

    #[tokio::test]
    async fn test_server_error_detail_surfaced_verbatim() {
        struct RejectingTransport;
        impl Transport for RejectingTransport {
            async fn send(&self, _request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
                Ok(HttpResponse {
                    status: StatusCode::BAD_REQUEST,
                    headers: vec![],
                    body: r#"{ "errors": [{ "status": "400", "title": "Bad Request", "detail": "Postal code is required" }] }"#.to_string(),
                })
            }
        }

        let pipeline = RequestPipeline::new(
            &test_config(),
            FakeIdentity::with_token("fresh-token"),
            RejectingTransport,
        );
        let err = pipeline.get("checkouts/1").await.expect_err("should fail");
        match err {
            CheckoutError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Postal code is required");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }
}

