//! Remote API client: the only component that talks to the web backend.
//!
//! Reads the session's access token from the persistent store and sends it
//! as a bearer token. Requests that fail transiently (connect errors, 429,
//! 5xx) are retried with exponential backoff.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::auth::{
    AuthTokens, ACCESS_TOKEN_KEY, AUTH_KEYS, ID_TOKEN_KEY, REFRESH_TOKEN_KEY,
    TOKEN_TIMESTAMP_KEY, USER_KEY,
};
use crate::store::{PersistentStore, StoreError};

const MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_BASE: Duration = Duration::from_millis(500);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Token storage error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    store: Arc<dyn PersistentStore>,
    retry_base: Duration,
}

impl ApiClient {
    pub fn new(base_url: &str, store: Arc<dyn PersistentStore>) -> Result<Self, ApiError> {
        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            store,
            retry_base: DEFAULT_RETRY_BASE,
        })
    }

    /// Overrides the first backoff delay; later delays double it.
    pub fn with_retry_base(mut self, retry_base: Duration) -> Self {
        self.retry_base = retry_base;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn save_tokens(&self, tokens: &AuthTokens) -> Result<(), ApiError> {
        for (key, value) in tokens.to_entries() {
            self.store.set(key, value).await?;
        }
        debug!("Stored auth tokens");
        Ok(())
    }

    pub async fn load_tokens(&self) -> Result<Option<AuthTokens>, ApiError> {
        Ok(AuthTokens::from_entries(
            self.store.get(ACCESS_TOKEN_KEY).await?,
            self.store.get(ID_TOKEN_KEY).await?,
            self.store.get(REFRESH_TOKEN_KEY).await?,
            self.store.get(USER_KEY).await?,
            self.store.get(TOKEN_TIMESTAMP_KEY).await?,
        ))
    }

    pub async fn clear_tokens(&self) -> Result<(), ApiError> {
        for key in AUTH_KEYS {
            self.store.remove(key).await?;
        }
        debug!("Cleared auth tokens");
        Ok(())
    }

    /// GET /resumes/{resume_id}
    pub async fn get_resume(&self, resume_id: &str) -> Result<Value, ApiError> {
        let path = resource_path(resume_id, None)?;
        self.get_json(&path).await
    }

    /// GET /resumes/{resume_id}/sections/{section_id}
    pub async fn get_section(&self, resume_id: &str, section_id: &str) -> Result<Value, ApiError> {
        let path = resource_path(resume_id, Some(section_id))?;
        self.get_json(&path).await
    }

    async fn bearer_token(&self) -> Result<Option<String>, ApiError> {
        Ok(match self.store.get(ACCESS_TOKEN_KEY).await? {
            Some(Value::String(token)) if !token.is_empty() => Some(token),
            _ => None,
        })
    }

    async fn get_json(&self, path: &str) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let token = self.bearer_token().await?;
        let mut attempt = 0;

        loop {
            let mut request = self.client.get(&url);
            if let Some(token) = &token {
                request = request.bearer_auth(token);
            }

            let error = match request.send().await {
                Err(e) => ApiError::Http(e),
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let bytes = response.bytes().await?;
                        debug!("GET {} succeeded ({} bytes)", path, bytes.len());
                        return Ok(serde_json::from_slice(&bytes)?);
                    }

                    let body = response.text().await.unwrap_or_default();
                    let error = ApiError::Api {
                        status: status.as_u16(),
                        message: body,
                    };
                    if status != StatusCode::TOO_MANY_REQUESTS && !status.is_server_error() {
                        return Err(error);
                    }
                    error
                }
            };

            attempt += 1;
            if attempt >= MAX_RETRIES {
                return Err(error);
            }
            let delay = self.retry_base * (1 << (attempt - 1));
            warn!(
                "GET {} attempt {} failed ({}), retrying after {}ms...",
                path,
                attempt,
                error,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Builds the request path, rejecting blank or slash-containing identifiers
/// before anything goes on the wire.
fn resource_path(resume_id: &str, section_id: Option<&str>) -> Result<String, ApiError> {
    let resume_id = require_id("resume id", resume_id)?;
    match section_id {
        None => Ok(format!("/resumes/{resume_id}")),
        Some(section_id) => {
            let section_id = require_id("section id", section_id)?;
            Ok(format!("/resumes/{resume_id}/sections/{section_id}"))
        }
    }
}

fn require_id<'a>(what: &str, id: &'a str) -> Result<&'a str, ApiError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(ApiError::Validation(format!("{what} is required")));
    }
    if id.contains('/') {
        return Err(ApiError::Validation(format!("{what} must not contain '/'")));
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_resource_path_validation() {
        assert_eq!(resource_path("r1", None).unwrap(), "/resumes/r1");
        assert_eq!(
            resource_path(" r1 ", Some("s9")).unwrap(),
            "/resumes/r1/sections/s9"
        );
        assert!(matches!(resource_path("", None), Err(ApiError::Validation(_))));
        assert!(matches!(resource_path("   ", None), Err(ApiError::Validation(_))));
        assert!(matches!(resource_path("r1", Some("")), Err(ApiError::Validation(_))));
        assert!(matches!(resource_path("a/b", None), Err(ApiError::Validation(_))));
    }

    /// Fake backend: echoes the Authorization header; `/resumes/flaky`
    /// fails twice before succeeding and `/resumes/down` always fails.
    async fn serve_backend() -> (String, Arc<AtomicU32>) {
        let hits = Arc::new(AtomicU32::new(0));

        async fn resume(
            State(hits): State<Arc<AtomicU32>>,
            Path(id): Path<String>,
            headers: HeaderMap,
        ) -> Result<Json<Value>, AxumStatus> {
            let n = hits.fetch_add(1, Ordering::SeqCst);
            match id.as_str() {
                "flaky" if n < 2 => Err(AxumStatus::SERVICE_UNAVAILABLE),
                "down" => Err(AxumStatus::BAD_GATEWAY),
                "missing" => Err(AxumStatus::NOT_FOUND),
                _ => Ok(Json(json!({
                    "id": id,
                    "authorization": headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok()),
                }))),
            }
        }

        async fn section(Path((id, section)): Path<(String, String)>) -> Json<Value> {
            Json(json!({ "resume": id, "section": section }))
        }

        let app = Router::new()
            .route("/resumes/:id", get(resume))
            .route("/resumes/:id/sections/:section", get(section))
            .with_state(hits.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), hits)
    }

    async fn client(base_url: &str) -> ApiClient {
        ApiClient::new(base_url, Arc::new(MemoryStore::new()))
            .unwrap()
            .with_retry_base(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_blank_id_fails_without_request() {
        let (base_url, hits) = serve_backend().await;
        let api = client(&base_url).await;

        let err = api.get_resume("").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        let err = api.get_section("r1", " ").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bearer_token_attached_when_stored() {
        let (base_url, _hits) = serve_backend().await;
        let api = client(&base_url).await;

        let anonymous = api.get_resume("r1").await.unwrap();
        assert_eq!(anonymous["authorization"], Value::Null);

        api.save_tokens(&AuthTokens::new(
            "tok-123".into(),
            "id-1".into(),
            "refresh-1".into(),
            json!({ "email": "a@example.com" }),
        ))
        .await
        .unwrap();

        let authed = api.get_resume("r1").await.unwrap();
        assert_eq!(authed["id"], "r1");
        assert_eq!(authed["authorization"], "Bearer tok-123");
    }

    #[tokio::test]
    async fn test_section_fetch() {
        let (base_url, _hits) = serve_backend().await;
        let api = client(&format!("{base_url}/")).await;
        let section = api.get_section("r1", "experience").await.unwrap();
        assert_eq!(section, json!({ "resume": "r1", "section": "experience" }));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let (base_url, hits) = serve_backend().await;
        let api = client(&base_url).await;

        let body = api.get_resume("flaky").await.unwrap();
        assert_eq!(body["id"], "flaky");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_last_error() {
        let (base_url, hits) = serve_backend().await;
        let api = client(&base_url).await;

        let err = api.get_resume("down").await.unwrap_err();
        assert!(matches!(err, ApiError::Api { status: 502, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), MAX_RETRIES);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let (base_url, hits) = serve_backend().await;
        let api = client(&base_url).await;

        let err = api.get_resume("missing").await.unwrap_err();
        assert!(matches!(err, ApiError::Api { status: 404, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_token_lifecycle() {
        let api = client("http://127.0.0.1:9").await;
        assert!(api.load_tokens().await.unwrap().is_none());

        let tokens = AuthTokens::new("a".into(), "i".into(), "r".into(), json!({ "id": 7 }));
        api.save_tokens(&tokens).await.unwrap();
        let loaded = api.load_tokens().await.unwrap().unwrap();
        assert_eq!(loaded.access_token, "a");
        assert_eq!(loaded.user, json!({ "id": 7 }));
        assert_eq!(
            loaded.issued_at.timestamp_millis(),
            tokens.issued_at.timestamp_millis()
        );

        api.clear_tokens().await.unwrap();
        assert!(api.load_tokens().await.unwrap().is_none());
    }
}
