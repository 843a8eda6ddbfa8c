pub mod health;
pub mod remote;
pub mod resume;
pub mod session;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Popup client: same message types as the page API
        .route(
            "/api/v1/resume",
            get(resume::handle_get_resume).put(resume::handle_save_resume),
        )
        .route("/api/v1/messages", post(resume::handle_message))
        .route("/api/v1/pages/:tab/data", get(resume::handle_page_data))
        .route(
            "/api/v1/session",
            get(session::handle_get_session)
                .put(session::handle_sign_in)
                .delete(session::handle_sign_out),
        )
        // Web backend proxy
        .route(
            "/api/v1/remote/resumes/:resume_id",
            get(remote::handle_get_remote_resume),
        )
        .route(
            "/api/v1/remote/resumes/:resume_id/sections/:section_id",
            get(remote::handle_get_remote_section),
        )
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, Response};
    use serde::de::DeserializeOwned;

    use crate::api_client::ApiClient;
    use crate::config::Config;
    use crate::relay::{self, RelayOptions};
    use crate::state::AppState;
    use crate::store::{MemoryStore, PersistentStore};

    pub fn test_config(api_base_url: &str) -> Config {
        Config {
            port: 0,
            rust_log: "debug".to_string(),
            storage_path: None,
            request_timeout: Duration::from_millis(500),
            strict_storage_errors: false,
            api_base_url: api_base_url.to_string(),
        }
    }

    pub async fn test_state_with_store(
        store: Arc<dyn PersistentStore>,
        options: RelayOptions,
    ) -> AppState {
        let config = test_config("http://127.0.0.1:9");
        AppState {
            relay: relay::spawn(store.clone(), options).await,
            api: ApiClient::new(&config.api_base_url, store).unwrap(),
            config,
        }
    }

    pub async fn test_state() -> AppState {
        test_state_with_store(Arc::new(MemoryStore::new()), RelayOptions::default()).await
    }

    pub fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    pub async fn body_json<T: DeserializeOwned>(resp: Response<Body>) -> T {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}
