use crate::api_client::ApiClient;
use crate::config::Config;
use crate::relay::RelayHandle;

/// Shared state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub relay: RelayHandle,
    pub api: ApiClient,
    pub config: Config,
}
