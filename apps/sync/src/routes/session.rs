use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AppError;
use crate::models::auth::AuthTokens;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    pub access_token: String,
    pub id_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub user: Value,
}

/// What the popup is told about the session. Tokens never leave the store.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub signed_in: bool,
    pub user: Value,
    pub token_timestamp: Option<DateTime<Utc>>,
}

impl From<Option<AuthTokens>> for SessionStatus {
    fn from(tokens: Option<AuthTokens>) -> Self {
        match tokens {
            Some(tokens) => Self {
                signed_in: true,
                user: tokens.user,
                token_timestamp: Some(tokens.issued_at),
            },
            None => Self {
                signed_in: false,
                user: Value::Null,
                token_timestamp: None,
            },
        }
    }
}

/// GET /api/v1/session
pub async fn handle_get_session(
    State(state): State<AppState>,
) -> Result<Json<SessionStatus>, AppError> {
    let tokens = state.api.load_tokens().await?;
    Ok(Json(tokens.into()))
}

/// PUT /api/v1/session
pub async fn handle_sign_in(
    State(state): State<AppState>,
    Json(req): Json<SignInRequest>,
) -> Result<Json<SessionStatus>, AppError> {
    if req.access_token.trim().is_empty() {
        return Err(AppError::Validation("accessToken is required".to_string()));
    }
    let tokens = AuthTokens::new(req.access_token, req.id_token, req.refresh_token, req.user);
    state.api.save_tokens(&tokens).await?;
    Ok(Json(Some(tokens).into()))
}

/// DELETE /api/v1/session
pub async fn handle_sign_out(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.api.clear_tokens().await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use crate::routes::build_router;
    use crate::routes::test_support::{body_json, get_request, json_request, test_state};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_sign_in_then_out() {
        let app = build_router(test_state().await);

        let resp = app.clone().oneshot(get_request("/api/v1/session")).await.unwrap();
        let body: Value = body_json(resp).await;
        assert_eq!(body["signedIn"], false);

        let sign_in = json!({
            "accessToken": "tok",
            "idToken": "id",
            "refreshToken": "refresh",
            "user": { "email": "a@example.com" }
        });
        let resp = app
            .clone()
            .oneshot(json_request("PUT", "/api/v1/session", &sign_in.to_string()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app.clone().oneshot(get_request("/api/v1/session")).await.unwrap();
        let body: Value = body_json(resp).await;
        assert_eq!(body["signedIn"], true);
        assert_eq!(body["user"]["email"], "a@example.com");
        assert!(body.get("accessToken").is_none());

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/v1/session")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = app.oneshot(get_request("/api/v1/session")).await.unwrap();
        let body: Value = body_json(resp).await;
        assert_eq!(body["signedIn"], false);
    }

    #[tokio::test]
    async fn test_blank_access_token_is_rejected() {
        let app = build_router(test_state().await);
        let body = json!({ "accessToken": " ", "idToken": "i", "refreshToken": "r" });
        let resp = app
            .oneshot(json_request("PUT", "/api/v1/session", &body.to_string()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
