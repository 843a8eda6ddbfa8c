use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::Value;

use crate::errors::AppError;
use crate::state::AppState;

/// GET /api/v1/remote/resumes/:resume_id
pub async fn handle_get_remote_resume(
    State(state): State<AppState>,
    Path(resume_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(state.api.get_resume(&resume_id).await?))
}

/// GET /api/v1/remote/resumes/:resume_id/sections/:section_id
pub async fn handle_get_remote_section(
    State(state): State<AppState>,
    Path((resume_id, section_id)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(state.api.get_section(&resume_id, &section_id).await?))
}

#[cfg(test)]
mod tests {
    use crate::routes::build_router;
    use crate::routes::test_support::{body_json, get_request, test_state};
    use axum::http::StatusCode;
    use serde_json::Value;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_blank_section_id_is_a_validation_error() {
        let app = build_router(test_state().await);
        let resp = app
            .oneshot(get_request("/api/v1/remote/resumes/r1/sections/%20"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = body_json(resp).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }
}
