//! Login endpoint.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::api::error::ApiResult;
use crate::api::types::success;
use crate::api::ApiState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// POST /api/v1/auth/login — exchange credentials for a bearer token.
pub async fn login(
    State(state): State<ApiState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let issued = state.auth.login(&req.username, &req.password).await?;
    Ok(success(issued))
}
