use super::AppState;
use crate::session::SessionData;
use crate::utils::AssessError;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{error, info, warn};

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(rename = "type")]
    pub session_type: String,
    #[serde(default)]
    pub data: Option<SessionData>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSessionRequest {
    pub data: SessionData,
}

/// JSON error body: `{ "error": code, "message": text }`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    /// Unknown and expired sessions share one answer
    pub fn session_not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code: "session_not_found",
            message: "Session not found or expired".to_string(),
        }
    }
}

impl From<AssessError> for ApiError {
    fn from(err: AssessError) -> Self {
        let level = err.severity();
        if level == tracing::Level::ERROR {
            error!(error = %err, "Request failed");
        } else if level == tracing::Level::WARN {
            warn!(error = %err, "Request failed");
        } else {
            info!(error = %err, "Request rejected");
        }

        match err {
            AssessError::InvalidInput { message } => Self {
                status: StatusCode::BAD_REQUEST,
                code: "invalid_input",
                message,
            },
            other => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "internal_error",
                message: other.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.code,
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "assessd",
            "version": env!("CARGO_PKG_VERSION"),
            "sessions": state.sessions.len().await,
            "rate_limit_counters": state.limiter.len().await,
        })),
    )
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let id = state
        .sessions
        .create(&request.session_type, request.data)
        .await?;
    let expires_at = state.sessions.get(&id).await.map(|record| record.expires_at);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "id": id, "expires_at": expires_at })),
    ))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let record = state
        .sessions
        .get(&id)
        .await
        .ok_or_else(ApiError::session_not_found)?;

    Ok(Json(json!({
        "id": record.id,
        "type": record.session_type,
        "data": record.data,
        "expires_at": record.expires_at,
    })))
}

pub async fn update_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateSessionRequest>,
) -> Result<Json<Value>, ApiError> {
    let data = state
        .sessions
        .update_data(&id, request.data)
        .await
        .ok_or_else(ApiError::session_not_found)?;

    Ok(Json(json!({ "id": id, "data": data })))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<Value> {
    let deleted = state.sessions.delete(&id).await;
    Json(json!({ "deleted": deleted }))
}
