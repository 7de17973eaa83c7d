use crate::routes::{reject, Rejection};
use axum::{http::StatusCode, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use taiga_assistant::taiga::{TaigaClient, TaigaError};
use tracing::{error, info};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default, alias = "taigaUrl")]
    backend_url: String,
}

#[derive(Debug, Serialize)]
struct AuthUser {
    id: i64,
    username: String,
    full_name: String,
    email: String,
    photo: Option<String>,
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    success: bool,
    user: AuthUser,
    token: String,
}

fn backend_rejection(err: TaigaError) -> Rejection {
    match err {
        TaigaError::Api {
            status, message, ..
        } => reject(
            StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            message,
        ),
        TaigaError::InvalidUrl { .. } => reject(StatusCode::BAD_REQUEST, err.to_string()),
        other => {
            error!(error = %other, "authentication failed");
            reject(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

async fn handler(Json(request): Json<AuthRequest>) -> Result<Json<AuthResponse>, Rejection> {
    if request.username.is_empty() || request.password.is_empty() {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "Username and password are required",
        ));
    }
    if request.backend_url.is_empty() {
        return Err(reject(StatusCode::BAD_REQUEST, "Taiga URL is required"));
    }

    let client = TaigaClient::new(&request.backend_url).map_err(backend_rejection)?;
    let auth = client
        .authenticate(&request.username, &request.password)
        .await
        .map_err(backend_rejection)?;
    info!(user_id = auth.id, "user authenticated");

    Ok(Json(AuthResponse {
        success: true,
        user: AuthUser {
            id: auth.id,
            username: auth.username,
            full_name: auth.full_name,
            email: auth.email,
            photo: auth.photo,
        },
        token: auth.auth_token,
    }))
}

pub fn routes() -> Router {
    Router::new()
        .route("/auth", post(handler))
        .route("/api/auth", post(handler))
}
