pub mod auth;
pub mod reply;

use axum::{http::StatusCode, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type Rejection = (StatusCode, Json<ErrorResponse>);

pub fn reject<S: Into<String>>(status: StatusCode, error: S) -> Rejection {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(reply::routes(state))
        .merge(auth::routes())
}
