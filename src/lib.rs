pub mod config;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod rooms;
pub mod stats;

use axum::{extract::FromRef, http::StatusCode, response::{IntoResponse, Response}};

use crate::engine::Engine;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub engine: Engine,
}

pub type AppResult<T> = Result<T, AppError>;
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!("request failed: {:#}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("{}\n\n{}", self.0, self.0.backtrace()),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
