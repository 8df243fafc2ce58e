use axum::extract::rejection::{FormRejection, PathRejection, QueryRejection};
use axum::response::{IntoResponse, Redirect, Response};
use http::StatusCode;
use thiserror::Error;

/// Failure surfaced by a storage backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A unique constraint rejected the write. Carries the constraint name.
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            // 23505 = unique_violation
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                return StoreError::Conflict(constraint);
            }
        }
        if let sqlx::Error::ColumnDecode { .. } = &e {
            return StoreError::Corrupt(e.to_string());
        }
        StoreError::Database(e)
    }
}

/// Outcome of a handler or core operation that did not succeed.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("authentication required")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("storage failure: {0}")]
    Storage(StoreError),
    #[error("session failure: {0}")]
    Session(#[from] tower_sessions::session::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(c) => AppError::Conflict(c),
            other => AppError::Storage(other),
        }
    }
}

impl From<PathRejection> for AppError {
    fn from(r: PathRejection) -> Self {
        AppError::InvalidInput(r.body_text())
    }
}

impl From<FormRejection> for AppError {
    fn from(r: FormRejection) -> Self {
        AppError::InvalidInput(r.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(r: QueryRejection) -> Self {
        AppError::InvalidInput(r.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound(what) => {
                (StatusCode::NOT_FOUND, format!("{what} not found")).into_response()
            }
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::Unauthorized => Redirect::to("/login").into_response(),
            AppError::InvalidCredentials => Redirect::to("/login?error=1").into_response(),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden").into_response(),
            AppError::Conflict(constraint) => {
                tracing::warn!(%constraint, "conflicting write");
                (StatusCode::CONFLICT, "Conflict").into_response()
            }
            AppError::Storage(e) => {
                tracing::error!(error = %e, "storage failure");
                e500()
            }
            AppError::Session(e) => {
                tracing::error!(error = %e, "session failure");
                e500()
            }
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                e500()
            }
        }
    }
}

fn e500() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}
