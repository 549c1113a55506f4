use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Error surface of the HTTP and WebSocket handlers.
///
/// The send path distinguishes three failure classes, each reported to the
/// caller without retry: a validation error happens before any side effect,
/// an upload error aborts the send with nothing persisted, and a persistence
/// error aborts after upload but before any push. A receiver being offline
/// is not an error at all and has no variant here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Send path
    #[error("{0}")]
    Validation(String),
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("persistence failed: {0}")]
    Persistence(String),

    // Auth
    #[error("login failed")]
    LoginFail,
    #[error("no auth token found")]
    AuthFailNoToken,
    #[error("auth token wrong format")]
    AuthFailTokenWrongFormat,
    #[error("auth context missing")]
    AuthFailCtxNotInRequestExt,

    // Generic
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = core::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Upload(_) => StatusCode::BAD_GATEWAY,
            Error::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::LoginFail | Error::AuthFailNoToken | Error::AuthFailTokenWrongFormat => {
                StatusCode::UNAUTHORIZED
            }
            Error::AuthFailCtxNotInRequestExt => StatusCode::INTERNAL_SERVER_ERROR,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": {
                "message": self.to_string()
            }
        }));

        (status, body).into_response()
    }
}

// Collaborator errors (sqlx, fs) funnel through anyhow at module edges.
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}
