use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

// Adapted from https://github.com/tokio-rs/axum/blob/main/examples/anyhow-error-response/src/main.rs
#[derive(Debug)]
pub struct WorkerError {
    pub status: StatusCode,
    pub message: HttpErrorResponse,
}

#[derive(Debug, Serialize)]
pub struct HttpErrorResponse {
    error: String,
}

impl From<String> for HttpErrorResponse {
    fn from(message: String) -> Self {
        HttpErrorResponse { error: message }
    }
}

impl From<&str> for HttpErrorResponse {
    fn from(message: &str) -> Self {
        HttpErrorResponse {
            error: message.to_string(),
        }
    }
}

impl IntoResponse for WorkerError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, "{}", self.message.error);
        }
        let mut res = Json(self.message).into_response();
        *res.status_mut() = self.status;
        res
    }
}

impl<E> From<E> for WorkerError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        WorkerError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: HttpErrorResponse::from(format!("{:#}", err.into())),
        }
    }
}

pub type WorkerResult<T, E = WorkerError> = Result<T, E>;

#[macro_export]
macro_rules! bail_worker {
    ($error_message:expr) => {
        return Err($crate::error::WorkerError {
            status: axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            message: $crate::error::HttpErrorResponse::from($error_message),
        })
    };
    ($status:expr, $fmt:expr $(, $arg:expr)+) => {
        return Err($crate::error::WorkerError {
            status: $status,
            message: $crate::error::HttpErrorResponse::from(format!($fmt $(, $arg)+)),
        })
    };
    ($status:expr, $error_message:expr) => {
        return Err($crate::error::WorkerError {
            status: $status,
            message: $crate::error::HttpErrorResponse::from($error_message),
        })
    };
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use axum::body::to_bytes;

    use super::*;

    fn reject(code: u16) -> WorkerResult<()> {
        bail_worker!(StatusCode::from_u16(code).unwrap(), "Rejected with {}", code);
    }

    #[tokio::test]
    async fn renders_json_error_body() {
        let err = WorkerError::from(anyhow!("model exploded"));
        let res = err.into_response();

        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "model exploded");
    }

    #[test]
    fn bail_keeps_status_and_formats_message() {
        let err = reject(413).unwrap_err();

        assert_eq!(err.status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.message.error, "Rejected with 413");
    }

    #[test]
    fn context_chain_is_kept_in_message() {
        let err = WorkerError::from(anyhow!("disk full").context("Failed to fetch weights"));

        assert_eq!(err.message.error, "Failed to fetch weights: disk full");
    }
}
