use axum::async_trait;
use axum::extract::{FromRequest, Request};
use axum::Json;
use serde::de::DeserializeOwned;

use crate::error::{HttpErrorResponse, WorkerError};

/// JSON body extractor whose rejections keep axum's status code but render
/// as the worker's JSON error body.
pub(crate) struct JsonBody<T>(pub(crate) T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = WorkerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(WorkerError {
                status: rejection.status(),
                message: HttpErrorResponse::from(rejection.body_text()),
            }),
        }
    }
}
