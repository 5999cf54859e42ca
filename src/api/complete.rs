use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bail_worker;
use crate::error::WorkerResult;
use crate::extractors::JsonBody;
use crate::worker::Worker;

#[derive(Deserialize, Debug)]
pub(crate) struct CompleteRequest {
    pub(crate) msg: String,
    #[serde(default = "default_verbose")]
    pub(crate) verbose: bool,
}

fn default_verbose() -> bool {
    true
}

#[derive(Deserialize, Serialize, Debug)]
pub(crate) struct CompleteResponse {
    pub(crate) prediction: String,
}

#[axum_macros::debug_handler]
pub(crate) async fn handle_complete(
    State(worker): State<Worker>,
    JsonBody(req): JsonBody<CompleteRequest>,
) -> WorkerResult<(StatusCode, Json<CompleteResponse>)> {
    if req.verbose {
        info!("Running prediction");
    }

    let candidates = worker.predict(req.msg).await?;
    let Some(first) = candidates.into_iter().next() else {
        bail_worker!("Pipeline returned no candidates");
    };

    Ok((
        StatusCode::OK,
        Json(CompleteResponse {
            prediction: first.generated_text,
        }),
    ))
}
