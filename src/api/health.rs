use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::worker::Worker;

#[derive(Deserialize, Serialize, Debug)]
pub(crate) struct HealthResponse {
    pub(crate) status: String,
    pub(crate) model: String,
}

pub(crate) async fn handle_health(State(worker): State<Worker>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        model: worker.model_name.clone(),
    })
}
