use crate::server::SharedState;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;
use tokio::task;
use toon_prediction::{PredictError, Prediction};
use tracing::instrument;

#[derive(Error, Debug)]
pub enum PredictImageError {
    #[error("{0}")]
    Predict(#[from] PredictError),
    #[error("prediction task failed: {0}")]
    TaskJoin(String),
}

impl IntoResponse for PredictImageError {
    fn into_response(self) -> Response {
        let status = match &self {
            PredictImageError::Predict(PredictError::DecodeFailure(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            PredictImageError::Predict(PredictError::InferenceFailure(_))
            | PredictImageError::TaskJoin(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub label: String,
    pub class_index: usize,
    pub confidence: f32,
    pub confidence_display: String,
    pub probabilities: Vec<f32>,
}

impl From<Prediction> for PredictResponse {
    fn from(prediction: Prediction) -> Self {
        let confidence = prediction.confidence();
        Self {
            label: prediction.label,
            class_index: prediction.class_index,
            confidence,
            confidence_display: format!("{confidence:.4}"),
            probabilities: prediction.probabilities,
        }
    }
}

#[instrument(skip(state, image_data))]
pub async fn predict_image(
    State(state): State<SharedState>,
    image_data: Bytes,
) -> Result<Json<PredictResponse>, PredictImageError> {
    let started = Instant::now();
    state.metrics.record_request("/predict");

    let classifier = state.classifier.clone();
    let prediction = task::spawn_blocking(move || classifier.predict(&image_data))
        .await
        .map_err(|e| PredictImageError::TaskJoin(e.to_string()))??;

    state
        .metrics
        .record_prediction_duration(started.elapsed().as_millis() as u64, "/predict");
    tracing::debug!(
        "Predicted {} with confidence {:.4}",
        prediction.label,
        prediction.confidence()
    );

    Ok(Json(PredictResponse::from(prediction)))
}
