//! Request handlers

use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};
use validator::{Validate, ValidationErrors};

use crate::ml::{label_for, Pipeline};
use crate::models::{PredictRequest, PredictResponse};

/// Shared, read-only state handed to every worker.
#[derive(Clone)]
pub struct AppState {
    pub model: Arc<Pipeline>,
}

impl AppState {
    pub fn new(model: Pipeline) -> Self {
        Self {
            model: Arc::new(model),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(#[from] ValidationErrors),

    #[error("{0}")]
    Payload(String),

    #[error("prediction failed: {0}")]
    Prediction(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Payload(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Prediction(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "detail": self.to_string() }))
    }
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

pub async fn predict(
    state: web::Data<AppState>,
    body: web::Json<PredictRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = body.into_inner();
    request.validate()?;

    let probability = state.model.predict_request(&request).map_err(|e| {
        error!(error = %e, "prediction failed");
        ApiError::Prediction(e.to_string())
    })?;
    if !(0.0..=1.0).contains(&probability) {
        error!(probability, "model returned an invalid probability");
        return Err(ApiError::Prediction(format!(
            "probability {probability} outside [0, 1]"
        )));
    }

    let response = PredictResponse {
        probability,
        label: label_for(probability),
    };
    debug!(?response, "scored encounter");
    Ok(HttpResponse::Ok().json(response))
}
