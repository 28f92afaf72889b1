//! Route table

use actix_web::error::JsonPayloadError;
use actix_web::{web, HttpRequest};

use super::handlers::{self, ApiError};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .route("/health", web::get().to(handlers::health))
        .route("/predict", web::post().to(handlers::predict));
}

// malformed bodies are reported like validation failures
fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::Payload(err.to_string()).into()
}
