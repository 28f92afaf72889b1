//! Prediction service
//!
//! Loads the trained pipeline once and serves it over HTTP.

pub mod handlers;
pub mod middleware;
pub mod routes;

use actix_web::{web, App, HttpServer};
use tracing::{info, instrument};
use tracing_actix_web::TracingLogger;

use crate::config::Config;
use crate::error::{ReadmitError, Result};
use crate::ml::Pipeline;

pub use handlers::AppState;
pub use routes::configure;

/// Runs the serve command until the server is stopped.
///
/// # Errors
///
/// Fails before binding if the model artifact is missing or unreadable.
#[instrument(skip(config))]
pub async fn serve(config: &Config) -> Result<()> {
    let model = Pipeline::load(&config.paths.model_path())?;
    let state = web::Data::new(AppState::new(model));

    let addr = (config.server.host.clone(), config.server.port);
    info!(host = %addr.0, port = addr.1, "Starting prediction service");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::cors())
            .wrap(TracingLogger::default())
            .configure(configure)
    })
    .bind(addr)
    .map_err(ReadmitError::Server)?
    .run()
    .await
    .map_err(ReadmitError::Server)
}
