//! HTTP client for the prediction service.

use std::time::Duration;

use tracing::{debug, instrument};

use crate::config::ClientConfig;
use crate::error::Result;
use crate::models::{PredictRequest, PredictResponse};

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(&config.api_url, Duration::from_secs(config.timeout_secs))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[instrument(skip(self))]
    pub async fn health(&self) -> Result<serde_json::Value> {
        let body = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(body)
    }

    /// Posts one encounter; non-2xx statuses are errors.
    #[instrument(skip(self, request))]
    pub async fn predict(&self, request: &PredictRequest) -> Result<PredictResponse> {
        let response: PredictResponse = self
            .http
            .post(format!("{}/predict", self.base_url))
            .json(request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!(?response, "prediction received");
        Ok(response)
    }
}
