//! Readmit core library
//!
//! This module exports the stages of the 30-day readmission pipeline:
//! synthetic seeding, mart building, feature extraction, training,
//! the prediction service and the BI export.

pub mod api;
pub mod db;
pub mod error;
pub mod etl;
pub mod ml;
pub mod models;
pub mod ui;

pub use error::{ReadmitError, Result};

/// Application configuration
pub mod config {
    use std::path::PathBuf;

    use serde::Deserialize;

    use crate::error::{ReadmitError, Result};

    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(default)]
    pub struct Config {
        pub server: ServerConfig,
        pub database: DatabaseConfig,
        pub paths: PathsConfig,
        pub seed: SeedConfig,
        pub split: SplitConfig,
        pub train: TrainConfig,
        pub client: ClientConfig,
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(default)]
    pub struct ServerConfig {
        pub host: String,
        pub port: u16,
    }

    impl Default for ServerConfig {
        fn default() -> Self {
            Self {
                host: "127.0.0.1".into(),
                port: 8000,
            }
        }
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(default)]
    pub struct DatabaseConfig {
        pub url: Option<String>,
        pub mart_table: String,
    }

    impl Default for DatabaseConfig {
        fn default() -> Self {
            Self {
                url: None,
                mart_table: "mart_risk_base".into(),
            }
        }
    }

    impl DatabaseConfig {
        /// The connection string, or an error naming the missing variable.
        pub fn url(&self) -> Result<&str> {
            self.url
                .as_deref()
                .filter(|url| !url.trim().is_empty())
                .ok_or(ReadmitError::MissingSetting("DATABASE_URL"))
        }
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(default)]
    pub struct PathsConfig {
        pub artifacts_dir: PathBuf,
        pub exports_dir: PathBuf,
    }

    impl Default for PathsConfig {
        fn default() -> Self {
            Self {
                artifacts_dir: PathBuf::from("artifacts"),
                exports_dir: PathBuf::from("exports"),
            }
        }
    }

    impl PathsConfig {
        pub fn model_path(&self) -> PathBuf {
            self.artifacts_dir.join("model_pipeline.json")
        }

        pub fn features_dir(&self) -> PathBuf {
            self.exports_dir.join("features")
        }

        pub fn ml_dir(&self) -> PathBuf {
            self.exports_dir.join("ml")
        }

        pub fn bi_dir(&self) -> PathBuf {
            self.exports_dir.join("bi")
        }
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(default)]
    pub struct SeedConfig {
        pub patients: usize,
        pub encounters_per_patient: (usize, usize),
        pub labs_per_encounter: (usize, usize),
        pub reset_tables: bool,
        pub random_seed: u64,
    }

    impl Default for SeedConfig {
        fn default() -> Self {
            Self {
                patients: 200,
                encounters_per_patient: (1, 3),
                labs_per_encounter: (3, 10),
                reset_tables: true,
                random_seed: 42,
            }
        }
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(default)]
    pub struct SplitConfig {
        pub test_size: f64,
        pub val_size: f64,
        pub random_seed: u64,
    }

    impl Default for SplitConfig {
        fn default() -> Self {
            Self {
                test_size: 0.2,
                val_size: 0.2,
                random_seed: 42,
            }
        }
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(default)]
    pub struct TrainConfig {
        pub max_iter: u64,
        /// Inverse L2 regularization strength.
        pub c: f64,
        pub balanced: bool,
        /// Gradient norm at which the solver stops.
        pub tolerance: f64,
    }

    impl Default for TrainConfig {
        fn default() -> Self {
            Self {
                max_iter: 200,
                c: 1.0,
                balanced: true,
                tolerance: 1e-4,
            }
        }
    }

    #[derive(Debug, Clone, Deserialize)]
    #[serde(default)]
    pub struct ClientConfig {
        pub api_url: String,
        pub timeout_secs: u64,
    }

    impl Default for ClientConfig {
        fn default() -> Self {
            Self {
                api_url: "http://127.0.0.1:8000".into(),
                timeout_secs: 10,
            }
        }
    }

    /// Load configuration from file
    pub fn load_config() -> Result<Config> {
        dotenv::dotenv().ok();

        let env = std::env::var("READMIT_ENV").unwrap_or_else(|_| "development".into());

        let settings = config::Config::builder()
            // Start with default settings
            .add_source(config::File::with_name("config/default").required(false))
            // Override with environment-specific settings
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
            // Override with environment variables
            .add_source(config::Environment::with_prefix("READMIT").separator("__"))
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("client.api_url", std::env::var("API_URL").ok())?
            .build()?;

        Ok(settings.try_deserialize()?)
    }

}
