//! Readmit
//!
//! Command-line entry point for every stage of the 30-day readmission pipeline.

use std::future::Future;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use readmit::config::{self, Config};
use readmit::models::Sex;
use readmit::ui::{ApiClient, PredictForm, Submission};
use readmit::{api, etl, ml};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 30-day readmission risk pipeline
#[derive(Parser)]
#[command(name = "readmit")]
#[command(about = "Seed, train and serve a 30-day hospital readmission risk model")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic cohort into the base tables
    Seed {
        /// Number of patients to generate
        #[arg(short, long)]
        patients: Option<usize>,

        /// Random seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Append instead of clearing the tables first
        #[arg(long)]
        keep_existing: bool,
    },

    /// Rebuild the per-encounter mart table
    BuildMart,

    /// Split the mart into train/val/test CSVs
    Features,

    /// Fit the pipeline and write the artifact and metrics
    Train,

    /// Serve /health and /predict
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Write the BI CSVs
    ExportBi,

    /// Score one encounter against a running service
    Predict(FormArgs),

    /// Open the desktop form (requires the `desktop-ui` feature)
    Ui,
}

/// Form fields; anything not given keeps the form default.
#[derive(clap::Args)]
struct FormArgs {
    #[arg(long)]
    sex: Option<Sex>,
    #[arg(long)]
    age: Option<String>,
    #[arg(long)]
    length_of_stay_days: Option<String>,
    #[arg(long)]
    avg_hemo: Option<String>,
    #[arg(long)]
    avg_glucose: Option<String>,
    #[arg(long)]
    avg_creatinine: Option<String>,
    #[arg(long)]
    avg_wbc: Option<String>,
    #[arg(long)]
    avg_platelets: Option<String>,
}

impl FormArgs {
    fn into_form(self) -> PredictForm {
        let mut form = PredictForm::default();
        if let Some(sex) = self.sex {
            form.sex = sex;
        }
        let fields = [
            (self.age, &mut form.age),
            (self.length_of_stay_days, &mut form.length_of_stay_days),
            (self.avg_hemo, &mut form.avg_hemo),
            (self.avg_glucose, &mut form.avg_glucose),
            (self.avg_creatinine, &mut form.avg_creatinine),
            (self.avg_wbc, &mut form.avg_wbc),
            (self.avg_platelets, &mut form.avg_platelets),
        ];
        for (given, slot) in fields {
            if let Some(value) = given {
                *slot = value;
            }
        }
        form
    }
}

fn init_tracing(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn block_on<F: Future>(future: F) -> F::Output {
    actix_rt::System::new().block_on(future)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.json_logs);

    let mut config: Config = config::load_config().context("Failed to load configuration")?;

    match cli.command {
        Commands::Seed {
            patients,
            seed,
            keep_existing,
        } => {
            if let Some(patients) = patients {
                config.seed.patients = patients;
            }
            if let Some(seed) = seed {
                config.seed.random_seed = seed;
            }
            if keep_existing {
                config.seed.reset_tables = false;
            }
            let counts = block_on(etl::seed::run(&config)).context("Seeding failed")?;
            for (table, rows) in counts {
                println!("{table}: {rows}");
            }
        }
        Commands::BuildMart => {
            let rows = block_on(etl::mart::run(&config)).context("Building the mart failed")?;
            println!("{}: {rows}", config.database.mart_table);
        }
        Commands::Features => {
            let meta = block_on(etl::features::run(&config)).context("Feature build failed")?;
            println!(
                "Wrote features to {}: {} train, {} val, {} test",
                config.paths.features_dir().display(),
                meta.rows.train,
                meta.rows.val,
                meta.rows.test
            );
        }
        Commands::Train => {
            let output = ml::train::run(&config).context("Training failed")?;
            println!("{}", output.report);
            println!("Saved model to {}", config.paths.model_path().display());
        }
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            block_on(api::serve(&config)).context("Prediction service failed")?;
        }
        Commands::ExportBi => {
            block_on(etl::export::run(&config)).context("BI export failed")?;
            println!("Wrote BI exports to {}", config.paths.bi_dir().display());
        }
        Commands::Predict(args) => {
            let client = ApiClient::from_config(&config.client)?;
            let form = args.into_form();
            let submission = block_on(form.submit(&client));
            print!("{submission}");
            if !matches!(submission, Submission::Scored { .. }) {
                std::process::exit(1);
            }
        }
        Commands::Ui => run_ui(&config)?,
    }

    info!("Done");
    Ok(())
}

#[cfg(feature = "desktop-ui")]
fn run_ui(config: &Config) -> Result<()> {
    let client = ApiClient::from_config(&config.client)?;
    readmit::ui::desktop::run(client).map_err(|e| anyhow::anyhow!("Desktop form failed: {e}"))
}

#[cfg(not(feature = "desktop-ui"))]
fn run_ui(_config: &Config) -> Result<()> {
    anyhow::bail!("this build has no desktop form; rebuild with --features desktop-ui")
}
