//! Seed command - generates a synthetic cohort and writes it to the base tables.

use chrono::{Duration, NaiveDateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tracing::{info, instrument};

use crate::config::{Config, SeedConfig};
use crate::db::{queries, Database};
use crate::error::{ReadmitError, Result};
use crate::models::{Encounter, LabResult, LabTest, Patient, Sex};

/// Patients, encounters and labs generated from one seed.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticCohort {
    pub patients: Vec<Patient>,
    pub encounters: Vec<Encounter>,
    pub labs: Vec<LabResult>,
}

/// Readmission probability rises with age and is clamped to [0.05, 0.5].
pub fn readmit_probability(age: i64) -> f64 {
    (0.15 + 0.002 * (age - 40) as f64).clamp(0.05, 0.5)
}

fn check_range(name: &str, (lo, hi): (usize, usize)) -> Result<()> {
    if lo > hi {
        return Err(ReadmitError::InvalidData(format!(
            "{name} range ({lo}, {hi}) is inverted"
        )));
    }
    Ok(())
}

fn short_id(rng: &mut StdRng) -> String {
    let uuid = uuid::Builder::from_random_bytes(rng.gen()).into_uuid();
    uuid.simple().to_string()[..12].to_string()
}

fn normal(mean: f64, std: f64) -> Result<Normal<f64>> {
    Normal::new(mean, std).map_err(|e| ReadmitError::InvalidData(e.to_string()))
}

impl SyntheticCohort {
    /// Generates a cohort; the same config and `now` always produce the same rows.
    pub fn generate(config: &SeedConfig, now: NaiveDateTime) -> Result<Self> {
        check_range("encounters_per_patient", config.encounters_per_patient)?;
        check_range("labs_per_encounter", config.labs_per_encounter)?;

        let mut rng = StdRng::seed_from_u64(config.random_seed);
        let stay_days = normal(3.0, 2.0)?;
        let draw_hours = normal(24.0, 12.0)?;

        let patients: Vec<Patient> = (0..config.patients)
            .map(|_| Patient {
                patient_id: short_id(&mut rng),
                sex: if rng.gen_bool(0.5) { Sex::Male } else { Sex::Female },
                age: rng.gen_range(18..90),
            })
            .collect();

        let (enc_lo, enc_hi) = config.encounters_per_patient;
        let mut encounters = Vec::new();
        for patient in &patients {
            for _ in 0..rng.gen_range(enc_lo..=enc_hi) {
                let back = Duration::days(rng.gen_range(0..365))
                    + Duration::hours(rng.gen_range(0..24))
                    + Duration::minutes(rng.gen_range(0..60));
                let admit_ts = now - back;
                let los_days: f64 = stay_days.sample(&mut rng).abs();
                let discharge_ts =
                    admit_ts + Duration::milliseconds((los_days * 86_400_000.0).round() as i64);
                let readmit_30d = rng.gen::<f64>() < readmit_probability(patient.age);

                encounters.push(Encounter {
                    enc_id: short_id(&mut rng),
                    patient_id: patient.patient_id.clone(),
                    admit_ts,
                    discharge_ts,
                    readmit_30d,
                });
            }
        }

        let (lab_lo, lab_hi) = config.labs_per_encounter;
        let mut labs = Vec::new();
        for encounter in &encounters {
            for _ in 0..rng.gen_range(lab_lo..=lab_hi) {
                let test = LabTest::ALL[rng.gen_range(0..LabTest::ALL.len())];
                let (lo, hi) = test.normal_range();
                let value = (rng.gen_range(lo..hi) * 100.0).round() / 100.0;
                let offset_hours: f64 = draw_hours.sample(&mut rng).abs();
                let taken_ts = encounter.admit_ts
                    + Duration::milliseconds((offset_hours * 3_600_000.0).round() as i64);

                labs.push(LabResult {
                    enc_id: encounter.enc_id.clone(),
                    test_name: test.name().to_string(),
                    value,
                    taken_ts,
                });
            }
        }

        Ok(Self {
            patients,
            encounters,
            labs,
        })
    }
}

/// Writes a cohort in one transaction, optionally clearing the tables first.
pub async fn write_cohort(db: &Database, cohort: &SyntheticCohort, reset: bool) -> Result<()> {
    let mut tx = db.pool().begin().await?;
    if reset {
        queries::reset_tables(&mut tx).await?;
    }
    queries::insert_patients(&mut tx, &cohort.patients).await?;
    queries::insert_encounters(&mut tx, &cohort.encounters).await?;
    queries::insert_labs(&mut tx, &cohort.labs).await?;
    tx.commit().await?;
    Ok(())
}

/// Runs the seed command and returns the resulting row counts.
#[instrument(skip(config))]
pub async fn run(config: &Config) -> Result<Vec<(String, i64)>> {
    let db = Database::connect(config.database.url()?).await?;
    db.run_migrations().await?;

    let cohort = SyntheticCohort::generate(&config.seed, Utc::now().naive_utc())?;
    info!(
        patients = cohort.patients.len(),
        encounters = cohort.encounters.len(),
        labs = cohort.labs.len(),
        "Generated synthetic cohort"
    );
    write_cohort(&db, &cohort, config.seed.reset_tables).await?;

    let counts = queries::table_counts(db.pool()).await?;
    info!(?counts, "Row counts");
    Ok(counts)
}
