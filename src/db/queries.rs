//! SQL used by the ETL stages.

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::record_batch::RecordBatch;
use serde::Serialize;
use sqlx::{Column, QueryBuilder, Row, Sqlite, SqliteConnection, SqlitePool, TypeInfo, ValueRef};
use tracing::{debug, instrument};

use crate::error::{ReadmitError, Result};
use crate::models::{Encounter, LabResult, LabTest, Patient};

// Rows per INSERT, keeping bind parameters under SQLite's 999 limit.
const PATIENT_CHUNK: usize = 300;
const ENCOUNTER_CHUNK: usize = 150;
const LAB_CHUNK: usize = 200;

/// Table names come from configuration, so they are checked before being spliced into SQL.
pub fn checked_identifier(name: &str) -> Result<&str> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(name)
    } else {
        Err(ReadmitError::InvalidData(format!(
            "invalid table name {name:?}"
        )))
    }
}

/// Empties the base tables and resets the lab id sequence.
pub async fn reset_tables(conn: &mut SqliteConnection) -> Result<()> {
    for table in ["labs", "encounters", "patients"] {
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(&mut *conn)
            .await?;
    }
    sqlx::query("DELETE FROM sqlite_sequence WHERE name = 'labs'")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn insert_patients(conn: &mut SqliteConnection, patients: &[Patient]) -> Result<()> {
    for chunk in patients.chunks(PATIENT_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO patients (patient_id, sex, age) ");
        builder.push_values(chunk, |mut b, patient| {
            b.push_bind(patient.patient_id.clone())
                .push_bind(patient.sex.code())
                .push_bind(patient.age);
        });
        builder.build().execute(&mut *conn).await?;
    }
    Ok(())
}

pub async fn insert_encounters(
    conn: &mut SqliteConnection,
    encounters: &[Encounter],
) -> Result<()> {
    for chunk in encounters.chunks(ENCOUNTER_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO encounters (enc_id, patient_id, admit_ts, discharge_ts, readmit_30d) ",
        );
        builder.push_values(chunk, |mut b, encounter| {
            b.push_bind(encounter.enc_id.clone())
                .push_bind(encounter.patient_id.clone())
                .push_bind(encounter.admit_ts)
                .push_bind(encounter.discharge_ts)
                .push_bind(encounter.readmit_30d);
        });
        builder.build().execute(&mut *conn).await?;
    }
    Ok(())
}

pub async fn insert_labs(conn: &mut SqliteConnection, labs: &[LabResult]) -> Result<()> {
    for chunk in labs.chunks(LAB_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO labs (enc_id, test_name, value, taken_ts) ");
        builder.push_values(chunk, |mut b, lab| {
            b.push_bind(lab.enc_id.clone())
                .push_bind(lab.test_name.clone())
                .push_bind(lab.value)
                .push_bind(lab.taken_ts);
        });
        builder.build().execute(&mut *conn).await?;
    }
    Ok(())
}

/// Row counts of the base tables, in seeding order.
pub async fn table_counts(pool: &SqlitePool) -> Result<Vec<(String, i64)>> {
    let counts = sqlx::query_as::<_, (String, i64)>(
        "SELECT 'patients' AS name, COUNT(*) AS n FROM patients
         UNION ALL
         SELECT 'encounters', COUNT(*) FROM encounters
         UNION ALL
         SELECT 'labs', COUNT(*) FROM labs",
    )
    .fetch_all(pool)
    .await?;
    Ok(counts)
}

/// SQL that materializes one row per encounter with per-test lab averages.
pub fn mart_sql(mart: &str) -> Result<String> {
    let mart = checked_identifier(mart)?;
    let averages = LabTest::ALL
        .iter()
        .map(|test| {
            format!(
                "AVG(CASE WHEN l.test_name = '{}' THEN l.value END) AS {}",
                test.name(),
                test.mart_column()
            )
        })
        .collect::<Vec<_>>()
        .join(",\n    ");

    Ok(format!(
        "CREATE TABLE {mart} AS
SELECT
    e.enc_id,
    e.patient_id,
    e.admit_ts,
    e.discharge_ts,
    p.sex,
    p.age,
    ROUND(julianday(e.discharge_ts) - julianday(e.admit_ts), 2) AS length_of_stay_days,
    {averages},
    e.readmit_30d
FROM encounters e
JOIN patients p ON p.patient_id = e.patient_id
LEFT JOIN labs l ON l.enc_id = e.enc_id
GROUP BY e.enc_id, e.patient_id, e.admit_ts, e.discharge_ts, p.sex, p.age, e.readmit_30d
ORDER BY e.enc_id"
    ))
}

/// Drops and recreates the mart table; returns its row count.
#[instrument(skip(pool))]
pub async fn rebuild_mart(pool: &SqlitePool, mart: &str) -> Result<i64> {
    let create = mart_sql(mart)?;
    let mut tx = pool.begin().await?;
    sqlx::query(&format!("DROP TABLE IF EXISTS {mart}"))
        .execute(&mut *tx)
        .await?;
    sqlx::query(&create).execute(&mut *tx).await?;
    let (rows,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {mart}"))
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(rows)
}

/// Reads a whole table with whatever columns it has.
///
/// A column holding any text becomes `Utf8`, one holding any real becomes
/// `Float64`, and the rest are `Int64`.
#[instrument(skip(pool))]
pub async fn fetch_table(pool: &SqlitePool, table: &str) -> Result<RecordBatch> {
    let table = checked_identifier(table)?;
    let rows = sqlx::query(&format!("SELECT * FROM {table}"))
        .fetch_all(pool)
        .await?;

    let Some(first) = rows.first() else {
        return Err(ReadmitError::InvalidData(format!("{table} has no rows")));
    };
    let names: Vec<String> = first
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect();

    let mut cells: Vec<Vec<Cell>> = names
        .iter()
        .map(|_| Vec::with_capacity(rows.len()))
        .collect();
    for row in &rows {
        for (index, column) in cells.iter_mut().enumerate() {
            column.push(decode_cell(row, index)?);
        }
    }

    let batch = RecordBatch::try_from_iter(
        names
            .iter()
            .zip(cells)
            .map(|(name, column)| (name, column_array(column))),
    )?;
    debug!(rows = batch.num_rows(), columns = batch.num_columns(), "fetched table");
    Ok(batch)
}

enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

fn decode_cell(row: &sqlx::sqlite::SqliteRow, index: usize) -> Result<Cell> {
    let kind = {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(Cell::Null);
        }
        raw.type_info().name().to_string()
    };
    let cell = match kind.as_str() {
        "INTEGER" | "BOOLEAN" => Cell::Integer(row.try_get(index)?),
        "REAL" | "NUMERIC" => Cell::Real(row.try_get(index)?),
        "TEXT" | "DATE" | "TIME" | "DATETIME" => Cell::Text(row.try_get(index)?),
        other => {
            return Err(ReadmitError::InvalidData(format!(
                "column {index} has unsupported type {other}"
            )))
        }
    };
    Ok(cell)
}

fn column_array(cells: Vec<Cell>) -> ArrayRef {
    if cells.iter().any(|c| matches!(c, Cell::Text(_))) {
        let values: StringArray = cells
            .into_iter()
            .map(|cell| match cell {
                Cell::Null => None,
                Cell::Integer(v) => Some(v.to_string()),
                Cell::Real(v) => Some(v.to_string()),
                Cell::Text(v) => Some(v),
            })
            .collect();
        Arc::new(values)
    } else if cells.iter().any(|c| matches!(c, Cell::Real(_))) {
        let values: Float64Array = cells
            .into_iter()
            .map(|cell| match cell {
                Cell::Integer(v) => Some(v as f64),
                Cell::Real(v) => Some(v),
                Cell::Null | Cell::Text(_) => None,
            })
            .collect();
        Arc::new(values)
    } else {
        let values: Int64Array = cells
            .into_iter()
            .map(|cell| match cell {
                Cell::Integer(v) => Some(v),
                _ => None,
            })
            .collect();
        Arc::new(values)
    }
}

/// Headline cohort statistics from the mart.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct CohortOverview {
    pub encounters: i64,
    pub readmits: i64,
    pub readmit_rate_pct: Option<f64>,
    pub avg_age: Option<f64>,
    pub avg_los: Option<f64>,
}

#[instrument(skip(pool))]
pub async fn cohort_overview(pool: &SqlitePool, mart: &str) -> Result<CohortOverview> {
    let mart = checked_identifier(mart)?;
    let overview = sqlx::query_as::<_, CohortOverview>(&format!(
        "SELECT
            COUNT(*) AS encounters,
            COALESCE(SUM(CASE WHEN readmit_30d THEN 1 ELSE 0 END), 0) AS readmits,
            ROUND(100.0 * AVG(CASE WHEN readmit_30d THEN 1 ELSE 0 END), 2) AS readmit_rate_pct,
            ROUND(AVG(age), 2) AS avg_age,
            ROUND(AVG(length_of_stay_days), 2) AS avg_los
        FROM {mart}"
    ))
    .fetch_one(pool)
    .await?;
    Ok(overview)
}
