//! Features command - splits the mart into stratified train/val/test CSVs.

use std::collections::BTreeMap;
use std::path::Path;

use arrow::record_batch::RecordBatch;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{info, instrument};

use crate::config::{Config, SplitConfig};
use crate::db::{queries, Database};
use crate::error::{ReadmitError, Result};
use crate::models::{frame, FeatureMeta, SplitRows};

pub const LABEL: &str = "readmit_30d";

/// Identifier and timestamp columns that never become features.
pub const ID_COLUMNS: [&str; 4] = ["enc_id", "patient_id", "admit_ts", "discharge_ts"];

#[derive(Debug, Clone)]
pub struct FeatureSplits {
    pub train: RecordBatch,
    pub val: RecordBatch,
    pub test: RecordBatch,
    pub meta: FeatureMeta,
}

/// Splits row positions into `(rest, held_out)`, preserving the label ratio in both.
///
/// The held-out size is `ceil(held_out_fraction * n)`; each class contributes
/// its proportional share, with leftover rows going to the largest remainders.
pub fn stratified_split(
    labels: &[u8],
    held_out_fraction: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>)> {
    let n = labels.len();
    if !(0.0..1.0).contains(&held_out_fraction) || held_out_fraction == 0.0 {
        return Err(ReadmitError::InvalidData(format!(
            "split fraction {held_out_fraction} must be in (0, 1)"
        )));
    }
    let n_held = (held_out_fraction * n as f64).ceil() as usize;
    if n_held == 0 || n_held >= n {
        return Err(ReadmitError::InvalidData(format!(
            "cannot hold out {n_held} of {n} rows"
        )));
    }

    let mut classes: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        classes.entry(label).or_default().push(i);
    }
    if let Some((label, members)) = classes.iter().find(|(_, m)| m.len() < 2) {
        return Err(ReadmitError::InvalidData(format!(
            "class {label} has only {} member(s); stratified split needs at least 2",
            members.len()
        )));
    }

    // proportional allocation with largest-remainder rounding
    let mut allocation: Vec<(u8, usize, f64)> = classes
        .iter()
        .map(|(&label, members)| {
            let exact = members.len() as f64 * n_held as f64 / n as f64;
            (label, exact.floor() as usize, exact.fract())
        })
        .collect();
    let mut remaining = n_held - allocation.iter().map(|a| a.1).sum::<usize>();
    let mut by_remainder: Vec<usize> = (0..allocation.len()).collect();
    by_remainder.sort_by(|&a, &b| allocation[b].2.total_cmp(&allocation[a].2));
    for idx in by_remainder {
        if remaining == 0 {
            break;
        }
        allocation[idx].1 += 1;
        remaining -= 1;
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut rest = Vec::with_capacity(n - n_held);
    let mut held = Vec::with_capacity(n_held);
    for (label, take, _) in allocation {
        let mut members = classes.remove(&label).unwrap_or_default();
        members.shuffle(&mut rng);
        let take = take.min(members.len());
        held.extend_from_slice(&members[..take]);
        rest.extend_from_slice(&members[take..]);
    }
    rest.shuffle(&mut rng);
    held.shuffle(&mut rng);
    Ok((rest, held))
}

/// Feature columns holding any text value are categorical; the rest are numerical.
pub fn classify_columns(features: &RecordBatch) -> (Vec<String>, Vec<String>) {
    frame::column_names(features)
        .into_iter()
        .partition(|name| frame::is_text(features, name))
}

/// Drops id columns and partitions the mart into train/val/test.
pub fn build_splits(mart: &RecordBatch, config: &SplitConfig) -> Result<FeatureSplits> {
    let labels = frame::labels(mart, LABEL)?;
    let mut drop = vec![LABEL];
    drop.extend(ID_COLUMNS);
    let features = frame::drop_columns(mart, &drop)?;

    let (train_val, test) = stratified_split(&labels, config.test_size, config.random_seed)?;
    let train_val_labels: Vec<u8> = train_val.iter().map(|&i| labels[i]).collect();
    let (train_local, val_local) =
        stratified_split(&train_val_labels, config.val_size, config.random_seed)?;
    let train: Vec<usize> = train_local.iter().map(|&i| train_val[i]).collect();
    let val: Vec<usize> = val_local.iter().map(|&i| train_val[i]).collect();

    let part = |indices: &[usize]| -> Result<RecordBatch> {
        let y: Vec<u8> = indices.iter().map(|&i| labels[i]).collect();
        frame::with_column(
            &frame::take_rows(&features, indices)?,
            LABEL,
            frame::label_array(&y),
        )
    };

    let (categoricals, numericals) = classify_columns(&features);
    let meta = FeatureMeta {
        label: LABEL.to_string(),
        categoricals,
        numericals,
        rows: SplitRows {
            train: train.len(),
            val: val.len(),
            test: test.len(),
        },
    };

    Ok(FeatureSplits {
        train: part(&train)?,
        val: part(&val)?,
        test: part(&test)?,
        meta,
    })
}

pub fn write_splits(splits: &FeatureSplits, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| ReadmitError::io(dir, e))?;
    frame::write_csv(&splits.train, &dir.join("train.csv"))?;
    frame::write_csv(&splits.val, &dir.join("val.csv"))?;
    frame::write_csv(&splits.test, &dir.join("test.csv"))?;
    splits.meta.save(&dir.join("meta.json"))
}

/// Runs the features command.
#[instrument(skip(config))]
pub async fn run(config: &Config) -> Result<FeatureMeta> {
    let db = Database::connect(config.database.url()?).await?;
    let mart = queries::fetch_table(db.pool(), &config.database.mart_table).await?;

    let splits = build_splits(&mart, &config.split)?;
    let dir = config.paths.features_dir();
    write_splits(&splits, &dir)?;

    info!(dir = %dir.display(), meta = ?splits.meta, "Wrote features");
    Ok(splits.meta)
}
