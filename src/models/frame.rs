//! Arrow record batches for mart extracts and feature splits.
//!
//! Splits are carried as `RecordBatch`es between stages and touch CSV only
//! when they are written to or read back from the features directory.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float64Array, StringArray, UInt64Array, UInt8Array};
use arrow::compute::kernels::take;
use arrow::compute::{cast, concat_batches};
use arrow::csv::reader::Format;
use arrow::csv::{ReaderBuilder, WriterBuilder};
use arrow::datatypes::{DataType, Field, FieldRef, Schema};
use arrow::record_batch::RecordBatch;

use crate::error::{ReadmitError, Result};

/// Column names in schema order.
pub fn column_names(batch: &RecordBatch) -> Vec<String> {
    batch
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect()
}

pub fn has_column(batch: &RecordBatch, name: &str) -> bool {
    batch.schema().index_of(name).is_ok()
}

/// A column cast to `Float64`; `None` when the batch has no such column.
///
/// Text that does not parse as a number reads as null.
pub fn numeric_column(batch: &RecordBatch, name: &str) -> Result<Option<Vec<Option<f64>>>> {
    let Some(column) = batch.column_by_name(name) else {
        return Ok(None);
    };
    let array = cast(column, &DataType::Float64)?;
    let values = array
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| ReadmitError::InvalidData(format!("column {name} is not numeric")))?;
    Ok(Some(values.iter().collect()))
}

/// A column cast to `Utf8`; `None` when the batch has no such column.
///
/// Blank cells read as null.
pub fn text_column(batch: &RecordBatch, name: &str) -> Result<Option<Vec<Option<String>>>> {
    let Some(column) = batch.column_by_name(name) else {
        return Ok(None);
    };
    let array = cast(column, &DataType::Utf8)?;
    let values = array
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| ReadmitError::InvalidData(format!("column {name} is not text")))?;
    Ok(Some(
        values
            .iter()
            .map(|v| v.filter(|s| !s.trim().is_empty()).map(str::to_string))
            .collect(),
    ))
}

/// True when any non-null cell of the column is text.
pub fn is_text(batch: &RecordBatch, name: &str) -> bool {
    batch.column_by_name(name).is_some_and(|column| {
        matches!(column.data_type(), DataType::Utf8 | DataType::LargeUtf8)
            && column.null_count() < column.len()
    })
}

/// Reads a readmission label stored as bool, 0/1 or text.
fn parse_label(cell: &str) -> Option<u8> {
    match cell.trim().to_ascii_lowercase().as_str() {
        "0" | "0.0" | "false" => Some(0),
        "1" | "1.0" | "true" => Some(1),
        _ => None,
    }
}

/// Label cells as 0/1. Nulls and anything else are rejected with their row number.
pub fn labels(batch: &RecordBatch, name: &str) -> Result<Vec<u8>> {
    let cells = text_column(batch, name)?
        .ok_or_else(|| ReadmitError::InvalidData(format!("missing label column {name}")))?;
    cells
        .iter()
        .enumerate()
        .map(|(row, cell)| {
            cell.as_deref().and_then(parse_label).ok_or_else(|| {
                ReadmitError::InvalidData(format!("row {} has label {:?}", row + 1, cell))
            })
        })
        .collect()
}

/// Label vector as a `UInt8` column.
pub fn label_array(labels: &[u8]) -> ArrayRef {
    Arc::new(UInt8Array::from(labels.to_vec()))
}

/// Rows at `indices`, in that order.
pub fn take_rows(batch: &RecordBatch, indices: &[usize]) -> Result<RecordBatch> {
    let indices = UInt64Array::from_iter_values(indices.iter().map(|&i| i as u64));
    Ok(take::take_record_batch(batch, &indices)?)
}

/// Drops the named columns; names that are absent are ignored.
pub fn drop_columns(batch: &RecordBatch, names: &[&str]) -> Result<RecordBatch> {
    let schema = batch.schema();
    let keep: Vec<usize> = schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, f)| !names.contains(&f.name().as_str()))
        .map(|(i, _)| i)
        .collect();
    Ok(batch.project(&keep)?)
}

/// Removes a column and returns it.
pub fn pop_column(batch: &mut RecordBatch, name: &str) -> Result<ArrayRef> {
    let index = batch
        .schema()
        .index_of(name)
        .map_err(|_| ReadmitError::InvalidData(format!("missing column {name}")))?;
    Ok(batch.remove_column(index))
}

/// Appends a column; its length must match the row count.
pub fn with_column(batch: &RecordBatch, name: &str, values: ArrayRef) -> Result<RecordBatch> {
    let mut fields: Vec<FieldRef> = batch.schema().fields().iter().cloned().collect();
    fields.push(Arc::new(Field::new(
        name,
        values.data_type().clone(),
        values.null_count() > 0,
    )));
    let mut columns = batch.columns().to_vec();
    columns.push(values);
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Reads a CSV with a header row, inferring column types from the whole file.
pub fn read_csv(path: &Path) -> Result<RecordBatch> {
    let mut file = File::open(path).map_err(|e| ReadmitError::io(path, e))?;
    let format = Format::default().with_header(true);
    let (schema, _) = format.infer_schema(&mut file, None)?;
    file.seek(SeekFrom::Start(0))
        .map_err(|e| ReadmitError::io(path, e))?;

    let schema = Arc::new(schema);
    let reader = ReaderBuilder::new(schema.clone())
        .with_format(format)
        .build(file)?;
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(concat_batches(&schema, &batches)?)
}

pub fn write_csv(batch: &RecordBatch, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| ReadmitError::io(path, e))?;
    let mut writer = WriterBuilder::new().with_header(true).build(file);
    writer.write(batch)?;
    Ok(())
}
