// src/history/mod.rs

use anyhow::{anyhow, Context, Result};
use arrow::{
    array::{Array, ArrayRef, Date32Array, Float64Array},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use chrono::{Duration, NaiveDate};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::{
    fs::{self, File},
    io::BufWriter,
    path::PathBuf,
    sync::Arc,
};
use tracing::{debug, info, instrument};

use crate::table::{CleanTable, TenorRecord};

const DATE_COLUMN: &str = "date";

fn epoch() -> NaiveDate {
    // NaiveDate's default is 1970-01-01
    NaiveDate::default()
}

fn to_days(date: NaiveDate) -> i32 {
    (date - epoch()).num_days() as i32
}

fn from_days(days: i32) -> NaiveDate {
    epoch() + Duration::days(days as i64)
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    let idx = batch
        .schema()
        .index_of(name)
        .map_err(|_| anyhow!("history file lacks column `{}`", name))?;
    Ok(batch.column(idx))
}

/// Rate history kept across runs in one Parquet file: a `date` column plus a
/// nullable `Float64` column per tenor.
pub struct HistoryStore {
    path: PathBuf,
    tenors: Vec<String>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>, tenors: Vec<String>) -> Self {
        Self {
            path: path.into(),
            tenors,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn schema(&self) -> Schema {
        let mut fields = Vec::with_capacity(self.tenors.len() + 1);
        fields.push(Field::new(DATE_COLUMN, DataType::Date32, false));
        fields.extend(
            self.tenors
                .iter()
                .map(|t| Field::new(t, DataType::Float64, true)),
        );
        Schema::new(fields)
    }

    /// Read the stored table; `None` when nothing has been stored yet.
    pub fn load(&self) -> Result<Option<CleanTable>> {
        if !self.path.is_file() {
            return Ok(None);
        }
        let file = File::open(&self.path)
            .with_context(|| format!("failed to open `{}`", self.path.display()))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?
            .with_batch_size(1024)
            .build()?;

        let mut records = Vec::new();
        for batch in reader {
            let batch = batch.context("reading history batch")?;
            records.extend(self.batch_to_records(&batch)?);
        }
        debug!(records = records.len(), path = %self.path.display(), "history loaded");
        Ok(Some(CleanTable::new(self.tenors.clone(), records)?))
    }

    fn batch_to_records(&self, batch: &RecordBatch) -> Result<Vec<TenorRecord>> {
        let dates = column(batch, DATE_COLUMN)?
            .as_any()
            .downcast_ref::<Date32Array>()
            .ok_or_else(|| anyhow!("`{}` column is not Date32", DATE_COLUMN))?;
        let rates = self
            .tenors
            .iter()
            .map(|t| {
                column(batch, t)?
                    .as_any()
                    .downcast_ref::<Float64Array>()
                    .ok_or_else(|| anyhow!("`{}` column is not Float64", t))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((0..batch.num_rows())
            .filter(|&i| !dates.is_null(i))
            .map(|i| {
                let row = rates
                    .iter()
                    .map(|arr| (!arr.is_null(i)).then(|| arr.value(i)))
                    .collect();
                TenorRecord::new(from_days(dates.value(i)), row)
            })
            .collect())
    }

    /// Overwrite the stored table. Writes `<path>.tmp` then renames.
    pub fn save(&self, table: &CleanTable) -> Result<()> {
        if table.tenors() != self.tenors.as_slice() {
            return Err(anyhow!(
                "table tenors {:?} do not match history tenors {:?}",
                table.tenors(),
                self.tenors
            ));
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("could not create `{}`", parent.display()))?;
        }

        let schema = Arc::new(self.schema());
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(self.tenors.len() + 1);
        columns.push(Arc::new(Date32Array::from(
            table.records().iter().map(|r| to_days(r.date)).collect::<Vec<_>>(),
        )));
        for i in 0..self.tenors.len() {
            columns.push(Arc::new(Float64Array::from(
                table.records().iter().map(|r| r.rates[i]).collect::<Vec<_>>(),
            )));
        }
        let batch = RecordBatch::try_new(schema.clone(), columns)
            .context("building history record batch")?;

        let tmp = self.path.with_extension("parquet.tmp");
        let file = File::create(&tmp)
            .with_context(|| format!("creating history file {:?}", &tmp))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(BufWriter::new(file), schema, Some(props))
            .context("creating Arrow writer for history")?;
        writer.write(&batch).context("writing history batch")?;
        writer.close().context("closing history writer")?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("renaming {:?} → {:?}", tmp, self.path))?;
        Ok(())
    }

    /// Merge `current` into the stored history, persist, and return the merged table.
    #[instrument(level = "info", skip_all, fields(path = %self.path.display()))]
    pub fn merge_and_save(&self, current: &CleanTable) -> Result<CleanTable> {
        let merged = match self.load()? {
            Some(history) => CleanTable::merge(&history, current)?,
            None => current.clone(),
        };
        self.save(&merged)?;
        info!(records = merged.len(), "history updated");
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn tenors() -> Vec<String> {
        vec!["1WEEK".to_string(), "3MONTH".to_string()]
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 9, day).unwrap()
    }

    fn table(rows: Vec<(u32, Vec<Option<f64>>)>) -> CleanTable {
        CleanTable::new(
            tenors(),
            rows.into_iter()
                .map(|(day, r)| TenorRecord::new(d(day), r))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn load_without_file_is_none() {
        let tmp = tempdir().unwrap();
        let store = HistoryStore::new(tmp.path().join("history.parquet"), tenors());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn saved_table_reads_back_with_missing_values() {
        let tmp = tempdir().unwrap();
        let store = HistoryStore::new(tmp.path().join("h").join("history.parquet"), tenors());
        let t = table(vec![
            (22, vec![Some(0.57), None]),
            (23, vec![Some(0.575), Some(0.9)]),
        ]);

        store.save(&t).unwrap();
        assert_eq!(store.load().unwrap(), Some(t));
        assert!(!store.path().with_extension("parquet.tmp").exists());
    }

    #[test]
    fn merge_and_save_accumulates_days() {
        let tmp = tempdir().unwrap();
        let store = HistoryStore::new(tmp.path().join("history.parquet"), tenors());

        store
            .merge_and_save(&table(vec![(22, vec![Some(0.5), Some(0.8)])]))
            .unwrap();
        let merged = store
            .merge_and_save(&table(vec![
                (22, vec![Some(0.51), Some(0.8)]),
                (23, vec![Some(0.52), None]),
            ]))
            .unwrap();

        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get(d(22)).unwrap().rates[0], Some(0.51));
        assert_eq!(store.load().unwrap(), Some(merged));
    }

    #[test]
    fn rejects_file_without_a_tenor_column() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("history.parquet");
        HistoryStore::new(&path, vec!["1WEEK".to_string()])
            .save(&CleanTable::new(
                vec!["1WEEK".to_string()],
                vec![TenorRecord::new(d(1), vec![Some(0.1)])],
            )
            .unwrap())
            .unwrap();

        let err = HistoryStore::new(&path, tenors()).load().unwrap_err();
        assert!(err.to_string().contains("3MONTH"));
    }
}
