//! End-to-end load runs. Each pipeline walks the run stages in order on a
//! single transaction and commits once at the end.
pub mod orders;
pub mod transactions;

use anyhow::Result;
use indexmap::IndexMap;
use tracing::info;

use crate::config::LoadConfig;
use crate::normalization::Dataset;

/// Rows written per table, in load order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub pipeline: &'static str,
    pub tables: IndexMap<&'static str, u64>,
}

impl RunSummary {
    pub fn new(pipeline: &'static str) -> Self {
        Self {
            pipeline,
            tables: IndexMap::new(),
        }
    }

    pub fn record(&mut self, table: &'static str, rows: u64) {
        *self.tables.entry(table).or_insert(0) += rows;
    }

    pub fn total_rows(&self) -> u64 {
        self.tables.values().sum()
    }

    pub fn log(&self) {
        for (table, rows) in &self.tables {
            info!(pipeline = self.pipeline, table, rows, "loaded");
        }
        info!(
            pipeline = self.pipeline,
            total = self.total_rows(),
            "run complete"
        );
    }
}

pub(crate) fn read_table_csv(cfg: &LoadConfig, file: &str, default_delimiter: u8) -> Result<Dataset> {
    let delimiter = cfg.delimiter_for(file, default_delimiter)?;
    let path = cfg.csv_path(file);
    let ds = Dataset::read_csv(&path, delimiter)?;
    info!(file = %path.display(), rows = ds.len(), "csv read");
    Ok(ds)
}
