use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord};
use std::{fs::File, io::BufReader, io::Read, path::Path};

use super::value::Value;

/// Ordered rows sharing one column list. Cells read from CSV are kept as
/// text; empty strings survive until the loader normalizes them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Dataset {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Build from parts without checking row widths; the loader validates
    /// shape before anything is written.
    pub fn from_parts(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn read_csv(path: &Path, delimiter: u8) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        Self::from_reader(BufReader::with_capacity(1 << 20, file), delimiter)
            .with_context(|| format!("parse {}", path.display()))
    }

    pub fn from_reader<R: Read>(reader: R, delimiter: u8) -> Result<Self, csv::Error> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .flexible(false)
            .trim(csv::Trim::None)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let mut out = Dataset::new(headers.iter().map(|h| h.trim()));
        let mut rec = StringRecord::new();
        while rdr.read_record(&mut rec)? {
            out.rows.push(rec.iter().map(Value::text).collect());
        }
        Ok(out)
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Case-insensitive, since Postgres folds unquoted identifiers.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
    }
}
