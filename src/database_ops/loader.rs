//! Batched multi-row inserts from a [`Dataset`] into a catalogued table.
use anyhow::{Context, Result};
use itertools::Itertools;
use sqlx::{query_builder::Separated, PgConnection, Postgres, QueryBuilder};
use thiserror::Error;
use tracing::{debug, info, instrument};

use super::schema::{ColumnDef, TableDef};
use crate::normalization::{Dataset, SqlType, Value};

/// Postgres rejects statements with more bind parameters than this.
pub const MAX_BIND_PARAMS: usize = 65_535;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("{table}: unknown column {column}")]
    UnknownColumn { table: String, column: String },
    #[error("{table}: row {row} has {found} values, expected {expected}")]
    RowShape {
        table: String,
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("{table}.{column} row {row}: cannot read {value:?} as {ty}")]
    Coerce {
        table: String,
        column: String,
        row: usize,
        value: String,
        ty: SqlType,
    },
}

/// Rows validated against a table and coerced to its column types.
#[derive(Debug)]
pub struct PreparedBatch {
    table: &'static TableDef,
    columns: Vec<&'static ColumnDef>,
    rows: Vec<Vec<Value>>,
}

impl PreparedBatch {
    /// Validate column names and row widths, then coerce every cell.
    /// Empty strings become NULL here.
    pub fn prepare(table: &'static TableDef, dataset: &Dataset) -> Result<Self, LoadError> {
        let columns = dataset
            .columns()
            .iter()
            .map(|name| {
                table.column(name).ok_or_else(|| LoadError::UnknownColumn {
                    table: table.name.to_string(),
                    column: name.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut rows = Vec::with_capacity(dataset.len());
        for (i, row) in dataset.rows().iter().enumerate() {
            if row.len() != columns.len() {
                return Err(LoadError::RowShape {
                    table: table.name.to_string(),
                    row: i + 1,
                    expected: columns.len(),
                    found: row.len(),
                });
            }
            let coerced = row
                .iter()
                .zip(&columns)
                .map(|(value, column)| {
                    value.coerce(column.ty).ok_or_else(|| LoadError::Coerce {
                        table: table.name.to_string(),
                        column: column.name.to_string(),
                        row: i + 1,
                        value: value.to_string(),
                        ty: column.ty,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            rows.push(coerced);
        }

        Ok(Self {
            table,
            columns,
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Rows per INSERT: as many as fit under the bind limit, optionally capped.
    pub fn chunk_rows(&self, cap: Option<usize>) -> usize {
        let by_params = (MAX_BIND_PARAMS / self.columns.len().max(1)).max(1);
        cap.filter(|c| *c > 0).map_or(by_params, |c| c.min(by_params))
    }

    /// One INSERT statement per chunk.
    pub fn statements(&self, cap: Option<usize>) -> Vec<QueryBuilder<'static, Postgres>> {
        let head = format!(
            "INSERT INTO {} ({}) ",
            self.table.name,
            self.columns.iter().map(|c| c.name).join(", ")
        );
        self.rows
            .chunks(self.chunk_rows(cap))
            .map(|chunk| {
                let mut qb: QueryBuilder<'static, Postgres> = QueryBuilder::new(head.clone());
                qb.push_values(chunk, |mut b, row| {
                    for (value, column) in row.iter().zip(&self.columns) {
                        push_cell(&mut b, column.ty, value);
                    }
                });
                qb
            })
            .collect()
    }
}

/// What gets bound for one coerced cell.
#[derive(Debug, Clone, PartialEq)]
pub enum CellBind {
    /// A NULL typed as the column, so Postgres does not infer `text` for it.
    Null(SqlType),
    BigInt(i64),
    Integer(i32),
    Float(f64),
    Bool(bool),
    Date(chrono::NaiveDate),
    Text(String),
}

pub fn bind_for(ty: SqlType, value: &Value) -> CellBind {
    match value {
        Value::Null => CellBind::Null(ty),
        Value::Text(s) if s.is_empty() => CellBind::Null(ty),
        // range checked during coercion
        Value::Int(i) if ty == SqlType::Integer => CellBind::Integer(*i as i32),
        Value::Int(i) => CellBind::BigInt(*i),
        Value::Float(f) => CellBind::Float(*f),
        Value::Bool(v) => CellBind::Bool(*v),
        Value::Date(d) => CellBind::Date(*d),
        Value::Text(s) => CellBind::Text(s.clone()),
    }
}

fn push_cell(b: &mut Separated<'_, 'static, Postgres, &'static str>, ty: SqlType, value: &Value) {
    match bind_for(ty, value) {
        CellBind::Null(SqlType::BigInt) => b.push_bind(None::<i64>),
        CellBind::Null(SqlType::Integer) => b.push_bind(None::<i32>),
        CellBind::Null(SqlType::Float) => b.push_bind(None::<f64>),
        CellBind::Null(SqlType::Boolean) => b.push_bind(None::<bool>),
        CellBind::Null(SqlType::Date) => b.push_bind(None::<chrono::NaiveDate>),
        CellBind::Null(SqlType::Text) => b.push_bind(None::<String>),
        CellBind::BigInt(i) => b.push_bind(i),
        CellBind::Integer(i) => b.push_bind(i),
        CellBind::Float(f) => b.push_bind(f),
        CellBind::Bool(v) => b.push_bind(v),
        CellBind::Date(d) => b.push_bind(d),
        CellBind::Text(s) => b.push_bind(s),
    };
}

/// Insert every row of `dataset` into `table`. All statements run on the
/// caller's connection, normally inside the run transaction. Returns the
/// number of rows written.
#[instrument(skip(conn, table, dataset), fields(table = table.name, rows = dataset.len()))]
pub async fn bulk_insert(
    conn: &mut PgConnection,
    table: &'static TableDef,
    dataset: &Dataset,
    chunk_cap: Option<usize>,
) -> Result<u64> {
    let batch = PreparedBatch::prepare(table, dataset)?;
    if batch.is_empty() {
        info!("no rows to insert");
        return Ok(0);
    }

    let mut written = 0u64;
    for (i, mut qb) in batch.statements(chunk_cap).into_iter().enumerate() {
        let res = qb
            .build()
            .persistent(false)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("insert into {} (chunk {})", table.name, i + 1))?;
        debug!(chunk = i + 1, rows = res.rows_affected(), "chunk inserted");
        written += res.rows_affected();
    }
    info!(written, "table loaded");
    Ok(written)
}
