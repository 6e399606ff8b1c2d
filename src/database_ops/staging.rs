//! Promote a staging table into its final table, one row per natural key.
use anyhow::{Context, Result};
use sqlx::{postgres::PgRow, PgConnection, Row};
use tracing::{info, instrument};

use super::loader::bulk_insert;
use super::schema::TableDef;
use crate::normalization::{dedup_by_highest, Dataset, SqlType, Value};

/// Where the survivors are ranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum DedupMode {
    /// `row_number()` window inside Postgres.
    #[default]
    Sql,
    /// Read staging rows back and rank them in process.
    Memory,
}

#[derive(Debug, Clone, Copy)]
pub struct DedupPlan {
    pub staging: &'static TableDef,
    pub target: &'static TableDef,
    pub key_column: &'static str,
    pub rank_column: &'static str,
}

impl DedupPlan {
    pub fn promote_sql(&self) -> String {
        let cols = self.target.column_list();
        format!(
            "INSERT INTO {target} ({cols}) \
             SELECT {cols} FROM ( \
             SELECT *, row_number() OVER (PARTITION BY {key} ORDER BY {rank} DESC NULLS LAST, ctid) AS rn \
             FROM {staging}) AS ranked \
             WHERE rn = 1",
            target = self.target.name,
            key = self.key_column,
            rank = self.rank_column,
            staging = self.staging.name,
        )
    }

    pub fn drop_staging_sql(&self) -> String {
        format!("DROP TABLE IF EXISTS {}", self.staging.name)
    }
}

/// Fill `plan.target` with the top-ranked staging row per key, then drop
/// the staging table. Returns the number of rows promoted.
#[instrument(skip(conn, plan), fields(staging = plan.staging.name, target = plan.target.name))]
pub async fn promote(
    conn: &mut PgConnection,
    plan: &DedupPlan,
    mode: DedupMode,
    chunk_cap: Option<usize>,
) -> Result<u64> {
    let promoted = match mode {
        DedupMode::Sql => sqlx::raw_sql(&plan.promote_sql())
            .execute(&mut *conn)
            .await
            .with_context(|| format!("promote {} into {}", plan.staging.name, plan.target.name))?
            .rows_affected(),
        DedupMode::Memory => {
            let staged = fetch_dataset(conn, plan.staging).await?;
            let kept = dedup_by_highest(&staged, plan.key_column, plan.rank_column)?;
            info!(staged = staged.len(), kept = kept.len(), "ranked staging rows");
            bulk_insert(conn, plan.target, &kept, chunk_cap).await?
        }
    };

    sqlx::raw_sql(&plan.drop_staging_sql())
        .execute(&mut *conn)
        .await?;
    info!(promoted, "staging promoted and dropped");
    Ok(promoted)
}

/// Rows in physical order. For a freshly filled staging table that is
/// insertion order, the same tie-break the window promotion uses.
pub fn select_in_load_order_sql(table: &TableDef) -> String {
    format!("SELECT {} FROM {} ORDER BY ctid", table.column_list(), table.name)
}

/// Read a whole table into a dataset, decoding each column by its catalogue type.
pub async fn fetch_dataset(conn: &mut PgConnection, table: &'static TableDef) -> Result<Dataset> {
    let sql = select_in_load_order_sql(table);
    let rows = sqlx::query(&sql)
        .persistent(false)
        .fetch_all(&mut *conn)
        .await
        .with_context(|| format!("read {}", table.name))?;

    let mut out = Dataset::new(table.columns.iter().map(|c| c.name));
    for row in &rows {
        let cells = table
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| decode_cell(row, i, c.ty))
            .collect::<Result<Vec<_>, _>>()?;
        out.push_row(cells);
    }
    Ok(out)
}

fn decode_cell(row: &PgRow, idx: usize, ty: SqlType) -> Result<Value, sqlx::Error> {
    let value = match ty {
        SqlType::BigInt => row.try_get::<Option<i64>, _>(idx)?.map(Value::Int),
        SqlType::Integer => row
            .try_get::<Option<i32>, _>(idx)?
            .map(|v| Value::Int(v.into())),
        SqlType::Float => row.try_get::<Option<f64>, _>(idx)?.map(Value::Float),
        SqlType::Boolean => row.try_get::<Option<bool>, _>(idx)?.map(Value::Bool),
        SqlType::Date => row
            .try_get::<Option<chrono::NaiveDate>, _>(idx)?
            .map(Value::Date),
        SqlType::Text => row.try_get::<Option<String>, _>(idx)?.map(Value::Text),
    };
    Ok(value.unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::schema::ORDERS;
    use crate::database_ops::PreparedBatch;

    fn product_plan() -> DedupPlan {
        DedupPlan {
            staging: ORDERS.table("product_temp").unwrap(),
            target: ORDERS.table("product").unwrap(),
            key_column: "product_id",
            rank_column: "list_price",
        }
    }

    #[test]
    fn promote_sql_ranks_by_price_within_product() {
        let sql = product_plan().promote_sql();
        assert!(sql.starts_with(
            "INSERT INTO product (product_id, brand, product_line, product_class, product_size, list_price, standard_cost) SELECT product_id, brand,"
        ));
        assert!(sql.contains(
            "row_number() OVER (PARTITION BY product_id ORDER BY list_price DESC NULLS LAST, ctid) AS rn"
        ));
        assert!(sql.contains("FROM product_temp) AS ranked"));
        assert!(sql.ends_with("WHERE rn = 1"));
    }

    #[test]
    fn drops_only_the_staging_table() {
        assert_eq!(
            product_plan().drop_staging_sql(),
            "DROP TABLE IF EXISTS product_temp"
        );
    }

    #[test]
    fn staging_is_read_back_in_load_order() {
        assert_eq!(
            select_in_load_order_sql(product_plan().staging),
            "SELECT product_id, brand, product_line, product_class, product_size, list_price, standard_cost \
             FROM product_temp ORDER BY ctid"
        );
    }

    #[test]
    fn memory_mode_keeps_the_first_of_tied_prices() {
        // rows as fetch_dataset would decode them, in ctid order
        let plan = product_plan();
        let mut staged = Dataset::new(plan.staging.columns.iter().map(|c| c.name));
        for (id, brand, price) in [(3, "Norco Bicycles", 40.0), (3, "Giant Bicycles", 40.0), (4, "OHM Cycles", 9.5)] {
            staged.push_row(vec![
                Value::Int(id),
                Value::text(brand),
                Value::text("Standard"),
                Value::text("medium"),
                Value::text("medium"),
                Value::Float(price),
                Value::Null,
            ]);
        }
        let kept = dedup_by_highest(&staged, plan.key_column, plan.rank_column).unwrap();
        assert_eq!(kept.len(), 2);
        assert_eq!(kept.rows()[0][1], Value::text("Norco Bicycles"));

        let batch = PreparedBatch::prepare(plan.target, &kept).unwrap();
        assert_eq!(batch.rows()[1][0], Value::Int(4));
        assert_eq!(batch.rows()[1][6], Value::Null);
    }
}
