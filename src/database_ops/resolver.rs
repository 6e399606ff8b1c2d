use anyhow::{anyhow, Context, Result};
use itertools::Itertools;
use sqlx::{PgConnection, Row};
use tracing::{info, instrument, warn};

use super::schema::TableDef;
use crate::normalization::{CollisionPolicy, CompositeKey, KeyMap, SqlType};

/// Where a dimension's composite key lives.
#[derive(Debug, Clone, Copy)]
pub struct KeySource<'a> {
    pub table: &'a str,
    pub id_column: &'a str,
    pub columns: &'a [&'a str],
}

impl KeySource<'_> {
    /// Ids are widened to bigint and key columns cast to text so one decode
    /// path serves every dimension. Rows come back in id order, which makes
    /// "later row" under last-write-wins mean "higher id".
    pub fn select_sql(&self) -> String {
        format!(
            "SELECT {}::bigint, {} FROM {} ORDER BY {}",
            self.id_column,
            self.columns.iter().map(|c| format!("{c}::text")).join(", "),
            self.table,
            self.id_column
        )
    }

    /// Catalogue types of the key columns, in key order.
    pub fn key_types(&self, table: &TableDef) -> Result<Vec<SqlType>> {
        self.columns
            .iter()
            .map(|c| {
                table
                    .column(c)
                    .map(|def| def.ty)
                    .ok_or_else(|| anyhow!("{} has no key column {}", table.name, c))
            })
            .collect()
    }
}

/// Read every `(id, key...)` row of a loaded dimension table into a key map.
///
/// The map remembers the key column types from `table` so dependent rows are
/// coerced the same way the loader coerced the dimension.
#[instrument(skip(conn, table, source), fields(table = source.table))]
pub async fn resolve_key_map(
    conn: &mut PgConnection,
    table: &TableDef,
    source: &KeySource<'_>,
    policy: CollisionPolicy,
) -> Result<KeyMap> {
    let key_types = source.key_types(table)?;
    let sql = source.select_sql();
    let rows = sqlx::query(&sql)
        .persistent(false)
        .fetch_all(&mut *conn)
        .await
        .with_context(|| format!("read composite keys from {}", source.table))?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in &rows {
        let id: i64 = row.try_get(0)?;
        let parts = (1..=source.columns.len())
            .map(|i| row.try_get::<Option<String>, _>(i))
            .collect::<Result<Vec<_>, _>>()?;
        entries.push((id, CompositeKey::new(parts)));
    }

    let map = KeyMap::from_rows(source.table, source.columns, entries, policy)?
        .with_key_types(key_types);
    if map.is_empty() {
        warn!("dimension is empty; every dependent lookup will miss");
    }
    if map.collisions() > 0 {
        warn!(
            collisions = map.collisions(),
            "dimension has duplicate composite keys; later rows won"
        );
    }
    info!(keys = map.len(), rows = rows.len(), "key map built");
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database_ops::schema::TRANSACTIONS;

    #[test]
    fn select_casts_keys_to_text_in_declared_order() {
        let source = KeySource {
            table: "postal_object",
            id_column: "id",
            columns: &["postcode", "state"],
        };
        assert_eq!(
            source.select_sql(),
            "SELECT id::bigint, postcode::text, state::text FROM postal_object ORDER BY id"
        );
    }

    #[test]
    fn key_types_follow_the_catalogue() {
        let source = KeySource {
            table: "postal_object",
            id_column: "id",
            columns: &["postcode", "state"],
        };
        let table = TRANSACTIONS.table("postal_object").unwrap();
        assert_eq!(
            source.key_types(table).unwrap(),
            vec![SqlType::Integer, SqlType::Text]
        );

        let bogus = KeySource {
            columns: &["postcode", "suburb"],
            ..source
        };
        assert!(bogus.key_types(table).is_err());
    }
}
