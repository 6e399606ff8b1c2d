use indexmap::map::Entry;
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::hash::Hash;

use super::dataset::Dataset;
use super::keys::KeyError;
use super::value::Value;

/// Group `rows` by `key` and keep the greatest row of each group under
/// `compare`. Ties keep the earlier row. Output follows the order in which
/// each group first appeared.
pub fn keep_max_by<T, K, FK, FC>(rows: impl IntoIterator<Item = T>, mut key: FK, mut compare: FC) -> Vec<T>
where
    K: Hash + Eq,
    FK: FnMut(&T) -> K,
    FC: FnMut(&T, &T) -> Ordering,
{
    let mut best: IndexMap<K, T> = IndexMap::new();
    for row in rows {
        match best.entry(key(&row)) {
            Entry::Occupied(mut slot) => {
                if compare(&row, slot.get()) == Ordering::Greater {
                    slot.insert(row);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(row);
            }
        }
    }
    best.into_values().collect()
}

/// Keep one row per `key_column`, preferring the highest `rank_column`.
pub fn dedup_by_highest(
    dataset: &Dataset,
    key_column: &str,
    rank_column: &str,
) -> Result<Dataset, KeyError> {
    let missing = |column: &str| KeyError::MissingColumn {
        column: column.to_string(),
    };
    let key_idx = dataset
        .column_index(key_column)
        .ok_or_else(|| missing(key_column))?;
    let rank_idx = dataset
        .column_index(rank_column)
        .ok_or_else(|| missing(rank_column))?;

    let cell = |row: &Vec<Value>, idx: usize| row.get(idx).cloned().unwrap_or(Value::Null);
    let kept = keep_max_by(
        dataset.rows().iter().cloned(),
        |row| cell(row, key_idx).key_text(),
        |a, b| cell(a, rank_idx).rank_cmp(&cell(b, rank_idx)),
    );
    Ok(Dataset::from_parts(dataset.columns().to_vec(), kept))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_highest_price_per_product() {
        let staged: Vec<(i32, f64)> = vec![(1, 10.0), (1, 25.0), (2, 5.0)];
        let kept = keep_max_by(staged, |r| r.0, |a, b| a.1.total_cmp(&b.1));
        assert_eq!(kept, vec![(1, 25.0), (2, 5.0)]);
    }

    #[test]
    fn ties_keep_the_first_row() {
        let staged = vec![(7, 3, "first"), (7, 3, "second"), (8, 1, "only")];
        let kept = keep_max_by(staged, |r| r.0, |a, b| a.1.cmp(&b.1));
        assert_eq!(kept, vec![(7, 3, "first"), (8, 1, "only")]);
    }

    #[test]
    fn group_order_follows_first_appearance() {
        let staged = vec![("b", 1), ("a", 1), ("b", 9), ("c", 0)];
        let kept = keep_max_by(staged, |r| r.0, |a, b| a.1.cmp(&b.1));
        assert_eq!(kept, vec![("b", 9), ("a", 1), ("c", 0)]);
    }

    #[test]
    fn dataset_dedup_compares_prices_numerically() {
        let csv = "product_id,brand,list_price\n\
                   1,Solex,10\n\
                   1,Solex,25.5\n\
                   1,Giant Bicycles,9.99\n\
                   2,Trek Bicycles,5\n";
        let ds = Dataset::from_reader(csv.as_bytes(), b',').unwrap();
        let out = dedup_by_highest(&ds, "product_id", "list_price").unwrap();
        assert_eq!(out.columns(), ds.columns());
        assert_eq!(out.len(), 2);
        assert_eq!(out.rows()[0][2], Value::text("25.5"));
        assert_eq!(out.rows()[1][0], Value::text("2"));
    }

    #[test]
    fn unknown_rank_column_is_an_error() {
        let ds = Dataset::new(["product_id"]);
        assert!(matches!(
            dedup_by_highest(&ds, "product_id", "list_price"),
            Err(KeyError::MissingColumn { column }) if column == "list_price"
        ));
    }
}
