use super::dataset::Dataset;
use super::keys::{KeyError, KeyMap};
use super::value::Value;

/// How a dependent dataset refers to a dimension.
#[derive(Debug, Clone, Copy)]
pub struct RemapPlan<'a> {
    /// Natural-key columns in the dependent dataset, in key-map order.
    pub natural_columns: &'a [&'a str],
    /// Column that receives the surrogate id. Replaced in place when it is
    /// already present, appended otherwise.
    pub target_column: &'a str,
    /// Extra columns to drop alongside the natural key.
    pub drop_columns: &'a [&'a str],
}

/// Replace natural-key columns with the surrogate id resolved through `map`.
///
/// Every row is resolved before any output is built, so a single missing
/// key yields an error and no rows at all.
pub fn remap(dataset: &Dataset, map: &KeyMap, plan: &RemapPlan<'_>) -> Result<Dataset, KeyError> {
    let key_idx = plan
        .natural_columns
        .iter()
        .map(|c| {
            dataset
                .column_index(c)
                .ok_or_else(|| KeyError::MissingColumn {
                    column: (*c).to_string(),
                })
        })
        .collect::<Result<Vec<usize>, _>>()?;

    let ids = dataset
        .rows()
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let key = map.key_for(key_idx.iter().map(|&k| row.get(k).unwrap_or(&Value::Null)));
            map.get(&key).ok_or_else(|| KeyError::KeyNotFound {
                table: map.table().to_string(),
                key: key.token(),
                row: i + 1,
            })
        })
        .collect::<Result<Vec<i64>, _>>()?;

    let target_idx = dataset.column_index(plan.target_column);
    let dropped = |idx: usize, name: &str| {
        Some(idx) != target_idx
            && (key_idx.contains(&idx)
                || plan
                    .drop_columns
                    .iter()
                    .any(|d| d.eq_ignore_ascii_case(name)))
    };

    // Source index per output column; None marks the surrogate id slot.
    let mut layout: Vec<Option<usize>> = Vec::with_capacity(dataset.columns().len() + 1);
    let mut columns: Vec<String> = Vec::with_capacity(dataset.columns().len() + 1);
    for (idx, name) in dataset.columns().iter().enumerate() {
        if Some(idx) == target_idx {
            layout.push(None);
            columns.push(name.clone());
        } else if !dropped(idx, name) {
            layout.push(Some(idx));
            columns.push(name.clone());
        }
    }
    if target_idx.is_none() {
        layout.push(None);
        columns.push(plan.target_column.to_string());
    }

    let rows = dataset
        .rows()
        .iter()
        .zip(ids)
        .map(|(row, id)| {
            layout
                .iter()
                .map(|slot| match slot {
                    Some(src) => row.get(*src).cloned().unwrap_or(Value::Null),
                    None => Value::Int(id),
                })
                .collect()
        })
        .collect();

    Ok(Dataset::from_parts(columns, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalization::keys::{CollisionPolicy, CompositeKey};
    use crate::normalization::value::SqlType;

    const JOB_KEY: [&str; 3] = ["job_title", "job_industry_category", "wealth_segment"];

    fn job_map() -> KeyMap {
        let rows = vec![
            (
                1,
                CompositeKey::new([Some("Executive Secretary"), Some("Health"), Some("Mass Customer")]),
            ),
            (2, CompositeKey::new([None, Some("IT"), Some("Affluent Customer")])),
        ];
        KeyMap::from_rows("job", &JOB_KEY, rows, CollisionPolicy::LastWriteWins).unwrap()
    }

    fn customers() -> Dataset {
        let csv = "id,first_name,job_title,job_industry_category,wealth_segment,owns_car\n\
                   1,Laraine,Executive Secretary,Health,Mass Customer,Yes\n\
                   2,Eli,,IT,Affluent Customer,No\n";
        Dataset::from_reader(csv.as_bytes(), b',').unwrap()
    }

    fn job_plan() -> RemapPlan<'static> {
        RemapPlan {
            natural_columns: &JOB_KEY,
            target_column: "job_id",
            drop_columns: &[],
        }
    }

    #[test]
    fn replaces_natural_key_with_surrogate_column() {
        let out = remap(&customers(), &job_map(), &job_plan()).unwrap();
        assert_eq!(out.columns(), ["id", "first_name", "owns_car", "job_id"]);
        assert_eq!(out.len(), 2);
        assert_eq!(out.rows()[0][3], Value::Int(1));
        // empty job_title resolves through the missing-component rule
        assert_eq!(out.rows()[1][3], Value::Int(2));
        assert_eq!(out.rows()[1][1], Value::text("Eli"));
    }

    #[test]
    fn target_that_is_part_of_the_key_is_replaced_in_place() {
        let products = KeyMap::from_rows(
            "product",
            &["product_number", "brand"],
            vec![(40, CompositeKey::new([Some("2"), Some("Solex")]))],
            CollisionPolicy::Fail,
        )
        .unwrap();
        let csv = "id,product_id,brand,list_price\n7,2,Solex,71.49\n";
        let txns = Dataset::from_reader(csv.as_bytes(), b',').unwrap();
        let plan = RemapPlan {
            natural_columns: &["product_id", "brand"],
            target_column: "product_id",
            drop_columns: &[],
        };
        let out = remap(&txns, &products, &plan).unwrap();
        assert_eq!(out.columns(), ["id", "product_id", "list_price"]);
        assert_eq!(
            out.rows()[0],
            vec![Value::text("7"), Value::Int(40), Value::text("71.49")]
        );
    }

    #[test]
    fn extra_drop_columns_are_removed() {
        let plan = RemapPlan {
            natural_columns: &JOB_KEY,
            target_column: "job_id",
            drop_columns: &["owns_car"],
        };
        let out = remap(&customers(), &job_map(), &plan).unwrap();
        assert_eq!(out.columns(), ["id", "first_name", "job_id"]);
    }

    #[test]
    fn missing_key_fails_and_produces_nothing() {
        let mut ds = customers();
        ds.push_row(vec![
            Value::text("3"),
            Value::text("Sheila"),
            Value::text("Nuclear Power Engineer"),
            Value::text("Manufacturing"),
            Value::text("High Net Worth"),
            Value::text("Yes"),
        ]);
        let err = remap(&ds, &job_map(), &job_plan()).unwrap_err();
        match err {
            KeyError::KeyNotFound { table, key, row } => {
                assert_eq!(table, "job");
                assert_eq!(row, 3);
                assert_eq!(key, "Nuclear Power Engineer_Manufacturing_High Net Worth");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_key_column_is_reported() {
        let plan = RemapPlan {
            natural_columns: &["postcode", "state"],
            target_column: "postal_object_id",
            drop_columns: &[],
        };
        let err = remap(&customers(), &job_map(), &plan).unwrap_err();
        assert!(matches!(err, KeyError::MissingColumn { column } if column == "postcode"));
    }

    #[test]
    fn remapping_is_pure() {
        let ds = customers();
        let map = job_map();
        let a = remap(&ds, &map, &job_plan()).unwrap();
        let b = remap(&ds, &map, &job_plan()).unwrap();
        assert_eq!(a, b);
        assert_eq!(ds, customers());
    }

    #[test]
    fn one_to_one_keys_resolve_every_row() {
        let dims: Vec<(i64, CompositeKey)> = (1..=50)
            .map(|i| {
                (
                    i * 10,
                    CompositeKey::new([Some(format!("{}", 2000 + i)), Some("NSW".to_string())]),
                )
            })
            .collect();
        let map = KeyMap::from_rows(
            "postal_object",
            &["postcode", "state"],
            dims,
            CollisionPolicy::Fail,
        )
        .unwrap();

        let mut ds = Dataset::new(["id", "postcode", "state"]);
        for i in 1..=50 {
            ds.push_row(vec![
                Value::Int(i),
                Value::text(format!("{}", 2000 + i)),
                Value::text("NSW"),
            ]);
        }
        let plan = RemapPlan {
            natural_columns: &["postcode", "state"],
            target_column: "postal_object_id",
            drop_columns: &[],
        };
        let out = remap(&ds, &map, &plan).unwrap();
        assert_eq!(out.len(), 50);
        for (i, row) in out.rows().iter().enumerate() {
            assert_eq!(row[1], Value::Int((i as i64 + 1) * 10));
        }
    }

    #[test]
    fn padded_integer_postcodes_match_the_stored_value() {
        // postal_object.postcode is an integer column, so `0800` is stored as 800
        let map = KeyMap::from_rows(
            "postal_object",
            &["postcode", "state"],
            vec![(1, CompositeKey::new([Some("800"), Some("NT")]))],
            CollisionPolicy::Fail,
        )
        .unwrap()
        .with_key_types(vec![SqlType::Integer, SqlType::Text]);

        let csv = "id,postcode,state\n1,0800,NT\n2, 800,NT\n";
        let ds = Dataset::from_reader(csv.as_bytes(), b',').unwrap();
        let plan = RemapPlan {
            natural_columns: &["postcode", "state"],
            target_column: "postal_object_id",
            drop_columns: &[],
        };
        let out = remap(&ds, &map, &plan).unwrap();
        assert_eq!(out.columns(), ["id", "postal_object_id"]);
        assert_eq!(out.rows()[0][1], Value::Int(1));
        assert_eq!(out.rows()[1][1], Value::Int(1));
    }
}
